//! Structural link validation.
//!
//! Every create-with-parent and re-parent goes through [`TreeValidator`]
//! before the store is touched. The validator is a pure decision: it only
//! reads goals, either from the store or from inside an atomic relink.
//!
//! Depth counts levels. A root is level 1, its children level 2, and so
//! on. A link is rejected when the deepest goal it would produce sits
//! below `tree.max_depth`.

use crate::config::TreeConfig;
use crate::error::{GoalTreeError, Result};
use crate::goal::{Goal, GoalId, GoalKind, OwnerId};
use crate::store::GoalLookup;

pub struct TreeValidator<'a, S: GoalLookup + ?Sized> {
    store: &'a S,
    config: &'a TreeConfig,
}

impl<'a, S: GoalLookup + ?Sized> TreeValidator<'a, S> {
    pub fn new(store: &'a S, config: &'a TreeConfig) -> Self {
        Self { store, config }
    }

    /// Decide whether `goal_id` may be placed under `parent_id`.
    ///
    /// Checks, in order: self-parenting, existence of both goals, owner
    /// match, cycles (by walking the parent chain of `parent_id`), kind
    /// ordering when strict, and the depth bound including the height of
    /// the subtree being moved.
    pub fn validate_link(&self, goal_id: GoalId, parent_id: GoalId) -> Result<()> {
        if goal_id == parent_id {
            return Err(GoalTreeError::CycleRejected { goal_id, parent_id });
        }

        let parent = self.require(parent_id)?;
        let goal = self.require(goal_id)?;

        if goal.owner != parent.owner {
            return Err(GoalTreeError::CrossOwnerRejected {
                goal_owner: goal.owner,
                parent_owner: parent.owner,
            });
        }

        let parent_level = self.level_of(&parent, Some(goal_id))?;
        self.check_kind_order(parent.kind, goal.kind)?;

        let budget = self.config.max_depth.saturating_sub(parent_level);
        let height = self.subtree_height(goal_id, budget)?;
        if parent_level + height > self.config.max_depth {
            tracing::warn!(
                goal_id = %goal_id,
                parent_id = %parent_id,
                limit = self.config.max_depth,
                "link rejected: depth bound"
            );
            return Err(GoalTreeError::MaxDepthExceeded {
                limit: self.config.max_depth,
            });
        }

        Ok(())
    }

    /// Decide whether a new goal of `owner`/`kind` may be created under
    /// `parent_id`. A goal that does not exist yet cannot close a cycle,
    /// so only existence, ownership, kind order and depth are checked.
    pub fn validate_new_child(
        &self,
        owner: &OwnerId,
        kind: GoalKind,
        parent_id: GoalId,
    ) -> Result<()> {
        let parent = self.require(parent_id)?;

        if &parent.owner != owner {
            return Err(GoalTreeError::CrossOwnerRejected {
                goal_owner: owner.clone(),
                parent_owner: parent.owner,
            });
        }

        let parent_level = self.level_of(&parent, None)?;
        self.check_kind_order(parent.kind, kind)?;

        if parent_level + 1 > self.config.max_depth {
            tracing::warn!(
                parent_id = %parent_id,
                limit = self.config.max_depth,
                "create rejected: depth bound"
            );
            return Err(GoalTreeError::MaxDepthExceeded {
                limit: self.config.max_depth,
            });
        }

        Ok(())
    }

    /// Level of `goal` in its tree (root = 1), found by walking parent
    /// references. Meeting `forbidden` on the way means the link would
    /// close a cycle.
    fn level_of(&self, goal: &Goal, forbidden: Option<GoalId>) -> Result<usize> {
        let mut level = 1;
        let mut current_parent = goal.parent_id;

        while let Some(ancestor_id) = current_parent {
            if forbidden == Some(ancestor_id) {
                return Err(GoalTreeError::CycleRejected {
                    goal_id: ancestor_id,
                    parent_id: goal.id,
                });
            }
            if level >= self.config.max_depth {
                return Err(GoalTreeError::MaxDepthExceeded {
                    limit: self.config.max_depth,
                });
            }
            let ancestor = self.require(ancestor_id)?;
            current_parent = ancestor.parent_id;
            level += 1;
        }

        Ok(level)
    }

    /// Number of levels in the subtree rooted at `goal_id` (a leaf is 1).
    ///
    /// Stops counting once the height exceeds `budget`: the caller only
    /// needs to know it is too tall.
    fn subtree_height(&self, goal_id: GoalId, budget: usize) -> Result<usize> {
        let mut height = 1;
        let mut frontier = vec![goal_id];

        loop {
            let mut next = Vec::new();
            for id in &frontier {
                next.extend(self.store.lookup_children(*id)?.into_iter().map(|c| c.id));
            }
            if next.is_empty() || height > budget {
                return Ok(height);
            }
            height += 1;
            frontier = next;
        }
    }

    fn check_kind_order(&self, parent_kind: GoalKind, child_kind: GoalKind) -> Result<()> {
        if self.config.strict_kind_ordering && !parent_kind.is_coarser_than(child_kind) {
            return Err(GoalTreeError::KindOrderRejected {
                parent_kind,
                child_kind,
            });
        }
        Ok(())
    }

    fn require(&self, goal_id: GoalId) -> Result<Goal> {
        self.store
            .lookup_goal(goal_id)?
            .ok_or(GoalTreeError::NotFound { goal_id })
    }
}

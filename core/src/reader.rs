//! Read path for presenting goals.
//!
//! Reads trust the cached completion values maintained by propagation and
//! never write. `progress_of` is the one exception that computes anything:
//! it reports what the aggregate *would* be right now, still without
//! persisting it.

use schemars::JsonSchema;
use serde::Serialize;

use crate::aggregator::Aggregator;
use crate::config::GoalTreeConfig;
use crate::error::{GoalTreeError, Result};
use crate::goal::{Goal, GoalId};
use crate::store::GoalStore;

/// A goal with its parent and immediate children resolved.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct GoalHierarchy {
    pub goal: Goal,
    pub parent: Option<Goal>,
    pub children: Vec<Goal>,
}

/// A depth-bounded subtree.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct GoalTree {
    pub goal: Goal,
    pub children: Vec<GoalTree>,
    /// Set when this node has children that were not loaded because of
    /// the depth bound.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

impl GoalTree {
    /// Number of goals loaded in this subtree, including the root.
    pub fn goal_count(&self) -> usize {
        1 + self.children.iter().map(GoalTree::goal_count).sum::<usize>()
    }
}

/// Live progress of one goal.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct GoalProgress {
    pub goal_id: GoalId,
    /// Aggregate of the current children, or the stored value for a leaf.
    pub completion: f64,
    /// Value currently cached on the goal.
    pub stored: Option<f64>,
    pub child_count: usize,
}

pub struct HierarchyReader<'a, S: GoalStore + ?Sized> {
    store: &'a S,
    aggregator: Aggregator,
    max_depth: usize,
}

impl<'a, S: GoalStore + ?Sized> HierarchyReader<'a, S> {
    pub fn new(store: &'a S, config: &GoalTreeConfig) -> Self {
        Self {
            store,
            aggregator: Aggregator::new(&config.aggregation),
            max_depth: config.tree.max_depth,
        }
    }

    pub fn read_hierarchy(&self, goal_id: GoalId) -> Result<GoalHierarchy> {
        let goal = self.require(goal_id)?;
        let parent = match goal.parent_id {
            Some(parent_id) => self.store.get(parent_id)?,
            None => None,
        };
        let children = self.store.get_children(goal_id)?;
        Ok(GoalHierarchy {
            goal,
            parent,
            children,
        })
    }

    /// Load `goal_id` and its descendants down to `depth` levels (the goal
    /// itself is level 1). `depth` is capped by `tree.max_depth` and a
    /// depth of zero is treated as one.
    pub fn read_subtree(&self, goal_id: GoalId, depth: usize) -> Result<GoalTree> {
        let depth = depth.clamp(1, self.max_depth.max(1));
        let goal = self.require(goal_id)?;
        self.load(goal, depth)
    }

    pub fn progress_of(&self, goal_id: GoalId) -> Result<GoalProgress> {
        let goal = self.require(goal_id)?;
        let children = self.store.get_children(goal_id)?;
        let completion = self
            .aggregator
            .aggregate(&children)
            .unwrap_or_else(|| goal.completion_or_zero());
        Ok(GoalProgress {
            goal_id,
            completion,
            stored: goal.completion,
            child_count: children.len(),
        })
    }

    fn load(&self, goal: Goal, remaining: usize) -> Result<GoalTree> {
        let children = self.store.get_children(goal.id)?;
        if remaining <= 1 {
            return Ok(GoalTree {
                goal,
                truncated: !children.is_empty(),
                children: Vec::new(),
            });
        }

        let children = children
            .into_iter()
            .map(|child| self.load(child, remaining - 1))
            .collect::<Result<Vec<_>>>()?;
        Ok(GoalTree {
            goal,
            children,
            truncated: false,
        })
    }

    fn require(&self, goal_id: GoalId) -> Result<Goal> {
        self.store
            .get(goal_id)?
            .ok_or(GoalTreeError::NotFound { goal_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::{Completion, GoalKind, GoalStatus, NewGoal, OwnerId};
    use crate::store::MemoryGoalStore;

    fn new_goal(title: &str) -> NewGoal {
        NewGoal::new(OwnerId::new("u1"), GoalKind::Monthly, title)
    }

    #[test]
    fn hierarchy_resolves_one_level_each_way() {
        let store = MemoryGoalStore::new();
        let config = GoalTreeConfig::default();
        let root = store.create(new_goal("root")).unwrap();
        let mid = store.create(new_goal("mid").with_parent(root)).unwrap();
        let leaf = store.create(new_goal("leaf").with_parent(mid)).unwrap();

        let view = HierarchyReader::new(&store, &config)
            .read_hierarchy(mid)
            .unwrap();
        assert_eq!(view.goal.id, mid);
        assert_eq!(view.parent.map(|p| p.id), Some(root));
        let children: Vec<GoalId> = view.children.iter().map(|c| c.id).collect();
        assert_eq!(children, vec![leaf]);

        let view = HierarchyReader::new(&store, &config)
            .read_hierarchy(root)
            .unwrap();
        assert!(view.parent.is_none());
    }

    #[test]
    fn reads_do_not_recompute() {
        let store = MemoryGoalStore::new();
        let config = GoalTreeConfig::default();
        let parent = store.create(new_goal("parent").with_completion(5.0)).unwrap();
        store
            .create(new_goal("child").with_parent(parent).with_completion(90.0))
            .unwrap();
        let reader = HierarchyReader::new(&store, &config);

        let view = reader.read_hierarchy(parent).unwrap();
        assert_eq!(view.goal.completion, Some(5.0));

        let progress = reader.progress_of(parent).unwrap();
        assert_eq!(progress.completion, 90.0);
        assert_eq!(progress.stored, Some(5.0));
        assert_eq!(store.get(parent).unwrap().unwrap().completion, Some(5.0));
    }

    #[test]
    fn progress_of_a_leaf_is_its_stored_value() {
        let store = MemoryGoalStore::new();
        let config = GoalTreeConfig::default();
        let leaf = store.create(new_goal("leaf")).unwrap();
        store
            .update_completion(
                leaf,
                Completion {
                    value: 42.5,
                    status: GoalStatus::Active,
                },
            )
            .unwrap();

        let progress = HierarchyReader::new(&store, &config)
            .progress_of(leaf)
            .unwrap();
        assert_eq!(progress.completion, 42.5);
        assert_eq!(progress.child_count, 0);
    }

    #[test]
    fn subtree_is_depth_bounded_and_flags_truncation() {
        let store = MemoryGoalStore::new();
        let config = GoalTreeConfig::default();
        let mut ids = vec![store.create(new_goal("l1")).unwrap()];
        for level in 2..=5 {
            let parent = *ids.last().unwrap();
            ids.push(
                store
                    .create(new_goal(&format!("l{level}")).with_parent(parent))
                    .unwrap(),
            );
        }
        let reader = HierarchyReader::new(&store, &config);

        let tree = reader.read_subtree(ids[0], 3).unwrap();
        assert_eq!(tree.goal_count(), 3);
        let third = &tree.children[0].children[0];
        assert_eq!(third.goal.id, ids[2]);
        assert!(third.truncated);
        assert!(!tree.truncated);

        let full = reader.read_subtree(ids[0], 10).unwrap();
        assert_eq!(full.goal_count(), 5);

        let single = reader.read_subtree(ids[4], 0).unwrap();
        assert_eq!(single.goal_count(), 1);
        assert!(!single.truncated);
    }

    #[test]
    fn missing_goal_is_not_found() {
        let store = MemoryGoalStore::new();
        let config = GoalTreeConfig::default();
        let reader = HierarchyReader::new(&store, &config);
        assert!(matches!(
            reader.read_hierarchy(GoalId::new()),
            Err(GoalTreeError::NotFound { .. })
        ));
        assert!(matches!(
            reader.read_subtree(GoalId::new(), 2),
            Err(GoalTreeError::NotFound { .. })
        ));
    }
}

//! Goal service facade.
//!
//! [`GoalService`] is what callers talk to. Every structural mutation is
//! gated by the [`TreeValidator`], every value or status change is
//! followed by a propagation walk, and every read goes through the
//! [`HierarchyReader`].

use schemars::JsonSchema;
use serde::Serialize;

use crate::aggregator::Aggregator;
use crate::config::{DeletePolicy, GoalTreeConfig};
use crate::error::{GoalTreeError, Result};
use crate::goal::{
    Completion, Goal, GoalId, GoalKind, GoalStatus, NewGoal, OwnerId, is_valid_completion,
};
use crate::propagation::{PropagationEngine, PropagationReport, StopReason};
use crate::reader::{GoalHierarchy, GoalProgress, GoalTree, HierarchyReader};
use crate::store::GoalStore;
use crate::validator::TreeValidator;

/// Outcome of a delete.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct DeleteReport {
    /// Removed goals, descendants before ancestors.
    pub deleted: Vec<GoalId>,
    /// Former children that became roots.
    pub detached: Vec<GoalId>,
    /// Walk over the former parent's ancestors.
    pub propagation: PropagationReport,
}

pub struct GoalService<S: GoalStore> {
    store: S,
    config: GoalTreeConfig,
    aggregator: Aggregator,
}

impl<S: GoalStore> GoalService<S> {
    pub fn new(store: S, config: GoalTreeConfig) -> Self {
        let aggregator = Aggregator::new(&config.aggregation);
        Self {
            store,
            config,
            aggregator,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &GoalTreeConfig {
        &self.config
    }

    fn validator(&self) -> TreeValidator<'_, S> {
        TreeValidator::new(&self.store, &self.config.tree)
    }

    fn engine(&self) -> PropagationEngine<'_, S> {
        PropagationEngine::new(&self.store, &self.config)
    }

    fn reader(&self) -> HierarchyReader<'_, S> {
        HierarchyReader::new(&self.store, &self.config)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────

    /// Create a goal, validating its parent link first.
    ///
    /// A child changes its parent's derived value, so the parent chain is
    /// walked right after the insert.
    pub fn create_goal(&self, goal: NewGoal) -> Result<GoalId> {
        if let Some(value) = goal.completion {
            check_completion(value)?;
        }
        if let Some(parent_id) = goal.parent_id {
            self.validator()
                .validate_new_child(&goal.owner, goal.kind, parent_id)?;
        }

        let parent_id = goal.parent_id;
        let kind = goal.kind;
        let id = self.store.create(goal)?;
        tracing::info!(goal_id = %id, kind = %kind, parent_id = ?parent_id, "goal created");

        if parent_id.is_some() {
            let report = self.engine().propagate(id)?;
            log_report("create", id, &report);
        }
        Ok(id)
    }

    /// Author the completion value of a leaf and propagate it upward.
    ///
    /// The leaf check and the write happen in one store step, so a child
    /// added concurrently cannot turn the goal into an aggregate between
    /// the two.
    pub fn set_leaf_completion(&self, goal_id: GoalId, value: f64) -> Result<PropagationReport> {
        check_completion(value)?;

        let mut derived = false;
        let step = self.store.transact_node(goal_id, &mut |goal, children| {
            if !children.is_empty() {
                derived = true;
                return None;
            }
            Some(Completion {
                value,
                status: goal.status,
            })
        })?;

        if step.is_none() {
            return Err(GoalTreeError::NotFound { goal_id });
        }
        if derived {
            return Err(GoalTreeError::DerivedValue { goal_id });
        }

        tracing::info!(goal_id = %goal_id, completion = value, "leaf completion set");
        let report = self.engine().propagate(goal_id)?;
        log_report("complete", goal_id, &report);
        Ok(report)
    }

    /// Set a goal's lifecycle status and propagate the consequences.
    ///
    /// Leaves take any status. Aggregate goals accept the owner overrides
    /// Paused/Abandoned, and Active, which clears an override and
    /// re-derives the status from the children. Completed on an aggregate
    /// is always derived and therefore refused.
    pub fn set_status(&self, goal_id: GoalId, status: GoalStatus) -> Result<PropagationReport> {
        let aggregator = &self.aggregator;
        let mut derived = false;

        let step = self.store.transact_node(goal_id, &mut |goal, children| {
            let Some(value) = aggregator.aggregate(children) else {
                return Some(Completion {
                    value: goal.completion_or_zero(),
                    status,
                });
            };
            match status {
                GoalStatus::Completed => {
                    derived = true;
                    None
                }
                GoalStatus::Paused | GoalStatus::Abandoned => Some(Completion { value, status }),
                GoalStatus::Active => Some(Completion {
                    value,
                    status: aggregator.derive_status(GoalStatus::Active, value, children),
                }),
            }
        })?;

        if step.is_none() {
            return Err(GoalTreeError::NotFound { goal_id });
        }
        if derived {
            return Err(GoalTreeError::DerivedValue { goal_id });
        }

        tracing::info!(goal_id = %goal_id, status = %status, "status set");
        let report = self.engine().propagate(goal_id)?;
        log_report("status", goal_id, &report);
        Ok(report)
    }

    /// Re-parent a goal (`None` makes it a root).
    ///
    /// The link checks run inside the store's atomic relink step, so a
    /// concurrent move cannot slip in between validation and the write.
    /// Both the old parent chain and the new one are recomputed. An old
    /// parent left without children becomes a leaf and keeps its last
    /// value.
    pub fn move_goal(
        &self,
        goal_id: GoalId,
        new_parent_id: Option<GoalId>,
    ) -> Result<PropagationReport> {
        let tree = &self.config.tree;
        let previous = self.store.relink(goal_id, new_parent_id, &mut |view| {
            match new_parent_id {
                Some(parent_id) => {
                    TreeValidator::new(view, tree).validate_link(goal_id, parent_id)
                }
                None => Ok(()),
            }
        })?;
        if previous.parent_id == new_parent_id {
            return Ok(PropagationReport::empty(StopReason::Unchanged));
        }

        tracing::info!(
            goal_id = %goal_id,
            from = ?previous.parent_id,
            to = ?new_parent_id,
            "goal moved"
        );

        let engine = self.engine();
        let old_side = match previous.parent_id {
            Some(old_parent_id) => engine.walk(old_parent_id),
            None => PropagationReport::empty(StopReason::Root),
        };
        let new_side = match new_parent_id {
            Some(parent_id) => engine.walk(parent_id),
            None => PropagationReport::empty(StopReason::Root),
        };

        let report = old_side.merge(new_side);
        log_report("move", goal_id, &report);
        Ok(report)
    }

    /// Delete a goal under an explicit policy for its children.
    ///
    /// Reject and Cascade delete in one atomic store call. Detach re-points
    /// the children one at a time; if that fails halfway, the goal and its
    /// ancestors are recomputed before the error is returned.
    pub fn delete_goal(&self, goal_id: GoalId, policy: DeletePolicy) -> Result<DeleteReport> {
        let goal = self.require(goal_id)?;
        let children = self.store.get_children(goal_id)?;

        let mut detached = Vec::new();
        let deleted = match policy {
            DeletePolicy::Reject => {
                if !children.is_empty() {
                    return Err(GoalTreeError::HasChildren {
                        goal_id,
                        count: children.len(),
                    });
                }
                self.store.delete_goals(&[goal_id])?;
                vec![goal_id]
            }
            DeletePolicy::Cascade => {
                let doomed = self.subtree_post_order(goal_id)?;
                self.store.delete_goals(&doomed)?;
                doomed
            }
            DeletePolicy::Detach => {
                for child in &children {
                    if let Err(err) = self.store.set_parent(child.id, None) {
                        return Err(self.settle_after_failure(goal_id, err));
                    }
                    detached.push(child.id);
                }
                if let Err(err) = self.store.delete_goals(&[goal_id]) {
                    return Err(self.settle_after_failure(goal_id, err));
                }
                vec![goal_id]
            }
        };

        tracing::info!(
            goal_id = %goal_id,
            policy = ?policy,
            deleted = deleted.len(),
            detached = detached.len(),
            "goal deleted"
        );

        let propagation = match goal.parent_id {
            Some(parent_id) => self.engine().walk(parent_id),
            None => PropagationReport::empty(StopReason::Root),
        };
        log_report("delete", goal_id, &propagation);

        Ok(DeleteReport {
            deleted,
            detached,
            propagation,
        })
    }

    /// Delete a goal with the configured default policy.
    pub fn delete_goal_default(&self, goal_id: GoalId) -> Result<DeleteReport> {
        self.delete_goal(goal_id, self.config.deletion.default_policy)
    }

    /// Force a refresh starting at `goal_id` itself.
    pub fn recompute(&self, goal_id: GoalId) -> Result<PropagationReport> {
        let report = self.engine().recompute_from(goal_id)?;
        log_report("recompute", goal_id, &report);
        Ok(report)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    pub fn get_goal(&self, goal_id: GoalId) -> Result<Goal> {
        self.require(goal_id)
    }

    pub fn get_hierarchy(&self, goal_id: GoalId) -> Result<GoalHierarchy> {
        self.reader().read_hierarchy(goal_id)
    }

    pub fn get_children(&self, goal_id: GoalId) -> Result<Vec<Goal>> {
        self.require(goal_id)?;
        self.store.get_children(goal_id)
    }

    pub fn get_parent(&self, goal_id: GoalId) -> Result<Option<Goal>> {
        match self.require(goal_id)?.parent_id {
            Some(parent_id) => self.store.get(parent_id),
            None => Ok(None),
        }
    }

    /// Subtree down to `depth` levels, or `tree.subtree_depth` when `None`.
    pub fn get_subtree(&self, goal_id: GoalId, depth: Option<usize>) -> Result<GoalTree> {
        let depth = depth.unwrap_or(self.config.tree.subtree_depth);
        self.reader().read_subtree(goal_id, depth)
    }

    pub fn list_goals(&self, owner: &OwnerId, kind: Option<GoalKind>) -> Result<Vec<Goal>> {
        self.store.list_goals(owner, kind)
    }

    pub fn progress_of(&self, goal_id: GoalId) -> Result<GoalProgress> {
        self.reader().progress_of(goal_id)
    }

    fn require(&self, goal_id: GoalId) -> Result<Goal> {
        self.store
            .get(goal_id)?
            .ok_or(GoalTreeError::NotFound { goal_id })
    }

    /// Recompute `goal_id` and its ancestors after a structural change
    /// stopped halfway, then hand back the error that stopped it.
    fn settle_after_failure(&self, goal_id: GoalId, err: GoalTreeError) -> GoalTreeError {
        let report = self.engine().walk(goal_id);
        tracing::warn!(
            goal_id = %goal_id,
            error = %err,
            updated = report.updated.len(),
            "structural change failed; tree recomputed"
        );
        err
    }

    /// Ids of the subtree under `goal_id`, every descendant before its
    /// ancestors. Bounded by `tree.max_depth` levels.
    fn subtree_post_order(&self, goal_id: GoalId) -> Result<Vec<GoalId>> {
        let mut pre_order = Vec::new();
        let mut stack = vec![(goal_id, 1usize)];

        while let Some((id, level)) = stack.pop() {
            if level > self.config.tree.max_depth {
                return Err(GoalTreeError::MaxDepthExceeded {
                    limit: self.config.tree.max_depth,
                });
            }
            pre_order.push(id);
            for child in self.store.get_children(id)?.into_iter().rev() {
                stack.push((child.id, level + 1));
            }
        }

        pre_order.reverse();
        Ok(pre_order)
    }
}

fn check_completion(value: f64) -> Result<()> {
    if is_valid_completion(value) {
        Ok(())
    } else {
        Err(GoalTreeError::InvalidCompletion { value })
    }
}

fn log_report(operation: &str, goal_id: GoalId, report: &PropagationReport) {
    if report.is_partial() {
        tracing::warn!(
            operation,
            goal_id = %goal_id,
            updated = report.updated.len(),
            stop = ?report.stop,
            "partial propagation"
        );
    } else {
        tracing::debug!(
            operation,
            goal_id = %goal_id,
            updated = report.updated.len(),
            stop = ?report.stop,
            "propagation finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AbandonedPolicy;
    use crate::store::MemoryGoalStore;
    use pretty_assertions::assert_eq;

    fn service() -> GoalService<MemoryGoalStore> {
        GoalService::new(MemoryGoalStore::new(), GoalTreeConfig::default())
    }

    fn owner() -> OwnerId {
        OwnerId::new("u1")
    }

    fn create(svc: &GoalService<MemoryGoalStore>, kind: GoalKind, parent: Option<GoalId>) -> GoalId {
        let mut goal = NewGoal::new(owner(), kind, kind.as_str());
        if let Some(parent) = parent {
            goal = goal.with_parent(parent);
        }
        svc.create_goal(goal).unwrap()
    }

    fn completion(svc: &GoalService<MemoryGoalStore>, id: GoalId) -> Option<f64> {
        svc.get_goal(id).unwrap().completion
    }

    #[test]
    fn leaf_update_propagates_to_every_ancestor() {
        let svc = service();
        let year = create(&svc, GoalKind::Yearly, None);
        let quarter = create(&svc, GoalKind::Quarterly, Some(year));
        let month = create(&svc, GoalKind::Monthly, Some(quarter));

        let report = svc.set_leaf_completion(month, 60.0).unwrap();
        assert_eq!(report.updated, vec![quarter, year]);
        assert_eq!(report.stop, StopReason::Root);
        assert_eq!(completion(&svc, quarter), Some(60.0));
        assert_eq!(completion(&svc, year), Some(60.0));
    }

    #[test]
    fn creating_a_child_recomputes_the_parent() {
        let svc = service();
        let parent = create(&svc, GoalKind::Monthly, None);
        let first = create(&svc, GoalKind::Weekly, Some(parent));
        svc.set_leaf_completion(first, 80.0).unwrap();
        assert_eq!(completion(&svc, parent), Some(80.0));

        create(&svc, GoalKind::Weekly, Some(parent));
        assert_eq!(completion(&svc, parent), Some(40.0));
    }

    #[test]
    fn aggregate_completion_cannot_be_authored() {
        let svc = service();
        let parent = create(&svc, GoalKind::Monthly, None);
        create(&svc, GoalKind::Weekly, Some(parent));

        let err = svc.set_leaf_completion(parent, 90.0).unwrap_err();
        assert!(matches!(err, GoalTreeError::DerivedValue { goal_id } if goal_id == parent));
        assert_eq!(completion(&svc, parent), Some(0.0));
    }

    #[test]
    fn invalid_completion_is_rejected_before_any_write() {
        let svc = service();
        let leaf = create(&svc, GoalKind::Weekly, None);
        for value in [-0.1, 100.1, f64::NAN, f64::INFINITY] {
            let err = svc.set_leaf_completion(leaf, value).unwrap_err();
            assert!(matches!(err, GoalTreeError::InvalidCompletion { .. }));
        }
        assert_eq!(completion(&svc, leaf), None);

        let err = svc
            .create_goal(NewGoal::new(owner(), GoalKind::Weekly, "bad").with_completion(120.0))
            .unwrap_err();
        assert!(matches!(err, GoalTreeError::InvalidCompletion { .. }));
    }

    #[test]
    fn missing_goal_is_not_found_everywhere() {
        let svc = service();
        let missing = GoalId::new();
        assert!(matches!(
            svc.set_leaf_completion(missing, 10.0),
            Err(GoalTreeError::NotFound { .. })
        ));
        assert!(matches!(
            svc.set_status(missing, GoalStatus::Paused),
            Err(GoalTreeError::NotFound { .. })
        ));
        assert!(matches!(
            svc.get_children(missing),
            Err(GoalTreeError::NotFound { .. })
        ));
        assert!(matches!(
            svc.get_parent(missing),
            Err(GoalTreeError::NotFound { .. })
        ));
        assert!(matches!(
            svc.recompute(missing),
            Err(GoalTreeError::NotFound { .. })
        ));
    }

    #[test]
    fn parent_completes_only_when_every_child_is_completed() {
        let svc = service();
        let parent = create(&svc, GoalKind::Monthly, None);
        let a = create(&svc, GoalKind::Weekly, Some(parent));
        let b = create(&svc, GoalKind::Weekly, Some(parent));

        svc.set_leaf_completion(a, 100.0).unwrap();
        svc.set_leaf_completion(b, 100.0).unwrap();
        assert_eq!(svc.get_goal(parent).unwrap().status, GoalStatus::Active);

        svc.set_status(a, GoalStatus::Completed).unwrap();
        svc.set_status(b, GoalStatus::Completed).unwrap();
        let goal = svc.get_goal(parent).unwrap();
        assert_eq!(goal.status, GoalStatus::Completed);
        assert_eq!(goal.completion, Some(100.0));

        svc.set_leaf_completion(b, 50.0).unwrap();
        let goal = svc.get_goal(parent).unwrap();
        assert_eq!(goal.status, GoalStatus::Active);
        assert_eq!(goal.completion, Some(75.0));
    }

    #[test]
    fn owner_override_on_aggregate_survives_recompute() {
        let svc = service();
        let parent = create(&svc, GoalKind::Monthly, None);
        let child = create(&svc, GoalKind::Weekly, Some(parent));

        svc.set_status(parent, GoalStatus::Paused).unwrap();
        svc.set_leaf_completion(child, 30.0).unwrap();
        let goal = svc.get_goal(parent).unwrap();
        assert_eq!(goal.status, GoalStatus::Paused);
        assert_eq!(goal.completion, Some(30.0));

        let err = svc.set_status(parent, GoalStatus::Completed).unwrap_err();
        assert!(matches!(err, GoalTreeError::DerivedValue { .. }));

        svc.set_status(parent, GoalStatus::Active).unwrap();
        assert_eq!(svc.get_goal(parent).unwrap().status, GoalStatus::Active);
    }

    #[test]
    fn abandoned_children_follow_the_configured_policy() {
        let mut config = GoalTreeConfig::default();
        config.aggregation.abandoned = AbandonedPolicy::Exclude;
        let svc = GoalService::new(MemoryGoalStore::new(), config);

        let parent = create(&svc, GoalKind::Monthly, None);
        let kept = create(&svc, GoalKind::Weekly, Some(parent));
        let dropped = create(&svc, GoalKind::Weekly, Some(parent));
        svc.set_leaf_completion(kept, 90.0).unwrap();
        svc.set_leaf_completion(dropped, 10.0).unwrap();
        assert_eq!(completion(&svc, parent), Some(50.0));

        svc.set_status(dropped, GoalStatus::Abandoned).unwrap();
        assert_eq!(completion(&svc, parent), Some(90.0));
    }

    #[test]
    fn move_recomputes_old_and_new_parents() {
        let svc = service();
        let old_parent = create(&svc, GoalKind::Monthly, None);
        let new_parent = create(&svc, GoalKind::Monthly, None);
        let stay = create(&svc, GoalKind::Weekly, Some(old_parent));
        let mover = create(&svc, GoalKind::Weekly, Some(old_parent));
        let resident = create(&svc, GoalKind::Weekly, Some(new_parent));
        svc.set_leaf_completion(stay, 20.0).unwrap();
        svc.set_leaf_completion(mover, 100.0).unwrap();
        svc.set_leaf_completion(resident, 40.0).unwrap();
        assert_eq!(completion(&svc, old_parent), Some(60.0));

        let report = svc.move_goal(mover, Some(new_parent)).unwrap();
        assert_eq!(report.updated, vec![old_parent, new_parent]);
        assert_eq!(completion(&svc, old_parent), Some(20.0));
        assert_eq!(completion(&svc, new_parent), Some(70.0));
        assert_eq!(svc.get_parent(mover).unwrap().map(|p| p.id), Some(new_parent));
    }

    #[test]
    fn emptied_old_parent_becomes_a_leaf_with_its_last_value() {
        let svc = service();
        let parent = create(&svc, GoalKind::Monthly, None);
        let only = create(&svc, GoalKind::Weekly, Some(parent));
        svc.set_leaf_completion(only, 45.0).unwrap();

        let report = svc.move_goal(only, None).unwrap();
        assert!(report.updated.is_empty());
        assert_eq!(completion(&svc, parent), Some(45.0));

        // Now a leaf again, so its value is authored directly.
        svc.set_leaf_completion(parent, 10.0).unwrap();
    }

    #[test]
    fn move_into_own_subtree_is_rejected_without_writes() {
        let svc = service();
        let a = create(&svc, GoalKind::Yearly, None);
        let b = create(&svc, GoalKind::Quarterly, Some(a));
        let c = create(&svc, GoalKind::Monthly, Some(b));

        let err = svc.move_goal(a, Some(c)).unwrap_err();
        assert!(matches!(err, GoalTreeError::CycleRejected { .. }));
        assert!(svc.get_goal(a).unwrap().is_root());
    }

    #[test]
    fn move_to_same_parent_is_a_no_op() {
        let svc = service();
        let parent = create(&svc, GoalKind::Monthly, None);
        let child = create(&svc, GoalKind::Weekly, Some(parent));
        let report = svc.move_goal(child, Some(parent)).unwrap();
        assert_eq!(report, PropagationReport::empty(StopReason::Unchanged));
    }

    #[test]
    fn delete_with_children_needs_an_explicit_policy() {
        let svc = service();
        let parent = create(&svc, GoalKind::Monthly, None);
        create(&svc, GoalKind::Weekly, Some(parent));

        let err = svc.delete_goal_default(parent).unwrap_err();
        assert!(matches!(err, GoalTreeError::HasChildren { count: 1, .. }));
        assert!(svc.get_goal(parent).is_ok());
    }

    #[test]
    fn cascade_deletes_descendants_first_and_recomputes_parent() {
        let svc = service();
        let root = create(&svc, GoalKind::Yearly, None);
        let keep = create(&svc, GoalKind::Quarterly, Some(root));
        let doomed = create(&svc, GoalKind::Quarterly, Some(root));
        let grandchild = create(&svc, GoalKind::Monthly, Some(doomed));
        svc.set_leaf_completion(keep, 80.0).unwrap();
        svc.set_leaf_completion(grandchild, 20.0).unwrap();
        assert_eq!(completion(&svc, root), Some(50.0));

        let report = svc.delete_goal(doomed, DeletePolicy::Cascade).unwrap();
        assert_eq!(report.deleted, vec![grandchild, doomed]);
        assert_eq!(report.propagation.updated, vec![root]);
        assert_eq!(completion(&svc, root), Some(80.0));
        assert_eq!(svc.store().len(), 2);
    }

    #[test]
    fn detach_turns_children_into_roots() {
        let svc = service();
        let parent = create(&svc, GoalKind::Monthly, None);
        let a = create(&svc, GoalKind::Weekly, Some(parent));
        let b = create(&svc, GoalKind::Weekly, Some(parent));

        let report = svc.delete_goal(parent, DeletePolicy::Detach).unwrap();
        assert_eq!(report.deleted, vec![parent]);
        assert_eq!(report.detached, vec![a, b]);
        assert!(svc.get_goal(a).unwrap().is_root());
        assert!(svc.get_goal(b).unwrap().is_root());
    }

    #[test]
    fn recompute_repairs_a_stale_ancestor() {
        let svc = service();
        let parent = create(&svc, GoalKind::Monthly, None);
        let child = create(&svc, GoalKind::Weekly, Some(parent));
        // Write behind the engine's back.
        svc.store()
            .update_completion(
                child,
                Completion {
                    value: 70.0,
                    status: GoalStatus::Active,
                },
            )
            .unwrap();

        let report = svc.recompute(parent).unwrap();
        assert_eq!(report.updated, vec![parent]);
        assert_eq!(completion(&svc, parent), Some(70.0));

        let again = svc.recompute(parent).unwrap();
        assert!(again.updated.is_empty());
    }

    #[test]
    fn subtree_uses_configured_depth_by_default() {
        let svc = service();
        let mut parent = create(&svc, GoalKind::Yearly, None);
        let top = parent;
        for _ in 0..6 {
            parent = create(&svc, GoalKind::Weekly, Some(parent));
        }
        let tree = svc.get_subtree(top, None).unwrap();
        assert_eq!(tree.goal_count(), 4);
        assert_eq!(svc.get_subtree(top, Some(7)).unwrap().goal_count(), 7);
    }
}

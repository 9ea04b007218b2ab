//! Upward propagation of derived completion values.
//!
//! A walk visits one ancestor at a time. Each visit is a single
//! [`GoalStore::transact_node`] step: the goal and its full children set
//! are re-read fresh, the aggregate is recomputed and, if it moved, written
//! before the next ancestor is touched. No lock is held across two nodes.
//!
//! The walk stops at the first of:
//! - a goal without a parent (`Root`)
//! - a recomputed value and status equal to the stored ones (`Unchanged`)
//! - a goal without children (`Leaf`)
//! - `tree.max_depth` visited nodes (`DepthBound`)
//! - a goal that vanished or a failed store step (`Interrupted`)
//!
//! An interrupted walk is a partial success. The ids rewritten before the
//! interruption are reported, and the caller may retry with
//! [`PropagationEngine::recompute_from`] on the goal where it stopped.

use schemars::JsonSchema;
use serde::Serialize;

use crate::aggregator::Aggregator;
use crate::config::GoalTreeConfig;
use crate::error::{GoalTreeError, Result};
use crate::goal::{Goal, GoalId};
use crate::store::GoalStore;

/// Why an interrupted walk stopped.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum InterruptCause {
    /// The goal was deleted while the walk was in flight.
    Deleted,
    /// The store step for this goal failed.
    StoreFailure(String),
}

/// Where and why a walk ended.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Root,
    Unchanged,
    Leaf,
    DepthBound,
    Interrupted {
        goal_id: GoalId,
        cause: InterruptCause,
    },
}

/// Result of one walk: rewritten goals in walk order plus the stop reason.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct PropagationReport {
    pub updated: Vec<GoalId>,
    pub stop: StopReason,
}

impl PropagationReport {
    pub fn new(updated: Vec<GoalId>, stop: StopReason) -> Self {
        Self { updated, stop }
    }

    /// A walk that had nothing to do.
    pub fn empty(stop: StopReason) -> Self {
        Self::new(Vec::new(), stop)
    }

    /// Whether the walk was cut short by a deletion or store failure.
    pub fn is_partial(&self) -> bool {
        matches!(self.stop, StopReason::Interrupted { .. })
    }

    /// Combine two walks triggered by one operation.
    ///
    /// Ids keep their first position. An interruption on either side wins
    /// the stop reason; otherwise `other`'s reason is kept.
    pub fn merge(mut self, other: PropagationReport) -> Self {
        for id in other.updated {
            if !self.updated.contains(&id) {
                self.updated.push(id);
            }
        }
        if !self.is_partial() {
            self.stop = other.stop;
        }
        self
    }
}

pub struct PropagationEngine<'a, S: GoalStore + ?Sized> {
    store: &'a S,
    aggregator: Aggregator,
    max_hops: usize,
}

impl<'a, S: GoalStore + ?Sized> PropagationEngine<'a, S> {
    pub fn new(store: &'a S, config: &GoalTreeConfig) -> Self {
        Self {
            store,
            aggregator: Aggregator::new(&config.aggregation),
            max_hops: config.tree.max_depth,
        }
    }

    /// Recompute the ancestors of `changed_goal_id`, starting at its parent.
    ///
    /// The changed goal itself is assumed already persisted.
    pub fn propagate(&self, changed_goal_id: GoalId) -> Result<PropagationReport> {
        let changed = self
            .store
            .get(changed_goal_id)?
            .ok_or(GoalTreeError::NotFound {
                goal_id: changed_goal_id,
            })?;

        match changed.parent_id {
            Some(parent_id) => Ok(self.walk(parent_id)),
            None => Ok(PropagationReport::empty(StopReason::Root)),
        }
    }

    /// Recompute `goal_id` itself and then its ancestors.
    pub fn recompute_from(&self, goal_id: GoalId) -> Result<PropagationReport> {
        if self.store.get(goal_id)?.is_none() {
            return Err(GoalTreeError::NotFound { goal_id });
        }
        Ok(self.walk(goal_id))
    }

    /// Walk upward from `start` without checking that it exists first.
    ///
    /// Used after structural changes where the start goal may have been
    /// removed concurrently; a missing start is reported as `Interrupted`.
    pub(crate) fn walk(&self, start: GoalId) -> PropagationReport {
        let aggregator = &self.aggregator;
        let mut decide = |goal: &Goal, children: &[Goal]| aggregator.recompute(goal, children);

        let mut updated = Vec::new();
        let mut current = start;

        for _ in 0..self.max_hops {
            let step = match self.store.transact_node(current, &mut decide) {
                Ok(Some(step)) => step,
                Ok(None) => {
                    tracing::warn!(
                        goal_id = %current,
                        updated = updated.len(),
                        "propagation interrupted: goal deleted"
                    );
                    return PropagationReport::new(
                        updated,
                        StopReason::Interrupted {
                            goal_id: current,
                            cause: InterruptCause::Deleted,
                        },
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        goal_id = %current,
                        updated = updated.len(),
                        category = err.category().as_str(),
                        error = %err,
                        "propagation interrupted: store failure"
                    );
                    return PropagationReport::new(
                        updated,
                        StopReason::Interrupted {
                            goal_id: current,
                            cause: InterruptCause::StoreFailure(err.to_string()),
                        },
                    );
                }
            };

            if step.child_count == 0 {
                tracing::debug!(goal_id = %current, "propagation reached a leaf");
                return PropagationReport::new(updated, StopReason::Leaf);
            }
            if !step.written {
                tracing::debug!(goal_id = %current, "propagation stopped: value unchanged");
                return PropagationReport::new(updated, StopReason::Unchanged);
            }

            tracing::debug!(
                goal_id = %current,
                completion = step.goal.completion_or_zero(),
                status = %step.goal.status,
                children = step.child_count,
                "ancestor recomputed"
            );
            updated.push(current);

            match step.goal.parent_id {
                Some(parent_id) => current = parent_id,
                None => return PropagationReport::new(updated, StopReason::Root),
            }
        }

        tracing::warn!(
            goal_id = %current,
            limit = self.max_hops,
            "propagation stopped at depth bound"
        );
        PropagationReport::new(updated, StopReason::DepthBound)
    }
}

//! Progress aggregation.
//!
//! An aggregate goal's completion is the arithmetic mean of its children's
//! current completion values. Children with no recorded value count as
//! zero. The mean is clamped to [0, 100] and never rounded here; rounding
//! happens only at presentation time, so repeated levels don't drift.
//!
//! Abandoned children keep contributing their last value unless the
//! `exclude` policy is configured. When every child is abandoned under
//! `exclude`, the mean falls back to all children rather than inventing a
//! value from an empty set.

use crate::config::{AbandonedPolicy, AggregationConfig};
use crate::goal::{COMPLETION_MAX, COMPLETION_MIN, Completion, Goal, GoalStatus};

#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    policy: AbandonedPolicy,
    epsilon: f64,
}

impl Aggregator {
    pub fn new(config: &AggregationConfig) -> Self {
        Self {
            policy: config.abandoned,
            epsilon: config.epsilon,
        }
    }

    /// Mean completion of `children`, or `None` for an empty slice.
    ///
    /// `None` is the leaf case: a goal without children keeps its
    /// caller-authored value and is never aggregated.
    pub fn aggregate(&self, children: &[Goal]) -> Option<f64> {
        if children.is_empty() {
            return None;
        }

        let counted: Vec<&Goal> = match self.policy {
            AbandonedPolicy::Include => children.iter().collect(),
            AbandonedPolicy::Exclude => {
                let active: Vec<&Goal> = children
                    .iter()
                    .filter(|c| c.status != GoalStatus::Abandoned)
                    .collect();
                if active.is_empty() {
                    children.iter().collect()
                } else {
                    active
                }
            }
        };

        let sum: f64 = counted.iter().copied().map(Goal::completion_or_zero).sum();
        let mean = sum / counted.len() as f64;
        Some(mean.clamp(COMPLETION_MIN, COMPLETION_MAX))
    }

    /// Status an aggregate goal should carry after a recompute.
    ///
    /// Owner overrides (Paused/Abandoned) are kept. Otherwise the goal is
    /// Completed only when the value reached 100 and every child is
    /// Completed, and Active in every other case.
    pub fn derive_status(&self, current: GoalStatus, value: f64, children: &[Goal]) -> GoalStatus {
        if current.is_owner_override() {
            return current;
        }
        let all_completed = !children.is_empty()
            && children.iter().all(|c| c.status == GoalStatus::Completed);
        if value >= COMPLETION_MAX && all_completed {
            GoalStatus::Completed
        } else {
            GoalStatus::Active
        }
    }

    /// Full recompute for one aggregate goal.
    ///
    /// Returns the completion to write, or `None` when the goal is a leaf
    /// or its stored value and status already match.
    pub fn recompute(&self, goal: &Goal, children: &[Goal]) -> Option<Completion> {
        let value = self.aggregate(children)?;
        let status = self.derive_status(goal.status, value, children);

        let value_unchanged = goal
            .completion
            .is_some_and(|stored| (stored - value).abs() <= self.epsilon);
        if value_unchanged && status == goal.status {
            return None;
        }
        Some(Completion { value, status })
    }
}

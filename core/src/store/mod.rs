//! Goal store contract.
//!
//! The store is the only shared mutable resource. It knows nothing about
//! aggregation or tree validity: the engine validates links before calling
//! `create`, runs its link checks inside `relink`, and decides every
//! derived value itself.
//!
//! Two implementations ship with the crate:
//! - [`MemoryGoalStore`]: mutex-guarded map, for tests and embedders
//! - [`SqliteGoalStore`]: durable SQLite file

mod memory;
mod sqlite;

pub use memory::MemoryGoalStore;
pub use sqlite::SqliteGoalStore;

use crate::error::Result;
use crate::goal::{Completion, Goal, GoalId, GoalKind, NewGoal, OwnerId};

/// Outcome of one atomic read-modify-write step on a single goal.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeStep {
    /// The goal as stored after the step.
    pub goal: Goal,
    /// Number of children seen during the step.
    pub child_count: usize,
    /// Whether `decide` asked for a write.
    pub written: bool,
}

/// Callback deciding the write for one node from its fresh state.
pub type DecideFn<'a> = dyn FnMut(&Goal, &[Goal]) -> Option<Completion> + 'a;

/// Callback checking a re-parent against the state it will be applied to.
pub type CheckFn<'a> = dyn FnMut(&dyn GoalLookup) -> Result<()> + 'a;

/// Read access to goals, either through a store or from inside one of its
/// atomic steps.
pub trait GoalLookup {
    fn lookup_goal(&self, goal_id: GoalId) -> Result<Option<Goal>>;

    /// Children of `parent_id` in creation order.
    fn lookup_children(&self, parent_id: GoalId) -> Result<Vec<Goal>>;
}

impl<S: GoalStore + ?Sized> GoalLookup for S {
    fn lookup_goal(&self, goal_id: GoalId) -> Result<Option<Goal>> {
        self.get(goal_id)
    }

    fn lookup_children(&self, parent_id: GoalId) -> Result<Vec<Goal>> {
        self.get_children(parent_id)
    }
}

/// Durable keyed storage for goals.
pub trait GoalStore: Send + Sync {
    /// Look up a goal. `Ok(None)` when it does not exist.
    fn get(&self, goal_id: GoalId) -> Result<Option<Goal>>;

    /// Children of `parent_id` in creation order.
    fn get_children(&self, parent_id: GoalId) -> Result<Vec<Goal>>;

    /// Persist a new goal and return its id.
    fn create(&self, goal: NewGoal) -> Result<GoalId>;

    /// Write completion value and status. `NotFound` when the goal is gone.
    fn update_completion(&self, goal_id: GoalId, completion: Completion) -> Result<()>;

    /// Re-point a goal's parent reference (`None` makes it a root).
    fn set_parent(&self, goal_id: GoalId, parent_id: Option<GoalId>) -> Result<()>;

    /// Re-parent a goal after `check` accepts the current state.
    ///
    /// `check` sees the tree under the same lock or transaction as the
    /// write, so two concurrent relinks cannot both pass against a state
    /// the other one is about to change. Returns the goal as it was before
    /// the write.
    fn relink(
        &self,
        goal_id: GoalId,
        parent_id: Option<GoalId>,
        check: &mut CheckFn<'_>,
    ) -> Result<Goal>;

    /// Delete goals in the given order, all or nothing.
    ///
    /// Each goal must exist and have no children left once the goals
    /// before it are gone. On any failure nothing is deleted.
    fn delete_goals(&self, goal_ids: &[GoalId]) -> Result<()>;

    /// Goals of one owner in creation order, optionally filtered by kind.
    fn list_goals(&self, owner: &OwnerId, kind: Option<GoalKind>) -> Result<Vec<Goal>>;

    /// Atomic read-modify-write of ONE goal.
    ///
    /// Loads the goal and its children fresh, hands them to `decide`, and
    /// persists the returned completion (if any) before releasing the lock
    /// or committing the transaction. Returns `Ok(None)` when the goal no
    /// longer exists.
    fn transact_node(&self, goal_id: GoalId, decide: &mut DecideFn<'_>)
    -> Result<Option<NodeStep>>;
}

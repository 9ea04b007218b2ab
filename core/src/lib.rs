//! goaltree: hierarchical goal aggregation engine
//!
//! Maintains owner-scoped trees of goals (Yearly → Quarterly → Monthly →
//! Weekly, or arbitrary nesting) and keeps every ancestor's completion
//! consistent with its descendants.
//!
//! The engine is split into four parts that all talk to a [`GoalStore`]:
//! - [`TreeValidator`] gates every structural change (no cycles, same
//!   owner, bounded depth, optional strict kind order)
//! - [`Aggregator`] derives an aggregate goal's value and status from its
//!   children
//! - [`PropagationEngine`] walks ancestors after a change, one atomic
//!   store step per node
//! - [`HierarchyReader`] assembles views without recomputing anything
//!
//! [`GoalService`] ties them together for callers.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod aggregator;
pub mod config;
pub mod error;
pub mod goal;
pub mod propagation;
pub mod reader;
pub mod service;
pub mod store;
pub mod validator;

pub use aggregator::Aggregator;
pub use config::{AbandonedPolicy, DeletePolicy, GoalTreeConfig};
pub use error::{ErrorCategory, GoalTreeError, Result};
pub use goal::{
    Completion, Goal, GoalId, GoalKind, GoalStatus, NewGoal, OwnerId, Priority, display_percent,
};
pub use propagation::{InterruptCause, PropagationEngine, PropagationReport, StopReason};
pub use reader::{GoalHierarchy, GoalProgress, GoalTree, HierarchyReader};
pub use service::{DeleteReport, GoalService};
pub use store::{GoalLookup, GoalStore, MemoryGoalStore, NodeStep, SqliteGoalStore};
pub use validator::TreeValidator;

/// goaltree version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

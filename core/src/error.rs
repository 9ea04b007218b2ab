//! Goal tree error types
//!
//! Rejections from the tree validator, lookup failures, write-path policy
//! violations and infrastructure (store/config) failures share one enum so
//! callers can match on the variant or log `category().as_str()`.
//!
//! An interrupted propagation walk is not an error: it is reported as a
//! partial success through `PropagationReport`.

use thiserror::Error;

use crate::goal::{GoalId, GoalKind, OwnerId};

/// Error category for structured logging and behavior mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Proposed parent link would create a cycle or self-reference
    CycleRejected,
    /// Parent and child belong to different owners
    CrossOwnerRejected,
    /// Referenced goal does not exist
    NotFound,
    /// Structural change would exceed the configured depth bound
    MaxDepthExceeded,
    /// Strict kind ordering violated
    KindOrderRejected,
    /// Write refused by leaf/aggregate or delete policy
    PolicyViolation,
    /// Completion value outside [0, 100]
    InvalidInput,
    /// Goal store failure
    StoreError,
    /// `goaltree.toml` or env misconfigured
    ConfigError,
}

impl ErrorCategory {
    /// Machine-readable code for logging
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CycleRejected => "CYCLE_REJECTED",
            Self::CrossOwnerRejected => "CROSS_OWNER_REJECTED",
            Self::NotFound => "NOT_FOUND",
            Self::MaxDepthExceeded => "MAX_DEPTH_EXCEEDED",
            Self::KindOrderRejected => "KIND_ORDER_REJECTED",
            Self::PolicyViolation => "POLICY_VIOLATION",
            Self::InvalidInput => "INVALID_INPUT",
            Self::StoreError => "STORE_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
        }
    }

    /// Whether this is a `Rejected(reason)` outcome of link validation
    pub fn is_rejection(self) -> bool {
        matches!(
            self,
            Self::CycleRejected
                | Self::CrossOwnerRejected
                | Self::NotFound
                | Self::MaxDepthExceeded
                | Self::KindOrderRejected
        )
    }
}

#[derive(Debug, Error)]
pub enum GoalTreeError {
    #[error("linking {goal_id} under {parent_id} would create a cycle")]
    CycleRejected { goal_id: GoalId, parent_id: GoalId },

    #[error("cannot link a goal of owner {goal_owner} under a goal of owner {parent_owner}")]
    CrossOwnerRejected {
        goal_owner: OwnerId,
        parent_owner: OwnerId,
    },

    #[error("goal not found: {goal_id}")]
    NotFound { goal_id: GoalId },

    #[error("goal tree would exceed the maximum depth of {limit}")]
    MaxDepthExceeded { limit: usize },

    #[error("a {child_kind} goal cannot be placed under a {parent_kind} goal")]
    KindOrderRejected {
        parent_kind: GoalKind,
        child_kind: GoalKind,
    },

    #[error("goal {goal_id} has children; its completion and status are derived")]
    DerivedValue { goal_id: GoalId },

    #[error("completion value {value} is outside [0, 100]")]
    InvalidCompletion { value: f64 },

    #[error("goal {goal_id} has {count} children; choose cascade or detach to delete it")]
    HasChildren { goal_id: GoalId, count: usize },

    #[error("store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl GoalTreeError {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::CycleRejected { .. } => ErrorCategory::CycleRejected,
            Self::CrossOwnerRejected { .. } => ErrorCategory::CrossOwnerRejected,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::MaxDepthExceeded { .. } => ErrorCategory::MaxDepthExceeded,
            Self::KindOrderRejected { .. } => ErrorCategory::KindOrderRejected,
            Self::DerivedValue { .. } | Self::HasChildren { .. } => {
                ErrorCategory::PolicyViolation
            }
            Self::InvalidCompletion { .. } => ErrorCategory::InvalidInput,
            Self::Store { .. } => ErrorCategory::StoreError,
            Self::Config { .. } => ErrorCategory::ConfigError,
        }
    }

    /// Whether this error is a link-validation rejection
    pub fn is_rejection(&self) -> bool {
        self.category().is_rejection()
    }

    pub fn not_found(goal_id: GoalId) -> Self {
        Self::NotFound { goal_id }
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            source: None,
        }
    }

    /// Create a store error with source
    pub fn store_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Store {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for goal tree operations
pub type Result<T> = std::result::Result<T, GoalTreeError>;

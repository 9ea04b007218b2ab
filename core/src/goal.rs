//! Goal record types.
//!
//! A goal is the only entity the engine manages:
//! - **Leaf goal**: no children, completion authored by the caller
//! - **Aggregate goal**: one or more children, completion derived from them
//!
//! The parent link is a plain id reference. Traversal always goes back
//! through the store, never through in-memory pointers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lower bound of a completion value.
pub const COMPLETION_MIN: f64 = 0.0;

/// Upper bound of a completion value.
pub const COMPLETION_MAX: f64 = 100.0;

/// Opaque goal identifier, stable for the lifetime of the goal.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(transparent)]
pub struct GoalId(Uuid);

impl GoalId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for GoalId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for GoalId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for GoalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for GoalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Opaque owner identifier. Trees never span two owners.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Goal granularity, ordered coarse-to-fine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GoalKind {
    Yearly,
    Quarterly,
    Monthly,
    Weekly,
}

impl GoalKind {
    pub const ALL: [GoalKind; 4] = [
        GoalKind::Yearly,
        GoalKind::Quarterly,
        GoalKind::Monthly,
        GoalKind::Weekly,
    ];

    /// Position in the coarse-to-fine order (Yearly = 0).
    pub fn rank(self) -> u8 {
        match self {
            GoalKind::Yearly => 0,
            GoalKind::Quarterly => 1,
            GoalKind::Monthly => 2,
            GoalKind::Weekly => 3,
        }
    }

    /// Whether `self` is a strictly coarser granularity than `other`.
    pub fn is_coarser_than(self, other: GoalKind) -> bool {
        self.rank() < other.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GoalKind::Yearly => "yearly",
            GoalKind::Quarterly => "quarterly",
            GoalKind::Monthly => "monthly",
            GoalKind::Weekly => "weekly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "yearly" => Some(GoalKind::Yearly),
            "quarterly" => Some(GoalKind::Quarterly),
            "monthly" => Some(GoalKind::Monthly),
            "weekly" => Some(GoalKind::Weekly),
            _ => None,
        }
    }
}

impl fmt::Display for GoalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status.
///
/// Caller-set on leaves. On aggregate goals, Active/Completed are derived
/// while Paused/Abandoned are owner overrides that aggregation keeps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    #[default]
    Active,
    Completed,
    Paused,
    Abandoned,
}

impl GoalStatus {
    /// Whether this status is an owner decision that aggregation must not overwrite.
    pub fn is_owner_override(self) -> bool {
        matches!(self, GoalStatus::Paused | GoalStatus::Abandoned)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GoalStatus::Active => "active",
            GoalStatus::Completed => "completed",
            GoalStatus::Paused => "paused",
            GoalStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(GoalStatus::Active),
            "completed" => Some(GoalStatus::Completed),
            "paused" => Some(GoalStatus::Paused),
            "abandoned" => Some(GoalStatus::Abandoned),
            _ => None,
        }
    }
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority level.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    JsonSchema,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            "urgent" => Some(Priority::Urgent),
            _ => None,
        }
    }
}

/// A stored goal.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Goal {
    /// Unique identifier (immutable).
    pub id: GoalId,

    /// Owning user (immutable).
    pub owner: OwnerId,

    /// Granularity (immutable).
    pub kind: GoalKind,

    /// Short human-readable title.
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Parent goal, absent for roots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<GoalId>,

    /// Completion in [0, 100]. `None` until a value has been recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<f64>,

    pub status: GoalStatus,

    #[serde(default)]
    pub priority: Priority,

    /// Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDate>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Goal {
    /// Completion as an aggregation input: unrecorded counts as zero.
    pub fn completion_or_zero(&self) -> f64 {
        self.completion.unwrap_or(COMPLETION_MIN)
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// The value/status pair written by a completion update.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Completion {
    pub value: f64,
    pub status: GoalStatus,
}

/// Input for creating a goal.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGoal {
    pub owner: OwnerId,
    pub kind: GoalKind,
    pub title: String,
    pub description: Option<String>,
    pub parent_id: Option<GoalId>,
    pub completion: Option<f64>,
    pub status: GoalStatus,
    pub priority: Priority,
    pub deadline: Option<NaiveDate>,
}

impl NewGoal {
    pub fn new(owner: OwnerId, kind: GoalKind, title: impl Into<String>) -> Self {
        Self {
            owner,
            kind,
            title: title.into(),
            description: None,
            parent_id: None,
            completion: None,
            status: GoalStatus::Active,
            priority: Priority::default(),
            deadline: None,
        }
    }

    pub fn with_parent(mut self, parent_id: GoalId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_completion(mut self, value: f64) -> Self {
        self.completion = Some(value);
        self
    }

    pub fn with_status(mut self, status: GoalStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_deadline(mut self, deadline: NaiveDate) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Materialize the record a store will persist.
    pub fn into_goal(self, id: GoalId, now: DateTime<Utc>) -> Goal {
        Goal {
            id,
            owner: self.owner,
            kind: self.kind,
            title: self.title,
            description: self.description,
            parent_id: self.parent_id,
            completion: self.completion,
            status: self.status,
            priority: self.priority,
            deadline: self.deadline,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Whether `value` is a legal completion value.
pub fn is_valid_completion(value: f64) -> bool {
    value.is_finite() && (COMPLETION_MIN..=COMPLETION_MAX).contains(&value)
}

/// Round for presentation only (one decimal). Stored values are never rounded.
pub fn display_percent(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

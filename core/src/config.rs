//! goaltree configuration loading
//!
//! Loads configuration from `~/.config/goaltree/goaltree.toml` (or the
//! `GOALTREE_CONFIG` env var). Every field has a default, so an absent
//! file is a valid configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{GoalTreeError, Result};

/// Root configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct GoalTreeConfig {
    /// Path to the SQLite goal database
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Structural limits and link policy
    #[serde(default)]
    pub tree: TreeConfig,

    /// Progress aggregation policy
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Delete behavior when no policy is given explicitly
    #[serde(default)]
    pub deletion: DeletionConfig,
}

fn default_db_path() -> String {
    dirs::data_dir()
        .map(|d| {
            d.join("goaltree")
                .join("goals.db")
                .to_string_lossy()
                .into_owned()
        })
        .unwrap_or_else(|| "goals.db".to_string())
}

/// Tree structure configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TreeConfig {
    /// Maximum number of levels (a root is level 1)
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Default depth for subtree reads
    #[serde(default = "default_subtree_depth")]
    pub subtree_depth: usize,

    /// Reject links where the parent kind is not strictly coarser than the child
    #[serde(default)]
    pub strict_kind_ordering: bool,
}

fn default_max_depth() -> usize {
    64
}

fn default_subtree_depth() -> usize {
    4
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            subtree_depth: default_subtree_depth(),
            strict_kind_ordering: false,
        }
    }
}

/// How abandoned children enter the average
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AbandonedPolicy {
    /// Abandoned children contribute their last completion value
    #[default]
    Include,
    /// Abandoned children are left out of the mean
    Exclude,
}

/// Aggregation configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AggregationConfig {
    #[serde(default)]
    pub abandoned: AbandonedPolicy,

    /// Tolerance under which a recomputed value counts as unchanged
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

fn default_epsilon() -> f64 {
    1e-9
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            abandoned: AbandonedPolicy::default(),
            epsilon: default_epsilon(),
        }
    }
}

/// What happens to the children of a deleted goal
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// Refuse to delete a goal that still has children
    #[default]
    Reject,
    /// Delete the whole subtree
    Cascade,
    /// Children become roots
    Detach,
}

impl DeletePolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reject" => Some(Self::Reject),
            "cascade" => Some(Self::Cascade),
            "detach" => Some(Self::Detach),
            _ => None,
        }
    }
}

/// Deletion configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct DeletionConfig {
    #[serde(default)]
    pub default_policy: DeletePolicy,
}

impl Default for GoalTreeConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            tree: TreeConfig::default(),
            aggregation: AggregationConfig::default(),
            deletion: DeletionConfig::default(),
        }
    }
}

impl GoalTreeConfig {
    /// Environment variable for config path override
    pub const ENV_CONFIG_PATH: &'static str = "GOALTREE_CONFIG";

    /// Default config filename
    pub const DEFAULT_CONFIG_FILENAME: &'static str = "goaltree.toml";

    /// Load configuration from file
    ///
    /// Resolution order:
    /// 1. `GOALTREE_CONFIG` environment variable
    /// 2. `~/.config/goaltree/goaltree.toml`
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let path = Self::resolve_config_path();

        if !path.exists() {
            tracing::info!(
                path = %path.display(),
                "goaltree config not found, using defaults"
            );
            return Ok(Self::default());
        }

        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            GoalTreeError::config_with_source(
                format!("failed to read config at {}", path.display()),
                e,
            )
        })?;

        Self::parse(&contents)
    }

    /// Parse configuration from TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let cfg: GoalTreeConfig = toml::from_str(contents)
            .map_err(|e| GoalTreeError::config_with_source("failed to parse config", e))?;

        cfg.validate()?;
        Ok(cfg)
    }

    fn resolve_config_path() -> PathBuf {
        if let Ok(path) = std::env::var(Self::ENV_CONFIG_PATH) {
            return PathBuf::from(path);
        }

        dirs::home_dir()
            .map(|h| {
                h.join(".config")
                    .join("goaltree")
                    .join(Self::DEFAULT_CONFIG_FILENAME)
            })
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_CONFIG_FILENAME))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.tree.max_depth == 0 {
            return Err(GoalTreeError::config("tree.max_depth must be at least 1"));
        }
        if self.tree.subtree_depth == 0 {
            return Err(GoalTreeError::config(
                "tree.subtree_depth must be at least 1",
            ));
        }
        if !self.aggregation.epsilon.is_finite() || self.aggregation.epsilon < 0.0 {
            return Err(GoalTreeError::config(format!(
                "aggregation.epsilon must be a non-negative number, got {}",
                self.aggregation.epsilon
            )));
        }
        if self.tree.subtree_depth > self.tree.max_depth {
            tracing::warn!(
                subtree_depth = self.tree.subtree_depth,
                max_depth = self.tree.max_depth,
                "subtree_depth exceeds max_depth; reads are capped by max_depth"
            );
        }
        Ok(())
    }

    /// Get the resolved database path (expanding ~ if needed)
    pub fn resolved_db_path(&self) -> PathBuf {
        if let Some(rest) = self.db_path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(rest);
        }
        PathBuf::from(&self.db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = GoalTreeConfig::default();
        assert_eq!(cfg.tree.max_depth, 64);
        assert_eq!(cfg.tree.subtree_depth, 4);
        assert!(!cfg.tree.strict_kind_ordering);
        assert_eq!(cfg.aggregation.abandoned, AbandonedPolicy::Include);
        assert_eq!(cfg.aggregation.epsilon, 1e-9);
        assert_eq!(cfg.deletion.default_policy, DeletePolicy::Reject);
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            db_path = "/tmp/goals.db"
        "#;

        let cfg = GoalTreeConfig::parse(toml).expect("should parse");
        assert_eq!(cfg.db_path, "/tmp/goals.db");
        assert_eq!(cfg.tree.max_depth, 64);
        assert_eq!(cfg.resolved_db_path(), PathBuf::from("/tmp/goals.db"));
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            db_path = "~/goals/goals.db"

            [tree]
            max_depth = 8
            subtree_depth = 6
            strict_kind_ordering = true

            [aggregation]
            abandoned = "exclude"
            epsilon = 0.001

            [deletion]
            default_policy = "detach"
        "#;

        let cfg = GoalTreeConfig::parse(toml).expect("should parse");
        assert_eq!(cfg.tree.max_depth, 8);
        assert_eq!(cfg.tree.subtree_depth, 6);
        assert!(cfg.tree.strict_kind_ordering);
        assert_eq!(cfg.aggregation.abandoned, AbandonedPolicy::Exclude);
        assert_eq!(cfg.aggregation.epsilon, 0.001);
        assert_eq!(cfg.deletion.default_policy, DeletePolicy::Detach);
        assert!(!cfg.resolved_db_path().starts_with("~"));
    }

    #[test]
    fn test_zero_depth_rejected() {
        let err = GoalTreeConfig::parse("[tree]\nmax_depth = 0\n").expect_err("should fail");
        assert!(err.to_string().contains("max_depth"));
    }

    #[test]
    fn test_negative_epsilon_rejected() {
        let err =
            GoalTreeConfig::parse("[aggregation]\nepsilon = -1.0\n").expect_err("should fail");
        assert!(err.to_string().contains("epsilon"));
    }

    #[test]
    fn test_unknown_policy_is_parse_error() {
        let err = GoalTreeConfig::parse("[deletion]\ndefault_policy = \"shred\"\n")
            .expect_err("should fail");
        assert!(err.to_string().contains("parse"));
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("goaltree.toml");
        std::fs::write(&path, "[tree]\nmax_depth = 12\n").expect("write");

        let cfg = GoalTreeConfig::load_from_path(&path).expect("load");
        assert_eq!(cfg.tree.max_depth, 12);
    }
}

//! SQLite goal store.
//!
//! One connection behind a mutex. Every mutating call runs in an
//! `IMMEDIATE` transaction so a `transact_node` step (read goal, read
//! children, write goal) is atomic against other connections too.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};

use super::{CheckFn, DecideFn, GoalLookup, GoalStore, NodeStep};
use crate::config::GoalTreeConfig;
use crate::error::{GoalTreeError, Result};
use crate::goal::{
    Completion, Goal, GoalId, GoalKind, GoalStatus, NewGoal, OwnerId, Priority,
};

/// Embedded schema
const SCHEMA_SQL: &str = include_str!("schema.sql");

const GOAL_COLUMNS: &str = "id, owner, kind, title, description, parent_id, completion, \
                            status, priority, deadline, created_at, updated_at";

const DEADLINE_FORMAT: &str = "%Y-%m-%d";

/// Goal store backed by a SQLite database.
pub struct SqliteGoalStore {
    conn: Mutex<Connection>,
}

impl SqliteGoalStore {
    /// Open the database at the configured path and initialize schema
    pub fn open_with_config(cfg: &GoalTreeConfig) -> Result<Self> {
        Self::open(&cfg.resolved_db_path())
    }

    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                GoalTreeError::store_with_source(
                    format!("failed to create db directory: {}", parent.display()),
                    e,
                )
            })?;
        }

        let conn = Connection::open(path).map_err(|e| {
            GoalTreeError::store_with_source(format!("failed to open db at {}", path.display()), e)
        })?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| GoalTreeError::store_with_source("failed to set busy timeout", e))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(|e| GoalTreeError::store_with_source("failed to enable WAL", e))?;

        Self::apply_schema(&conn)?;
        tracing::debug!(path = %path.display(), "goal store initialized");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| GoalTreeError::store_with_source("failed to open in-memory db", e))?;
        Self::apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn apply_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| GoalTreeError::store_with_source("failed to apply schema", e))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| GoalTreeError::store("sqlite connection lock poisoned"))
    }

    /// Run `operation` inside a transaction, committing on success.
    ///
    /// Rollback on error happens when the transaction is dropped.
    fn in_transaction<T>(
        &self,
        operation: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| GoalTreeError::store_with_source("failed to begin transaction", e))?;
        let result = operation(&tx)?;
        tx.commit()
            .map_err(|e| GoalTreeError::store_with_source("failed to commit transaction", e))?;
        Ok(result)
    }
}

fn db_err(message: &'static str) -> impl FnOnce(rusqlite::Error) -> GoalTreeError {
    move |e| GoalTreeError::store_with_source(message, e)
}

fn conversion_err(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn parse_goal_id(idx: usize, raw: &str) -> rusqlite::Result<GoalId> {
    raw.parse().map_err(|e| conversion_err(idx, e))
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn row_to_goal(row: &Row<'_>) -> rusqlite::Result<Goal> {
    let id: String = row.get(0)?;
    let owner: String = row.get(1)?;
    let kind: String = row.get(2)?;
    let parent_id: Option<String> = row.get(5)?;
    let status: String = row.get(7)?;
    let priority: String = row.get(8)?;
    let deadline: Option<String> = row.get(9)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;

    Ok(Goal {
        id: parse_goal_id(0, &id)?,
        owner: OwnerId::new(owner),
        kind: GoalKind::parse(&kind)
            .ok_or_else(|| conversion_err(2, format!("unknown goal kind: {kind}")))?,
        title: row.get(3)?,
        description: row.get(4)?,
        parent_id: parent_id
            .as_deref()
            .map(|raw| parse_goal_id(5, raw))
            .transpose()?,
        completion: row.get(6)?,
        status: GoalStatus::parse(&status)
            .ok_or_else(|| conversion_err(7, format!("unknown goal status: {status}")))?,
        priority: Priority::parse(&priority)
            .ok_or_else(|| conversion_err(8, format!("unknown priority: {priority}")))?,
        deadline: deadline
            .as_deref()
            .map(|raw| NaiveDate::parse_from_str(raw, DEADLINE_FORMAT))
            .transpose()
            .map_err(|e| conversion_err(9, e))?,
        created_at: parse_timestamp(10, &created_at)?,
        updated_at: parse_timestamp(11, &updated_at)?,
    })
}

fn fetch_goal(conn: &Connection, goal_id: GoalId) -> rusqlite::Result<Option<Goal>> {
    conn.query_row(
        &format!("SELECT {GOAL_COLUMNS} FROM goals WHERE id = ?1"),
        params![goal_id.to_string()],
        row_to_goal,
    )
    .optional()
}

fn fetch_children(conn: &Connection, parent_id: GoalId) -> rusqlite::Result<Vec<Goal>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {GOAL_COLUMNS} FROM goals WHERE parent_id = ?1 ORDER BY seq"
    ))?;
    let rows = stmt.query_map(params![parent_id.to_string()], row_to_goal)?;
    rows.collect()
}

fn exists(conn: &Connection, goal_id: GoalId) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM goals WHERE id = ?1)",
        params![goal_id.to_string()],
        |row| row.get(0),
    )
}

fn require_parent(conn: &Connection, parent_id: Option<GoalId>) -> Result<()> {
    match parent_id {
        Some(parent_id) if !exists(conn, parent_id).map_err(db_err("failed to check parent"))? => {
            Err(GoalTreeError::not_found(parent_id))
        }
        _ => Ok(()),
    }
}

fn write_parent(
    conn: &Connection,
    goal_id: GoalId,
    parent_id: Option<GoalId>,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE goals SET parent_id = ?2, updated_at = ?3 WHERE id = ?1",
        params![
            goal_id.to_string(),
            parent_id.as_ref().map(ToString::to_string),
            Utc::now().to_rfc3339()
        ],
    )
}

/// Reads served from an open transaction.
struct TxLookup<'c> {
    conn: &'c Connection,
}

impl GoalLookup for TxLookup<'_> {
    fn lookup_goal(&self, goal_id: GoalId) -> Result<Option<Goal>> {
        fetch_goal(self.conn, goal_id).map_err(db_err("failed to read goal"))
    }

    fn lookup_children(&self, parent_id: GoalId) -> Result<Vec<Goal>> {
        fetch_children(self.conn, parent_id).map_err(db_err("failed to read children"))
    }
}

fn write_completion(
    conn: &Connection,
    goal_id: GoalId,
    completion: Completion,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE goals SET completion = ?2, status = ?3, updated_at = ?4 WHERE id = ?1",
        params![
            goal_id.to_string(),
            completion.value,
            completion.status.as_str(),
            Utc::now().to_rfc3339(),
        ],
    )
}

impl GoalStore for SqliteGoalStore {
    fn get(&self, goal_id: GoalId) -> Result<Option<Goal>> {
        let conn = self.lock()?;
        fetch_goal(&conn, goal_id).map_err(db_err("failed to read goal"))
    }

    fn get_children(&self, parent_id: GoalId) -> Result<Vec<Goal>> {
        let conn = self.lock()?;
        fetch_children(&conn, parent_id).map_err(db_err("failed to read children"))
    }

    fn create(&self, goal: NewGoal) -> Result<GoalId> {
        let id = GoalId::new();
        let record = goal.into_goal(id, Utc::now());

        self.in_transaction(|tx| {
            require_parent(tx, record.parent_id)?;

            tx.execute(
                &format!(
                    "INSERT INTO goals ({GOAL_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    record.id.to_string(),
                    record.owner.as_str(),
                    record.kind.as_str(),
                    record.title,
                    record.description,
                    record.parent_id.as_ref().map(ToString::to_string),
                    record.completion,
                    record.status.as_str(),
                    record.priority.as_str(),
                    record
                        .deadline
                        .map(|d| d.format(DEADLINE_FORMAT).to_string()),
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )
            .map_err(db_err("failed to insert goal"))?;
            Ok(())
        })?;

        Ok(id)
    }

    fn update_completion(&self, goal_id: GoalId, completion: Completion) -> Result<()> {
        self.in_transaction(|tx| {
            let changed = write_completion(tx, goal_id, completion)
                .map_err(db_err("failed to update completion"))?;
            if changed == 0 {
                return Err(GoalTreeError::not_found(goal_id));
            }
            Ok(())
        })
    }

    fn set_parent(&self, goal_id: GoalId, parent_id: Option<GoalId>) -> Result<()> {
        self.in_transaction(|tx| {
            require_parent(tx, parent_id)?;
            let changed =
                write_parent(tx, goal_id, parent_id).map_err(db_err("failed to update parent"))?;
            if changed == 0 {
                return Err(GoalTreeError::not_found(goal_id));
            }
            Ok(())
        })
    }

    fn relink(
        &self,
        goal_id: GoalId,
        parent_id: Option<GoalId>,
        check: &mut CheckFn<'_>,
    ) -> Result<Goal> {
        self.in_transaction(|tx| {
            let previous = fetch_goal(tx, goal_id)
                .map_err(db_err("failed to read goal"))?
                .ok_or(GoalTreeError::NotFound { goal_id })?;
            require_parent(tx, parent_id)?;
            check(&TxLookup { conn: tx })?;

            write_parent(tx, goal_id, parent_id).map_err(db_err("failed to update parent"))?;
            Ok(previous)
        })
    }

    fn delete_goals(&self, goal_ids: &[GoalId]) -> Result<()> {
        self.in_transaction(|tx| {
            for &goal_id in goal_ids {
                let children: i64 = tx
                    .query_row(
                        "SELECT COUNT(*) FROM goals WHERE parent_id = ?1",
                        params![goal_id.to_string()],
                        |row| row.get(0),
                    )
                    .map_err(db_err("failed to count children"))?;
                if children > 0 {
                    return Err(GoalTreeError::store(format!(
                        "goal {goal_id} still has children"
                    )));
                }
                let changed = tx
                    .execute("DELETE FROM goals WHERE id = ?1", params![goal_id.to_string()])
                    .map_err(db_err("failed to delete goal"))?;
                if changed == 0 {
                    return Err(GoalTreeError::not_found(goal_id));
                }
            }
            Ok(())
        })
    }

    fn list_goals(&self, owner: &OwnerId, kind: Option<GoalKind>) -> Result<Vec<Goal>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(&format!(
                "SELECT {GOAL_COLUMNS} FROM goals \
                 WHERE owner = ?1 AND (?2 IS NULL OR kind = ?2) ORDER BY seq"
            ))
            .map_err(db_err("failed to prepare goal listing"))?;
        let rows = stmt
            .query_map(params![owner.as_str(), kind.map(GoalKind::as_str)], row_to_goal)
            .map_err(db_err("failed to list goals"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("failed to read goal row"))
    }

    fn transact_node(
        &self,
        goal_id: GoalId,
        decide: &mut DecideFn<'_>,
    ) -> Result<Option<NodeStep>> {
        self.in_transaction(|tx| {
            let Some(current) = fetch_goal(tx, goal_id).map_err(db_err("failed to read goal"))?
            else {
                return Ok(None);
            };
            let children =
                fetch_children(tx, goal_id).map_err(db_err("failed to read children"))?;

            let Some(completion) = decide(&current, &children) else {
                return Ok(Some(NodeStep {
                    goal: current,
                    child_count: children.len(),
                    written: false,
                }));
            };

            write_completion(tx, goal_id, completion)
                .map_err(db_err("failed to update completion"))?;
            let goal = fetch_goal(tx, goal_id)
                .map_err(db_err("failed to re-read goal"))?
                .ok_or(GoalTreeError::NotFound { goal_id })?;
            Ok(Some(NodeStep {
                goal,
                child_count: children.len(),
                written: true,
            }))
        })
    }
}

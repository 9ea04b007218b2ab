//! `goaltree` subcommands.
//!
//! Thin caller of [`GoalService`] backed by the SQLite store.
//!
//! ## Commands
//!
//! - `goaltree create --owner <OWNER> --kind <KIND> <TITLE> [--parent <ID>]`
//! - `goaltree complete <ID> <VALUE>`
//! - `goaltree status <ID> <STATUS>`
//! - `goaltree move <ID> [--parent <ID>]`
//! - `goaltree delete <ID> [--policy reject|cascade|detach]`
//! - `goaltree show|children|parent|recompute|progress <ID>`
//! - `goaltree tree <ID> [--depth <N>]`
//! - `goaltree list --owner <OWNER> [--kind <KIND>]`
//! - `goaltree schema [hierarchy|tree|goal|report]`

use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use goaltree_core::{
    DeletePolicy, DeleteReport, Goal, GoalHierarchy, GoalId, GoalKind, GoalProgress,
    GoalService, GoalStatus, GoalTree, GoalTreeConfig, InterruptCause, NewGoal, OwnerId,
    Priority, PropagationReport, SqliteGoalStore, StopReason, display_percent,
};
use serde::Serialize;

/// Maintain goal trees whose ancestors track their descendants' progress.
#[derive(Debug, Parser)]
#[command(name = "goaltree", version)]
pub struct GoalCli {
    /// Goal database path (overrides `db_path` from the config file).
    #[arg(long = "db", global = true)]
    pub db: Option<PathBuf>,

    /// Config file (defaults to $GOALTREE_CONFIG, then ~/.config/goaltree/goaltree.toml).
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Output as JSON.
    #[arg(long = "json", short = 'j', global = true)]
    pub json: bool,

    /// Debug logging on stderr.
    #[arg(long = "verbose", short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: GoalSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum GoalSubcommand {
    /// Create a goal, optionally under a parent.
    Create(CreateArgs),
    /// Set the completion value of a leaf goal.
    Complete(CompleteArgs),
    /// Set the lifecycle status of a goal.
    Status(StatusArgs),
    /// Re-parent a goal; without --parent it becomes a root.
    Move(MoveArgs),
    /// Delete a goal.
    Delete(DeleteArgs),
    /// Show a goal with its parent and children.
    Show(GoalArg),
    /// List the children of a goal.
    Children(GoalArg),
    /// Show the parent of a goal.
    Parent(GoalArg),
    /// Print the subtree under a goal.
    Tree(TreeArgs),
    /// List the goals of an owner.
    List(ListArgs),
    /// Recompute a goal and its ancestors.
    Recompute(GoalArg),
    /// Live progress of a goal, without writing it.
    Progress(GoalArg),
    /// Print the JSON schema of an output type.
    Schema(SchemaArgs),
}

#[derive(Debug, Parser)]
pub struct CreateArgs {
    /// Goal title.
    pub title: String,

    /// Owner id.
    #[arg(long = "owner", short = 'o')]
    pub owner: String,

    /// Granularity: yearly, quarterly, monthly or weekly.
    #[arg(long = "kind", short = 'k', value_parser = parse_kind)]
    pub kind: GoalKind,

    /// Parent goal id.
    #[arg(long = "parent", short = 'p')]
    pub parent: Option<GoalId>,

    #[arg(long = "description", short = 'd')]
    pub description: Option<String>,

    /// Priority: low, medium, high or urgent.
    #[arg(long = "priority", value_parser = parse_priority)]
    pub priority: Option<Priority>,

    /// Deadline (YYYY-MM-DD).
    #[arg(long = "deadline")]
    pub deadline: Option<NaiveDate>,

    /// Initial completion value in [0, 100].
    #[arg(long = "completion")]
    pub completion: Option<f64>,
}

#[derive(Debug, Parser)]
pub struct CompleteArgs {
    pub id: GoalId,

    /// Completion value in [0, 100].
    pub value: f64,
}

#[derive(Debug, Parser)]
pub struct StatusArgs {
    pub id: GoalId,

    /// active, completed, paused or abandoned.
    #[arg(value_parser = parse_status)]
    pub status: GoalStatus,
}

#[derive(Debug, Parser)]
pub struct MoveArgs {
    pub id: GoalId,

    /// New parent goal id.
    #[arg(long = "parent", short = 'p')]
    pub parent: Option<GoalId>,
}

#[derive(Debug, Parser)]
pub struct DeleteArgs {
    pub id: GoalId,

    /// What happens to children: reject, cascade or detach.
    #[arg(long = "policy", value_parser = parse_policy)]
    pub policy: Option<DeletePolicy>,
}

#[derive(Debug, Parser)]
pub struct GoalArg {
    pub id: GoalId,
}

#[derive(Debug, Parser)]
pub struct TreeArgs {
    pub id: GoalId,

    /// Levels to load, the goal itself included.
    #[arg(long = "depth")]
    pub depth: Option<usize>,
}

#[derive(Debug, Parser)]
pub struct ListArgs {
    /// Owner id.
    #[arg(long = "owner", short = 'o')]
    pub owner: String,

    /// Only goals of this kind.
    #[arg(long = "kind", short = 'k', value_parser = parse_kind)]
    pub kind: Option<GoalKind>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SchemaKind {
    Hierarchy,
    Tree,
    Goal,
    Report,
}

#[derive(Debug, Parser)]
pub struct SchemaArgs {
    #[arg(value_enum, default_value = "hierarchy")]
    pub kind: SchemaKind,
}

fn parse_kind(s: &str) -> Result<GoalKind, String> {
    GoalKind::parse(s).ok_or_else(|| {
        format!("unknown kind '{s}' (expected yearly, quarterly, monthly or weekly)")
    })
}

fn parse_status(s: &str) -> Result<GoalStatus, String> {
    GoalStatus::parse(s).ok_or_else(|| {
        format!("unknown status '{s}' (expected active, completed, paused or abandoned)")
    })
}

fn parse_priority(s: &str) -> Result<Priority, String> {
    Priority::parse(s)
        .ok_or_else(|| format!("unknown priority '{s}' (expected low, medium, high or urgent)"))
}

fn parse_policy(s: &str) -> Result<DeletePolicy, String> {
    DeletePolicy::parse(s)
        .ok_or_else(|| format!("unknown policy '{s}' (expected reject, cascade or detach)"))
}

#[derive(Debug, Serialize)]
struct Created {
    id: GoalId,
}

impl GoalCli {
    pub fn run(&self) -> anyhow::Result<()> {
        if let GoalSubcommand::Schema(args) = &self.command {
            return cmd_schema(args);
        }

        let service = self.open_service()?;
        match &self.command {
            GoalSubcommand::Create(args) => cmd_create(&service, args, self.json),
            GoalSubcommand::Complete(args) => {
                let report = service.set_leaf_completion(args.id, args.value)?;
                print_report(&report, self.json)
            }
            GoalSubcommand::Status(args) => {
                let report = service.set_status(args.id, args.status)?;
                print_report(&report, self.json)
            }
            GoalSubcommand::Move(args) => {
                let report = service.move_goal(args.id, args.parent)?;
                print_report(&report, self.json)
            }
            GoalSubcommand::Delete(args) => {
                let report = match args.policy {
                    Some(policy) => service.delete_goal(args.id, policy)?,
                    None => service.delete_goal_default(args.id)?,
                };
                print_delete(&report, self.json)
            }
            GoalSubcommand::Show(args) => {
                let view = service.get_hierarchy(args.id)?;
                print_hierarchy(&view, self.json)
            }
            GoalSubcommand::Children(args) => {
                let children = service.get_children(args.id)?;
                print_goals(&children, self.json)
            }
            GoalSubcommand::Parent(args) => {
                let parent = service.get_parent(args.id)?;
                if self.json {
                    return print_json(&parent);
                }
                match parent {
                    Some(goal) => println!("{}", goal_line(&goal)),
                    None => println!("{} is a root goal", args.id),
                }
                Ok(())
            }
            GoalSubcommand::Tree(args) => {
                let tree = service.get_subtree(args.id, args.depth)?;
                print_tree(&tree, self.json)
            }
            GoalSubcommand::List(args) => {
                let goals = service.list_goals(&OwnerId::new(args.owner.as_str()), args.kind)?;
                print_goals(&goals, self.json)
            }
            GoalSubcommand::Recompute(args) => {
                let report = service.recompute(args.id)?;
                print_report(&report, self.json)
            }
            GoalSubcommand::Progress(args) => {
                let progress = service.progress_of(args.id)?;
                print_progress(&progress, self.json)
            }
            GoalSubcommand::Schema(args) => cmd_schema(args),
        }
    }

    fn open_service(&self) -> anyhow::Result<GoalService<SqliteGoalStore>> {
        let config = match &self.config {
            Some(path) => GoalTreeConfig::load_from_path(path)?,
            None => GoalTreeConfig::load()?,
        };
        let db_path = self
            .db
            .clone()
            .unwrap_or_else(|| config.resolved_db_path());
        let store = SqliteGoalStore::open(&db_path)
            .with_context(|| format!("opening goal database {}", db_path.display()))?;
        tracing::debug!(db = %db_path.display(), "goal service ready");
        Ok(GoalService::new(store, config))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_create(
    service: &GoalService<SqliteGoalStore>,
    args: &CreateArgs,
    json: bool,
) -> anyhow::Result<()> {
    let mut goal = NewGoal::new(
        OwnerId::new(args.owner.as_str()),
        args.kind,
        args.title.as_str(),
    );
    if let Some(parent) = args.parent {
        goal = goal.with_parent(parent);
    }
    if let Some(description) = &args.description {
        goal = goal.with_description(description.as_str());
    }
    if let Some(priority) = args.priority {
        goal = goal.with_priority(priority);
    }
    if let Some(deadline) = args.deadline {
        goal = goal.with_deadline(deadline);
    }
    if let Some(value) = args.completion {
        goal = goal.with_completion(value);
    }

    let id = service.create_goal(goal)?;
    if json {
        print_json(&Created { id })
    } else {
        println!("{id}");
        Ok(())
    }
}

fn cmd_schema(args: &SchemaArgs) -> anyhow::Result<()> {
    let schema = match args.kind {
        SchemaKind::Hierarchy => schemars::schema_for!(GoalHierarchy),
        SchemaKind::Tree => schemars::schema_for!(GoalTree),
        SchemaKind::Goal => schemars::schema_for!(Goal),
        SchemaKind::Report => schemars::schema_for!(PropagationReport),
    };
    print_json(&schema)
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn percent(goal: &Goal) -> String {
    match goal.completion {
        Some(value) => format!("{:>5.1}%", display_percent(value)),
        None => "     -".to_string(),
    }
}

fn goal_line(goal: &Goal) -> String {
    format!(
        "{}  {:<9} {:<9} {}  {}",
        goal.id,
        goal.kind.as_str(),
        goal.status.as_str(),
        percent(goal),
        goal.title
    )
}

fn print_goals(goals: &[Goal], json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(goals);
    }
    if goals.is_empty() {
        println!("No goals");
    }
    for goal in goals {
        println!("{}", goal_line(goal));
    }
    Ok(())
}

fn print_hierarchy(view: &GoalHierarchy, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(view);
    }
    println!("{}", goal_line(&view.goal));
    if let Some(description) = &view.goal.description {
        println!("  {description}");
    }
    if let Some(deadline) = view.goal.deadline {
        println!("  deadline: {deadline}");
    }
    match &view.parent {
        Some(parent) => println!("parent:\n  {}", goal_line(parent)),
        None => println!("parent: (root)"),
    }
    println!("children: {}", view.children.len());
    for child in &view.children {
        println!("  {}", goal_line(child));
    }
    Ok(())
}

fn print_tree(tree: &GoalTree, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(tree);
    }
    print_tree_node(tree, 0);
    Ok(())
}

fn print_tree_node(node: &GoalTree, indent: usize) {
    let marker = if node.truncated { " …" } else { "" };
    println!(
        "{:indent$}{}{marker}",
        "",
        goal_line(&node.goal),
        indent = indent * 2
    );
    for child in &node.children {
        print_tree_node(child, indent + 1);
    }
}

fn print_progress(progress: &GoalProgress, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(progress);
    }
    let stored = progress
        .stored
        .map(|v| format!("{:.1}%", display_percent(v)))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{}: {:.1}% (stored {stored}, {} children)",
        progress.goal_id,
        display_percent(progress.completion),
        progress.child_count
    );
    Ok(())
}

fn stop_text(stop: &StopReason) -> String {
    match stop {
        StopReason::Root => "reached root".to_string(),
        StopReason::Unchanged => "value unchanged".to_string(),
        StopReason::Leaf => "leaf goal".to_string(),
        StopReason::DepthBound => "depth bound reached".to_string(),
        StopReason::Interrupted { goal_id, cause } => match cause {
            InterruptCause::Deleted => format!("interrupted at {goal_id}: goal deleted"),
            InterruptCause::StoreFailure(message) => {
                format!("interrupted at {goal_id}: {message} (retry with `goaltree recompute {goal_id}`)")
            }
        },
    }
}

fn print_report(report: &PropagationReport, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(report);
    }
    println!(
        "updated {} ancestor(s), {}",
        report.updated.len(),
        stop_text(&report.stop)
    );
    for id in &report.updated {
        println!("  {id}");
    }
    Ok(())
}

fn print_delete(report: &DeleteReport, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(report);
    }
    println!("deleted {} goal(s)", report.deleted.len());
    for id in &report.deleted {
        println!("  {id}");
    }
    if !report.detached.is_empty() {
        println!("detached {} goal(s)", report.detached.len());
        for id in &report.detached {
            println!("  {id}");
        }
    }
    print_report(&report.propagation, false)
}

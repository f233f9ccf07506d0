//! Command implementations for the CLI interface.
//!
//! Every command answers with a JSON envelope on stdout, except `list`, which
//! prints a table for people. A failed command exits with status 1.

use std::fs;
use std::io::Read;

use chrono::NaiveDate;
use clap::Subcommand;
use clap_complete::{generate, Shell};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use gantt_planner::calendar::WorkDays;
use gantt_planner::db::{local_today, parse_date_input, Store};
use gantt_planner::epoch;
use gantt_planner::error::{PlanError, ValidationError};
use gantt_planner::fields::{AnnotationKind, Priority};
use gantt_planner::repository::TaskRepository;
use gantt_planner::service::{InitialView, Planner, ResourceScope};
use gantt_planner::task::{Annotation, Resource, ResourceId, Task, TaskAttributes, TaskId};
use gantt_planner::tracker::Reconciliation;
use gantt_planner::tree::{TaskNode, TaskTree};
use gantt_planner::wire::{CreatedJson, DeletedJson, Envelope, InitialJson, ReconcileJson, ResourceJson, TaskJson};

#[derive(Subcommand)]
pub enum Commands {
    /// Print everything a chart needs to draw itself.
    Init {
        /// Only resources of this department.
        #[arg(long)]
        department: Option<String>,
        /// Resource of the person viewing; listed first.
        #[arg(long)]
        viewer: Option<ResourceId>,
        /// Leave out work that ended before this date (default: today).
        #[arg(long)]
        as_of: Option<String>,
    },

    /// Add a new task.
    Add {
        /// Task name.
        name: String,
        /// Resource the task is planned for. Inherited from --parent if omitted.
        #[arg(long)]
        resource: Option<ResourceId>,
        /// Parent task ID.
        #[arg(long)]
        parent: Option<TaskId>,
        /// Start date: YYYY-MM-DD, "today", "next monday", "in 3d" or epoch millis.
        #[arg(long, default_value = "today")]
        start: String,
        /// Duration in working days, in steps of 0.25.
        #[arg(long, default_value = "1")]
        duration: WorkDays,
        #[arg(long, value_enum, default_value_t = Priority::Normal)]
        priority: Priority,
        #[arg(long)]
        color: Option<String>,
        /// Owner user ID.
        #[arg(long)]
        owner: Option<u64>,
        #[arg(long)]
        owner_shortname: Option<String>,
        #[arg(long, default_value = "")]
        job_reference: String,
        #[arg(long, default_value = "")]
        job_description: String,
        /// Deadline, same formats as --start.
        #[arg(long)]
        deadline: Option<String>,
        #[arg(long)]
        deadline_description: Option<String>,
    },

    /// Change one field of a task.
    Set {
        /// Task ID.
        id: TaskId,
        /// Checksum of the task as last seen.
        #[arg(long)]
        hash: String,
        /// name | start | duration | complete | priority | color | active | deadline | deadlineDescription
        field: String,
        /// New value. Empty clears color and deadline fields.
        value: String,
    },

    /// Save all editable attributes of a task at once.
    Save {
        /// Task ID.
        id: TaskId,
        /// Checksum of the task as last seen.
        #[arg(long)]
        hash: String,
        /// Attributes as JSON, "@file" to read a file or "-" for stdin.
        #[arg(long)]
        json: String,
        /// Move the task and its subtasks to this resource.
        #[arg(long)]
        resource: Option<ResourceId>,
    },

    /// Delete a task and all tasks below it.
    Delete {
        /// Task ID.
        id: TaskId,
        /// Checksum of the task as last seen.
        #[arg(long)]
        hash: String,
    },

    /// Report which of the given tasks changed or disappeared.
    Reconcile {
        /// `{"taskId": "checksum", ...}`, "@file" or "-" for stdin.
        payload: String,
    },

    /// Print one stored task with its checksum.
    Show {
        /// Task ID.
        id: TaskId,
    },

    /// Print the plan as an indented table.
    List {
        /// Only this resource.
        #[arg(long)]
        resource: Option<ResourceId>,
        /// Only this department.
        #[arg(long)]
        department: Option<String>,
        /// Leave out work that ended before this date (default: today).
        #[arg(long)]
        as_of: Option<String>,
    },

    /// Manage resources.
    Resource {
        #[command(subcommand)]
        action: ResourceAction,
    },

    /// Block out time on a resource's row.
    Absence {
        /// Resource ID.
        resource: ResourceId,
        #[arg(long, value_enum)]
        kind: AnnotationKind,
        /// First day, same formats as task dates.
        #[arg(long)]
        start: String,
        /// Number of calendar days.
        #[arg(long, default_value_t = 1)]
        days: u32,
        #[arg(long)]
        comment: Option<String>,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum ResourceAction {
    /// Register a person tasks can be planned for.
    Add {
        name: String,
        #[arg(long)]
        shortname: Option<String>,
        #[arg(long)]
        department: Option<String>,
        /// Position among resources; lower comes first.
        #[arg(long, default_value_t = 0)]
        sort_order: i32,
    },
    /// List all resources.
    List,
}

/// Print the envelope for `result` and exit non-zero on failure.
fn respond<T: Serialize>(result: Result<T, PlanError>) {
    let failed = result.is_err();
    if let Err(PlanError::Storage(e)) = &result {
        error!(error = %e, "storage failure");
    }
    match serde_json::to_string_pretty(&Envelope::from_result(result)) {
        Ok(out) => println!("{out}"),
        Err(e) => {
            eprintln!("Failed to encode response: {e}");
            std::process::exit(1);
        }
    }
    if failed {
        std::process::exit(1);
    }
}

fn date_arg(raw: &str, today: NaiveDate) -> Result<NaiveDate, ValidationError> {
    parse_date_input(raw, today).ok_or_else(|| ValidationError::InvalidTimestamp { value: raw.to_string() })
}

/// Literal text, or the contents of a file (`@path`) or stdin (`-`).
fn read_payload(raw: &str) -> Result<String, PlanError> {
    if raw == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| ValidationError::MalformedJson { reason: e.to_string() })?;
        return Ok(buf);
    }
    match raw.strip_prefix('@') {
        Some(path) => fs::read_to_string(path)
            .map_err(|e| ValidationError::MalformedJson { reason: format!("{path}: {e}") }.into()),
        None => Ok(raw.to_string()),
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, PlanError> {
    serde_json::from_str(text).map_err(|e| ValidationError::MalformedJson { reason: e.to_string() }.into())
}

fn as_of_arg(as_of: Option<String>) -> Result<NaiveDate, PlanError> {
    let today = local_today();
    Ok(match as_of {
        Some(raw) => date_arg(&raw, today)?,
        None => today,
    })
}

/// Print the initial chart payload.
pub fn cmd_init(store: &Store, department: Option<String>, viewer: Option<ResourceId>, as_of: Option<String>) {
    respond(initial_view(store, ResourceScope { department, viewer }, as_of).map(|v| InitialJson::from(&v)));
}

fn initial_view(store: &Store, scope: ResourceScope, as_of: Option<String>) -> Result<InitialView, PlanError> {
    let as_of = as_of_arg(as_of)?;
    let mut db = store.read()?;
    Planner::new(&mut db).fetch_initial(&scope, as_of)
}

/// Add a new task to the plan.
#[allow(clippy::too_many_arguments)]
pub fn cmd_add(
    store: &Store,
    name: String,
    resource: Option<ResourceId>,
    parent: Option<TaskId>,
    start: String,
    duration: WorkDays,
    priority: Priority,
    color: Option<String>,
    owner: Option<u64>,
    owner_shortname: Option<String>,
    job_reference: String,
    job_description: String,
    deadline: Option<String>,
    deadline_description: Option<String>,
) {
    let today = local_today();
    let attributes = date_arg(&start, today).and_then(|start_date| {
        Ok(TaskAttributes {
            name,
            parent,
            color,
            start_date,
            duration,
            priority,
            owner,
            owner_shortname,
            job_reference,
            job_description,
            deadline: deadline.map(|d| date_arg(&d, today)).transpose()?,
            deadline_description,
        })
    });
    let created = match attributes {
        Ok(attributes) => store.write(|db| Planner::new(db).create_task(attributes, resource)),
        Err(e) => Err(e.into()),
    };
    respond(created.map(|id| CreatedJson { id }));
}

/// Guarded single-field change.
///
/// Date fields also accept the human forms of `add`; they are turned into
/// epoch milliseconds before validation.
pub fn cmd_set(store: &Store, id: TaskId, hash: String, field: String, value: String) {
    respond(set_field(store, id, &hash, &field, value).map(|t| TaskJson::record(&t)));
}

fn set_field(store: &Store, id: TaskId, hash: &str, field: &str, value: String) -> Result<Task, PlanError> {
    let is_date = matches!(field, "start" | "startDate" | "deadline");
    let value = if is_date && !value.trim().is_empty() {
        epoch::date_to_millis(date_arg(&value, local_today())?).to_string()
    } else {
        value
    };
    store.write(|db| Planner::new(db).update_field(id, hash, field, &value))
}

/// Guarded full save of a task's attributes.
pub fn cmd_save(store: &Store, id: TaskId, hash: String, json: String, resource: Option<ResourceId>) {
    let saved = read_payload(&json)
        .and_then(|text| parse_json::<TaskAttributes>(&text))
        .and_then(|attributes| store.write(|db| Planner::new(db).update_task(id, &hash, attributes, resource)));
    respond(saved.map(|t| TaskJson::record(&t)));
}

/// Guarded delete of a task subtree.
pub fn cmd_delete(store: &Store, id: TaskId, hash: String) {
    let deleted = store.write(|db| Planner::new(db).delete_task(id, &hash));
    respond(deleted.map(|deleted| DeletedJson { deleted }));
}

/// Batch change detection against a client snapshot.
pub fn cmd_reconcile(store: &Store, payload: String) {
    respond(reconcile(store, &payload).map(|r| ReconcileJson::from(&r)));
}

fn reconcile(store: &Store, payload: &str) -> Result<Reconciliation, PlanError> {
    let payload: Value = parse_json(&read_payload(payload)?)?;
    let mut db = store.read()?;
    Planner::new(&mut db).reconcile(&payload)
}

/// Print one stored record.
pub fn cmd_show(store: &Store, id: TaskId) {
    let task = store
        .read()
        .and_then(|db| db.task(id))
        .map_err(PlanError::from)
        .and_then(|t| t.ok_or(PlanError::NotFound { id }));
    respond(task.map(|t| TaskJson::record(&t)));
}

/// Print the plan as a table, indented by hierarchy depth.
pub fn cmd_list(store: &Store, resource: Option<ResourceId>, department: Option<String>, as_of: Option<String>) {
    let view = match initial_view(store, ResourceScope { department, viewer: resource }, as_of) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error: {}", e.public_message());
            std::process::exit(1);
        }
    };

    print_header();
    match view {
        InitialView::Resources(rows) => {
            for row in rows.iter().filter(|r| resource.map_or(true, |id| r.resource.id == id)) {
                print_resource(&row.resource, &row.tasks);
            }
        }
        InitialView::Projects(tree) => print_tree(&tree),
    }
}

fn print_header() {
    println!(
        "{:<5} {:<10} {:<10} {:>5} {:>5} {:<4} {}",
        "ID", "Start", "End", "Days", "Done", "Pri", "Name"
    );
}

fn print_resource(resource: &Resource, tasks: &TaskTree) {
    let who = match &resource.shortname {
        Some(s) => format!("{} ({s})", resource.name),
        None => resource.name.clone(),
    };
    println!("== {who}");
    for a in &resource.annotations {
        println!("   {} .. {}  {}", a.start_date, a.end_date(), truncate(&a.label(), 40));
    }
    print_tree(tasks);
}

fn print_tree(tree: &TaskTree) {
    for row in tree.flatten() {
        if let Some(node) = tree.get(row.id) {
            print_row(node, row.generation - 1);
        }
    }
}

fn print_row(node: &TaskNode, depth: usize) {
    let pri = match node.task.priority {
        Priority::Low => "low",
        Priority::Normal => "",
        Priority::High => "high",
    };
    println!(
        "{:<5} {:<10} {:<10} {:>5} {:>5} {:<4} {}{}",
        node.id(),
        node.effective_start().to_string(),
        node.effective_end().to_string(),
        node.effective_duration().to_string(),
        node.completion().to_string(),
        pri,
        "  ".repeat(depth),
        truncate(&node.task.name, 48)
    );
}

/// Truncate a string to a maximum width, adding ellipsis if needed.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out = String::new();
        for (i, ch) in s.chars().enumerate() {
            if i + 1 >= width {
                out.push('…');
                break;
            }
            out.push(ch);
        }
        out
    }
}

/// Handle resource management commands.
pub fn cmd_resource(store: &Store, action: ResourceAction) {
    match action {
        ResourceAction::Add { name, shortname, department, sort_order } => {
            let created = if name.trim().is_empty() {
                Err(ValidationError::EmptyName.into())
            } else {
                store.write(|db| Ok::<_, PlanError>(db.add_resource(&name, shortname, department, sort_order)))
            };
            respond(created.map(|id| CreatedJson { id }));
        }
        ResourceAction::List => {
            let listed = store.read().map(|db| db.resources.iter().map(ResourceJson::from).collect::<Vec<_>>());
            respond(listed.map_err(PlanError::from));
        }
    }
}

/// Attach an absence block to a resource.
pub fn cmd_absence(
    store: &Store,
    resource: ResourceId,
    kind: AnnotationKind,
    start: String,
    days: u32,
    comment: Option<String>,
) {
    let added = date_arg(&start, local_today()).map_err(PlanError::from).and_then(|start_date| {
        let annotation = Annotation { id: 0, kind, comment, start_date, duration_days: days.max(1) };
        store.write(|db| {
            db.add_annotation(resource, annotation)
                .ok_or(PlanError::from(ValidationError::UnknownResource { id: resource }))
        })
    });
    if let Ok(id) = &added {
        info!(resource, annotation = *id, "absence added");
    }
    respond(added.map(|id| CreatedJson { id }));
}

/// Generate shell completion scripts.
pub fn cmd_completions(shell: Shell) {
    use crate::cli::Cli;
    use clap::CommandFactory;

    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut std::io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_adds_ellipsis() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer name", 6), "a lon…");
    }

    #[test]
    fn date_args_accept_human_and_millis() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();
        assert_eq!(date_arg("tomorrow", today).unwrap(), NaiveDate::from_ymd_opt(2024, 3, 7).unwrap());
        assert_eq!(date_arg("1709510400000", today).unwrap(), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert!(matches!(date_arg("soon", today), Err(ValidationError::InvalidTimestamp { .. })));
    }

    #[test]
    fn malformed_payload_is_validation_error() {
        let err = parse_json::<Value>("{not json").unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert_eq!(read_payload("{\"1\":\"x\"}").unwrap(), "{\"1\":\"x\"}");
    }
}

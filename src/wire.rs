//! JSON shapes handed to callers.
//!
//! Dates leave the crate as milliseconds since the epoch and every task
//! carries its current content hash as `checksum`, which the caller sends
//! back with its next write.

use chrono::NaiveDate;
use serde::Serialize;

use crate::calendar::WorkDays;
use crate::epoch;
use crate::error::PlanError;
use crate::fields::{Completion, DisplayMode};
use crate::service::InitialView;
use crate::task::{Annotation, Resource, ResourceId, Task, TaskId};
use crate::tracker::{content_hash, ChangeSummary, ContentHash, Reconciliation};
use crate::tree::{ResourceView, TaskNode};

/// Response wrapper: `{"status":"ok","data":...}` or
/// `{"status":"error","kind":...,"message":...}`.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Envelope<T> {
    Ok { data: T },
    Error { kind: &'static str, message: String },
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Envelope::Ok { data }
    }

    pub fn error(err: &PlanError) -> Self {
        Envelope::Error {
            kind: err.kind(),
            message: err.public_message(),
        }
    }

    pub fn from_result(result: Result<T, PlanError>) -> Self {
        match result {
            Ok(data) => Envelope::ok(data),
            Err(e) => Envelope::error(&e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskJson {
    pub id: TaskId,
    pub resource: Option<ResourceId>,
    pub parent: Option<TaskId>,
    pub name: String,
    pub color: Option<String>,
    #[serde(with = "epoch::millis")]
    pub start_date: NaiveDate,
    #[serde(with = "epoch::millis")]
    pub end_date: NaiveDate,
    pub duration: WorkDays,
    pub complete: Completion,
    pub priority: u8,
    pub owner: Option<u64>,
    pub owner_shortname: Option<String>,
    pub job_reference: String,
    pub job_description: String,
    #[serde(with = "epoch::millis::option")]
    pub deadline: Option<NaiveDate>,
    pub deadline_description: Option<String>,
    pub active: bool,
    pub checksum: ContentHash,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TaskJson>,
}

impl TaskJson {
    /// A stored record as it is, without hierarchy.
    pub fn record(task: &Task) -> Self {
        TaskJson {
            id: task.id,
            resource: task.resource,
            parent: task.parent,
            name: task.name.clone(),
            color: task.color.clone(),
            start_date: task.start_date,
            end_date: task.end_date,
            duration: task.duration,
            complete: Completion::Percent(task.complete),
            priority: task.priority.code(),
            owner: task.owner,
            owner_shortname: task.owner_shortname.clone(),
            job_reference: task.job_reference.clone(),
            job_description: task.job_description.clone(),
            deadline: task.deadline,
            deadline_description: task.deadline_description.clone(),
            active: task.active,
            checksum: content_hash(task),
            children: Vec::new(),
        }
    }

    /// A tree node with its aggregate values and nested children.
    pub fn node(node: &TaskNode) -> Self {
        TaskJson {
            color: node.display_color().map(str::to_string),
            start_date: node.effective_start(),
            end_date: node.effective_end(),
            duration: node.effective_duration(),
            complete: node.completion(),
            children: node.children.iter().map(TaskJson::node).collect(),
            ..TaskJson::record(&node.task)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationJson {
    pub id: u64,
    pub kind: crate::fields::AnnotationKind,
    pub label: String,
    pub color: &'static str,
    #[serde(with = "epoch::millis")]
    pub start_date: NaiveDate,
    #[serde(with = "epoch::millis")]
    pub end_date: NaiveDate,
}

impl From<&Annotation> for AnnotationJson {
    fn from(a: &Annotation) -> Self {
        AnnotationJson {
            id: a.id,
            kind: a.kind,
            label: a.label(),
            color: a.kind.color(),
            start_date: a.start_date,
            end_date: a.end_date(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceJson {
    pub id: ResourceId,
    pub name: String,
    pub shortname: Option<String>,
    pub department: Option<String>,
    #[serde(with = "epoch::millis::option")]
    pub start_date: Option<NaiveDate>,
    #[serde(with = "epoch::millis::option")]
    pub end_date: Option<NaiveDate>,
    pub tasks: Vec<TaskJson>,
    pub absence: Vec<AnnotationJson>,
}

/// A bare resource, without tasks.
impl From<&Resource> for ResourceJson {
    fn from(resource: &Resource) -> Self {
        ResourceJson {
            id: resource.id,
            name: resource.name.clone(),
            shortname: resource.shortname.clone(),
            department: resource.department.clone(),
            start_date: None,
            end_date: None,
            tasks: Vec::new(),
            absence: resource.annotations.iter().map(AnnotationJson::from).collect(),
        }
    }
}

impl From<&ResourceView> for ResourceJson {
    fn from(view: &ResourceView) -> Self {
        let span = view.span();
        ResourceJson {
            start_date: span.map(|(s, _)| s),
            end_date: span.map(|(_, e)| e),
            tasks: view.tasks.roots().iter().map(TaskJson::node).collect(),
            ..ResourceJson::from(&view.resource)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InitialRecords {
    Resources(Vec<ResourceJson>),
    Projects(Vec<TaskJson>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialJson {
    pub display_mode: DisplayMode,
    pub records: InitialRecords,
}

impl From<&InitialView> for InitialJson {
    fn from(view: &InitialView) -> Self {
        let records = match view {
            InitialView::Resources(rows) => InitialRecords::Resources(rows.iter().map(ResourceJson::from).collect()),
            InitialView::Projects(tree) => InitialRecords::Projects(tree.roots().iter().map(TaskJson::node).collect()),
        };
        InitialJson { display_mode: view.display_mode(), records }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileJson {
    pub changed: Vec<TaskJson>,
    pub deleted: Vec<TaskId>,
    pub summary: ChangeSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&Reconciliation> for ReconcileJson {
    fn from(r: &Reconciliation) -> Self {
        ReconcileJson {
            changed: r.changed.iter().map(TaskJson::record).collect(),
            deleted: r.deleted.clone(),
            summary: r.summary,
            message: r.summary.message(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreatedJson {
    pub id: TaskId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedJson {
    pub deleted: Vec<TaskId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::compute_end_date;
    use crate::fields::{AnnotationKind, Priority, AGGREGATE_COLOR};
    use crate::tree::TaskTree;
    use serde_json::json;

    fn task(id: TaskId, parent: Option<TaskId>, start: NaiveDate, days: u32) -> Task {
        let duration = WorkDays::from_days(days).unwrap();
        Task {
            id,
            resource: Some(1),
            parent,
            name: format!("task {id}"),
            color: Some("#123456".into()),
            start_date: start,
            duration,
            end_date: compute_end_date(start, duration).unwrap(),
            complete: 25,
            priority: Priority::High,
            owner: None,
            owner_shortname: None,
            job_reference: "J-1".into(),
            job_description: String::new(),
            deadline: None,
            deadline_description: None,
            active: false,
            created_at_utc: 0,
            updated_at_utc: 0,
        }
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    #[test]
    fn record_uses_millis_and_checksum() {
        let t = task(3, None, monday(), 2);
        let v = serde_json::to_value(TaskJson::record(&t)).unwrap();
        assert_eq!(v["startDate"], 1_709_510_400_000i64);
        assert_eq!(v["endDate"], 1_709_596_800_000i64);
        assert_eq!(v["priority"], 2);
        assert_eq!(v["complete"], 25);
        assert_eq!(v["checksum"], content_hash(&t).as_str());
        assert_eq!(v["deadline"], serde_json::Value::Null);
        assert!(v.get("children").is_none());
    }

    #[test]
    fn composite_node_shows_aggregates() {
        let tree = TaskTree::build(vec![
            task(1, None, NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(), 1),
            task(2, Some(1), monday(), 3),
        ]);
        let v = serde_json::to_value(TaskJson::node(&tree.roots()[0])).unwrap();
        assert_eq!(v["complete"], "indeterminate");
        assert_eq!(v["color"], AGGREGATE_COLOR);
        assert_eq!(v["startDate"], 1_709_510_400_000i64);
        assert_eq!(v["duration"], 3.0);
        assert_eq!(v["children"][0]["id"], 2);
        assert_eq!(v["children"][0]["complete"], 25);
    }

    #[test]
    fn envelopes() {
        let ok = serde_json::to_value(Envelope::ok(CreatedJson { id: 9 })).unwrap();
        assert_eq!(ok, json!({"status": "ok", "data": {"id": 9}}));

        let err = Envelope::<CreatedJson>::from_result(Err(PlanError::NotFound { id: 4 }));
        let v = serde_json::to_value(err).unwrap();
        assert_eq!(v["status"], "error");
        assert_eq!(v["kind"], "not-found");
        assert_eq!(v["message"], "task 4 not found");
    }

    #[test]
    fn initial_resources_payload() {
        let resource = Resource {
            id: 1,
            name: "Ada".into(),
            shortname: Some("ada".into()),
            department: None,
            sort_order: 0,
            annotations: vec![Annotation {
                id: 1,
                kind: AnnotationKind::Sick,
                comment: None,
                start_date: monday(),
                duration_days: 2,
            }],
        };
        let view = InitialView::Resources(vec![ResourceView {
            resource,
            tasks: TaskTree::build(vec![task(1, None, monday(), 1)]),
        }]);
        let v = serde_json::to_value(InitialJson::from(&view)).unwrap();
        assert_eq!(v["displayMode"], "resources");
        let row = &v["records"][0];
        assert_eq!(row["tasks"][0]["id"], 1);
        assert_eq!(row["startDate"], 1_709_510_400_000i64);
        assert_eq!(row["absence"][0]["label"], "Sick");
        assert_eq!(row["absence"][0]["color"], AnnotationKind::Sick.color());
        assert_eq!(row["absence"][0]["endDate"], 1_709_596_800_000i64);
    }

    #[test]
    fn reconcile_payload_has_message_only_when_changed() {
        let quiet = serde_json::to_value(ReconcileJson::from(&Reconciliation::default())).unwrap();
        assert!(quiet.get("message").is_none());

        let r = Reconciliation {
            changed: vec![task(5, None, monday(), 1)],
            deleted: vec![6],
            summary: ChangeSummary { changed: 1, deleted: 1, unchanged: 0 },
        };
        let v = serde_json::to_value(ReconcileJson::from(&r)).unwrap();
        assert_eq!(v["message"], "2 objects changed.");
        assert_eq!(v["deleted"], json!([6]));
        assert_eq!(v["changed"][0]["id"], 5);
    }
}

//! Content hashes and change reconciliation.
//!
//! A content hash covers the fields that make up a task's visible content.
//! Callers send back the hash they last saw; a mismatch means somebody else
//! changed the record in the meantime. The same hashes let a client ask which
//! of its displayed records changed or disappeared without reloading all of
//! them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{PlanError, StorageError, ValidationError};
use crate::repository::TaskRepository;
use crate::task::{Task, TaskId};

const FIELD_SEPARATOR: u8 = 0x1F;

/// Hex-encoded SHA-256 over a task's tracked fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against a caller-supplied hash, ignoring case and whitespace.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }
}

impl From<String> for ContentHash {
    fn from(value: String) -> Self {
        ContentHash(value)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash of id, name, color, start date, duration, completion, priority, job
/// reference, job description, owner and owner shortname, in that order.
///
/// `active`, the deadline fields, the parent link, the derived end date and
/// timestamps are not part of it: editing them is not a content change.
pub fn content_hash(task: &Task) -> ContentHash {
    let fields = [
        task.id.to_string(),
        task.name.clone(),
        task.color.clone().unwrap_or_default(),
        task.start_date.format("%Y-%m-%d").to_string(),
        task.duration.to_string(),
        task.complete.to_string(),
        task.priority.code().to_string(),
        task.job_reference.clone(),
        task.job_description.clone(),
        task.owner.map(|o| o.to_string()).unwrap_or_default(),
        task.owner_shortname.clone().unwrap_or_default(),
    ];
    let mut hasher = Sha256::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            hasher.update([FIELD_SEPARATOR]);
        }
        hasher.update(field.as_bytes());
    }
    ContentHash(hex::encode(hasher.finalize()))
}

/// Reject the write unless `caller_hash` matches the current record.
pub fn verify(current: &Task, caller_hash: &str) -> Result<(), PlanError> {
    if content_hash(current).matches(caller_hash) {
        Ok(())
    } else {
        Err(PlanError::Conflict { id: current.id })
    }
}

/// The `{taskId: lastKnownHash}` snapshot of a client's display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub known: BTreeMap<TaskId, String>,
}

impl ReconcileRequest {
    /// Validate an untrusted payload. Only an object of id strings to hash
    /// strings is accepted; errors name the shape that was actually sent.
    pub fn from_json(payload: &Value) -> Result<Self, ValidationError> {
        let Value::Object(map) = payload else {
            return Err(ValidationError::NotAnObject { shape: json_shape(payload).to_string() });
        };
        let mut known = BTreeMap::new();
        for (key, value) in map {
            let id: TaskId = key
                .trim()
                .parse()
                .map_err(|_| ValidationError::InvalidTaskId { key: key.clone() })?;
            let Value::String(hash) = value else {
                return Err(ValidationError::InvalidHash { key: key.clone(), shape: json_shape(value).to_string() });
            };
            if known.insert(id, hash.clone()).is_some() {
                return Err(ValidationError::InvalidTaskId { key: key.clone() });
            }
        }
        Ok(ReconcileRequest { known })
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

fn json_shape(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Counts behind a reconciliation response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub changed: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl ChangeSummary {
    pub fn total_changes(&self) -> usize {
        self.changed + self.deleted
    }

    /// User-facing notice; `None` when the client is up to date.
    pub fn message(&self) -> Option<String> {
        match self.total_changes() {
            0 => None,
            1 => Some("One object changed.".to_string()),
            n => Some(format!("{n} objects changed.")),
        }
    }
}

/// Only the deltas relative to the client's snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    pub changed: Vec<Task>,
    pub deleted: Vec<TaskId>,
    pub summary: ChangeSummary,
}

/// Diff a client snapshot against the repository.
///
/// Missing ids are reported as deleted, ids with a different hash return the
/// full current record, matching ids are left out. Ids are visited in
/// ascending order.
pub fn reconcile<R>(repo: &R, request: &ReconcileRequest) -> Result<Reconciliation, StorageError>
where
    R: TaskRepository + ?Sized,
{
    let mut out = Reconciliation::default();
    for (&id, hash) in &request.known {
        match repo.task(id)? {
            None => out.deleted.push(id),
            Some(task) if !content_hash(&task).matches(hash) => out.changed.push(task),
            Some(_) => out.summary.unchanged += 1,
        }
    }
    out.summary.changed = out.changed.len();
    out.summary.deleted = out.deleted.len();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::WorkDays;
    use crate::db::Database;
    use crate::fields::Priority;
    use chrono::NaiveDate;
    use serde_json::json;

    fn task(id: TaskId) -> Task {
        let start = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        Task {
            id,
            resource: Some(1),
            parent: None,
            name: format!("Task {id}"),
            color: Some("#336699".into()),
            start_date: start,
            duration: WorkDays::from_days(2).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            complete: 10,
            priority: Priority::Normal,
            owner: Some(7),
            owner_shortname: Some("abc".into()),
            job_reference: "J-1".into(),
            job_description: "ACME | Site".into(),
            deadline: None,
            deadline_description: None,
            active: false,
            created_at_utc: 0,
            updated_at_utc: 0,
        }
    }

    #[test]
    fn hash_is_stable() {
        let t = task(1);
        assert_eq!(content_hash(&t), content_hash(&t.clone()));
        assert_eq!(content_hash(&t).as_str().len(), 64);
    }

    #[test]
    fn hash_ignores_untracked_fields() {
        let base = task(1);
        let h = content_hash(&base);

        let mut t = base.clone();
        t.active = true;
        t.deadline = NaiveDate::from_ymd_opt(2024, 4, 1);
        t.deadline_description = Some("launch".into());
        t.parent = Some(9);
        t.end_date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        t.updated_at_utc = 99;
        assert_eq!(content_hash(&t), h);
    }

    #[test]
    fn hash_tracks_every_content_field() {
        let base = task(1);
        let h = content_hash(&base);
        let edits: [fn(&mut Task); 11] = [
            |t| t.id = 2,
            |t| t.name.push('!'),
            |t| t.color = None,
            |t| t.start_date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            |t| t.duration = WorkDays::from_f64(2.25).unwrap(),
            |t| t.complete = 11,
            |t| t.priority = Priority::High,
            |t| t.job_reference = "J-2".into(),
            |t| t.job_description = "Other".into(),
            |t| t.owner = Some(8),
            |t| t.owner_shortname = None,
        ];
        for (i, edit) in edits.iter().enumerate() {
            let mut t = base.clone();
            edit(&mut t);
            assert_ne!(content_hash(&t), h, "edit #{i} was not detected");
        }
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let mut a = task(1);
        a.job_reference = "AB".into();
        a.job_description = "C".into();
        let mut b = task(1);
        b.job_reference = "A".into();
        b.job_description = "BC".into();
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn verify_reports_conflict() {
        let t = task(4);
        let good = content_hash(&t);
        assert!(verify(&t, good.as_str()).is_ok());
        assert!(verify(&t, &good.as_str().to_uppercase()).is_ok());
        assert!(matches!(verify(&t, "stale"), Err(PlanError::Conflict { id: 4 })));
    }

    #[test]
    fn request_requires_object_of_strings() {
        let err = ReconcileRequest::from_json(&json!(["1", "abc"])).unwrap_err();
        assert_eq!(err, ValidationError::NotAnObject { shape: "array".into() });
        assert!(err.to_string().contains("array"));

        let err = ReconcileRequest::from_json(&json!("1:abc")).unwrap_err();
        assert_eq!(err, ValidationError::NotAnObject { shape: "string".into() });

        let err = ReconcileRequest::from_json(&json!({"x": "abc"})).unwrap_err();
        assert_eq!(err, ValidationError::InvalidTaskId { key: "x".into() });

        let err = ReconcileRequest::from_json(&json!({"3": 17})).unwrap_err();
        assert_eq!(err, ValidationError::InvalidHash { key: "3".into(), shape: "number".into() });

        let err = ReconcileRequest::from_json(&json!({"1": "abc", " 01": "def"})).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidTaskId { .. }), "same id twice: {err:?}");

        let ok = ReconcileRequest::from_json(&json!({"3": "abc", "1": "def"})).unwrap();
        assert_eq!(ok.len(), 2);
        assert_eq!(ok.known.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn reconcile_reports_only_deltas() {
        let mut db = Database::default();
        for id in 1..=6 {
            db.tasks.push(task(id));
        }
        let mut request = ReconcileRequest::default();
        // Unchanged: 1, 2, 3.
        for id in 1..=3 {
            request.known.insert(id, content_hash(&task(id)).to_string());
        }
        // Changed: 4 and 5 were edited after the client loaded them.
        for id in 4..=5 {
            request.known.insert(id, content_hash(&task(id)).to_string());
            db.get_mut(id).unwrap().complete = 90;
        }
        // Deleted: 7 and 8 are gone.
        request.known.insert(7, "old".into());
        request.known.insert(8, "old".into());

        let result = reconcile(&db, &request).unwrap();
        assert_eq!(result.changed.iter().map(|t| t.id).collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(result.deleted, vec![7, 8]);
        assert_eq!(result.summary, ChangeSummary { changed: 2, deleted: 2, unchanged: 3 });
        assert_eq!(result.summary.message().as_deref(), Some("4 objects changed."));
    }

    #[test]
    fn summary_messages() {
        assert_eq!(ChangeSummary::default().message(), None);
        let one = ChangeSummary { changed: 0, deleted: 1, unchanged: 5 };
        assert_eq!(one.message().as_deref(), Some("One object changed."));
    }
}

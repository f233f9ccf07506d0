//! Task, resource and annotation records.
//!
//! This module defines the flat records kept by a repository. Hierarchy is
//! expressed through the `parent` id only; the owning tree is rebuilt per
//! request by [`crate::tree::TaskTree`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::{self, WorkDays};
use crate::epoch;
use crate::error::{PlanError, ValidationError};
use crate::fields::*;

pub type TaskId = u64;
pub type ResourceId = u64;

/// A planned work item as persisted.
///
/// Dates are stored as epoch seconds. `end_date` is derived from
/// `start_date` and `duration` and is kept only so that range queries do not
/// have to redo calendar math.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub resource: Option<ResourceId>,
    pub parent: Option<TaskId>,
    pub name: String,
    pub color: Option<String>,
    #[serde(with = "epoch::seconds")]
    pub start_date: NaiveDate,
    pub duration: WorkDays,
    #[serde(with = "epoch::seconds")]
    pub end_date: NaiveDate,
    pub complete: u8,
    #[serde(default)]
    pub priority: Priority,
    pub owner: Option<u64>,
    pub owner_shortname: Option<String>,
    #[serde(default)]
    pub job_reference: String,
    #[serde(default)]
    pub job_description: String,
    #[serde(default, with = "epoch::seconds::option")]
    pub deadline: Option<NaiveDate>,
    pub deadline_description: Option<String>,
    #[serde(default)]
    pub active: bool,
    pub created_at_utc: i64,
    pub updated_at_utc: i64,
}

impl Task {
    /// Recompute the stored end date after start or duration changed.
    pub fn refresh_end_date(&mut self) -> Result<(), PlanError> {
        self.end_date = calendar::compute_end_date(self.start_date, self.duration)?;
        Ok(())
    }
}

/// Caller-supplied attributes for a new task or a full-record save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAttributes {
    pub name: String,
    #[serde(default)]
    pub parent: Option<TaskId>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(with = "epoch::millis")]
    pub start_date: NaiveDate,
    pub duration: WorkDays,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub owner: Option<u64>,
    #[serde(default)]
    pub owner_shortname: Option<String>,
    #[serde(default)]
    pub job_reference: String,
    #[serde(default)]
    pub job_description: String,
    #[serde(default, with = "epoch::millis::option")]
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub deadline_description: Option<String>,
}

impl TaskAttributes {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        Ok(())
    }

    /// Build a fresh leaf record. Completion starts at zero and the task is
    /// not active.
    pub fn into_task(self, id: TaskId, resource: Option<ResourceId>, now_utc: i64) -> Result<Task, PlanError> {
        self.validate()?;
        let mut task = Task {
            id,
            resource,
            parent: self.parent,
            name: self.name.trim().to_string(),
            color: self.color,
            start_date: self.start_date,
            duration: self.duration,
            end_date: self.start_date,
            complete: 0,
            priority: self.priority,
            owner: self.owner,
            owner_shortname: self.owner_shortname,
            job_reference: self.job_reference,
            job_description: self.job_description,
            deadline: self.deadline,
            deadline_description: self.deadline_description,
            active: false,
            created_at_utc: now_utc,
            updated_at_utc: now_utc,
        };
        task.refresh_end_date()?;
        Ok(task)
    }

    /// Overwrite the editable attributes of an existing record.
    ///
    /// Identity, hierarchy, completion and the active flag are kept.
    pub fn apply_to(self, task: &mut Task) -> Result<(), PlanError> {
        self.validate()?;
        task.name = self.name.trim().to_string();
        task.color = self.color;
        task.start_date = self.start_date;
        task.duration = self.duration;
        task.priority = self.priority;
        task.owner = self.owner;
        task.owner_shortname = self.owner_shortname;
        task.job_reference = self.job_reference;
        task.job_description = self.job_description;
        task.deadline = self.deadline;
        task.deadline_description = self.deadline_description;
        task.refresh_end_date()
    }
}

/// A person that tasks are planned for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    pub shortname: Option<String>,
    pub department: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

/// A vacation, holiday or appointment block shown on a resource's row.
///
/// Annotations never join the task hierarchy and never affect aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: u64,
    pub kind: AnnotationKind,
    pub comment: Option<String>,
    #[serde(with = "epoch::seconds")]
    pub start_date: NaiveDate,
    pub duration_days: u32,
}

impl Annotation {
    /// Last calendar day covered. Annotations count calendar days, not workdays.
    pub fn end_date(&self) -> NaiveDate {
        let extra = u64::from(self.duration_days.saturating_sub(1));
        self.start_date
            .checked_add_days(chrono::Days::new(extra))
            .unwrap_or(self.start_date)
    }

    pub fn label(&self) -> String {
        self.comment
            .clone()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| self.kind.label().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(name: &str) -> TaskAttributes {
        TaskAttributes {
            name: name.into(),
            parent: None,
            color: None,
            start_date: NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(),
            duration: WorkDays::from_days(2).unwrap(),
            priority: Priority::High,
            owner: Some(3),
            owner_shortname: Some("jfu".into()),
            job_reference: "J-100".into(),
            job_description: "ACME | Relaunch".into(),
            deadline: None,
            deadline_description: None,
        }
    }

    #[test]
    fn new_task_gets_end_date_and_defaults() {
        let t = attrs("  Layout ").into_task(1, Some(10), 0).unwrap();
        assert_eq!(t.name, "Layout");
        assert_eq!(t.end_date, NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
        assert_eq!(t.complete, 0);
        assert!(!t.active);
    }

    #[test]
    fn empty_name_is_rejected() {
        let err = attrs("   ").into_task(1, None, 0).unwrap_err();
        assert!(matches!(err, PlanError::Validation(ValidationError::EmptyName)));
    }

    #[test]
    fn stored_dates_are_seconds() {
        let t = attrs("Layout").into_task(1, None, 0).unwrap();
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["start_date"], 1_709_856_000i64);
        assert_eq!(json["duration"], 2.0);
    }

    #[test]
    fn attributes_read_millis() {
        let json = serde_json::json!({
            "name": "Copy",
            "startDate": 1_709_856_000_000i64,
            "duration": 1.5,
            "deadline": 1_710_374_400_000i64,
        });
        let a: TaskAttributes = serde_json::from_value(json).unwrap();
        assert_eq!(a.start_date, NaiveDate::from_ymd_opt(2024, 3, 8).unwrap());
        assert_eq!(a.deadline, NaiveDate::from_ymd_opt(2024, 3, 14));
        assert_eq!(a.duration.quarters(), 6);
    }

    #[test]
    fn annotation_end_counts_calendar_days() {
        let a = Annotation {
            id: 1,
            kind: AnnotationKind::Vacation,
            comment: None,
            start_date: NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(),
            duration_days: 3,
        };
        assert_eq!(a.end_date(), NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
        assert_eq!(a.label(), "Vacation");
    }
}

//! Single-field mutations.
//!
//! Every field a caller may edit is one variant of [`FieldUpdate`], so the
//! set of valid mutations is closed and each is handled exhaustively.

use std::fmt;

use chrono::NaiveDate;

use crate::calendar::WorkDays;
use crate::epoch;
use crate::error::{PlanError, ValidationError};
use crate::fields::{parse_completion, parse_flag, Priority};
use crate::task::Task;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Name(String),
    Start(NaiveDate),
    Duration(WorkDays),
    Complete(u8),
    Priority(Priority),
    Color(Option<String>),
    Active(bool),
    Deadline(Option<NaiveDate>),
    DeadlineDescription(Option<String>),
}

impl FieldUpdate {
    /// Turn a wire field name and its raw value into a checked update.
    ///
    /// Dates arrive as milliseconds since the epoch. An empty value clears
    /// the optional fields (color, deadline, deadline description).
    pub fn parse(field: &str, value: &str) -> Result<Self, ValidationError> {
        let cleared = value.trim().is_empty();
        let update = match field {
            "name" => {
                if cleared {
                    return Err(ValidationError::EmptyName);
                }
                FieldUpdate::Name(value.trim().to_string())
            }
            "start" | "startDate" => FieldUpdate::Start(epoch::parse_millis(value)?),
            "duration" => FieldUpdate::Duration(value.parse()?),
            "complete" => FieldUpdate::Complete(parse_completion(value)?),
            "priority" => FieldUpdate::Priority(value.parse()?),
            "color" => FieldUpdate::Color((!cleared).then(|| value.trim().to_string())),
            "active" | "activate" => FieldUpdate::Active(parse_flag(value)?),
            "deadline" => FieldUpdate::Deadline(if cleared { None } else { Some(epoch::parse_millis(value)?) }),
            "deadlineDescription" => FieldUpdate::DeadlineDescription((!cleared).then(|| value.to_string())),
            other => return Err(ValidationError::UnknownField { field: other.to_string() }),
        };
        Ok(update)
    }

    pub fn field_name(&self) -> &'static str {
        match self {
            FieldUpdate::Name(_) => "name",
            FieldUpdate::Start(_) => "start",
            FieldUpdate::Duration(_) => "duration",
            FieldUpdate::Complete(_) => "complete",
            FieldUpdate::Priority(_) => "priority",
            FieldUpdate::Color(_) => "color",
            FieldUpdate::Active(_) => "active",
            FieldUpdate::Deadline(_) => "deadline",
            FieldUpdate::DeadlineDescription(_) => "deadlineDescription",
        }
    }

    /// Whether the stored end date has to be recomputed.
    pub fn affects_schedule(&self) -> bool {
        matches!(self, FieldUpdate::Start(_) | FieldUpdate::Duration(_))
    }

    /// Apply to a copy of the record. On error `task` may be partially
    /// modified, so callers apply to a clone and persist only on success.
    pub fn apply(&self, task: &mut Task) -> Result<(), PlanError> {
        match self {
            FieldUpdate::Name(name) => task.name = name.clone(),
            FieldUpdate::Start(date) => task.start_date = *date,
            FieldUpdate::Duration(d) => task.duration = *d,
            FieldUpdate::Complete(c) => task.complete = *c,
            FieldUpdate::Priority(p) => task.priority = *p,
            FieldUpdate::Color(c) => task.color = c.clone(),
            FieldUpdate::Active(a) => task.active = *a,
            FieldUpdate::Deadline(d) => task.deadline = *d,
            FieldUpdate::DeadlineDescription(d) => task.deadline_description = d.clone(),
        }
        if self.affects_schedule() {
            task.refresh_end_date()?;
        }
        Ok(())
    }
}

impl fmt::Display for FieldUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldUpdate::Name(v) => write!(f, "name={v:?}"),
            FieldUpdate::Start(v) => write!(f, "start={v}"),
            FieldUpdate::Duration(v) => write!(f, "duration={v}"),
            FieldUpdate::Complete(v) => write!(f, "complete={v}"),
            FieldUpdate::Priority(v) => write!(f, "priority={}", v.code()),
            FieldUpdate::Color(v) => write!(f, "color={}", v.as_deref().unwrap_or("-")),
            FieldUpdate::Active(v) => write!(f, "active={v}"),
            FieldUpdate::Deadline(v) => match v {
                Some(d) => write!(f, "deadline={d}"),
                None => f.write_str("deadline=-"),
            },
            FieldUpdate::DeadlineDescription(v) => write!(f, "deadlineDescription={:?}", v.as_deref().unwrap_or("")),
        }
    }
}

//! Enumerations and field types for planned tasks.
//!
//! This module defines the structured values carried by tasks and resources:
//! priorities, absence kinds, completion state and the display mode of an
//! initial fetch.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ValidationError;

/// Color every composite task is drawn in, whatever it has stored.
pub const AGGREGATE_COLOR: &str = "#000000";

/// Task priority, independent per task.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ValueEnum, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    /// Numeric code used by browsers and the content hash (0, 1, 2).
    pub fn code(self) -> u8 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Priority::Low),
            1 => Some(Priority::Normal),
            2 => Some(Priority::High),
            _ => None,
        }
    }
}

impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_lowercase();
        if let Some(p) = value.parse::<u8>().ok().and_then(Priority::from_code) {
            return Ok(p);
        }
        match value.as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            _ => Err(ValidationError::InvalidPriority { value: s.to_string() }),
        }
    }
}

/// Kinds of non-schedulable annotation blocks shown next to a resource.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AnnotationKind {
    Holiday,
    Vacation,
    VacationRequest,
    InternalAppointment,
    School,
    Absent,
    Sick,
    ExternalAppointment,
}

impl AnnotationKind {
    pub fn color(self) -> &'static str {
        match self {
            AnnotationKind::Holiday => "#FEF3C1",
            AnnotationKind::Vacation => "#00CC00",
            AnnotationKind::VacationRequest => "#ADDD89",
            AnnotationKind::InternalAppointment => "#00A1ED",
            AnnotationKind::School => "#7C6355",
            AnnotationKind::Absent => "#C0C0C0",
            AnnotationKind::Sick => "#606060",
            AnnotationKind::ExternalAppointment => "#FF004A",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AnnotationKind::Holiday => "Holiday",
            AnnotationKind::Vacation => "Vacation",
            AnnotationKind::VacationRequest => "Vacation request",
            AnnotationKind::InternalAppointment => "Internal appointment",
            AnnotationKind::School => "School",
            AnnotationKind::Absent => "Absent",
            AnnotationKind::Sick => "Sick",
            AnnotationKind::ExternalAppointment => "External appointment",
        }
    }
}

/// Completion as presented: a leaf percentage, or indeterminate for composites.
///
/// Composites deliberately carry no weighted roll-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Percent(u8),
    Indeterminate,
}

impl Serialize for Completion {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Completion::Percent(p) => s.serialize_u8(*p),
            Completion::Indeterminate => s.serialize_str("indeterminate"),
        }
    }
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Percent(p) => write!(f, "{p}%"),
            Completion::Indeterminate => f.write_str("-"),
        }
    }
}

/// Validate a completion percentage given as text.
pub fn parse_completion(value: &str) -> Result<u8, ValidationError> {
    let out_of_range = || ValidationError::CompletionOutOfRange { value: value.to_string() };
    let n: i64 = value.trim().parse().map_err(|_| out_of_range())?;
    u8::try_from(n).ok().filter(|p| *p <= 100).ok_or_else(out_of_range)
}

/// Parse a `true`/`false` flag as sent by browsers (`1`/`0` accepted).
pub fn parse_flag(value: &str) -> Result<bool, ValidationError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ValidationError::InvalidFlag { value: value.to_string() }),
    }
}

/// Shape of the tree returned by an initial fetch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayMode {
    /// Top level rows are resources (people) with their tasks beneath.
    Resources,
    /// Top level rows are root tasks; the store has no resources.
    Projects,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_codes_and_names() {
        assert_eq!("2".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!("Low".parse::<Priority>().unwrap(), Priority::Low);
        assert!("3".parse::<Priority>().is_err());
        assert!("urgent".parse::<Priority>().is_err());
        assert_eq!(Priority::default().code(), 1);
    }

    #[test]
    fn completion_bounds() {
        assert_eq!(parse_completion("0").unwrap(), 0);
        assert_eq!(parse_completion(" 100 ").unwrap(), 100);
        assert!(parse_completion("101").is_err());
        assert!(parse_completion("-1").is_err());
        assert!(parse_completion("50.5").is_err());
    }

    #[test]
    fn completion_serializes_sentinel() {
        assert_eq!(serde_json::to_string(&Completion::Percent(40)).unwrap(), "40");
        assert_eq!(serde_json::to_string(&Completion::Indeterminate).unwrap(), "\"indeterminate\"");
    }

    #[test]
    fn flags() {
        assert!(parse_flag("TRUE").unwrap());
        assert!(!parse_flag("0").unwrap());
        assert!(parse_flag("maybe").is_err());
    }
}

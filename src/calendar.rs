//! Workday calendar math.
//!
//! Converts between a start date, a duration in working days and an end date.
//! Saturday and Sunday are never worked. Durations are carried as quarter
//! days; only whole days take part in weekend placement, the fractional part
//! is for display.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{CalendarError, ValidationError};

const QUARTERS_PER_DAY: u32 = 4;

/// A positive duration in working days, quantized to quarter days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct WorkDays(u32);

impl WorkDays {
    /// Whole-day duration; zero is rejected.
    pub fn from_days(days: u32) -> Result<Self, ValidationError> {
        if days == 0 {
            return Err(ValidationError::NonPositiveDuration { value: "0".into() });
        }
        days.checked_mul(QUARTERS_PER_DAY)
            .map(WorkDays)
            .ok_or_else(|| ValidationError::NotQuarterDay { value: days.to_string() })
    }

    /// Whole-day duration clamped to at least one day.
    pub fn saturating_days(days: u32) -> Self {
        WorkDays(days.max(1).saturating_mul(QUARTERS_PER_DAY))
    }

    pub fn from_f64(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NonNumericDuration { value: value.to_string() });
        }
        if value <= 0.0 {
            return Err(ValidationError::NonPositiveDuration { value: value.to_string() });
        }
        let quarters = value * QUARTERS_PER_DAY as f64;
        if (quarters - quarters.round()).abs() > 1e-9 || quarters.round() > u32::MAX as f64 {
            return Err(ValidationError::NotQuarterDay { value: value.to_string() });
        }
        if quarters.round() < 1.0 {
            return Err(ValidationError::NonPositiveDuration { value: value.to_string() });
        }
        Ok(WorkDays(quarters.round() as u32))
    }

    pub fn quarters(self) -> u32 {
        self.0
    }

    /// Duration rounded up to whole days, as used for end-date placement.
    pub fn whole_days(self) -> i64 {
        i64::from(self.0.div_ceil(QUARTERS_PER_DAY))
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / QUARTERS_PER_DAY as f64
    }
}

impl TryFrom<f64> for WorkDays {
    type Error = ValidationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        WorkDays::from_f64(value)
    }
}

impl From<WorkDays> for f64 {
    fn from(value: WorkDays) -> Self {
        value.as_f64()
    }
}

impl FromStr for WorkDays {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let value: f64 = trimmed
            .parse()
            .map_err(|_| ValidationError::NonNumericDuration { value: trimmed.to_string() })?;
        WorkDays::from_f64(value)
    }
}

impl fmt::Display for WorkDays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // f64 Display already prints 3.0 as "3" and 2.25 as "2.25".
        write!(f, "{}", self.as_f64())
    }
}

/// Weekday number with Sunday = 0 through Saturday = 6.
pub fn weekday_number(date: NaiveDate) -> i64 {
    i64::from(date.weekday().num_days_from_sunday())
}

pub fn is_workday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// The date itself if it is a workday, otherwise the following Monday.
pub fn next_workday(date: NaiveDate) -> NaiveDate {
    let skip = match date.weekday() {
        Weekday::Sat => 2,
        Weekday::Sun => 1,
        _ => 0,
    };
    date.checked_add_days(Days::new(skip)).unwrap_or(date)
}

/// End date of a task that starts on `start` and covers `days` workdays.
///
/// A weekend start is rolled forward to Monday first. The span crosses
/// `(days + weekday(start) - 2) / 5` weekends: for up to five days that is one
/// weekend exactly when `days + weekday(start) - 1 > 5`, for longer spans it
/// is `(days - 1) / 5` full weeks plus one when the remaining days run past
/// Friday. The result is always a workday.
pub fn end_date_for_days(start: NaiveDate, days: i64) -> Result<NaiveDate, CalendarError> {
    if days <= 0 {
        return Err(CalendarError::NonPositiveDuration { days });
    }
    let start = next_workday(start);
    let weekends = (days + weekday_number(start) - 2) / 5;
    let offset = (days - 1) + 2 * weekends;
    u64::try_from(offset)
        .ok()
        .and_then(|offset| start.checked_add_days(Days::new(offset)))
        .ok_or(CalendarError::OutOfRange { start, days })
}

/// End date for a fractional duration; the duration is rounded up to whole days.
pub fn compute_end_date(start: NaiveDate, duration: WorkDays) -> Result<NaiveDate, CalendarError> {
    end_date_for_days(start, duration.whole_days())
}

/// Count of Monday..Friday dates in `start..=end`. Zero when `end < start`.
pub fn compute_duration_workdays(start: NaiveDate, end: NaiveDate) -> u32 {
    if end < start {
        return 0;
    }
    let total = (end - start).num_days() + 1;
    let full_weeks = total / 7;
    let tail_start = start + chrono::Duration::days(full_weeks * 7);
    let tail = tail_start
        .iter_days()
        .take((total % 7) as usize)
        .filter(|d| is_workday(*d))
        .count() as i64;
    u32::try_from(full_weeks * 5 + tail).unwrap_or(u32::MAX)
}

/// Inclusive number of calendar days from `start` to `end`, weekends included.
pub fn calendar_span_days(start: NaiveDate, end: NaiveDate) -> i64 {
    if end < start {
        0
    } else {
        (end - start).num_days() + 1
    }
}

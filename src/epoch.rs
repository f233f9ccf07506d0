//! Date/epoch conversions at the storage and presentation boundaries.
//!
//! The store keeps dates as seconds since the epoch (UTC midnight); the wire
//! format for browsers uses milliseconds. Every conversion between the two
//! goes through this module so the factor of 1000 is applied in one place.

use chrono::{DateTime, NaiveDate};

use crate::error::ValidationError;

const MILLIS_PER_SECOND: i64 = 1000;

pub fn date_to_secs(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

/// Date containing the given instant, in UTC.
pub fn secs_to_date(secs: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(secs, 0).map(|dt| dt.date_naive())
}

pub fn date_to_millis(date: NaiveDate) -> i64 {
    date_to_secs(date) * MILLIS_PER_SECOND
}

pub fn millis_to_date(millis: i64) -> Option<NaiveDate> {
    secs_to_date(millis.div_euclid(MILLIS_PER_SECOND))
}

/// Parse a presentation-side millisecond timestamp, as sent by a browser.
///
/// Accepts integral or floating-point text (`Date.getTime()` may be
/// serialized either way).
pub fn parse_millis(value: &str) -> Result<NaiveDate, ValidationError> {
    let trimmed = value.trim();
    let invalid = || ValidationError::InvalidTimestamp { value: trimmed.to_string() };
    let millis = match trimmed.parse::<i64>() {
        Ok(ms) => ms,
        Err(_) => {
            let f: f64 = trimmed.parse().map_err(|_| invalid())?;
            if !f.is_finite() || f.abs() > i64::MAX as f64 {
                return Err(invalid());
            }
            f.floor() as i64
        }
    };
    millis_to_date(millis).ok_or_else(invalid)
}

macro_rules! epoch_serde {
    ($name:ident, $to:path, $from:path, $unit:literal) => {
        #[doc = concat!("Serde adapter storing a `NaiveDate` as ", $unit, " since the epoch.")]
        pub mod $name {
            use chrono::NaiveDate;
            use serde::{de::Error, Deserialize, Deserializer, Serializer};

            pub fn serialize<S: Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_i64($to(*date))
            }

            pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
                let raw = i64::deserialize(d)?;
                $from(raw).ok_or_else(|| D::Error::custom(format!("timestamp out of range: {raw}")))
            }

            pub mod option {
                use chrono::NaiveDate;
                use serde::{de::Error, Deserialize, Deserializer, Serializer};

                pub fn serialize<S: Serializer>(date: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
                    match date {
                        Some(d) => s.serialize_some(&$to(*d)),
                        None => s.serialize_none(),
                    }
                }

                pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
                    match Option::<i64>::deserialize(d)? {
                        None => Ok(None),
                        Some(raw) => $from(raw)
                            .map(Some)
                            .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {raw}"))),
                    }
                }
            }
        }
    };
}

epoch_serde!(seconds, crate::epoch::date_to_secs, crate::epoch::secs_to_date, "seconds");
epoch_serde!(millis, crate::epoch::date_to_millis, crate::epoch::millis_to_date, "milliseconds");

//! Recurrence rules for scout runs.
//!
//! Stored as tagged JSON, e.g. `{"type":"daily","hour":8}`,
//! `{"type":"times_per_day","count":4}`, `{"type":"every_n_days","days":3,"hour":9}`.
//! Shape is enforced by the enum; numeric bounds are checked at every parse boundary.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoutError};

/// Timezone used when a publication has none or an unknown one.
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// When a publication's discovery job recurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScoutSchedule {
    /// Once per local calendar day at `hour` (0-23).
    Daily { hour: u8 },
    /// `count` (2-6) evenly spaced runs per local day, starting at midnight.
    TimesPerDay { count: u8 },
    /// Every `days` (2-7) local calendar days at `hour` (0-23).
    EveryNDays { days: u8, hour: u8 },
}

impl Default for ScoutSchedule {
    fn default() -> Self {
        ScoutSchedule::Daily { hour: 8 }
    }
}

impl ScoutSchedule {
    /// Check numeric bounds.
    pub fn validate(&self) -> Result<()> {
        match *self {
            ScoutSchedule::Daily { hour } => check_hour(hour),
            ScoutSchedule::TimesPerDay { count } => {
                if (2..=6).contains(&count) {
                    Ok(())
                } else {
                    Err(ScoutError::InvalidSchedule(format!(
                        "times_per_day count must be 2-6, got {count}"
                    )))
                }
            }
            ScoutSchedule::EveryNDays { days, hour } => {
                if !(2..=7).contains(&days) {
                    return Err(ScoutError::InvalidSchedule(format!(
                        "every_n_days days must be 2-7, got {days}"
                    )));
                }
                check_hour(hour)
            }
        }
    }

    /// Strict parse: malformed JSON or out-of-range values are errors.
    pub fn from_json(raw: &str) -> Result<Self> {
        let schedule: ScoutSchedule = serde_json::from_str(raw)
            .map_err(|e| ScoutError::InvalidSchedule(format!("{e}: {raw}")))?;
        schedule.validate()?;
        Ok(schedule)
    }

    /// Serialize to the stored JSON form.
    pub fn to_json(&self) -> String {
        // Enum of plain integers always serializes.
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"daily","hour":8}"#.into())
    }

    /// Local slot hours for a given day (empty for `EveryNDays`, which is day-gated).
    pub fn slot_hours(&self) -> Vec<u32> {
        match *self {
            ScoutSchedule::Daily { hour } => vec![hour as u32],
            ScoutSchedule::TimesPerDay { count } => slot_hours(count),
            ScoutSchedule::EveryNDays { hour, .. } => vec![hour as u32],
        }
    }
}

fn check_hour(hour: u8) -> Result<()> {
    if hour <= 23 {
        Ok(())
    } else {
        Err(ScoutError::InvalidSchedule(format!(
            "hour must be 0-23, got {hour}"
        )))
    }
}

/// Evenly spaced local hours for a "times per day" schedule.
/// count=3 → [0, 8, 16], count=4 → [0, 6, 12, 18], count=5 → [0, 4, 8, 12, 16].
pub fn slot_hours(count: u8) -> Vec<u32> {
    let count = count.max(1) as u32;
    let interval = 24 / count;
    (0..count).map(|i| i * interval).collect()
}

/// Lenient parse of a stored schedule. Anything unusable becomes the default.
pub fn parse_schedule(raw: Option<&str>) -> ScoutSchedule {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return ScoutSchedule::default();
    };
    match ScoutSchedule::from_json(raw) {
        Ok(schedule) => schedule,
        Err(e) => {
            tracing::warn!("[schedule] falling back to default schedule: {e}");
            ScoutSchedule::default()
        }
    }
}

/// Strict IANA timezone check.
pub fn validate_timezone(raw: &str) -> Result<Tz> {
    raw.parse::<Tz>()
        .map_err(|_| ScoutError::InvalidTimezone(raw.to_string()))
}

/// Lenient timezone parse. Missing or unknown names become UTC.
pub fn parse_timezone(raw: Option<&str>) -> Tz {
    match raw.filter(|r| !r.trim().is_empty()) {
        Some(name) => validate_timezone(name).unwrap_or_else(|e| {
            tracing::warn!("[schedule] {e}, using {DEFAULT_TIMEZONE}");
            Tz::UTC
        }),
        None => Tz::UTC,
    }
}

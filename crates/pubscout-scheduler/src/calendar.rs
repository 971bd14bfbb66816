//! Next-run computation for scout schedules.
//!
//! Pure and deterministic: (schedule, timezone, reference instant) → next UTC
//! instant strictly after the reference. All date arithmetic happens on local
//! calendar days; a local (date, hour) is converted back to UTC using the offset
//! in force at that local time, never the reference's offset.
//!
//! DST handling:
//! - target hour missing (spring-forward gap) → the next existing hour
//! - target hour repeated (fall-back) → the first occurrence

use chrono::{DateTime, Days, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use pubscout_core::schedule::{ScoutSchedule, parse_schedule, parse_timezone, slot_hours};

const SECS_PER_HOUR: i64 = 3_600;
const SECS_PER_DAY: i64 = 86_400;

/// `EveryNDays` cadence anchor instant, 2024-01-01T12:00:00Z. The anchor day is
/// its local date in the publication's timezone (2024-01-02 from UTC+12 east).
pub const CADENCE_ANCHOR_EPOCH: i64 = 1_704_110_400;

/// Longest run of non-existent local hours we step over.
const MAX_GAP_STEPS: u32 = 24;

/// Next run after `after` (UTC epoch seconds). Out-of-range schedules use the default.
pub fn compute_next_run(schedule: &ScoutSchedule, tz: Tz, after: i64) -> i64 {
    let schedule = if schedule.validate().is_ok() {
        *schedule
    } else {
        ScoutSchedule::default()
    };

    let Some(reference) = DateTime::<Utc>::from_timestamp(after, 0) else {
        return after.saturating_add(SECS_PER_DAY);
    };
    let now = reference.with_timezone(&tz);
    let today = now.date_naive();
    let hour = now.hour();

    let next = match schedule {
        ScoutSchedule::Daily { hour: target } => {
            let target = target as u32;
            if hour < target {
                local_to_utc(tz, today, target)
            } else {
                local_to_utc(tz, add_days(today, 1), target)
            }
        }
        ScoutSchedule::TimesPerDay { count } => {
            let slots = slot_hours(count);
            match slots.iter().copied().find(|&slot| slot > hour) {
                Some(slot) => local_to_utc(tz, today, slot),
                None => {
                    let first = slots.first().copied().unwrap_or(0);
                    local_to_utc(tz, add_days(today, 1), first)
                }
            }
        }
        ScoutSchedule::EveryNDays { days, hour: target } => {
            let days = days as i64;
            let target = target as u32;
            let since_anchor = (today - cadence_anchor(tz)).num_days();
            let remainder = since_anchor.rem_euclid(days);

            if remainder == 0 && hour < target {
                local_to_utc(tz, today, target)
            } else {
                let until_next = if remainder == 0 { days } else { days - remainder };
                local_to_utc(tz, add_days(today, until_next as u64), target)
            }
        }
    };

    // Only reachable at the edges of chrono's date range.
    if next > after {
        next
    } else {
        after.saturating_add(SECS_PER_HOUR)
    }
}

/// Lenient variant for stored rows: corrupt schedule or unknown timezone fall back to defaults.
pub fn next_run_for_row(schedule: Option<&str>, timezone: Option<&str>, after: i64) -> i64 {
    compute_next_run(&parse_schedule(schedule), parse_timezone(timezone), after)
}

/// The next `count` runs, each computed from the previous one.
pub fn upcoming_runs(schedule: &ScoutSchedule, tz: Tz, after: i64, count: usize) -> Vec<i64> {
    let mut runs = Vec::with_capacity(count);
    let mut reference = after;
    for _ in 0..count {
        reference = compute_next_run(schedule, tz, reference);
        runs.push(reference);
    }
    runs
}

/// Local calendar date of the cadence anchor in `tz`.
pub fn cadence_anchor(tz: Tz) -> NaiveDate {
    DateTime::<Utc>::from_timestamp(CADENCE_ANCHOR_EPOCH, 0)
        .map(|dt| dt.with_timezone(&tz).date_naive())
        .unwrap_or_default()
}

fn add_days(date: NaiveDate, n: u64) -> NaiveDate {
    date.checked_add_days(Days::new(n)).unwrap_or(date)
}

/// Convert a local wall-clock (date, hour) to UTC epoch seconds.
fn local_to_utc(tz: Tz, date: NaiveDate, hour: u32) -> i64 {
    let mut local = NaiveDateTime::new(date, NaiveTime::MIN) + Duration::hours(hour as i64);
    for _ in 0..MAX_GAP_STEPS {
        match tz.from_local_datetime(&local) {
            LocalResult::Single(dt) => return dt.timestamp(),
            LocalResult::Ambiguous(earliest, _) => return earliest.timestamp(),
            LocalResult::None => local += Duration::hours(1),
        }
    }
    local.and_utc().timestamp()
}

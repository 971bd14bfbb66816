//! Weekly auto-write quota.

use chrono::{DateTime, Datelike, Days, LocalResult, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use pubscout_core::error::Result;
use pubscout_core::schedule::parse_timezone;
use pubscout_core::traits::SessionLedger;
use pubscout_core::types::Publication;

/// Monday 00:00 local time of the week containing `now`, as UTC epoch seconds.
pub fn week_start(now: i64, tz: Tz) -> i64 {
    let Some(reference) = DateTime::<Utc>::from_timestamp(now, 0) else {
        return now;
    };
    let local = reference.with_timezone(&tz);
    let back = local.weekday().num_days_from_monday() as u64;
    let Some(monday) = local.date_naive().checked_sub_days(Days::new(back)) else {
        return now;
    };

    // Midnight can fall in a DST gap in a few zones; take the first valid hour.
    let mut midnight = monday.and_time(NaiveTime::MIN);
    for _ in 0..24 {
        match tz.from_local_datetime(&midnight) {
            LocalResult::Single(dt) => return dt.timestamp(),
            LocalResult::Ambiguous(earliest, _) => return earliest.timestamp(),
            LocalResult::None => midnight += chrono::Duration::hours(1),
        }
    }
    midnight.and_utc().timestamp()
}

/// Whether the publication still has auto-write quota this week.
pub async fn has_weekly_capacity(
    ledger: &dyn SessionLedger,
    publication: &Publication,
    now: i64,
) -> Result<bool> {
    let since = week_start(now, parse_timezone(Some(&publication.timezone)));
    let completed = ledger
        .count_completed_sessions_since(&publication.id, since)
        .await?;
    let limit = publication.cadence_posts_per_week.max(1);

    tracing::debug!(
        "[auto-write] {}: {completed}/{limit} sessions completed this week",
        publication.id
    );
    Ok(completed < limit)
}

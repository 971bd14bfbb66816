//! Due-publication scan and dispatch.
//!
//! Per tick: backfill publications with no `next_scout_at`, then for every due
//! publication advance `next_scout_at` and only then enqueue a dispatch
//! message. Each publication's advance/enqueue pair completes before the next
//! publication is touched. A crash between the two loses one run for that
//! publication; it never produces a second enqueue for the same window.

use chrono_tz::Tz;

use pubscout_core::error::{Result, ScoutError};
use pubscout_core::schedule::{ScoutSchedule, validate_timezone};
use pubscout_core::traits::{DispatchQueue, PublicationStore};
use pubscout_core::types::DispatchMessage;

use crate::calendar::{compute_next_run, next_run_for_row};
use crate::retry::{RetryPolicy, run_with_retry};

/// Manual "run all" sends in chunks of this size.
pub const ENQUEUE_CHUNK: usize = 100;

/// Outcome of one scheduler tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub backfilled: usize,
    pub due: usize,
    pub enqueued: usize,
    /// Advance failed; left due for the next tick.
    pub not_advanced: usize,
    /// Advanced but the enqueue failed; this run is skipped.
    pub missed: usize,
}

/// Give every unscheduled publication an initial `next_scout_at`.
pub async fn backfill_unscheduled(
    store: &dyn PublicationStore,
    now: i64,
    policy: &RetryPolicy,
) -> Result<usize> {
    let rows = run_with_retry("list unscheduled", policy, || store.list_unscheduled()).await?;
    let mut written = 0;
    for row in rows {
        let next = next_run_for_row(row.scout_schedule.as_deref(), row.timezone.as_deref(), now);
        match run_with_retry("backfill", policy, || store.set_next_scout_at(&row.id, next)).await {
            Ok(()) => {
                tracing::debug!("[backfill] {} → next_scout_at={next}", row.id);
                written += 1;
            }
            Err(e) => tracing::error!("[backfill] {} failed: {e}", row.id),
        }
    }
    if written > 0 {
        tracing::info!("[backfill] initialized next_scout_at for {written} publication(s)");
    }
    Ok(written)
}

/// Advance and enqueue every publication due at `now`.
pub async fn enqueue_due(
    store: &dyn PublicationStore,
    queue: &dyn DispatchQueue,
    now: i64,
    policy: &RetryPolicy,
) -> Result<TickReport> {
    let rows = run_with_retry("list due", policy, || store.list_due(now)).await?;
    let mut report = TickReport {
        due: rows.len(),
        ..TickReport::default()
    };

    for row in rows {
        let next = next_run_for_row(row.scout_schedule.as_deref(), row.timezone.as_deref(), now);

        if let Err(e) = run_with_retry("advance", policy, || store.set_next_scout_at(&row.id, next)).await {
            tracing::error!("[enqueue] {} not advanced, will retry next tick: {e}", row.id);
            report.not_advanced += 1;
            continue;
        }

        let message = DispatchMessage::cron(row.id.as_str());
        match run_with_retry("enqueue", policy, || queue.send(message.clone())).await {
            Ok(()) => {
                tracing::debug!("[enqueue] {} dispatched, next_scout_at={next}", row.id);
                report.enqueued += 1;
            }
            Err(e) => {
                tracing::error!(
                    "[enqueue] {} advanced to {next} but enqueue failed, run skipped: {e}",
                    row.id
                );
                report.missed += 1;
            }
        }
    }
    Ok(report)
}

/// One full scheduler tick: backfill, then scan and dispatch.
pub async fn run_tick(
    store: &dyn PublicationStore,
    queue: &dyn DispatchQueue,
    now: i64,
    policy: &RetryPolicy,
) -> Result<TickReport> {
    let backfilled = match backfill_unscheduled(store, now, policy).await {
        Ok(n) => n,
        Err(e) => {
            tracing::error!("[backfill] skipped this tick: {e}");
            0
        }
    };

    let mut report = enqueue_due(store, queue, now, policy).await?;
    report.backfilled = backfilled;
    tracing::info!(
        "[enqueue] tick: {} due, {} enqueued, {} not advanced, {} missed, {} backfilled",
        report.due,
        report.enqueued,
        report.not_advanced,
        report.missed,
        report.backfilled
    );
    Ok(report)
}

/// Dispatch one publication now without touching its schedule.
pub async fn enqueue_publication(
    store: &dyn PublicationStore,
    queue: &dyn DispatchQueue,
    publication_id: &str,
    policy: &RetryPolicy,
) -> Result<()> {
    let exists = run_with_retry("get publication", policy, || store.get_publication(publication_id))
        .await?
        .is_some();
    if !exists {
        return Err(ScoutError::PublicationNotFound(publication_id.to_string()));
    }
    run_with_retry("enqueue", policy, || queue.send(DispatchMessage::manual(publication_id))).await?;
    tracing::info!("[enqueue] {publication_id} dispatched manually");
    Ok(())
}

/// Dispatch every publication now. Returns the number of messages sent.
pub async fn enqueue_all(
    store: &dyn PublicationStore,
    queue: &dyn DispatchQueue,
    policy: &RetryPolicy,
) -> Result<usize> {
    let ids = run_with_retry("list publications", policy, || store.list_publication_ids()).await?;
    for chunk in ids.chunks(ENQUEUE_CHUNK) {
        let batch: Vec<DispatchMessage> = chunk.iter().map(|id| DispatchMessage::manual(id.as_str())).collect();
        run_with_retry("enqueue batch", policy, || queue.send_batch(batch.clone())).await?;
    }
    tracing::info!("[enqueue] {} publication(s) dispatched manually", ids.len());
    Ok(ids.len())
}

/// Replace a publication's schedule and timezone, recomputing `next_scout_at` from `now`.
pub async fn reschedule(
    store: &dyn PublicationStore,
    publication_id: &str,
    schedule: &ScoutSchedule,
    timezone: &str,
    now: i64,
) -> Result<i64> {
    schedule.validate()?;
    let tz: Tz = validate_timezone(timezone)?;
    let next = compute_next_run(schedule, tz, now);
    if !store.update_schedule(publication_id, schedule, timezone, next).await? {
        return Err(ScoutError::PublicationNotFound(publication_id.to_string()));
    }
    tracing::info!("[schedule] {publication_id} rescheduled, next_scout_at={next}");
    Ok(next)
}

//! Background loops: the periodic scheduler tick and the queue consumer.
//! Both sleep between iterations on a `tokio::time::interval`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;

use pubscout_core::traits::{DispatchQueue, PublicationStore};

use crate::consumer::DispatchConsumer;
use crate::queue::MemoryQueue;
use crate::retry::RetryPolicy;
use crate::scanner::run_tick;

/// Run the scheduler tick forever. The first tick fires immediately.
pub async fn spawn_scheduler(
    store: Arc<dyn PublicationStore>,
    queue: Arc<dyn DispatchQueue>,
    tick_interval_secs: u64,
    policy: RetryPolicy,
) {
    tracing::info!("[cron] scheduler started (tick every {tick_interval_secs}s)");

    let mut interval = tokio::time::interval(Duration::from_secs(tick_interval_secs.max(1)));
    // Overlapping ticks can double-enqueue; never burst to catch up.
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let now = Utc::now().timestamp();
        if let Err(e) = run_tick(store.as_ref(), queue.as_ref(), now, &policy).await {
            tracing::error!("[cron] tick failed: {e}");
        }
    }
}

/// Poll the in-process queue forever, handing each batch to the consumer.
pub async fn spawn_consumer(
    queue: MemoryQueue,
    consumer: DispatchConsumer,
    batch_size: usize,
    poll_interval: Duration,
) {
    tracing::info!(
        "[queue] consumer started (batch {batch_size}, poll every {}ms)",
        poll_interval.as_millis()
    );

    let mut interval = tokio::time::interval(poll_interval.max(Duration::from_millis(10)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let batch = queue.receive(batch_size.max(1));
        if batch.is_empty() {
            continue;
        }
        let report = consumer.process_batch(&batch).await;
        tracing::debug!(
            "[queue] batch of {}: {} started, {} retried",
            batch.len(),
            report.started,
            report.retried
        );
    }
}

//! Queue consumer: one workflow execution per dispatch message.
//!
//! Start failures are handed back to the queue with `retry()`; backoff is the
//! queue's business. What happens inside a started workflow is not retried here.

use std::sync::Arc;

use pubscout_core::traits::{Delivery, WorkflowEngine};

/// Outcome of one processed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub started: usize,
    pub retried: usize,
}

pub struct DispatchConsumer {
    engine: Arc<dyn WorkflowEngine>,
}

impl DispatchConsumer {
    pub fn new(engine: Arc<dyn WorkflowEngine>) -> Self {
        Self { engine }
    }

    /// Fresh per attempt, so a redelivered message never collides with a stale run.
    pub fn run_id(publication_id: &str) -> String {
        format!("scout-{publication_id}-{}", uuid::Uuid::new_v4())
    }

    pub async fn process_batch<D: Delivery>(&self, batch: &[D]) -> BatchReport {
        let mut report = BatchReport::default();
        for delivery in batch {
            let message = delivery.body();
            let run_id = Self::run_id(&message.publication_id);
            match self.engine.create(&run_id, message.clone()).await {
                Ok(()) => {
                    tracing::info!(
                        "[queue] started {run_id} ({}, attempt {})",
                        message.triggered_by,
                        delivery.attempts()
                    );
                    delivery.ack();
                    report.started += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        "[queue] failed to start workflow for {} (attempt {}): {e}",
                        message.publication_id,
                        delivery.attempts()
                    );
                    delivery.retry();
                    report.retried += 1;
                }
            }
        }
        report
    }
}

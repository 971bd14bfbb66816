//! In-process at-least-once queue for single-node deployments and tests.
//!
//! FIFO with per-message visibility delays. A received message is in flight
//! until its `Delivery` is acked, retried or dropped; retried and dropped
//! messages come back after `retry_delay * 2^(attempts-1)`, and a message that
//! exceeds `max_retries` is moved to the dead-letter list. That list is
//! bounded; past its capacity the oldest dead letter is discarded.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use pubscout_core::config::QueueConfig;
use pubscout_core::error::Result;
use pubscout_core::traits::{Delivery, DispatchQueue};
use pubscout_core::types::DispatchMessage;

/// Dead letters retained by default.
pub const DEAD_LETTER_CAPACITY: usize = 1000;

struct Envelope {
    body: DispatchMessage,
    attempts: u32,
    visible_at: Instant,
}

/// A message that ran out of retries.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub body: DispatchMessage,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub in_flight: usize,
    pub dead: usize,
    /// Dead letters discarded to stay within capacity.
    pub dead_discarded: u64,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Envelope>,
    dead: VecDeque<DeadLetter>,
    dead_discarded: u64,
    in_flight: usize,
}

struct Shared {
    state: Mutex<QueueState>,
    max_retries: u32,
    retry_delay: Duration,
    dead_capacity: usize,
}

impl Shared {
    /// A poisoned lock only means a panicking holder; the queue data is still consistent.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn settle_ack(&self) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
    }

    fn settle_retry(&self, body: DispatchMessage, attempts: u32) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);

        if attempts > self.max_retries {
            tracing::error!(
                "[queue] {} dead-lettered after {attempts} attempts",
                body.publication_id
            );
            if self.dead_capacity == 0 {
                state.dead_discarded += 1;
                return;
            }
            if state.dead.len() >= self.dead_capacity {
                state.dead.pop_front();
                state.dead_discarded += 1;
            }
            state.dead.push_back(DeadLetter { body, attempts });
            return;
        }

        let factor = 1u32.checked_shl(attempts.saturating_sub(1)).unwrap_or(u32::MAX);
        let delay = self.retry_delay.saturating_mul(factor);
        tracing::debug!(
            "[queue] {} redelivery in {}s (attempt {attempts})",
            body.publication_id,
            delay.as_secs()
        );
        state.pending.push_back(Envelope {
            body,
            attempts,
            visible_at: Instant::now() + delay,
        });
    }
}

/// Shared handle; clones see the same queue.
#[derive(Clone)]
pub struct MemoryQueue {
    shared: Arc<Shared>,
}

impl MemoryQueue {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self::with_dead_letter_capacity(max_retries, retry_delay, DEAD_LETTER_CAPACITY)
    }

    /// Keep at most `capacity` dead letters, discarding the oldest.
    pub fn with_dead_letter_capacity(max_retries: u32, retry_delay: Duration, capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                max_retries,
                retry_delay,
                dead_capacity: capacity,
            }),
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.max_retries, Duration::from_secs(config.retry_delay_secs))
    }

    /// Take up to `max` visible messages, oldest first.
    pub fn receive(&self, max: usize) -> Vec<QueuedMessage> {
        let now = Instant::now();
        let mut state = self.shared.lock();
        let mut taken = Vec::new();
        let mut i = 0;
        while i < state.pending.len() && taken.len() < max {
            if state.pending[i].visible_at > now {
                i += 1;
                continue;
            }
            if let Some(envelope) = state.pending.remove(i) {
                taken.push(envelope);
            }
        }
        state.in_flight += taken.len();
        drop(state);

        taken
            .into_iter()
            .map(|envelope| QueuedMessage {
                shared: Arc::clone(&self.shared),
                body: envelope.body,
                attempts: envelope.attempts + 1,
                settled: AtomicBool::new(false),
            })
            .collect()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.shared.lock();
        QueueStats {
            pending: state.pending.len(),
            in_flight: state.in_flight,
            dead: state.dead.len(),
            dead_discarded: state.dead_discarded,
        }
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.shared.lock().dead.iter().cloned().collect()
    }

    fn push(&self, messages: impl IntoIterator<Item = DispatchMessage>) {
        let now = Instant::now();
        let mut state = self.shared.lock();
        for body in messages {
            state.pending.push_back(Envelope {
                body,
                attempts: 0,
                visible_at: now,
            });
        }
    }
}

#[async_trait]
impl DispatchQueue for MemoryQueue {
    async fn send(&self, message: DispatchMessage) -> Result<()> {
        self.push([message]);
        Ok(())
    }

    async fn send_batch(&self, messages: Vec<DispatchMessage>) -> Result<()> {
        self.push(messages);
        Ok(())
    }
}

/// One in-flight message from a [`MemoryQueue`].
pub struct QueuedMessage {
    shared: Arc<Shared>,
    body: DispatchMessage,
    attempts: u32,
    settled: AtomicBool,
}

impl Delivery for QueuedMessage {
    fn body(&self) -> &DispatchMessage {
        &self.body
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }

    fn ack(&self) {
        if !self.settled.swap(true, Ordering::SeqCst) {
            self.shared.settle_ack();
        }
    }

    fn retry(&self) {
        if !self.settled.swap(true, Ordering::SeqCst) {
            self.shared.settle_retry(self.body.clone(), self.attempts);
        }
    }
}

impl Drop for QueuedMessage {
    fn drop(&mut self) {
        if !self.settled.swap(true, Ordering::SeqCst) {
            tracing::warn!(
                "[queue] {} dropped without ack, redelivering",
                self.body.publication_id
            );
            self.shared.settle_retry(self.body.clone(), self.attempts);
        }
    }
}

//! Durable at-least-once queue interface.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::DispatchMessage;

/// Producer side of the dispatch queue.
#[async_trait]
pub trait DispatchQueue: Send + Sync {
    async fn send(&self, message: DispatchMessage) -> Result<()>;

    async fn send_batch(&self, messages: Vec<DispatchMessage>) -> Result<()>;
}

/// One received message. Consumers must settle each delivery exactly once.
pub trait Delivery: Send + Sync {
    fn body(&self) -> &DispatchMessage;

    /// 1 on first delivery, incremented on every redelivery.
    fn attempts(&self) -> u32;

    /// Processed; remove from the queue.
    fn ack(&self);

    /// Not processed; redeliver using the queue's own backoff.
    fn retry(&self);
}

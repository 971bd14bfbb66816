//! Workflow execution engine interface.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::ScoutParams;

#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Start one execution under `id`. Fails if it could not be started.
    async fn create(&self, id: &str, params: ScoutParams) -> Result<()>;
}

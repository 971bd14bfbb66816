//! Writing/publishing service interface.
//!
//! Each call is a single request/response; the service does not promise
//! idempotency, so callers pick stable ids where a retry must not duplicate work.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Caller-chosen session id.
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub publication_id: String,
    pub idea_id: String,
    pub seed_context: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WritingSession {
    pub id: String,
}

/// Result of an autonomous writing pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftResult {
    pub version: u32,
    pub word_count: u32,
    /// The agent stopped before producing a final draft.
    #[serde(default)]
    pub partial: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub slug: String,
    pub author: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResult {
    pub post_id: String,
    pub slug: String,
}

#[async_trait]
pub trait WriterService: Send + Sync {
    async fn create_session(&self, request: &CreateSessionRequest) -> Result<WritingSession>;

    /// Ask the agent to produce a complete draft; returns when it is done.
    async fn auto_write(&self, session_id: &str, instruction: &str) -> Result<DraftResult>;

    async fn publish(&self, session_id: &str, request: &PublishRequest) -> Result<PublishResult>;
}

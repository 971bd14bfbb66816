//! Relational store interfaces.

use async_trait::async_trait;

use crate::error::Result;
use crate::schedule::ScoutSchedule;
use crate::types::{Idea, IdeaStatus, NewIdea, Publication, ScheduleRow, Topic};

/// Publication (tenant) rows and their scheduling field.
#[async_trait]
pub trait PublicationStore: Send + Sync {
    async fn get_publication(&self, id: &str) -> Result<Option<Publication>>;

    /// Ids of every publication, oldest first.
    async fn list_publication_ids(&self) -> Result<Vec<String>>;

    /// Publications whose `next_scout_at` is NULL.
    async fn list_unscheduled(&self) -> Result<Vec<ScheduleRow>>;

    /// Publications whose `next_scout_at` is set and `<= now`.
    async fn list_due(&self, now: i64) -> Result<Vec<ScheduleRow>>;

    /// Unconditional `UPDATE ... SET next_scout_at = ? WHERE id = ?`.
    async fn set_next_scout_at(&self, id: &str, next_scout_at: i64) -> Result<()>;

    /// Replace schedule, timezone and next run together. Returns false if the row is missing.
    async fn update_schedule(
        &self,
        id: &str,
        schedule: &ScoutSchedule,
        timezone: &str,
        next_scout_at: i64,
    ) -> Result<bool>;

    async fn list_active_topics(&self, publication_id: &str) -> Result<Vec<Topic>>;
}

/// Discovered idea rows.
#[async_trait]
pub trait IdeaRepository: Send + Sync {
    /// Insert-if-absent keyed by id. Returns how many rows were actually new.
    async fn insert_ideas_if_absent(&self, ideas: &[NewIdea]) -> Result<usize>;

    async fn get_idea(&self, id: &str) -> Result<Option<Idea>>;

    /// Ideas for a publication created at or after `since`, newest first.
    async fn recent_ideas(&self, publication_id: &str, since: i64) -> Result<Vec<Idea>>;

    /// Set status if the transition is allowed. `None` if the idea does not exist.
    async fn update_idea_status(&self, id: &str, status: IdeaStatus) -> Result<Option<Idea>>;

    /// Mark promoted and link the writing session.
    async fn promote_idea(&self, id: &str, session_id: &str) -> Result<()>;

    async fn count_ideas(&self, publication_id: &str) -> Result<usize>;
}

/// Writing-session bookkeeping needed by the cadence gate.
#[async_trait]
pub trait SessionLedger: Send + Sync {
    /// Completed writing sessions for a publication with `updated_at >= since`.
    async fn count_completed_sessions_since(&self, publication_id: &str, since: i64) -> Result<u32>;
}

//! Data model shared by the scheduler and the scout workflow.

use serde::{Deserialize, Serialize};

use crate::schedule::ScoutSchedule;

/// How far discovery results are carried without a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutoPublishMode {
    /// Only store ideas; a human promotes them.
    IdeasOnly,
    /// Write a draft from the top idea, leave publishing to a human.
    Draft,
    /// Write and publish the top idea.
    FullAuto,
}

impl AutoPublishMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoPublishMode::IdeasOnly => "ideas-only",
            AutoPublishMode::Draft => "draft",
            AutoPublishMode::FullAuto => "full-auto",
        }
    }

    /// Unknown stored values degrade to the safest mode.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "draft" => AutoPublishMode::Draft,
            "full-auto" => AutoPublishMode::FullAuto,
            _ => AutoPublishMode::IdeasOnly,
        }
    }
}

impl std::fmt::Display for AutoPublishMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tenant: an independent content channel with its own schedule and quota.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Publication {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub writing_tone: Option<String>,
    pub default_author: String,
    pub auto_publish_mode: AutoPublishMode,
    /// Weekly cap on automated writing sessions (≥ 1).
    pub cadence_posts_per_week: u32,
    pub scout_schedule: ScoutSchedule,
    /// IANA timezone name.
    pub timezone: String,
    /// UTC epoch seconds of the next scout run. `None` = needs backfill.
    pub next_scout_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Minimal projection the scanner works from.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRow {
    pub id: String,
    /// Raw stored schedule JSON (may be corrupt).
    pub scout_schedule: Option<String>,
    pub timezone: Option<String>,
}

/// A topic a publication covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub publication_id: String,
    pub name: String,
    pub description: Option<String>,
    pub priority: i64,
    pub is_active: bool,
}

/// One cited source backing an idea.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaSource {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// Idea lifecycle. `Promoted` and `Dismissed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdeaStatus {
    New,
    Reviewed,
    Promoted,
    Dismissed,
}

impl IdeaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdeaStatus::New => "new",
            IdeaStatus::Reviewed => "reviewed",
            IdeaStatus::Promoted => "promoted",
            IdeaStatus::Dismissed => "dismissed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "new" => Some(IdeaStatus::New),
            "reviewed" => Some(IdeaStatus::Reviewed),
            "promoted" => Some(IdeaStatus::Promoted),
            "dismissed" => Some(IdeaStatus::Dismissed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, IdeaStatus::Promoted | IdeaStatus::Dismissed)
    }

    /// Allowed transitions: new→reviewed, new/reviewed→promoted, any→dismissed.
    pub fn can_transition_to(&self, next: IdeaStatus) -> bool {
        match (self, next) {
            (IdeaStatus::New, IdeaStatus::Reviewed) => true,
            (IdeaStatus::New | IdeaStatus::Reviewed, IdeaStatus::Promoted) => true,
            (_, IdeaStatus::Dismissed) => true,
            _ => false,
        }
    }
}

/// A persisted discovered idea.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Idea {
    pub id: String,
    pub publication_id: String,
    pub topic_id: Option<String>,
    pub title: String,
    pub angle: String,
    pub summary: String,
    pub sources: Vec<IdeaSource>,
    pub relevance_score: f64,
    pub status: IdeaStatus,
    pub session_id: Option<String>,
    pub created_at: i64,
}

/// Insert payload for an idea row (status starts at `new`).
#[derive(Debug, Clone, PartialEq)]
pub struct NewIdea {
    pub id: String,
    pub publication_id: String,
    pub topic_id: Option<String>,
    pub title: String,
    pub angle: String,
    pub summary: String,
    pub sources: Vec<IdeaSource>,
    pub relevance_score: f64,
}

/// A ranked idea as produced by the discovery backend, before storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaBrief {
    pub title: String,
    pub angle: String,
    pub summary: String,
    /// Topic name; resolved against active topics at storage time.
    pub topic: String,
    pub relevance_score: f64,
    #[serde(default)]
    pub sources: Vec<IdeaSource>,
}

/// What started a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggeredBy {
    Cron,
    Manual,
}

impl std::fmt::Display for TriggeredBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggeredBy::Cron => write!(f, "cron"),
            TriggeredBy::Manual => write!(f, "manual"),
        }
    }
}

/// Queue payload: run discovery for one publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchMessage {
    pub publication_id: String,
    pub triggered_by: TriggeredBy,
}

impl DispatchMessage {
    pub fn cron(publication_id: impl Into<String>) -> Self {
        Self {
            publication_id: publication_id.into(),
            triggered_by: TriggeredBy::Cron,
        }
    }

    pub fn manual(publication_id: impl Into<String>) -> Self {
        Self {
            publication_id: publication_id.into(),
            triggered_by: TriggeredBy::Manual,
        }
    }
}

/// Parameters a workflow execution is started with.
pub type ScoutParams = DispatchMessage;

/// Everything the discovery step needs about a publication.
#[derive(Debug, Clone)]
pub struct PublicationContext {
    pub publication: Publication,
    pub topics: Vec<Topic>,
    /// Ideas from the recent window, for de-duplication.
    pub recent_ideas: Vec<Idea>,
}

//! Shared fixtures for unit tests.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use pubscout_core::error::{Result, ScoutError};
use pubscout_core::schedule::ScoutSchedule;
use pubscout_core::traits::WriterService;
use pubscout_core::traits::writer::{
    CreateSessionRequest, DraftResult, PublishRequest, PublishResult, WritingSession,
};
use pubscout_core::types::{AutoPublishMode, Idea, IdeaBrief, IdeaStatus, Publication};
use pubscout_scheduler::SqliteStore;

pub fn store() -> SqliteStore {
    SqliteStore::open(Path::new(":memory:")).unwrap()
}

pub fn publication(id: &str) -> Publication {
    Publication {
        id: id.to_string(),
        user_id: "user-1".into(),
        name: "The Weekly Crab".into(),
        writing_tone: None,
        default_author: "Ferris".into(),
        auto_publish_mode: AutoPublishMode::Draft,
        cadence_posts_per_week: 3,
        scout_schedule: ScoutSchedule::default(),
        timezone: "UTC".into(),
        next_scout_at: None,
        created_at: 1_700_000_000,
        updated_at: 1_700_000_000,
    }
}

pub fn brief(title: &str, score: f64) -> IdeaBrief {
    IdeaBrief {
        title: title.to_string(),
        angle: format!("Why {title} matters"),
        summary: format!("Summary of {title}"),
        topic: "General".into(),
        relevance_score: score,
        sources: Vec::new(),
    }
}

pub fn idea(id: &str, title: &str, score: f64) -> Idea {
    Idea {
        id: id.to_string(),
        publication_id: "pub-1".into(),
        topic_id: None,
        title: title.to_string(),
        angle: format!("Why {title} matters"),
        summary: format!("Summary of {title}"),
        sources: Vec::new(),
        relevance_score: score,
        status: IdeaStatus::New,
        session_id: None,
        created_at: 1_700_000_000,
    }
}

/// Records every call; can be told to fail publishing or return partial drafts.
#[derive(Default)]
pub struct FakeWriter {
    calls: Mutex<Vec<&'static str>>,
    sessions: Mutex<Vec<String>>,
    slugs: Mutex<Vec<String>>,
    publish_failures: AtomicU32,
    partial: bool,
}

impl FakeWriter {
    pub fn failing_publish(times: u32) -> Self {
        Self {
            publish_failures: AtomicU32::new(times),
            ..Self::default()
        }
    }

    pub fn partial() -> Self {
        Self {
            partial: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn published_slugs(&self) -> Vec<String> {
        self.slugs.lock().unwrap().clone()
    }
}

#[async_trait]
impl WriterService for FakeWriter {
    async fn create_session(&self, request: &CreateSessionRequest) -> Result<WritingSession> {
        self.calls.lock().unwrap().push("create");
        self.sessions.lock().unwrap().push(request.id.clone());
        Ok(WritingSession {
            id: request.id.clone(),
        })
    }

    async fn auto_write(&self, _session_id: &str, _instruction: &str) -> Result<DraftResult> {
        self.calls.lock().unwrap().push("auto_write");
        Ok(DraftResult {
            version: 1,
            word_count: 1200,
            partial: self.partial,
        })
    }

    async fn publish(&self, session_id: &str, request: &PublishRequest) -> Result<PublishResult> {
        self.calls.lock().unwrap().push("publish");
        if self.publish_failures.load(Ordering::SeqCst) > 0 {
            self.publish_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(ScoutError::writer("publish target returned 502"));
        }
        self.slugs.lock().unwrap().push(request.slug.clone());
        Ok(PublishResult {
            post_id: format!("post-{session_id}"),
            slug: request.slug.clone(),
        })
    }
}

//! Cadence-gated auto-write of the top discovered idea.
//!
//! Order of side effects: session → draft → publish (full-auto only) →
//! promote. Promotion is last, so any earlier failure leaves the idea
//! promotable and the whole step can be retried. The session id is derived
//! from (publication, idea), so a retry lands on the same session.

use std::sync::Arc;

use pubscout_core::error::{Result, ScoutError};
use pubscout_core::traits::writer::{CreateSessionRequest, PublishRequest};
use pubscout_core::traits::{IdeaRepository, SessionLedger, WriterService};
use pubscout_core::types::{AutoPublishMode, Idea, IdeaBrief, Publication};

use crate::cadence::has_weekly_capacity;
use crate::ideas::session_id;
use crate::seed::{build_seed_context, build_write_instruction, slugify};

/// Result of one auto-write decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoWriteOutcome {
    /// 0 or 1.
    pub written: u32,
    pub title: Option<String>,
    pub session_id: Option<String>,
    pub post_id: Option<String>,
}

impl AutoWriteOutcome {
    fn skipped() -> Self {
        Self::default()
    }
}

pub struct AutoWriter {
    ideas: Arc<dyn IdeaRepository>,
    sessions: Arc<dyn SessionLedger>,
    writer: Arc<dyn WriterService>,
}

/// Index of the highest score; ties go to the earliest entry.
pub fn top_index(ranked: &[IdeaBrief]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, brief) in ranked.iter().enumerate() {
        match best {
            Some(b) if ranked[b].relevance_score >= brief.relevance_score => {}
            _ => best = Some(i),
        }
    }
    best
}

impl AutoWriter {
    pub fn new(
        ideas: Arc<dyn IdeaRepository>,
        sessions: Arc<dyn SessionLedger>,
        writer: Arc<dyn WriterService>,
    ) -> Self {
        Self {
            ideas,
            sessions,
            writer,
        }
    }

    /// Possibly write (and publish) the best of `ranked`. `stored_ids[i]` is the
    /// persisted id of `ranked[i]`.
    pub async fn auto_write_top_idea(
        &self,
        publication: &Publication,
        ranked: &[IdeaBrief],
        stored_ids: &[String],
        now: i64,
    ) -> Result<AutoWriteOutcome> {
        if publication.auto_publish_mode == AutoPublishMode::IdeasOnly {
            return Ok(AutoWriteOutcome::skipped());
        }

        if !has_weekly_capacity(self.sessions.as_ref(), publication, now).await? {
            tracing::info!("[auto-write] {}: weekly cadence reached, skipping", publication.id);
            return Ok(AutoWriteOutcome::skipped());
        }

        let Some(top) = top_index(ranked) else {
            return Ok(AutoWriteOutcome::skipped());
        };
        let Some(idea_id) = stored_ids.get(top) else {
            tracing::warn!("[auto-write] {}: no stored id for top idea", publication.id);
            return Ok(AutoWriteOutcome::skipped());
        };
        let Some(idea) = self.ideas.get_idea(idea_id).await? else {
            tracing::warn!("[auto-write] {}: idea {idea_id} not found", publication.id);
            return Ok(AutoWriteOutcome::skipped());
        };
        if idea.status.is_terminal() {
            tracing::info!(
                "[auto-write] {}: idea {idea_id} already {}, skipping",
                publication.id,
                idea.status.as_str()
            );
            return Ok(AutoWriteOutcome::skipped());
        }

        self.write(publication, &idea).await
    }

    async fn write(&self, publication: &Publication, idea: &Idea) -> Result<AutoWriteOutcome> {
        let request = CreateSessionRequest {
            id: session_id(&publication.id, &idea.id),
            user_id: publication.user_id.clone(),
            title: idea.title.clone(),
            publication_id: publication.id.clone(),
            idea_id: idea.id.clone(),
            seed_context: build_seed_context(idea, publication),
        };
        let session = self.writer.create_session(&request).await?;
        tracing::info!(
            "[auto-write] {}: session {} for \"{}\"",
            publication.id,
            session.id,
            idea.title
        );

        let draft = self
            .writer
            .auto_write(&session.id, &build_write_instruction(idea, publication))
            .await?;
        if draft.partial {
            if publication.auto_publish_mode == AutoPublishMode::FullAuto {
                return Err(ScoutError::writer(format!(
                    "session {} produced only a partial draft (v{})",
                    session.id, draft.version
                )));
            }
            tracing::warn!(
                "[auto-write] {}: session {} left a partial draft (v{})",
                publication.id,
                session.id,
                draft.version
            );
        }

        let mut post_id = None;
        if publication.auto_publish_mode == AutoPublishMode::FullAuto {
            let published = self
                .writer
                .publish(
                    &session.id,
                    &PublishRequest {
                        slug: slugify(&idea.title),
                        author: publication.default_author.clone(),
                    },
                )
                .await?;
            tracing::info!(
                "[auto-write] {}: published {} as /{}",
                publication.id,
                published.post_id,
                published.slug
            );
            post_id = Some(published.post_id);
        }

        self.ideas.promote_idea(&idea.id, &session.id).await?;

        Ok(AutoWriteOutcome {
            written: 1,
            title: Some(idea.title.clone()),
            session_id: Some(session.id),
            post_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ideas::store_ideas;
    use crate::testing::{FakeWriter, brief, publication, store};
    use pubscout_core::types::IdeaStatus;
    use pubscout_scheduler::SqliteStore;

    const NOW: i64 = 1_718_206_200; // Wed 2024-06-12 15:30 UTC

    fn setup(writer: FakeWriter) -> (Arc<SqliteStore>, Arc<FakeWriter>, AutoWriter) {
        let store = Arc::new(store());
        let writer = Arc::new(writer);
        let auto = AutoWriter::new(store.clone(), store.clone(), writer.clone());
        (store, writer, auto)
    }

    #[test]
    fn test_top_index_ties_keep_first() {
        assert_eq!(top_index(&[]), None);
        let ranked = vec![brief("a", 0.5), brief("b", 0.9), brief("c", 0.9), brief("d", 0.1)];
        assert_eq!(top_index(&ranked), Some(1));
    }

    #[tokio::test]
    async fn test_full_auto_picks_highest_score() {
        let (store, writer, auto) = setup(FakeWriter::default());
        let mut publication = publication("pub-1");
        publication.auto_publish_mode = AutoPublishMode::FullAuto;
        publication.cadence_posts_per_week = 1;

        let ranked = vec![brief("Good idea", 0.9), brief("Better idea", 0.95)];
        let stored = store_ideas(store.as_ref(), "pub-1", &ranked, &[]).await.unwrap();

        let outcome = auto
            .auto_write_top_idea(&publication, &ranked, &stored.idea_ids, NOW)
            .await
            .unwrap();
        assert_eq!(outcome.written, 1);
        assert_eq!(outcome.title.as_deref(), Some("Better idea"));
        assert_eq!(writer.calls(), vec!["create", "auto_write", "publish"]);
        assert_eq!(writer.published_slugs(), vec!["better-idea"]);

        let idea = store.get_idea(&stored.idea_ids[1]).await.unwrap().unwrap();
        assert_eq!(idea.status, IdeaStatus::Promoted);
        assert_eq!(idea.session_id, outcome.session_id);
        let other = store.get_idea(&stored.idea_ids[0]).await.unwrap().unwrap();
        assert_eq!(other.status, IdeaStatus::New);
    }

    #[tokio::test]
    async fn test_cadence_reached_writes_nothing() {
        let (store, writer, auto) = setup(FakeWriter::default());
        let mut publication = publication("pub-1");
        publication.auto_publish_mode = AutoPublishMode::FullAuto;
        publication.cadence_posts_per_week = 3;
        for i in 0..3 {
            store
                .record_session(&format!("s{i}"), "pub-1", None, "completed", NOW - 60)
                .unwrap();
        }

        let ranked = vec![brief("Sure thing", 1.0)];
        let stored = store_ideas(store.as_ref(), "pub-1", &ranked, &[]).await.unwrap();
        let outcome = auto
            .auto_write_top_idea(&publication, &ranked, &stored.idea_ids, NOW)
            .await
            .unwrap();
        assert_eq!(outcome.written, 0);
        assert!(writer.calls().is_empty());
    }

    #[tokio::test]
    async fn test_ideas_only_is_noop() {
        let (store, writer, auto) = setup(FakeWriter::default());
        let mut publication = publication("pub-1");
        publication.auto_publish_mode = AutoPublishMode::IdeasOnly;

        let ranked = vec![brief("Idea", 0.7)];
        let stored = store_ideas(store.as_ref(), "pub-1", &ranked, &[]).await.unwrap();
        let outcome = auto
            .auto_write_top_idea(&publication, &ranked, &stored.idea_ids, NOW)
            .await
            .unwrap();
        assert_eq!(outcome, AutoWriteOutcome::default());
        assert!(writer.calls().is_empty());
    }

    #[tokio::test]
    async fn test_draft_mode_does_not_publish() {
        let (store, writer, auto) = setup(FakeWriter::default());
        let publication = publication("pub-1");
        assert_eq!(publication.auto_publish_mode, AutoPublishMode::Draft);

        let ranked = vec![brief("Draft me", 0.7)];
        let stored = store_ideas(store.as_ref(), "pub-1", &ranked, &[]).await.unwrap();
        let outcome = auto
            .auto_write_top_idea(&publication, &ranked, &stored.idea_ids, NOW)
            .await
            .unwrap();
        assert_eq!(outcome.written, 1);
        assert_eq!(outcome.post_id, None);
        assert_eq!(writer.calls(), vec!["create", "auto_write"]);
    }

    #[tokio::test]
    async fn test_missing_stored_idea_is_noop() {
        let (_store, writer, auto) = setup(FakeWriter::default());
        let publication = publication("pub-1");
        let ranked = vec![brief("Ghost", 0.7)];

        let outcome = auto
            .auto_write_top_idea(&publication, &ranked, &["nope".to_string()], NOW)
            .await
            .unwrap();
        assert_eq!(outcome.written, 0);
        let outcome = auto.auto_write_top_idea(&publication, &ranked, &[], NOW).await.unwrap();
        assert_eq!(outcome.written, 0);
        assert!(writer.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failure_leaves_idea_promotable_and_retry_reuses_session() {
        let (store, writer, auto) = setup(FakeWriter::failing_publish(1));
        let mut publication = publication("pub-1");
        publication.auto_publish_mode = AutoPublishMode::FullAuto;

        let ranked = vec![brief("Flaky", 0.8)];
        let stored = store_ideas(store.as_ref(), "pub-1", &ranked, &[]).await.unwrap();

        let err = auto
            .auto_write_top_idea(&publication, &ranked, &stored.idea_ids, NOW)
            .await;
        assert!(matches!(err, Err(ScoutError::Writer(_))));
        let idea = store.get_idea(&stored.idea_ids[0]).await.unwrap().unwrap();
        assert_eq!(idea.status, IdeaStatus::New);

        let outcome = auto
            .auto_write_top_idea(&publication, &ranked, &stored.idea_ids, NOW)
            .await
            .unwrap();
        assert_eq!(outcome.written, 1);
        let sessions = writer.session_ids();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0], sessions[1]);
    }

    #[tokio::test]
    async fn test_partial_draft_fails_full_auto() {
        let (store, writer, auto) = setup(FakeWriter::partial());
        let mut publication = publication("pub-1");
        publication.auto_publish_mode = AutoPublishMode::FullAuto;

        let ranked = vec![brief("Half done", 0.8)];
        let stored = store_ideas(store.as_ref(), "pub-1", &ranked, &[]).await.unwrap();
        assert!(
            auto.auto_write_top_idea(&publication, &ranked, &stored.idea_ids, NOW)
                .await
                .is_err()
        );
        assert_eq!(writer.calls(), vec!["create", "auto_write"]);
    }

    #[tokio::test]
    async fn test_already_promoted_is_not_rewritten() {
        let (store, writer, auto) = setup(FakeWriter::default());
        let publication = publication("pub-1");
        let ranked = vec![brief("Done before", 0.8)];
        let stored = store_ideas(store.as_ref(), "pub-1", &ranked, &[]).await.unwrap();
        store.promote_idea(&stored.idea_ids[0], "earlier-session").await.unwrap();

        let outcome = auto
            .auto_write_top_idea(&publication, &ranked, &stored.idea_ids, NOW)
            .await
            .unwrap();
        assert_eq!(outcome.written, 0);
        assert!(writer.calls().is_empty());
    }
}

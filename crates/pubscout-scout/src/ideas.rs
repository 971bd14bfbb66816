//! Idempotent idea ingestion.
//!
//! Idea ids are derived from content, not generated, so re-running a discovery
//! step reproduces the same ids and the insert-if-absent store turns the
//! repeat into a no-op.
//!
//! Id layout (version 1): SHA-256 over the UTF-8 bytes of
//! `publication_id 0x00 title 0x00 angle`, lowercase hex, formatted as
//! `h[0..8]-h[8..12]-4h[13..16]-8h[17..20]-h[20..32]`.

use sha2::{Digest, Sha256};
use std::collections::HashMap;

use pubscout_core::error::Result;
use pubscout_core::traits::IdeaRepository;
use pubscout_core::types::{IdeaBrief, NewIdea, Topic};

/// Result of one `store_ideas` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredIdeas {
    /// Briefs submitted, including ones that already existed.
    pub count: usize,
    /// Deterministic id per brief, same order as the input.
    pub idea_ids: Vec<String>,
}

/// UUID-shaped deterministic id for an idea.
pub fn deterministic_id(publication_id: &str, title: &str, angle: &str) -> String {
    uuid_shaped(&[publication_id, title, angle])
}

/// Writing-session id for auto-writing an idea. Stable across retries, so a
/// re-run reuses the session instead of opening a second one.
pub fn session_id(publication_id: &str, idea_id: &str) -> String {
    uuid_shaped(&["session", publication_id, idea_id])
}

fn uuid_shaped(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(part.as_bytes());
    }
    let hex: String = hasher.finalize().iter().map(|b| format!("{b:02x}")).collect();

    format!(
        "{}-{}-4{}-8{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[13..16],
        &hex[17..20],
        &hex[20..32]
    )
}

/// Persist briefs for a publication. Unknown topic names map to no topic.
pub async fn store_ideas(
    repo: &dyn IdeaRepository,
    publication_id: &str,
    briefs: &[IdeaBrief],
    topics: &[Topic],
) -> Result<StoredIdeas> {
    let topics_by_name: HashMap<&str, &str> =
        topics.iter().map(|t| (t.name.as_str(), t.id.as_str())).collect();

    let rows: Vec<NewIdea> = briefs
        .iter()
        .map(|brief| NewIdea {
            id: deterministic_id(publication_id, &brief.title, &brief.angle),
            publication_id: publication_id.to_string(),
            topic_id: topics_by_name.get(brief.topic.as_str()).map(|id| id.to_string()),
            title: brief.title.clone(),
            angle: brief.angle.clone(),
            summary: brief.summary.clone(),
            sources: brief.sources.clone(),
            relevance_score: brief.relevance_score,
        })
        .collect();

    let inserted = repo.insert_ideas_if_absent(&rows).await?;
    tracing::info!(
        "[workflow] {publication_id}: stored {inserted} new of {} idea(s)",
        rows.len()
    );

    Ok(StoredIdeas {
        count: briefs.len(),
        idea_ids: rows.into_iter().map(|r| r.id).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{brief, store};

    fn topic(id: &str, name: &str) -> Topic {
        Topic {
            id: id.into(),
            publication_id: "pub-1".into(),
            name: name.into(),
            description: None,
            priority: 1,
            is_active: true,
        }
    }

    #[test]
    fn test_id_is_stable_and_uuid_shaped() {
        let a = deterministic_id("pub-1", "Rust 2024", "What changed");
        let b = deterministic_id("pub-1", "Rust 2024", "What changed");
        assert_eq!(a, b);

        let parts: Vec<&str> = a.split('-').collect();
        assert_eq!(parts.iter().map(|p| p.len()).collect::<Vec<_>>(), vec![8, 4, 4, 4, 12]);
        assert!(parts[2].starts_with('4'));
        assert!(parts[3].starts_with('8'));
    }

    #[test]
    fn test_known_vector() {
        assert_eq!(
            deterministic_id("pub-1", "Rust 2024", "What changed"),
            "2de93ff7-c230-4f7d-87c2-b2ed98dc4fa8"
        );
    }

    #[test]
    fn test_separator_prevents_field_bleed() {
        assert_ne!(
            deterministic_id("pub", "ab", "c"),
            deterministic_id("pub", "a", "bc")
        );
        assert_ne!(
            deterministic_id("pub-1", "t", "a"),
            deterministic_id("pub-2", "t", "a")
        );
    }

    #[test]
    fn test_session_id_differs_from_idea_id() {
        let idea = deterministic_id("pub-1", "t", "a");
        assert_eq!(session_id("pub-1", &idea), session_id("pub-1", &idea));
        assert_ne!(session_id("pub-1", &idea), idea);
        assert_ne!(session_id("pub-1", &idea), session_id("pub-2", &idea));
    }

    #[tokio::test]
    async fn test_store_twice_no_duplicates() {
        let repo = store();
        let briefs = vec![brief("One", 0.4), brief("Two", 0.8)];

        let first = store_ideas(&repo, "pub-1", &briefs, &[]).await.unwrap();
        let second = store_ideas(&repo, "pub-1", &briefs, &[]).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.count, 2);
        assert_eq!(repo.count_ideas("pub-1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_topic_resolved_by_name() {
        let repo = store();
        let mut known = brief("Known", 0.5);
        known.topic = "Rust".into();
        let mut unknown = brief("Unknown", 0.5);
        unknown.topic = "Gardening".into();

        let stored = store_ideas(&repo, "pub-1", &[known, unknown], &[topic("t-rust", "Rust")])
            .await
            .unwrap();

        let first = repo.get_idea(&stored.idea_ids[0]).await.unwrap().unwrap();
        let second = repo.get_idea(&stored.idea_ids[1]).await.unwrap().unwrap();
        assert_eq!(first.topic_id.as_deref(), Some("t-rust"));
        assert_eq!(second.topic_id, None);
    }
}

//! SQLite-backed relational store for publications, topics, ideas and
//! writing-session bookkeeping.
//!
//! Every timestamp column is UTC epoch seconds. `next_scout_at` is the only
//! field the scheduler mutates; it is written with a plain
//! `UPDATE ... WHERE id = ?` (no version check).

use async_trait::async_trait;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;

use pubscout_core::error::{Result, ScoutError};
use pubscout_core::schedule::{ScoutSchedule, parse_schedule};
use pubscout_core::traits::{IdeaRepository, PublicationStore, SessionLedger};
use pubscout_core::types::{
    AutoPublishMode, Idea, IdeaSource, IdeaStatus, NewIdea, Publication, ScheduleRow, Topic,
};

/// SQLite store shared by the scanner, the consumer and the scout workflow.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

/// Shared SELECT column list for publication queries.
const PUBLICATION_SELECT: &str = "SELECT id, user_id, name, writing_tone, default_author, auto_publish_mode, cadence_posts_per_week, scout_schedule, timezone, next_scout_at, created_at, updated_at FROM publications";

const IDEA_SELECT: &str = "SELECT id, publication_id, topic_id, title, angle, summary, sources, relevance_score, status, session_id, created_at FROM ideas";

/// Busy/locked are transient; everything else is a hard database error.
fn db_err(context: &str, e: rusqlite::Error) -> ScoutError {
    let transient = matches!(
        e.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    );
    if transient {
        ScoutError::Unavailable(format!("{context}: {e}"))
    } else {
        ScoutError::Database(format!("{context}: {e}"))
    }
}

fn row_to_publication(row: &rusqlite::Row) -> rusqlite::Result<Publication> {
    let mode: String = row.get(5)?;
    let schedule: Option<String> = row.get(7)?;
    let timezone: Option<String> = row.get(8)?;
    Ok(Publication {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        writing_tone: row.get(3)?,
        default_author: row.get(4)?,
        auto_publish_mode: AutoPublishMode::parse(&mode),
        cadence_posts_per_week: row.get::<_, i64>(6)?.max(1) as u32,
        scout_schedule: parse_schedule(schedule.as_deref()),
        timezone: timezone.unwrap_or_else(|| pubscout_core::schedule::DEFAULT_TIMEZONE.to_string()),
        next_scout_at: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn row_to_idea(row: &rusqlite::Row) -> rusqlite::Result<Idea> {
    let sources: Option<String> = row.get(6)?;
    let status: String = row.get(8)?;
    Ok(Idea {
        id: row.get(0)?,
        publication_id: row.get(1)?,
        topic_id: row.get(2)?,
        title: row.get(3)?,
        angle: row.get(4)?,
        summary: row.get(5)?,
        sources: sources
            .and_then(|s| serde_json::from_str::<Vec<IdeaSource>>(&s).ok())
            .unwrap_or_default(),
        relevance_score: row.get(7)?,
        status: IdeaStatus::parse(&status).unwrap_or(IdeaStatus::New),
        session_id: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn row_to_schedule(row: &rusqlite::Row) -> rusqlite::Result<ScheduleRow> {
    Ok(ScheduleRow {
        id: row.get(0)?,
        scout_schedule: row.get(1)?,
        timezone: row.get(2)?,
    })
}

fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

impl SqliteStore {
    /// Open or create the database. `:memory:` gives a private in-memory store.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| db_err("DB open", e))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| db_err("DB pragma", e))?;

        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ScoutError::database(format!("Lock: {e}")))
    }

    /// Run schema migrations.
    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS publications (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                writing_tone TEXT,
                default_author TEXT NOT NULL DEFAULT '',
                auto_publish_mode TEXT NOT NULL DEFAULT 'draft',
                cadence_posts_per_week INTEGER NOT NULL DEFAULT 3,
                scout_schedule TEXT,
                timezone TEXT,
                next_scout_at INTEGER,             -- NULL = needs backfill
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_publications_next_scout ON publications(next_scout_at);

            CREATE TABLE IF NOT EXISTS topics (
                id TEXT PRIMARY KEY,
                publication_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                priority INTEGER NOT NULL DEFAULT 1,
                is_active INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS ideas (
                id TEXT PRIMARY KEY,               -- content-derived, see idea ids
                publication_id TEXT NOT NULL,
                topic_id TEXT,
                title TEXT NOT NULL,
                angle TEXT NOT NULL,
                summary TEXT NOT NULL,
                sources TEXT,                      -- JSON array of {url,title,snippet}
                relevance_score REAL NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'new',
                session_id TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_ideas_publication ON ideas(publication_id, created_at);

            CREATE TABLE IF NOT EXISTS writing_sessions (
                id TEXT PRIMARY KEY,
                publication_id TEXT NOT NULL,
                idea_id TEXT,
                status TEXT NOT NULL DEFAULT 'active',  -- active, completed, archived
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_publication ON writing_sessions(publication_id, status, updated_at);
            ",
        )
        .map_err(|e| db_err("Migration", e))?;
        Ok(())
    }

    // ─── Publications ────────────────────────────────────────

    /// Insert a publication row as given (including a possibly NULL `next_scout_at`).
    pub fn insert_publication(&self, publication: &Publication) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO publications (id, user_id, name, writing_tone, default_author, auto_publish_mode,
                cadence_posts_per_week, scout_schedule, timezone, next_scout_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                publication.id,
                publication.user_id,
                publication.name,
                publication.writing_tone,
                publication.default_author,
                publication.auto_publish_mode.as_str(),
                publication.cadence_posts_per_week,
                publication.scout_schedule.to_json(),
                publication.timezone,
                publication.next_scout_at,
                publication.created_at,
                publication.updated_at,
            ],
        )
        .map_err(|e| db_err("Insert publication", e))?;
        Ok(())
    }

    /// Overwrite the raw stored schedule text (repairs, imports, tests).
    pub fn set_raw_schedule(&self, id: &str, raw: Option<&str>, timezone: Option<&str>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE publications SET scout_schedule = ?1, timezone = ?2 WHERE id = ?3",
            params![raw, timezone, id],
        )
        .map_err(|e| db_err("Set raw schedule", e))?;
        Ok(())
    }

    pub fn insert_topic(&self, topic: &Topic) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO topics (id, publication_id, name, description, priority, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                topic.id,
                topic.publication_id,
                topic.name,
                topic.description,
                topic.priority,
                topic.is_active as i32,
            ],
        )
        .map_err(|e| db_err("Insert topic", e))?;
        Ok(())
    }

    // ─── Writing sessions ────────────────────────────────────

    /// Record a writing session's status. Written by the writing service when it
    /// shares this database.
    pub fn record_session(
        &self,
        id: &str,
        publication_id: &str,
        idea_id: Option<&str>,
        status: &str,
        at: i64,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO writing_sessions (id, publication_id, idea_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(id) DO UPDATE SET status = excluded.status, updated_at = excluded.updated_at",
            params![id, publication_id, idea_id, status, at],
        )
        .map_err(|e| db_err("Record session", e))?;
        Ok(())
    }

    fn find_idea(conn: &Connection, id: &str) -> Result<Option<Idea>> {
        conn.query_row(&format!("{IDEA_SELECT} WHERE id = ?1"), [id], row_to_idea)
            .optional()
            .map_err(|e| db_err("Get idea", e))
    }
}

#[async_trait]
impl PublicationStore for SqliteStore {
    async fn get_publication(&self, id: &str) -> Result<Option<Publication>> {
        let conn = self.lock()?;
        conn.query_row(&format!("{PUBLICATION_SELECT} WHERE id = ?1"), [id], row_to_publication)
            .optional()
            .map_err(|e| db_err("Get publication", e))
    }

    async fn list_publication_ids(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id FROM publications ORDER BY created_at, id")
            .map_err(|e| db_err("List publications", e))?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| db_err("List publications", e))?;
        rows.collect::<rusqlite::Result<Vec<String>>>()
            .map_err(|e| db_err("List publications", e))
    }

    async fn list_unscheduled(&self) -> Result<Vec<ScheduleRow>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, scout_schedule, timezone FROM publications WHERE next_scout_at IS NULL ORDER BY created_at, id")
            .map_err(|e| db_err("List unscheduled", e))?;
        let rows = stmt
            .query_map([], row_to_schedule)
            .map_err(|e| db_err("List unscheduled", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("List unscheduled", e))
    }

    async fn list_due(&self, now: i64) -> Result<Vec<ScheduleRow>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, scout_schedule, timezone FROM publications
                 WHERE next_scout_at IS NOT NULL AND next_scout_at <= ?1
                 ORDER BY next_scout_at, id",
            )
            .map_err(|e| db_err("List due", e))?;
        let rows = stmt
            .query_map([now], row_to_schedule)
            .map_err(|e| db_err("List due", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("List due", e))
    }

    async fn set_next_scout_at(&self, id: &str, next_scout_at: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE publications SET next_scout_at = ?1 WHERE id = ?2",
            params![next_scout_at, id],
        )
        .map_err(|e| db_err("Set next_scout_at", e))?;
        Ok(())
    }

    async fn update_schedule(
        &self,
        id: &str,
        schedule: &ScoutSchedule,
        timezone: &str,
        next_scout_at: i64,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE publications SET scout_schedule = ?1, timezone = ?2, next_scout_at = ?3, updated_at = ?4 WHERE id = ?5",
                params![schedule.to_json(), timezone, next_scout_at, now_epoch(), id],
            )
            .map_err(|e| db_err("Update schedule", e))?;
        Ok(changed > 0)
    }

    async fn list_active_topics(&self, publication_id: &str) -> Result<Vec<Topic>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, publication_id, name, description, priority, is_active FROM topics
                 WHERE publication_id = ?1 AND is_active = 1 ORDER BY priority DESC, name",
            )
            .map_err(|e| db_err("List topics", e))?;
        let rows = stmt
            .query_map([publication_id], |row| {
                Ok(Topic {
                    id: row.get(0)?,
                    publication_id: row.get(1)?,
                    name: row.get(2)?,
                    description: row.get(3)?,
                    priority: row.get(4)?,
                    is_active: row.get::<_, i32>(5)? != 0,
                })
            })
            .map_err(|e| db_err("List topics", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("List topics", e))
    }
}

#[async_trait]
impl IdeaRepository for SqliteStore {
    async fn insert_ideas_if_absent(&self, ideas: &[NewIdea]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(|e| db_err("Begin", e))?;
        let now = now_epoch();
        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO ideas (id, publication_id, topic_id, title, angle, summary,
                        sources, relevance_score, status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'new', ?9, ?9)",
                )
                .map_err(|e| db_err("Insert ideas", e))?;
            for idea in ideas {
                let sources = serde_json::to_string(&idea.sources)?;
                inserted += stmt
                    .execute(params![
                        idea.id,
                        idea.publication_id,
                        idea.topic_id,
                        idea.title,
                        idea.angle,
                        idea.summary,
                        sources,
                        idea.relevance_score,
                        now,
                    ])
                    .map_err(|e| db_err("Insert ideas", e))?;
            }
        }
        tx.commit().map_err(|e| db_err("Commit", e))?;
        Ok(inserted)
    }

    async fn get_idea(&self, id: &str) -> Result<Option<Idea>> {
        let conn = self.lock()?;
        Self::find_idea(&conn, id)
    }

    async fn recent_ideas(&self, publication_id: &str, since: i64) -> Result<Vec<Idea>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "{IDEA_SELECT} WHERE publication_id = ?1 AND created_at >= ?2 ORDER BY created_at DESC, id"
            ))
            .map_err(|e| db_err("Recent ideas", e))?;
        let rows = stmt
            .query_map(params![publication_id, since], row_to_idea)
            .map_err(|e| db_err("Recent ideas", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("Recent ideas", e))
    }

    async fn update_idea_status(&self, id: &str, status: IdeaStatus) -> Result<Option<Idea>> {
        let conn = self.lock()?;
        let Some(current) = Self::find_idea(&conn, id)? else {
            return Ok(None);
        };
        if current.status == status {
            return Ok(Some(current));
        }
        if !current.status.can_transition_to(status) {
            return Err(ScoutError::InvalidTransition(format!(
                "idea {id}: {} → {}",
                current.status.as_str(),
                status.as_str()
            )));
        }
        conn.execute(
            "UPDATE ideas SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now_epoch(), id],
        )
        .map_err(|e| db_err("Update idea status", e))?;
        Self::find_idea(&conn, id)
    }

    async fn promote_idea(&self, id: &str, session_id: &str) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE ideas SET status = 'promoted', session_id = ?1, updated_at = ?2
                 WHERE id = ?3 AND status IN ('new', 'reviewed')",
                params![session_id, now_epoch(), id],
            )
            .map_err(|e| db_err("Promote idea", e))?;
        if changed > 0 {
            return Ok(());
        }
        match Self::find_idea(&conn, id)? {
            // Re-promotion to the same session is a no-op.
            Some(idea) if idea.status == IdeaStatus::Promoted && idea.session_id.as_deref() == Some(session_id) => Ok(()),
            Some(idea) => Err(ScoutError::InvalidTransition(format!(
                "idea {id}: {} → promoted",
                idea.status.as_str()
            ))),
            None => Err(ScoutError::database(format!("Promote idea: {id} not found"))),
        }
    }

    async fn count_ideas(&self, publication_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM ideas WHERE publication_id = ?1",
                [publication_id],
                |row| row.get(0),
            )
            .map_err(|e| db_err("Count ideas", e))?;
        Ok(count as usize)
    }
}

#[async_trait]
impl SessionLedger for SqliteStore {
    async fn count_completed_sessions_since(&self, publication_id: &str, since: i64) -> Result<u32> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM writing_sessions
                 WHERE publication_id = ?1 AND status = 'completed' AND updated_at >= ?2",
                params![publication_id, since],
                |row| row.get(0),
            )
            .map_err(|e| db_err("Count sessions", e))?;
        Ok(count as u32)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;

    pub(crate) fn temp_store() -> SqliteStore {
        SqliteStore::open(&PathBuf::from(":memory:")).unwrap()
    }

    pub(crate) fn publication(id: &str, next_scout_at: Option<i64>) -> Publication {
        Publication {
            id: id.to_string(),
            user_id: "user-1".into(),
            name: format!("Publication {id}"),
            writing_tone: Some("plain".into()),
            default_author: "Editor".into(),
            auto_publish_mode: AutoPublishMode::Draft,
            cadence_posts_per_week: 3,
            scout_schedule: ScoutSchedule::Daily { hour: 8 },
            timezone: "UTC".into(),
            next_scout_at,
            created_at: 1_700_000_000,
            updated_at: 1_700_000_000,
        }
    }

    fn new_idea(id: &str, publication_id: &str) -> NewIdea {
        NewIdea {
            id: id.to_string(),
            publication_id: publication_id.to_string(),
            topic_id: None,
            title: format!("Title {id}"),
            angle: "angle".into(),
            summary: "summary".into(),
            sources: vec![IdeaSource {
                url: "https://example.com/a".into(),
                title: "A".into(),
                snippet: "snippet".into(),
            }],
            relevance_score: 0.5,
        }
    }

    #[tokio::test]
    async fn test_publication_roundtrip() {
        let store = temp_store();
        store.insert_publication(&publication("p1", Some(100))).unwrap();
        let loaded = store.get_publication("p1").await.unwrap().unwrap();
        assert_eq!(loaded, publication("p1", Some(100)));
        assert!(store.get_publication("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_schedule_loads_as_default() {
        let store = temp_store();
        let mut p = publication("p1", None);
        p.scout_schedule = ScoutSchedule::TimesPerDay { count: 3 };
        store.insert_publication(&p).unwrap();
        store.set_raw_schedule("p1", Some("{oops"), None).unwrap();
        let loaded = store.get_publication("p1").await.unwrap().unwrap();
        assert_eq!(loaded.scout_schedule, ScoutSchedule::Daily { hour: 8 });
        assert_eq!(loaded.timezone, "UTC");
    }

    #[tokio::test]
    async fn test_due_and_unscheduled_queries() {
        let store = temp_store();
        store.insert_publication(&publication("due", Some(100))).unwrap();
        store.insert_publication(&publication("exact", Some(200))).unwrap();
        store.insert_publication(&publication("later", Some(300))).unwrap();
        store.insert_publication(&publication("null", None)).unwrap();

        let due: Vec<_> = store.list_due(200).await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(due, vec!["due", "exact"]);

        let unscheduled = store.list_unscheduled().await.unwrap();
        assert_eq!(unscheduled.len(), 1);
        assert_eq!(unscheduled[0].id, "null");

        store.set_next_scout_at("due", 999).await.unwrap();
        let due: Vec<_> = store.list_due(200).await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(due, vec!["exact"]);
    }

    #[tokio::test]
    async fn test_insert_if_absent_is_idempotent() {
        let store = temp_store();
        let batch = vec![new_idea("i1", "p1"), new_idea("i2", "p1")];
        assert_eq!(store.insert_ideas_if_absent(&batch).await.unwrap(), 2);
        assert_eq!(store.insert_ideas_if_absent(&batch).await.unwrap(), 0);
        assert_eq!(store.count_ideas("p1").await.unwrap(), 2);

        let idea = store.get_idea("i1").await.unwrap().unwrap();
        assert_eq!(idea.status, IdeaStatus::New);
        assert_eq!(idea.sources.len(), 1);
    }

    #[tokio::test]
    async fn test_status_transitions_enforced() {
        let store = temp_store();
        store.insert_ideas_if_absent(&[new_idea("i1", "p1")]).await.unwrap();

        let reviewed = store.update_idea_status("i1", IdeaStatus::Reviewed).await.unwrap().unwrap();
        assert_eq!(reviewed.status, IdeaStatus::Reviewed);

        store.promote_idea("i1", "s1").await.unwrap();
        // Same session again is fine
        store.promote_idea("i1", "s1").await.unwrap();
        // Different session is not
        assert!(matches!(
            store.promote_idea("i1", "s2").await,
            Err(ScoutError::InvalidTransition(_))
        ));
        assert!(matches!(
            store.update_idea_status("i1", IdeaStatus::Reviewed).await,
            Err(ScoutError::InvalidTransition(_))
        ));
        let dismissed = store.update_idea_status("i1", IdeaStatus::Dismissed).await.unwrap().unwrap();
        assert_eq!(dismissed.status, IdeaStatus::Dismissed);
        assert!(store.update_idea_status("nope", IdeaStatus::Reviewed).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_completed_session_count_window() {
        let store = temp_store();
        store.record_session("s1", "p1", None, "completed", 1_000).unwrap();
        store.record_session("s2", "p1", None, "completed", 2_000).unwrap();
        store.record_session("s3", "p1", None, "active", 2_000).unwrap();
        store.record_session("s4", "p2", None, "completed", 2_000).unwrap();
        assert_eq!(store.count_completed_sessions_since("p1", 1_500).await.unwrap(), 1);
        assert_eq!(store.count_completed_sessions_since("p1", 0).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_schedule() {
        let store = temp_store();
        store.insert_publication(&publication("p1", None)).unwrap();
        let schedule = ScoutSchedule::EveryNDays { days: 3, hour: 6 };
        assert!(store.update_schedule("p1", &schedule, "Asia/Tokyo", 5_000).await.unwrap());
        assert!(!store.update_schedule("nope", &schedule, "UTC", 5_000).await.unwrap());
        let loaded = store.get_publication("p1").await.unwrap().unwrap();
        assert_eq!(loaded.scout_schedule, schedule);
        assert_eq!(loaded.timezone, "Asia/Tokyo");
        assert_eq!(loaded.next_scout_at, Some(5_000));
    }
}

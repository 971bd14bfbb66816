//! The discovery workflow and a local engine that runs it.
//!
//! One run: load context → discover → store ideas → auto-write. Every step is
//! safe to repeat (deterministic idea ids, insert-if-absent, deterministic
//! session id, promotion last), so a failed run is simply run again.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;

use pubscout_core::config::WorkflowConfig;
use pubscout_core::error::{Result, ScoutError};
use pubscout_core::traits::{Discoverer, IdeaRepository, PublicationStore, WorkflowEngine};
use pubscout_core::types::{IdeaBrief, PublicationContext, ScoutParams};

use crate::autowrite::AutoWriter;
use crate::ideas::{deterministic_id, store_ideas};

/// Ideas younger than this are handed to discovery for de-duplication.
pub const RECENT_IDEAS_WINDOW_SECS: i64 = 7 * 24 * 3600;

/// Finished runs kept for `status`/`wait`; older ones are evicted on `create`.
pub const FINISHED_RUN_RETENTION: usize = 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoutRunSummary {
    pub publication_id: String,
    pub ideas_found: usize,
    pub ideas_stored: usize,
    pub written: u32,
    pub title: Option<String>,
}

pub struct ScoutWorkflow {
    publications: Arc<dyn PublicationStore>,
    ideas: Arc<dyn IdeaRepository>,
    discoverer: Arc<dyn Discoverer>,
    auto_writer: AutoWriter,
}

impl ScoutWorkflow {
    pub fn new(
        publications: Arc<dyn PublicationStore>,
        ideas: Arc<dyn IdeaRepository>,
        discoverer: Arc<dyn Discoverer>,
        auto_writer: AutoWriter,
    ) -> Self {
        Self {
            publications,
            ideas,
            discoverer,
            auto_writer,
        }
    }

    pub async fn load_context(&self, publication_id: &str, now: i64) -> Result<PublicationContext> {
        let publication = self
            .publications
            .get_publication(publication_id)
            .await?
            .ok_or_else(|| ScoutError::PublicationNotFound(publication_id.to_string()))?;
        let topics = self.publications.list_active_topics(publication_id).await?;
        let recent_ideas = self
            .ideas
            .recent_ideas(publication_id, now - RECENT_IDEAS_WINDOW_SECS)
            .await?;
        Ok(PublicationContext {
            publication,
            topics,
            recent_ideas,
        })
    }

    pub async fn run(&self, params: &ScoutParams) -> Result<ScoutRunSummary> {
        self.run_at(params, Utc::now().timestamp()).await
    }

    pub async fn run_at(&self, params: &ScoutParams, now: i64) -> Result<ScoutRunSummary> {
        let publication_id = params.publication_id.as_str();
        tracing::info!("[workflow] {publication_id}: run started ({})", params.triggered_by);

        let context = self.load_context(publication_id, now).await?;
        let found = self.discoverer.discover(&context).await?;
        let ideas_found = found.len();
        let briefs = drop_settled(publication_id, found, &context);

        if briefs.is_empty() {
            tracing::info!("[workflow] {publication_id}: no new ideas ({ideas_found} found)");
            return Ok(ScoutRunSummary {
                publication_id: publication_id.to_string(),
                ideas_found,
                ..ScoutRunSummary::default()
            });
        }

        let stored = store_ideas(self.ideas.as_ref(), publication_id, &briefs, &context.topics).await?;
        let outcome = self
            .auto_writer
            .auto_write_top_idea(&context.publication, &briefs, &stored.idea_ids, now)
            .await?;

        tracing::info!(
            "[workflow] {publication_id}: {} idea(s) stored, {} written",
            stored.count,
            outcome.written
        );
        Ok(ScoutRunSummary {
            publication_id: publication_id.to_string(),
            ideas_found,
            ideas_stored: stored.count,
            written: outcome.written,
            title: outcome.title,
        })
    }
}

/// Drop briefs already acted on (promoted or dismissed). Briefs matching an
/// idea that is still open are kept so a re-run can finish what it started.
fn drop_settled(
    publication_id: &str,
    briefs: Vec<IdeaBrief>,
    context: &PublicationContext,
) -> Vec<IdeaBrief> {
    let settled: Vec<&str> = context
        .recent_ideas
        .iter()
        .filter(|idea| idea.status.is_terminal())
        .map(|idea| idea.id.as_str())
        .collect();
    briefs
        .into_iter()
        .filter(|brief| {
            let id = deterministic_id(publication_id, &brief.title, &brief.angle);
            !settled.contains(&id.as_str())
        })
        .collect()
}

/// State of one execution started through [`LocalWorkflowEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Running { attempt: u32 },
    Completed(ScoutRunSummary),
    Failed(String),
}

impl RunStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, RunStatus::Running { .. })
    }
}

/// Run handles in creation order.
#[derive(Default)]
struct RunTable {
    runs: HashMap<String, watch::Receiver<RunStatus>>,
    order: VecDeque<String>,
}

impl RunTable {
    /// Drop the oldest finished runs until at most `keep` finished remain.
    fn evict_finished(&mut self, keep: usize) {
        let finished = self
            .runs
            .values()
            .filter(|rx| rx.borrow().is_finished())
            .count();
        let mut excess = finished.saturating_sub(keep);
        if excess == 0 {
            return;
        }
        let runs = &mut self.runs;
        self.order.retain(|id| {
            let done = excess > 0 && runs.get(id).is_some_and(|rx| rx.borrow().is_finished());
            if done {
                runs.remove(id);
                excess -= 1;
            }
            !done
        });
    }
}

/// Runs each workflow execution on its own tokio task, with whole-run retries.
pub struct LocalWorkflowEngine {
    workflow: Arc<ScoutWorkflow>,
    max_attempts: u32,
    retry_backoff: Duration,
    retention: usize,
    table: Mutex<RunTable>,
}

impl LocalWorkflowEngine {
    pub fn new(workflow: Arc<ScoutWorkflow>, config: &WorkflowConfig) -> Self {
        Self::with_retries(
            workflow,
            config.max_attempts,
            Duration::from_secs(config.retry_backoff_secs),
        )
    }

    pub fn with_retries(workflow: Arc<ScoutWorkflow>, max_attempts: u32, retry_backoff: Duration) -> Self {
        Self {
            workflow,
            max_attempts: max_attempts.max(1),
            retry_backoff,
            retention: FINISHED_RUN_RETENTION,
            table: Mutex::new(RunTable::default()),
        }
    }

    /// Keep at most `retention` finished runs.
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    pub fn status(&self, id: &str) -> Option<RunStatus> {
        let table = self.table.lock().ok()?;
        table.runs.get(id).map(|rx| rx.borrow().clone())
    }

    /// Ids of tracked runs, oldest first.
    pub fn run_ids(&self) -> Vec<String> {
        self.table
            .lock()
            .map(|table| table.order.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Wait until the run finishes. `None` for an unknown or evicted id.
    pub async fn wait(&self, id: &str) -> Option<RunStatus> {
        let mut rx = {
            let table = self.table.lock().ok()?;
            table.runs.get(id)?.clone()
        };
        let status = rx.wait_for(RunStatus::is_finished).await.ok()?.clone();
        Some(status)
    }
}

#[async_trait]
impl WorkflowEngine for LocalWorkflowEngine {
    async fn create(&self, id: &str, params: ScoutParams) -> Result<()> {
        let (tx, rx) = watch::channel(RunStatus::Running { attempt: 1 });
        {
            let mut table = self
                .table
                .lock()
                .map_err(|e| ScoutError::workflow(format!("Lock: {e}")))?;
            if table.runs.contains_key(id) {
                return Err(ScoutError::workflow(format!("run {id} already exists")));
            }
            table.evict_finished(self.retention);
            table.runs.insert(id.to_string(), rx);
            table.order.push_back(id.to_string());
        }

        let workflow = Arc::clone(&self.workflow);
        let max_attempts = self.max_attempts;
        let backoff = self.retry_backoff;
        let run_id = id.to_string();

        tokio::spawn(async move {
            let mut attempt = 1;
            let final_status = loop {
                let _ = tx.send(RunStatus::Running { attempt });
                match workflow.run(&params).await {
                    Ok(summary) => break RunStatus::Completed(summary),
                    Err(e @ ScoutError::PublicationNotFound(_)) => {
                        tracing::error!("[workflow] {run_id} failed: {e}");
                        break RunStatus::Failed(e.to_string());
                    }
                    Err(e) if attempt < max_attempts => {
                        tracing::warn!(
                            "[workflow] {run_id} attempt {attempt}/{max_attempts} failed: {e}"
                        );
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                    }
                    Err(e) => {
                        tracing::error!("[workflow] {run_id} failed after {attempt} attempt(s): {e}");
                        break RunStatus::Failed(e.to_string());
                    }
                }
            };
            let _ = tx.send(final_status);
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeWriter, brief, publication, store};
    use pubscout_core::types::{AutoPublishMode, DispatchMessage, IdeaStatus};
    use pubscout_scheduler::SqliteStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    const NOW: i64 = 1_718_206_200;

    /// Returns a fixed list; fails the first `failures` calls.
    struct FakeDiscoverer {
        briefs: Vec<IdeaBrief>,
        failures: AtomicU32,
        calls: AtomicU32,
    }

    impl FakeDiscoverer {
        fn new(briefs: Vec<IdeaBrief>) -> Self {
            Self {
                briefs,
                failures: AtomicU32::new(0),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Discoverer for FakeDiscoverer {
        async fn discover(&self, _context: &PublicationContext) -> Result<Vec<IdeaBrief>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(ScoutError::Discovery("search backend timed out".into()));
            }
            Ok(self.briefs.clone())
        }
    }

    fn workflow(store: &Arc<SqliteStore>, discoverer: Arc<FakeDiscoverer>) -> ScoutWorkflow {
        let auto = AutoWriter::new(store.clone(), store.clone(), Arc::new(FakeWriter::default()));
        ScoutWorkflow::new(store.clone(), store.clone(), discoverer, auto)
    }

    #[tokio::test]
    async fn test_run_stores_and_writes() {
        let store = Arc::new(store());
        store.insert_publication(&publication("pub-1")).unwrap();
        let discoverer = Arc::new(FakeDiscoverer::new(vec![brief("A", 0.3), brief("B", 0.6)]));
        let flow = workflow(&store, discoverer);

        let summary = flow.run_at(&DispatchMessage::cron("pub-1"), NOW).await.unwrap();
        assert_eq!(summary.ideas_found, 2);
        assert_eq!(summary.ideas_stored, 2);
        assert_eq!(summary.written, 1);
        assert_eq!(summary.title.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_rerun_skips_promoted_ideas() {
        let store = Arc::new(store());
        let mut p = publication("pub-1");
        p.auto_publish_mode = AutoPublishMode::Draft;
        store.insert_publication(&p).unwrap();
        let discoverer = Arc::new(FakeDiscoverer::new(vec![brief("A", 0.3), brief("B", 0.6)]));
        let flow = workflow(&store, discoverer);

        flow.run_at(&DispatchMessage::cron("pub-1"), NOW).await.unwrap();
        let again = flow.run_at(&DispatchMessage::cron("pub-1"), NOW + 60).await.unwrap();
        // "B" was promoted; "A" is still open and gets written now
        assert_eq!(again.title.as_deref(), Some("A"));
        assert_eq!(store.count_ideas("pub-1").await.unwrap(), 2);

        let ids: Vec<_> = store
            .recent_ideas("pub-1", 0)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.status)
            .collect();
        assert!(ids.iter().all(|s| *s == IdeaStatus::Promoted));
    }

    #[tokio::test]
    async fn test_unknown_publication() {
        let store = Arc::new(store());
        let flow = workflow(&store, Arc::new(FakeDiscoverer::new(vec![])));
        assert!(matches!(
            flow.run_at(&DispatchMessage::manual("ghost"), NOW).await,
            Err(ScoutError::PublicationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_engine_rejects_duplicate_ids_and_retries() {
        let store = Arc::new(store());
        store.insert_publication(&publication("pub-1")).unwrap();
        let discoverer = Arc::new(FakeDiscoverer::new(vec![brief("A", 0.3)]));
        discoverer.failures.store(1, Ordering::SeqCst);
        let flow = Arc::new(workflow(&store, discoverer.clone()));
        let engine = LocalWorkflowEngine::with_retries(flow, 2, Duration::ZERO);

        engine.create("run-1", DispatchMessage::cron("pub-1")).await.unwrap();
        assert!(engine.create("run-1", DispatchMessage::cron("pub-1")).await.is_err());

        let status = engine.wait("run-1").await.unwrap();
        assert!(matches!(status, RunStatus::Completed(ref s) if s.ideas_stored == 1));
        assert_eq!(discoverer.calls.load(Ordering::SeqCst), 2);
        assert!(engine.wait("unknown").await.is_none());
    }

    #[tokio::test]
    async fn test_engine_gives_up() {
        let store = Arc::new(store());
        store.insert_publication(&publication("pub-1")).unwrap();
        let discoverer = Arc::new(FakeDiscoverer::new(vec![]));
        discoverer.failures.store(5, Ordering::SeqCst);
        let flow = Arc::new(workflow(&store, discoverer.clone()));
        let engine = LocalWorkflowEngine::with_retries(flow, 2, Duration::ZERO);

        engine.create("run-1", DispatchMessage::cron("pub-1")).await.unwrap();
        assert!(matches!(engine.wait("run-1").await, Some(RunStatus::Failed(_))));
        assert_eq!(discoverer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_engine_evicts_oldest_finished_runs() {
        let store = Arc::new(store());
        store.insert_publication(&publication("pub-1")).unwrap();
        let flow = Arc::new(workflow(&store, Arc::new(FakeDiscoverer::new(vec![]))));
        let engine = LocalWorkflowEngine::with_retries(flow, 1, Duration::ZERO).with_retention(3);

        for i in 0..10 {
            let id = format!("run-{i}");
            engine.create(&id, DispatchMessage::cron("pub-1")).await.unwrap();
            assert!(matches!(engine.wait(&id).await, Some(RunStatus::Completed(_))));
        }

        // Three finished survivors plus the run created last
        assert_eq!(engine.run_ids(), vec!["run-6", "run-7", "run-8", "run-9"]);
        assert!(engine.status("run-0").is_none());
        assert!(engine.wait("run-5").await.is_none());
        assert!(matches!(engine.status("run-9"), Some(RunStatus::Completed(_))));
    }
}

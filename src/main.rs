//! # PubScout
//!
//! Schedules content discovery per publication and dispatches scout runs.
//!
//! Usage:
//!   pubscout serve                                   # Scheduler + consumer + trigger API
//!   pubscout tick                                    # One scheduler pass, run what it dispatched
//!   pubscout next-run --schedule '{"type":"daily","hour":8}' --timezone Europe/Berlin
//!   pubscout reschedule pub-1 --schedule '{"type":"times_per_day","count":2}' --timezone UTC

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use pubscout_core::config::ScoutConfig;
use pubscout_core::schedule::{ScoutSchedule, validate_timezone};
use pubscout_scheduler::engine::{spawn_consumer, spawn_scheduler};
use pubscout_scheduler::scanner::reschedule;
use pubscout_scheduler::{DispatchConsumer, MemoryQueue, RetryPolicy, SqliteStore, run_tick, upcoming_runs};
use pubscout_scout::{
    AutoWriter, HttpDiscoverer, HttpWriterClient, LocalWorkflowEngine, RunStatus, ScoutWorkflow,
};

#[derive(Parser)]
#[command(name = "pubscout", version, about = "Content-discovery scheduler and dispatch pipeline")]
struct Cli {
    /// Config file (default: $PUBSCOUT_CONFIG or ~/.pubscout/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler, the queue consumer and the trigger API
    Serve {
        /// Override the gateway port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run a single scheduler tick and print the report
    Tick,
    /// Preview upcoming run times for a schedule
    NextRun {
        /// Schedule JSON
        #[arg(long)]
        schedule: String,
        #[arg(long, default_value = "UTC")]
        timezone: String,
        /// Reference time (epoch seconds, default now)
        #[arg(long)]
        after: Option<i64>,
        #[arg(long, default_value = "5")]
        count: usize,
    },
    /// Replace a publication's schedule and recompute its next run
    Reschedule {
        publication_id: String,
        #[arg(long)]
        schedule: String,
        #[arg(long)]
        timezone: String,
    },
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        "pubscout=debug,pubscout_scheduler=debug,pubscout_scout=debug,pubscout_gateway=debug,tower_http=debug"
    } else {
        "pubscout=info,pubscout_scheduler=info,pubscout_scout=info,pubscout_gateway=info"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> Result<ScoutConfig> {
    let config = match path {
        Some(path) => {
            let mut config = ScoutConfig::load_from(path)?;
            config.apply_env_overrides();
            config
        }
        None => ScoutConfig::load()?,
    };
    Ok(config)
}

fn open_store(config: &ScoutConfig) -> Result<Arc<SqliteStore>> {
    let db_path = shellexpand::tilde(&config.database.path).to_string();
    if let Some(parent) = Path::new(&db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let store = SqliteStore::open(Path::new(&db_path))
        .with_context(|| format!("opening database {db_path}"))?;
    Ok(Arc::new(store))
}

fn format_epoch(epoch: i64) -> String {
    chrono::DateTime::from_timestamp(epoch, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| "out of range".into())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json);

    match cli.command {
        Command::Serve { port } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(port) = port {
                config.gateway.port = port;
            }
            serve(config).await
        }
        Command::Tick => {
            let config = load_config(cli.config.as_deref())?;
            tick_once(config).await
        }
        Command::NextRun { schedule, timezone, after, count } => {
            let schedule = ScoutSchedule::from_json(&schedule)?;
            let tz = validate_timezone(&timezone)?;
            let after = after.unwrap_or_else(|| chrono::Utc::now().timestamp());
            for run in upcoming_runs(&schedule, tz, after, count) {
                println!("{run}  {}", format_epoch(run));
            }
            Ok(())
        }
        Command::Reschedule { publication_id, schedule, timezone } => {
            let config = load_config(cli.config.as_deref())?;
            let store = open_store(&config)?;
            let schedule = ScoutSchedule::from_json(&schedule)?;
            let next = reschedule(
                store.as_ref(),
                &publication_id,
                &schedule,
                &timezone,
                chrono::Utc::now().timestamp(),
            )
            .await?;
            println!("{publication_id}: next run {next}  {}", format_epoch(next));
            Ok(())
        }
    }
}

/// Wire the HTTP clients, the workflow and the local engine over one store.
fn build_pipeline(
    config: &ScoutConfig,
    store: &Arc<SqliteStore>,
) -> Result<(Arc<LocalWorkflowEngine>, DispatchConsumer)> {
    let writer = Arc::new(HttpWriterClient::new(&config.writer)?);
    let discoverer = Arc::new(HttpDiscoverer::new(&config.discovery)?);
    let auto_writer = AutoWriter::new(store.clone(), store.clone(), writer);
    let workflow = Arc::new(ScoutWorkflow::new(store.clone(), store.clone(), discoverer, auto_writer));
    let engine = Arc::new(LocalWorkflowEngine::new(workflow, &config.workflow));
    let consumer = DispatchConsumer::new(engine.clone());
    Ok((engine, consumer))
}

/// One scheduler pass, then drain the queue and wait for every run it started.
async fn tick_once(config: ScoutConfig) -> Result<()> {
    let store = open_store(&config)?;
    let queue = MemoryQueue::from_config(&config.queue);
    let policy = RetryPolicy::from(&config.retry);
    let (engine, consumer) = build_pipeline(&config, &store)?;

    let report = run_tick(store.as_ref(), &queue, chrono::Utc::now().timestamp(), &policy).await?;

    loop {
        let batch = queue.receive(config.queue.batch_size.max(1));
        if batch.is_empty() {
            break;
        }
        consumer.process_batch(&batch).await;
    }

    let mut runs = serde_json::Map::new();
    for id in engine.run_ids() {
        let status = match engine.wait(&id).await {
            Some(RunStatus::Completed(summary)) => serde_json::json!({
                "status": "completed",
                "ideasStored": summary.ideas_stored,
                "written": summary.written,
            }),
            Some(RunStatus::Failed(e)) => serde_json::json!({"status": "failed", "error": e}),
            _ => serde_json::json!({"status": "unknown"}),
        };
        runs.insert(id, status);
    }

    println!("{}", serde_json::to_string_pretty(&serde_json::json!({
        "backfilled": report.backfilled,
        "due": report.due,
        "enqueued": report.enqueued,
        "notAdvanced": report.not_advanced,
        "missed": report.missed,
        "runs": runs,
    }))?);
    Ok(())
}

async fn serve(config: ScoutConfig) -> Result<()> {
    let store = open_store(&config)?;
    let queue = MemoryQueue::from_config(&config.queue);
    let policy = RetryPolicy::from(&config.retry);

    let (_, consumer) = build_pipeline(&config, &store)?;

    tokio::spawn(spawn_scheduler(
        store.clone(),
        Arc::new(queue.clone()),
        config.scheduler.tick_interval_secs,
        policy.clone(),
    ));
    tokio::spawn(spawn_consumer(
        queue.clone(),
        consumer,
        config.queue.batch_size,
        Duration::from_millis(config.queue.poll_interval_ms),
    ));

    let state = pubscout_gateway::AppState::new(config.gateway.clone(), store, Arc::new(queue.clone()), policy);

    tokio::select! {
        result = pubscout_gateway::start(state) => result?,
        _ = tokio::signal::ctrl_c() => {
            let stats = queue.stats();
            tracing::info!(
                "[queue] shutting down with {} pending, {} in flight, {} dead",
                stats.pending,
                stats.in_flight,
                stats.dead
            );
        }
    }
    Ok(())
}

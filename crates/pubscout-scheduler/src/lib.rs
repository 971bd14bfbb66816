//! # PubScout Scheduler
//!
//! Decides when each publication's discovery job runs and hands due jobs to
//! the dispatch queue.
//!
//! - `calendar`: timezone/DST-correct next-run computation
//! - `scanner`: per-tick backfill, due scan, advance-then-enqueue, manual triggers
//! - `consumer`: queue message → workflow execution
//! - `queue`: in-process at-least-once queue
//! - `persistence`: SQLite store for publications, topics, ideas, sessions
//! - `engine`: tick and consumer loops

pub mod calendar;
pub mod consumer;
pub mod engine;
pub mod persistence;
pub mod queue;
pub mod retry;
pub mod scanner;

pub use calendar::{compute_next_run, next_run_for_row, upcoming_runs};
pub use consumer::DispatchConsumer;
pub use persistence::SqliteStore;
pub use queue::MemoryQueue;
pub use retry::RetryPolicy;
pub use scanner::{TickReport, run_tick};

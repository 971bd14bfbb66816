//! # PubScout Core
//!
//! Shared building blocks for the content-discovery pipeline:
//! the publication/idea data model, the tagged recurrence rule,
//! configuration, the error taxonomy, and the traits every external
//! collaborator (relational store, durable queue, workflow engine,
//! writing service, discovery backend) is reached through.
//!
//! ## Architecture
//! ```text
//! cron tick ─▶ DueTenantScanner ─(advance, then enqueue)─▶ DispatchQueue
//!                                                           │
//!                     WorkflowEngine ◀── DispatchConsumer ◀─┘
//!                          │
//!                          ▼
//!        discover ─▶ IdeaStore ─▶ CadenceGate / AutoWrite ─▶ WriterService
//! ```

pub mod config;
pub mod error;
pub mod schedule;
pub mod traits;
pub mod types;

pub use config::ScoutConfig;
pub use error::{Result, ScoutError};
pub use schedule::ScoutSchedule;

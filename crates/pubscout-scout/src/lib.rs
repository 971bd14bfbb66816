//! # PubScout Scout
//!
//! What runs once a publication has been dispatched: discovery, idempotent
//! idea storage, and the cadence-gated auto-write of the best idea.

pub mod autowrite;
pub mod cadence;
pub mod client;
pub mod ideas;
pub mod seed;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

pub use autowrite::{AutoWriteOutcome, AutoWriter};
pub use client::{HttpDiscoverer, HttpWriterClient};
pub use ideas::{StoredIdeas, deterministic_id, store_ideas};
pub use workflow::{LocalWorkflowEngine, RunStatus, ScoutRunSummary, ScoutWorkflow};

//! Trait seams for every external collaborator.

pub mod discovery;
pub mod queue;
pub mod store;
pub mod workflow;
pub mod writer;

pub use discovery::Discoverer;
pub use queue::{Delivery, DispatchQueue};
pub use store::{IdeaRepository, PublicationStore, SessionLedger};
pub use workflow::WorkflowEngine;
pub use writer::WriterService;

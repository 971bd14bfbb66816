//! # PubScout Gateway
//!
//! Manual trigger API: enqueue one publication or all of them immediately,
//! without changing their schedules.

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};

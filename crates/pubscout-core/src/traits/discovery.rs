//! Discovery backend (search + ranking) interface.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{IdeaBrief, PublicationContext};

#[async_trait]
pub trait Discoverer: Send + Sync {
    /// Ranked idea briefs for a publication.
    async fn discover(&self, context: &PublicationContext) -> Result<Vec<IdeaBrief>>;
}

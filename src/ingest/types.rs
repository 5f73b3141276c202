// src/ingest/types.rs
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::post::Post;

/// Which collaborator family a source belongs to (the `sources` config list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Forum,
    Web,
    Fixture,
}

/// A source collaborator call failed. Never fatal: the aggregator logs it
/// and treats the call as having returned nothing.
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("{source_name}: request failed: {message}")]
    Transport {
        source_name: &'static str,
        message: String,
    },

    #[error("{source_name}: unreadable response: {message}")]
    Decode {
        source_name: &'static str,
        message: String,
    },
}

#[async_trait::async_trait]
pub trait SourceCollaborator: Send + Sync {
    /// Search with the current keyword set. `forums` only matters to
    /// forum-capable sources.
    async fn search(
        &self,
        keywords: &[String],
        forums: &[String],
    ) -> Result<Vec<Post>, CollectionError>;
    fn name(&self) -> &'static str;
}

//! Artifact storage boundary
//!
//! Storage is optional. When it fails the turn still succeeds; the formatter
//! falls back to inline encoding or a size summary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::artifact::Artifact;

/// Metadata handed to the store alongside each artifact
#[derive(Debug, Clone)]
pub struct StorageMetadata {
    /// Owner (tenant) the artifact belongs to
    pub owner: String,
    /// Conversation thread, when the caller supplied one
    pub thread_id: Option<String>,
    /// Session that produced the artifact
    pub session_key: String,
    /// Prompt of the turn that produced the artifact
    pub prompt: String,
    pub created_at: DateTime<Utc>,
}

/// Persists generated artifacts and returns a retrievable locator
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Store an artifact, returning a URL or path the caller can render
    async fn store(&self, artifact: &Artifact, metadata: &StorageMetadata) -> anyhow::Result<String>;
}

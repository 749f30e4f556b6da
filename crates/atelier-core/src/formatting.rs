//! Formatting of turn results for the caller
//!
//! Each artifact is handed to the configured store when there is one. When
//! storage is absent or fails, small artifacts are embedded as data URIs and
//! large ones are reduced to a size summary so no oversized payload ever
//! reaches the conversation.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::artifact::Artifact;
use crate::config::defaults;
use crate::error::Error;
use crate::provider::TurnResponse;
use crate::storage::{ArtifactStore, StorageMetadata};

/// How one artifact ended up in the output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactRendering {
    /// Delegated to the store, referenced by locator
    Stored { locator: String },
    /// Embedded as a data URI
    Inline,
    /// Too large to embed; only format and size are reported
    Summary,
}

/// Formatted artifacts and usage for one turn
#[derive(Debug, Clone, Default)]
pub struct FormattedTurn {
    pub text: String,
    pub renderings: Vec<ArtifactRendering>,
}

/// Turns provider responses into caller-facing text
#[derive(Clone)]
pub struct ResponseFormatter {
    store: Option<Arc<dyn ArtifactStore>>,
    inline_limit: usize,
}

impl Default for ResponseFormatter {
    fn default() -> Self {
        Self::new(None, defaults::INLINE_LIMIT_BYTES)
    }
}

impl ResponseFormatter {
    /// `inline_limit` bounds the base64 payload length of inline artifacts
    pub fn new(store: Option<Arc<dyn ArtifactStore>>, inline_limit: usize) -> Self {
        Self {
            store,
            inline_limit,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn inline_limit(&self) -> usize {
        self.inline_limit
    }

    /// Render every artifact of `response`, then the token usage line
    ///
    /// Storage failures are logged and never fail the turn.
    pub async fn format_turn(
        &self,
        response: &TurnResponse,
        metadata: &StorageMetadata,
    ) -> FormattedTurn {
        let mut out = FormattedTurn::default();

        if response.artifacts.is_empty() {
            out.text.push_str("No image was generated in this turn.\n");
        }

        for (index, artifact) in response.artifacts.iter().enumerate() {
            if index > 0 {
                let _ = write!(out.text, "\n--- Image {} ---\n", index + 1);
            }
            let rendering = self.render(artifact, metadata).await;
            write_artifact(&mut out.text, artifact, &rendering);
            out.renderings.push(rendering);
        }

        if let Some(usage) = &response.usage {
            let _ = write!(
                out.text,
                "\nTokens used: {} input, {} output\n",
                usage.input_tokens, usage.output_tokens
            );
        }

        out
    }

    async fn render(&self, artifact: &Artifact, metadata: &StorageMetadata) -> ArtifactRendering {
        if let Some(store) = &self.store {
            match store.store(artifact, metadata).await {
                Ok(locator) => {
                    debug!(
                        store = store.name(),
                        session = %metadata.session_key,
                        locator = %locator,
                        "Stored artifact"
                    );
                    return ArtifactRendering::Stored { locator };
                }
                Err(e) => {
                    let err = Error::Storage(e);
                    warn!(
                        store = store.name(),
                        session = %metadata.session_key,
                        error = %err,
                        "Artifact storage failed, falling back to inline"
                    );
                }
            }
        }

        if artifact.encoded_len() <= self.inline_limit {
            ArtifactRendering::Inline
        } else {
            debug!(
                size = artifact.size_bytes(),
                limit = self.inline_limit,
                "Artifact too large to embed inline"
            );
            ArtifactRendering::Summary
        }
    }
}

fn write_artifact(out: &mut String, artifact: &Artifact, rendering: &ArtifactRendering) {
    let size = artifact.size_bytes();
    let _ = match rendering {
        ArtifactRendering::Stored { locator } => write!(
            out,
            "![Generated image]({})\n\nFormat: {}\nSize: {} bytes\n",
            locator, artifact.mime_type, size
        ),
        ArtifactRendering::Inline => write!(
            out,
            "![Generated image]({})\n\nFormat: {}\nSize: {} bytes\n",
            artifact.data_uri(),
            artifact.mime_type,
            size
        ),
        ArtifactRendering::Summary => write!(
            out,
            "[Image generated successfully]\n\nFormat: {}\nSize: {} bytes ({:.1} KB)\n\
             \nNote: Image was generated but is too large to display inline.\n\
             Configure an artifact store to get shareable image URLs.\n",
            artifact.mime_type,
            size,
            size as f64 / 1024.0
        ),
    };
}

/// Format a duration rounded to whole seconds, e.g. "1h2m3s" or "42s"
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs() + u64::from(duration.subsec_millis() >= 500);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

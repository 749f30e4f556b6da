//! Error types for Atelier Core

use std::time::Duration;

use thiserror::Error;

/// Result type alias using Atelier Error
pub type Result<T> = std::result::Result<T, Error>;

/// Atelier error types
///
/// Every message names what went wrong and what the caller can do about it,
/// since these strings are shown to an agent mid-conversation.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Image editing session not found: {0}. Start a new session with action='start'")]
    SessionNotFound(String),

    #[error(
        "Image editing session {key} has expired after {}s of inactivity. Start a new session with action='start'",
        .idle_timeout.as_secs()
    )]
    SessionExpired { key: String, idle_timeout: Duration },

    #[error("Image editing session {0} already exists. Continue it with action='edit' or end it first")]
    SessionExists(String),

    #[error(
        "Maximum number of concurrent sessions ({limit}) reached for {owner}. Please end an existing session first"
    )]
    QuotaExceeded { owner: String, limit: usize },

    #[error("Provider error: {0:#}")]
    Provider(#[source] anyhow::Error),

    #[error("Storage error: {0:#}")]
    Storage(#[source] anyhow::Error),

    #[error("Session manager is shutting down; no new turns are accepted")]
    ShuttingDown,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Stable snake_case name of the error kind, suitable for tool metadata
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "invalid_argument",
            Error::SessionNotFound(_) => "session_not_found",
            Error::SessionExpired { .. } => "session_expired",
            Error::SessionExists(_) => "session_exists",
            Error::QuotaExceeded { .. } => "quota_exceeded",
            Error::Provider(_) => "provider_failure",
            Error::Storage(_) => "storage_failure",
            Error::ShuttingDown => "shutting_down",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
        }
    }

    /// Prompt is longer than the configured limit
    pub(crate) fn prompt_too_long(max_len: usize) -> Self {
        Error::InvalidArgument(format!(
            "prompt exceeds maximum length of {} characters. Please shorten your prompt",
            max_len
        ))
    }
}

/// Tool-specific errors
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Session(#[from] Error),
}

impl ToolError {
    /// Kind of the underlying failure
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::InvalidParams(_) => "invalid_argument",
            ToolError::Session(e) => e.kind(),
        }
    }
}

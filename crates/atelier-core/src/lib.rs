//! Atelier Core - Multi-turn image editing sessions for agent tools
//!
//! This crate provides the session engine behind conversational image tools:
//! - Session management with per-owner quotas and idle expiry
//! - Provider and artifact storage boundaries
//! - Response formatting that keeps oversized images out of the conversation
//! - Tool adapters for explicit-key and owner-keyed addressing

pub mod artifact;
pub mod config;
pub mod error;
pub mod formatting;
pub mod provider;
pub mod session;
pub mod storage;
pub mod tools;

pub use artifact::{Artifact, Usage};
pub use config::{ConfigManager, ImageSessionConfig, defaults};
pub use error::{Error, Result, ToolError};
pub use formatting::{ArtifactRendering, FormattedTurn, ResponseFormatter, format_duration};
pub use provider::{
    AspectRatio, EditSession, ImageEditor, ImageSize, Role, SessionOptions, Turn, TurnOptions,
    TurnResponse,
};
pub use storage::{ArtifactStore, StorageMetadata};

// Session exports
pub use session::{
    CallContext, EndOutcome, ExpiredEditPolicy, QuotaGuard, SessionInfo, SessionKey,
    SessionManager, SessionSummary, StartConflict, TurnOutcome,
};

// Tool exports
pub use tools::{
    ImageSessionRequest, ImageSessionTool, SessionAction, Tool, ToolDefinition, ToolOutput,
    ToolRegistry,
};

//! Session module - multi-turn image editing sessions
//!
//! A session wraps one stateful provider conversation so a caller can
//! refine an image over several turns. Key components:
//!
//! - `SessionManager`: start/edit/end against a shared session table
//! - `QuotaGuard`: per-owner cap on concurrently open sessions
//! - the reaper: a background task evicting sessions idle past the timeout
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  SessionManager                   │
//! │                                                   │
//! │  start / edit / end ─────┐                        │
//! │                          ▼                        │
//! │  ┌────────────────────────────────────────────┐   │
//! │  │ RwLock<SessionTable>                       │   │
//! │  │   entries: key -> { owner, slot, recency } │   │
//! │  │   quota:   owner -> open sessions          │   │
//! │  └────────────────────────────────────────────┘   │
//! │          ▲                      │                 │
//! │   reaper (weak ref)       Arc<LiveSession> ──────────▶ EditSession
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! The table lock is only held for bookkeeping. Provider calls happen on the
//! `LiveSession`, whose own async lock runs turns one at a time.
//!
//! # Example Usage
//!
//! ```ignore
//! use atelier_core::session::{CallContext, SessionManager};
//!
//! let manager = SessionManager::new(editor, ImageSessionConfig::explicit_key())?;
//! let ctx = CallContext::new("acme");
//!
//! let first = manager.start(&ctx, "k1", Some("draw a cat"), &options).await?;
//! let second = manager.edit(&ctx, "k1", "make it blue", &options).await?;
//! let summary = manager.end(&ctx, "k1").await?;
//! ```

mod entry;
mod manager;
mod quota;
mod reaper;
mod table;
mod types;

pub use manager::SessionManager;
pub use quota::QuotaGuard;
pub use types::{
    CallContext, DEFAULT_OWNER, EndOutcome, ExpiredEditPolicy, SessionInfo, SessionKey,
    SessionSummary, StartConflict, TurnOutcome,
};

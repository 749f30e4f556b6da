//! Session key strategies
//!
//! The two addressing modes differ only in where a session key comes from.
//! Explicit keys are minted on start and handed back to the caller; owner
//! keys are derived from the caller's identity, so the caller never sees one.

use uuid::Uuid;

use crate::error::ToolError;
use crate::session::{CallContext, SessionKey};

/// Derives the session key for each action
pub trait SessionKeys: Send + Sync + 'static {
    /// Key for a new session
    fn start_key(&self, ctx: &CallContext) -> SessionKey;

    /// Key addressed by `edit` / `end`
    fn lookup_key(&self, ctx: &CallContext, session_id: Option<&str>) -> Result<SessionKey, ToolError>;

    /// Whether keys are shown to the caller
    fn exposes_key(&self) -> bool;
}

/// Caller-held session ids; a fresh UUID per start
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplicitKeys;

impl SessionKeys for ExplicitKeys {
    fn start_key(&self, _ctx: &CallContext) -> SessionKey {
        Uuid::new_v4().to_string()
    }

    fn lookup_key(&self, _ctx: &CallContext, session_id: Option<&str>) -> Result<SessionKey, ToolError> {
        match session_id.map(str::trim) {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => Err(ToolError::InvalidParams(
                "session_id is required for this action. Use the id returned by action='start'".into(),
            )),
        }
    }

    fn exposes_key(&self) -> bool {
        true
    }
}

/// One session per owner, or per owner and thread when a thread id is known
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnerKeys;

impl OwnerKeys {
    /// `owner` or `owner:thread`; backslashes and colons inside either part
    /// are escaped so no two contexts share a key
    fn key(ctx: &CallContext) -> SessionKey {
        let owner = escape(ctx.owner());
        match ctx.thread_id() {
            Some(thread) => format!("{}:{}", owner, escape(thread)),
            None => owner,
        }
    }
}

fn escape(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for c in part.chars() {
        if matches!(c, '\\' | ':') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl SessionKeys for OwnerKeys {
    fn start_key(&self, ctx: &CallContext) -> SessionKey {
        Self::key(ctx)
    }

    fn lookup_key(&self, ctx: &CallContext, _session_id: Option<&str>) -> Result<SessionKey, ToolError> {
        Ok(Self::key(ctx))
    }

    fn exposes_key(&self) -> bool {
        false
    }
}

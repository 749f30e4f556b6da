//! Session types shared by the manager, the reaper, and the tool adapters

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::provider::TurnResponse;

/// Unique identifier for a session
pub type SessionKey = String;

/// Owner used when the caller supplies none
pub const DEFAULT_OWNER: &str = "default";

/// Out-of-band identity of the caller, supplied by the agent runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    owner: String,
    thread_id: Option<String>,
}

impl CallContext {
    /// Create a context for `owner`; an empty owner maps to [`DEFAULT_OWNER`]
    pub fn new(owner: impl Into<String>) -> Self {
        let owner = owner.into();
        Self {
            owner: if owner.trim().is_empty() {
                DEFAULT_OWNER.to_string()
            } else {
                owner
            },
            thread_id: None,
        }
    }

    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        let thread_id = thread_id.into();
        self.thread_id = (!thread_id.is_empty()).then_some(thread_id);
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new(DEFAULT_OWNER)
    }
}

/// What `edit` does when its key is absent or idle-expired
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiredEditPolicy {
    /// Fail with `SessionNotFound` / `SessionExpired`; the caller re-starts
    #[default]
    Fail,
    /// Start a fresh session using the edit's own message
    Restart,
}

/// What `start` does when its key is already live
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartConflict {
    /// Fail with `SessionExists`
    #[default]
    Reject,
    /// Close the existing session, then start a new one under the same key
    Replace,
}

/// Result of a successful `start` or `edit`
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub key: SessionKey,
    pub owner: String,
    /// True when this call created the session
    pub first_turn: bool,
    /// Completed turns recorded for the session, this one included
    pub turns: u32,
    /// Provider output; `None` for a start without an initial message
    pub response: Option<TurnResponse>,
}

/// Final statistics of a closed session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub key: SessionKey,
    pub owner: String,
    pub duration: Duration,
    pub turns: u32,
}

/// Result of `end`; ending an absent session is not an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndOutcome {
    Closed(SessionSummary),
    NoActiveSession,
}

impl EndOutcome {
    pub fn summary(&self) -> Option<&SessionSummary> {
        match self {
            EndOutcome::Closed(summary) => Some(summary),
            EndOutcome::NoActiveSession => None,
        }
    }
}

/// Point-in-time view of a live session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub key: SessionKey,
    pub owner: String,
    pub age: Duration,
    pub idle: Duration,
    pub turns: u32,
    /// Turns currently in flight
    pub busy: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_owner_is_default() {
        assert_eq!(CallContext::new("").owner(), DEFAULT_OWNER);
        assert_eq!(CallContext::new("  ").owner(), DEFAULT_OWNER);
        assert_eq!(CallContext::new("acme").owner(), "acme");
    }

    #[test]
    fn test_empty_thread_is_none() {
        let ctx = CallContext::new("acme").with_thread("");
        assert!(ctx.thread_id().is_none());
        let ctx = CallContext::new("acme").with_thread("t-1");
        assert_eq!(ctx.thread_id(), Some("t-1"));
    }

    #[test]
    fn test_policy_serde_names() {
        let policy: ExpiredEditPolicy = serde_json::from_str("\"restart\"").unwrap();
        assert_eq!(policy, ExpiredEditPolicy::Restart);
        let conflict: StartConflict = serde_json::from_str("\"replace\"").unwrap();
        assert_eq!(conflict, StartConflict::Replace);
    }
}

//! Session entries and the provider session wrapper

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::provider::{EditSession, TurnOptions, TurnResponse};

/// State guarded by the per-session turn lock
#[derive(Debug, Default)]
struct TurnState {
    closed: bool,
}

/// A provider session shared between the table and in-flight turns
///
/// Turns on one session run one at a time. Closing takes the same lock, so a
/// close waits for the turn in progress and every turn queued behind it sees
/// the session as closed instead of touching a released provider handle.
pub(crate) struct LiveSession {
    session: Box<dyn EditSession>,
    state: Mutex<TurnState>,
    turns: AtomicU32,
}

impl LiveSession {
    pub(crate) fn new(session: Box<dyn EditSession>) -> Self {
        Self {
            session,
            state: Mutex::new(TurnState::default()),
            turns: AtomicU32::new(0),
        }
    }

    /// Run one turn. Returns `None` if the session was closed first.
    ///
    /// The turn counter only moves once the provider call has fully
    /// succeeded; a failed or cancelled call records nothing.
    pub(crate) async fn send(
        &self,
        message: &str,
        options: &TurnOptions,
    ) -> Option<anyhow::Result<TurnResponse>> {
        let state = self.state.lock().await;
        if state.closed {
            return None;
        }
        let result = self.session.send_message(message, options).await;
        if result.is_ok() {
            self.turns.fetch_add(1, Ordering::SeqCst);
        }
        Some(result)
    }

    /// Close the provider session. Only the first call reaches the provider.
    pub(crate) async fn close(&self) -> Option<anyhow::Result<()>> {
        let mut state = self.state.lock().await;
        if state.closed {
            return None;
        }
        state.closed = true;
        Some(self.session.close().await)
    }

    /// Completed turns
    pub(crate) fn turns(&self) -> u32 {
        self.turns.load(Ordering::SeqCst)
    }
}

/// What occupies a key in the table
#[derive(Clone)]
pub(crate) enum Slot {
    /// Quota is reserved and the provider session is being created
    Starting,
    Live(Arc<LiveSession>),
}

/// Bookkeeping record for one session
///
/// `last_used` and `busy` are only touched through the table's write lock,
/// which is also what the reaper holds when it decides an entry is idle.
pub(crate) struct SessionEntry {
    pub(crate) owner: String,
    /// Distinguishes this entry from a later one under the same key
    pub(crate) generation: u64,
    pub(crate) slot: Slot,
    pub(crate) created_at: Instant,
    pub(crate) last_used: Instant,
    /// Turns in flight
    pub(crate) busy: usize,
}

impl SessionEntry {
    pub(crate) fn starting(owner: &str, generation: u64, now: Instant) -> Self {
        Self {
            owner: owner.to_string(),
            generation,
            slot: Slot::Starting,
            created_at: now,
            last_used: now,
            busy: 0,
        }
    }

    pub(crate) fn live(&self) -> Option<&Arc<LiveSession>> {
        match &self.slot {
            Slot::Live(live) => Some(live),
            Slot::Starting => None,
        }
    }

    /// Record use at `now`; never moves backwards
    pub(crate) fn touch(&mut self, now: Instant) {
        if now > self.last_used {
            self.last_used = now;
        }
    }

    pub(crate) fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used)
    }

    /// Live, with no turn in flight, and unused for longer than `timeout`
    pub(crate) fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        self.live().is_some() && self.busy == 0 && self.idle_for(now) > timeout
    }
}

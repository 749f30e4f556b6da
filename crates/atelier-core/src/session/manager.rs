//! Session Manager for multi-turn image editing
//!
//! Owns the table of live sessions and runs start/edit/end against it.
//! Table bookkeeping happens under a short synchronous lock; provider calls
//! always happen after the lock is released.

use std::sync::Arc;

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::entry::LiveSession;
use super::reaper::{self, ReaperHandle};
use super::table::{Checkout, Reservation, SessionTable, TurnGuard};
use super::types::{
    CallContext, EndOutcome, ExpiredEditPolicy, SessionInfo, SessionKey, SessionSummary,
    StartConflict, TurnOutcome,
};
use crate::config::ImageSessionConfig;
use crate::error::{Error, Result};
use crate::provider::{ImageEditor, SessionOptions, TurnOptions};

/// State shared by every manager handle and, weakly, by the reaper
pub(super) struct ManagerState {
    pub(super) editor: Arc<dyn ImageEditor>,
    pub(super) config: ImageSessionConfig,
    pub(super) session_options: SessionOptions,
    pub(super) table: RwLock<SessionTable>,
    reaper: Mutex<Option<ReaperHandle>>,
}

impl ManagerState {
    /// Close a session that has already been removed from the table
    pub(super) async fn close_removed(&self, key: &str, live: &LiveSession, reason: &str) {
        match live.close().await {
            Some(Ok(())) => debug!(session = %key, reason, "Closed provider session"),
            Some(Err(e)) => {
                warn!(session = %key, reason, error = %e, "Failed to close provider session")
            }
            None => {}
        }
    }
}

/// Manages concurrently held image editing sessions
///
/// Cloning is cheap; all clones share one session table. The idle reaper
/// runs until [`shutdown`](Self::shutdown) is called or the last handle is
/// dropped.
#[derive(Clone)]
pub struct SessionManager {
    state: Arc<ManagerState>,
}

impl SessionManager {
    /// Create a session manager and start its idle reaper
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(editor: Arc<dyn ImageEditor>, config: ImageSessionConfig) -> Result<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::Config("session manager must be created inside a Tokio runtime".into())
        })?;

        let state = Arc::new(ManagerState {
            session_options: config.session_options(),
            table: RwLock::new(SessionTable::new(config.max_sessions_per_owner)),
            editor,
            config,
            reaper: Mutex::new(None),
        });

        let handle = reaper::spawn(&runtime, Arc::downgrade(&state), state.config.reap_interval());
        *state.reaper.lock() = Some(handle);

        info!(
            provider = state.editor.name(),
            timeout_secs = state.config.session_timeout_secs,
            max_per_owner = state.config.max_sessions_per_owner,
            "Image session manager started"
        );

        Ok(Self { state })
    }

    pub fn config(&self) -> &ImageSessionConfig {
        &self.state.config
    }

    /// Open a session under `key`, optionally sending a first message
    ///
    /// The owner's quota is checked and the key reserved in one critical
    /// section. If creating the provider session or the first turn fails,
    /// the reservation is rolled back and the provider session closed.
    pub async fn start(
        &self,
        ctx: &CallContext,
        key: impl Into<SessionKey>,
        initial_message: Option<&str>,
        options: &TurnOptions,
    ) -> Result<TurnOutcome> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(Error::InvalidArgument("session key must not be empty".into()));
        }
        let message = initial_message.map(|m| self.validate_prompt(m)).transpose()?;
        self.start_validated(ctx, key, message, options).await
    }

    /// Send a message to an existing session
    ///
    /// An absent or idle-expired session either fails or is transparently
    /// restarted, depending on [`ExpiredEditPolicy`]. A provider failure
    /// leaves the session in place so the caller can retry.
    pub async fn edit(
        &self,
        ctx: &CallContext,
        key: &str,
        message: &str,
        options: &TurnOptions,
    ) -> Result<TurnOutcome> {
        let message = self.validate_prompt(message)?;
        let owner = ctx.owner();
        let timeout = self.state.config.session_timeout();

        let checkout = {
            let mut table = self.state.table.write();
            if table.is_shutting_down() {
                return Err(Error::ShuttingDown);
            }
            table.checkout(key, owner, Instant::now(), timeout)
        };

        let (live, generation) = match checkout {
            Checkout::Live { live, generation } => (live, generation),
            Checkout::Missing => {
                return match self.state.config.expired_edit {
                    ExpiredEditPolicy::Fail => Err(Error::SessionNotFound(key.to_string())),
                    ExpiredEditPolicy::Restart => {
                        debug!(session = %key, owner = %owner, "No active session, starting one");
                        self.start_validated(ctx, key.to_string(), Some(message), options)
                            .await
                    }
                };
            }
            Checkout::Expired(entry) => {
                info!(session = %key, owner = %owner, "Session expired after inactivity");
                if let Some(live) = entry.live() {
                    self.state.close_removed(key, live, "expired").await;
                }
                return match self.state.config.expired_edit {
                    ExpiredEditPolicy::Fail => Err(Error::SessionExpired {
                        key: key.to_string(),
                        idle_timeout: timeout,
                    }),
                    ExpiredEditPolicy::Restart => {
                        self.start_validated(ctx, key.to_string(), Some(message), options)
                            .await
                    }
                };
            }
        };

        let _busy = TurnGuard::new(&self.state.table, key.to_string(), generation);
        match live.send(message, options).await {
            Some(Ok(response)) => {
                debug!(session = %key, turns = live.turns(), "Edit turn completed");
                Ok(TurnOutcome {
                    key: key.to_string(),
                    owner: owner.to_string(),
                    first_turn: false,
                    turns: live.turns(),
                    response: Some(response),
                })
            }
            Some(Err(e)) => {
                warn!(session = %key, error = %e, "Edit turn failed; session kept for retry");
                Err(Error::Provider(e.context("failed to edit image")))
            }
            // Ended or shut down while this turn waited for the session
            None => Err(Error::SessionNotFound(key.to_string())),
        }
    }

    /// Close a session; ending an absent session reports `NoActiveSession`
    pub async fn end(&self, ctx: &CallContext, key: &str) -> Result<EndOutcome> {
        let removed = self.state.table.write().remove_owned(key, ctx.owner());

        let Some(entry) = removed else {
            debug!(session = %key, "No active session to end");
            return Ok(EndOutcome::NoActiveSession);
        };
        let Some(live) = entry.live() else {
            return Ok(EndOutcome::NoActiveSession);
        };

        self.state.close_removed(key, live, "ended").await;

        let summary = SessionSummary {
            key: key.to_string(),
            owner: entry.owner.clone(),
            duration: entry.created_at.elapsed(),
            turns: live.turns(),
        };
        info!(session = %key, owner = %summary.owner, turns = summary.turns, "Session ended");
        Ok(EndOutcome::Closed(summary))
    }

    /// Evict idle sessions now, returning how many were closed
    ///
    /// The background reaper calls this on every tick.
    pub async fn reap_idle(&self) -> usize {
        self.state.reap_idle().await
    }

    /// Stop the reaper and close every remaining session
    ///
    /// Starts and edits issued afterwards fail with `ShuttingDown`.
    pub async fn shutdown(&self) {
        let reaper = self.state.reaper.lock().take();
        if let Some(reaper) = reaper {
            reaper.stop().await;
        }

        let drained = self.state.table.write().drain();
        let count = drained.len();
        let closes = drained.iter().filter_map(|(key, entry)| {
            entry
                .live()
                .map(|live| self.state.close_removed(key, live, "shutdown"))
        });
        join_all(closes).await;

        info!(closed = count, "Image session manager shut down");
    }

    /// Number of sessions in the table, including ones still starting
    pub fn active_sessions(&self) -> usize {
        self.state.table.read().len()
    }

    /// Sessions counted against `owner`'s quota
    pub fn active_sessions_for(&self, owner: &str) -> usize {
        self.state.table.read().owner_count(owner)
    }

    /// Whether a live session exists under `key`
    pub fn has_session(&self, key: &str) -> bool {
        self.state
            .table
            .read()
            .get(key)
            .is_some_and(|entry| entry.live().is_some())
    }

    pub fn session_info(&self, key: &str) -> Option<SessionInfo> {
        self.state.table.read().info(key, Instant::now())
    }

    fn validate_prompt<'m>(&self, prompt: &'m str) -> Result<&'m str> {
        if prompt.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "prompt is required. Describe the image or the change you want".into(),
            ));
        }
        if prompt.chars().count() > self.state.config.max_prompt_len {
            return Err(Error::prompt_too_long(self.state.config.max_prompt_len));
        }
        Ok(prompt)
    }

    async fn start_validated(
        &self,
        ctx: &CallContext,
        key: SessionKey,
        message: Option<&str>,
        options: &TurnOptions,
    ) -> Result<TurnOutcome> {
        let owner = ctx.owner();

        let (reserved, replaced) = {
            let mut table = self.state.table.write();
            let replaced = match table.get(&key) {
                Some(existing)
                    if self.state.config.on_existing == StartConflict::Replace
                        && existing.owner == owner
                        && existing.live().is_some() =>
                {
                    table.remove(&key)
                }
                _ => None,
            };
            let reserved = table
                .reserve(&key, owner, Instant::now())
                .map(|generation| Reservation::new(&self.state.table, key.clone(), generation));
            (reserved, replaced)
        };

        // The guard exists before the first await, so a cancelled start
        // never strands its `Starting` entry. The superseded session is
        // closed on its own task so cancelling this call cannot cut it short.
        if let Some(old) = replaced.as_ref().and_then(|entry| entry.live()).cloned() {
            info!(session = %key, owner = %owner, "Replacing existing session");
            let state = Arc::clone(&self.state);
            let closing_key = key.clone();
            let closing = tokio::spawn(async move {
                state.close_removed(&closing_key, &old, "replaced").await;
            });
            if let Err(e) = closing.await {
                warn!(session = %key, error = %e, "Closing replaced session panicked");
            }
        }
        let mut reservation = reserved?;

        let session = match self.state.editor.create_session(&self.state.session_options).await {
            Ok(session) => session,
            Err(e) => {
                reservation.abort();
                warn!(session = %key, owner = %owner, error = %e, "Failed to create provider session");
                return Err(Error::Provider(e.context("failed to create editing session")));
            }
        };

        let live = Arc::new(LiveSession::new(session));
        if !reservation.activate(Arc::clone(&live), message.is_some()) {
            reservation.abort();
            self.state.close_removed(&key, &live, "shutdown").await;
            return Err(Error::ShuttingDown);
        }
        info!(session = %key, owner = %owner, "Created image editing session");

        let Some(message) = message else {
            reservation.commit();
            return Ok(TurnOutcome {
                key,
                owner: owner.to_string(),
                first_turn: true,
                turns: 0,
                response: None,
            });
        };

        match live.send(message, options).await {
            Some(Ok(response)) => {
                reservation.commit();
                Ok(TurnOutcome {
                    key,
                    owner: owner.to_string(),
                    first_turn: true,
                    turns: live.turns(),
                    response: Some(response),
                })
            }
            Some(Err(e)) => {
                reservation.abort();
                self.state.close_removed(&key, &live, "initial turn failed").await;
                warn!(session = %key, error = %e, "Initial turn failed; session discarded");
                Err(Error::Provider(e.context("failed to generate initial image")))
            }
            None => {
                reservation.abort();
                Err(Error::ShuttingDown)
            }
        }
    }
}

impl Drop for ManagerState {
    fn drop(&mut self) {
        // Sessions still in the table are dropped without a provider close;
        // call `shutdown` to close them properly
        let remaining = self.table.get_mut().len();
        if remaining > 0 {
            debug!(remaining, "Session manager dropped with open sessions");
        }
    }
}

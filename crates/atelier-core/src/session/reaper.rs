//! Background eviction of idle sessions

use std::sync::Weak;
use std::time::Duration;

use futures::future::join_all;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::manager::ManagerState;

/// Handle to a running reaper task
pub(super) struct ReaperHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl ReaperHandle {
    /// Signal the task and wait for it to exit
    pub(super) async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.join).await {
            warn!(error = %e, "Session reaper task failed");
        }
    }
}

/// Spawn the reaper on `runtime`
///
/// The task only holds a weak reference, so dropping every manager handle
/// ends it as well as an explicit stop.
pub(super) fn spawn(runtime: &Handle, state: Weak<ManagerState>, period: Duration) -> ReaperHandle {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    let join = runtime.spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => {
                    let Some(state) = state.upgrade() else {
                        break;
                    };
                    let evicted = state.reap_idle().await;
                    if evicted > 0 {
                        debug!(evicted, "Reaper pass finished");
                    }
                }
            }
        }
        debug!("Session reaper stopped");
    });

    ReaperHandle {
        shutdown_tx: Some(shutdown_tx),
        join,
    }
}

impl ManagerState {
    /// Remove and close every session idle past the timeout
    ///
    /// Candidates are found under the read lock, then each one is re-checked
    /// and removed under the write lock, so a session touched in between is
    /// kept. Provider sessions are closed after the lock is released.
    pub(super) async fn reap_idle(&self) -> usize {
        let timeout = self.config.session_timeout();
        let now = Instant::now();

        let candidates = self.table.read().idle_candidates(now, timeout);
        if candidates.is_empty() {
            return 0;
        }

        let evicted: Vec<_> = {
            let mut table = self.table.write();
            candidates
                .into_iter()
                .filter_map(|(key, generation)| {
                    table
                        .remove_if_idle(&key, generation, now, timeout)
                        .map(|entry| (key, entry))
                })
                .collect()
        };

        for (key, entry) in &evicted {
            info!(
                session = %key,
                owner = %entry.owner,
                idle_secs = entry.idle_for(now).as_secs(),
                "Evicting idle session"
            );
        }

        let closes = evicted.iter().filter_map(|(key, entry)| {
            entry
                .live()
                .map(|live| self.close_removed(key, live, "idle"))
        });
        join_all(closes).await;

        evicted.len()
    }
}

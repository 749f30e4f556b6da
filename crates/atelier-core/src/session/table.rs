//! The session table and the guards that keep it consistent
//!
//! Entries and the quota live behind one `parking_lot::RwLock`. The lock is
//! never held across an `.await`: every method here is synchronous.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::entry::{LiveSession, SessionEntry, Slot};
use super::quota::QuotaGuard;
use super::types::{SessionInfo, SessionKey};
use crate::error::{Error, Result};

/// Result of looking up a session for a turn
pub(crate) enum Checkout {
    /// Live and now marked busy
    Live {
        live: Arc<LiveSession>,
        generation: u64,
    },
    /// No usable entry for this caller
    Missing,
    /// Idle past the timeout; already removed from the table
    Expired(SessionEntry),
}

pub(crate) struct SessionTable {
    entries: HashMap<SessionKey, SessionEntry>,
    quota: QuotaGuard,
    next_generation: u64,
    shutting_down: bool,
}

impl SessionTable {
    pub(crate) fn new(max_sessions_per_owner: usize) -> Self {
        Self {
            entries: HashMap::new(),
            quota: QuotaGuard::new(max_sessions_per_owner),
            next_generation: 0,
            shutting_down: false,
        }
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    pub(crate) fn get(&self, key: &str) -> Option<&SessionEntry> {
        self.entries.get(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn owner_count(&self, owner: &str) -> usize {
        self.quota.count(owner)
    }

    /// Check quota and insert a `Starting` entry in one step
    pub(crate) fn reserve(&mut self, key: &str, owner: &str, now: Instant) -> Result<u64> {
        if self.shutting_down {
            return Err(Error::ShuttingDown);
        }
        if self.entries.contains_key(key) {
            return Err(Error::SessionExists(key.to_string()));
        }
        if !self.quota.try_reserve(owner) {
            return Err(Error::QuotaExceeded {
                owner: owner.to_string(),
                limit: self.quota.limit(),
            });
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        self.entries
            .insert(key.to_string(), SessionEntry::starting(owner, generation, now));
        Ok(generation)
    }

    /// Promote a reservation to a live session. False if it was removed meanwhile.
    fn activate(
        &mut self,
        key: &str,
        generation: u64,
        live: Arc<LiveSession>,
        busy: bool,
        now: Instant,
    ) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) if entry.generation == generation => {
                entry.slot = Slot::Live(live);
                entry.touch(now);
                if busy {
                    entry.busy += 1;
                }
                true
            }
            _ => false,
        }
    }

    /// Remove an entry and return its quota slot
    pub(crate) fn remove(&mut self, key: &str) -> Option<SessionEntry> {
        let entry = self.entries.remove(key)?;
        self.quota.release(&entry.owner);
        Some(entry)
    }

    /// Remove only if the key still holds the given generation
    pub(crate) fn remove_generation(&mut self, key: &str, generation: u64) -> Option<SessionEntry> {
        match self.entries.get(key) {
            Some(entry) if entry.generation == generation => self.remove(key),
            _ => None,
        }
    }

    /// Remove a live entry owned by `owner`
    pub(crate) fn remove_owned(&mut self, key: &str, owner: &str) -> Option<SessionEntry> {
        match self.entries.get(key) {
            Some(entry) if entry.owner == owner && entry.live().is_some() => self.remove(key),
            _ => None,
        }
    }

    /// Look up a session for a turn, expiring it if idle
    ///
    /// On a live hit the recency timestamp and busy count are updated here,
    /// under the same lock the reaper uses to judge idleness.
    pub(crate) fn checkout(&mut self, key: &str, owner: &str, now: Instant, timeout: Duration) -> Checkout {
        let Some(entry) = self.entries.get_mut(key) else {
            return Checkout::Missing;
        };
        if entry.owner != owner {
            debug!(session = %key, owner = %owner, "Session belongs to another owner");
            return Checkout::Missing;
        }
        let Some(live) = entry.live().cloned() else {
            return Checkout::Missing;
        };

        if entry.is_idle(now, timeout) {
            return match self.remove(key) {
                Some(entry) => Checkout::Expired(entry),
                None => Checkout::Missing,
            };
        }

        entry.touch(now);
        entry.busy += 1;
        Checkout::Live {
            live,
            generation: entry.generation,
        }
    }

    /// Keys and generations of entries that look idle right now
    pub(crate) fn idle_candidates(&self, now: Instant, timeout: Duration) -> Vec<(SessionKey, u64)> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_idle(now, timeout))
            .map(|(key, entry)| (key.clone(), entry.generation))
            .collect()
    }

    /// Remove an entry only if it is still the same generation and still idle
    pub(crate) fn remove_if_idle(
        &mut self,
        key: &str,
        generation: u64,
        now: Instant,
        timeout: Duration,
    ) -> Option<SessionEntry> {
        match self.entries.get(key) {
            Some(entry) if entry.generation == generation && entry.is_idle(now, timeout) => {
                self.remove(key)
            }
            _ => None,
        }
    }

    /// End a turn; the session counts as used until the turn finished
    fn release_busy(&mut self, key: &str, generation: u64, now: Instant) {
        match self.entries.get_mut(key) {
            Some(entry) if entry.generation == generation => {
                entry.busy = entry.busy.saturating_sub(1);
                entry.touch(now);
            }
            _ => {}
        }
    }

    /// Stop accepting new sessions and hand back every entry
    pub(crate) fn drain(&mut self) -> Vec<(SessionKey, SessionEntry)> {
        self.shutting_down = true;
        self.quota.clear();
        self.entries.drain().collect()
    }

    pub(crate) fn info(&self, key: &str, now: Instant) -> Option<SessionInfo> {
        let entry = self.entries.get(key)?;
        let live = entry.live()?;
        Some(SessionInfo {
            key: key.to_string(),
            owner: entry.owner.clone(),
            age: now.saturating_duration_since(entry.created_at),
            idle: entry.idle_for(now),
            turns: live.turns(),
            busy: entry.busy,
        })
    }
}

/// Marks a session busy for the duration of one turn
///
/// Dropping the guard, including when the turn's future is cancelled,
/// clears the busy mark again.
pub(crate) struct TurnGuard<'a> {
    table: &'a RwLock<SessionTable>,
    key: SessionKey,
    generation: u64,
}

impl<'a> TurnGuard<'a> {
    /// Wrap a checkout that already incremented the busy count
    pub(crate) fn new(table: &'a RwLock<SessionTable>, key: SessionKey, generation: u64) -> Self {
        Self {
            table,
            key,
            generation,
        }
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        let now = Instant::now();
        self.table.write().release_busy(&self.key, self.generation, now);
    }
}

enum ReservationState {
    Pending,
    Active { live: Arc<LiveSession>, busy: bool },
    Done,
}

/// A quota reservation held by an in-progress `start`
///
/// If the start does not finish (error or cancellation) the reservation is
/// rolled back: the entry is removed, the quota slot returned, and a
/// provider session that was already attached gets closed.
pub(crate) struct Reservation<'a> {
    table: &'a RwLock<SessionTable>,
    key: SessionKey,
    generation: u64,
    state: ReservationState,
}

impl<'a> Reservation<'a> {
    pub(crate) fn new(table: &'a RwLock<SessionTable>, key: SessionKey, generation: u64) -> Self {
        Self {
            table,
            key,
            generation,
            state: ReservationState::Pending,
        }
    }

    /// Attach the provider session, optionally marking a first turn in flight
    pub(crate) fn activate(&mut self, live: Arc<LiveSession>, busy: bool) -> bool {
        let now = Instant::now();
        let activated = self
            .table
            .write()
            .activate(&self.key, self.generation, Arc::clone(&live), busy, now);
        if activated {
            self.state = ReservationState::Active { live, busy };
        }
        activated
    }

    /// The session is established; keep the entry
    pub(crate) fn commit(mut self) {
        if let ReservationState::Active { busy: true, .. } = self.state {
            let now = Instant::now();
            self.table.write().release_busy(&self.key, self.generation, now);
        }
        self.state = ReservationState::Done;
    }

    /// Remove the entry. The caller closes any attached provider session.
    pub(crate) fn abort(mut self) {
        self.table.write().remove_generation(&self.key, self.generation);
        self.state = ReservationState::Done;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let live = match std::mem::replace(&mut self.state, ReservationState::Done) {
            ReservationState::Done => return,
            ReservationState::Pending => None,
            ReservationState::Active { live, .. } => Some(live),
        };

        self.table.write().remove_generation(&self.key, self.generation);
        debug!(session = %self.key, "Rolled back abandoned session start");

        let Some(live) = live else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let key = self.key.clone();
                handle.spawn(async move {
                    if let Some(Err(e)) = live.close().await {
                        warn!(session = %key, error = %e, "Failed to close abandoned session");
                    }
                });
            }
            Err(_) => warn!(session = %self.key, "No runtime to close abandoned session"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{EditSession, Turn, TurnOptions, TurnResponse};
    use async_trait::async_trait;

    struct NoopSession;

    #[async_trait]
    impl EditSession for NoopSession {
        async fn send_message(&self, _message: &str, _options: &TurnOptions) -> anyhow::Result<TurnResponse> {
            Ok(TurnResponse::default())
        }

        fn history(&self) -> Vec<Turn> {
            Vec::new()
        }

        async fn close(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn live() -> Arc<LiveSession> {
        Arc::new(LiveSession::new(Box::new(NoopSession)))
    }

    const TIMEOUT: Duration = Duration::from_secs(30);

    #[test]
    fn test_reserve_rejects_duplicate_key() {
        let mut table = SessionTable::new(5);
        let now = Instant::now();
        table.reserve("k1", "acme", now).unwrap();
        let err = table.reserve("k1", "acme", now).unwrap_err();
        assert_eq!(err.kind(), "session_exists");
        assert_eq!(table.owner_count("acme"), 1);
    }

    #[test]
    fn test_reserve_enforces_quota() {
        let mut table = SessionTable::new(1);
        let now = Instant::now();
        table.reserve("k1", "acme", now).unwrap();
        let err = table.reserve("k2", "acme", now).unwrap_err();
        assert_eq!(err.kind(), "quota_exceeded");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remove_returns_quota() {
        let mut table = SessionTable::new(1);
        let now = Instant::now();
        table.reserve("k1", "acme", now).unwrap();
        assert!(table.remove("k1").is_some());
        assert_eq!(table.owner_count("acme"), 0);
        table.reserve("k2", "acme", now).unwrap();
    }

    #[test]
    fn test_starting_entry_is_not_checked_out() {
        let mut table = SessionTable::new(1);
        let now = Instant::now();
        table.reserve("k1", "acme", now).unwrap();
        assert!(matches!(table.checkout("k1", "acme", now, TIMEOUT), Checkout::Missing));
        assert!(table.idle_candidates(now + TIMEOUT * 2, TIMEOUT).is_empty());
    }

    #[test]
    fn test_checkout_other_owner_is_missing() {
        let mut table = SessionTable::new(1);
        let now = Instant::now();
        let generation = table.reserve("k1", "acme", now).unwrap();
        assert!(table.activate("k1", generation, live(), false, now));
        assert!(matches!(table.checkout("k1", "globex", now, TIMEOUT), Checkout::Missing));
        assert!(table.remove_owned("k1", "globex").is_none());
    }

    #[test]
    fn test_checkout_expires_idle_entry() {
        let mut table = SessionTable::new(1);
        let now = Instant::now();
        let generation = table.reserve("k1", "acme", now).unwrap();
        assert!(table.activate("k1", generation, live(), false, now));

        let later = now + Duration::from_secs(31);
        assert!(matches!(table.checkout("k1", "acme", later, TIMEOUT), Checkout::Expired(_)));
        assert_eq!(table.len(), 0);
        assert_eq!(table.owner_count("acme"), 0);
    }

    #[test]
    fn test_busy_entry_is_never_idle() {
        let mut table = SessionTable::new(1);
        let now = Instant::now();
        let generation = table.reserve("k1", "acme", now).unwrap();
        assert!(table.activate("k1", generation, live(), true, now));

        let later = now + Duration::from_secs(120);
        assert!(table.idle_candidates(later, TIMEOUT).is_empty());
        assert!(table.remove_if_idle("k1", generation, later, TIMEOUT).is_none());

        table.release_busy("k1", generation, now);
        assert_eq!(table.idle_candidates(later, TIMEOUT).len(), 1);
        assert!(table.remove_if_idle("k1", generation, later, TIMEOUT).is_some());
    }

    #[test]
    fn test_remove_if_idle_rechecks_recency() {
        let mut table = SessionTable::new(1);
        let now = Instant::now();
        let generation = table.reserve("k1", "acme", now).unwrap();
        assert!(table.activate("k1", generation, live(), false, now));

        let later = now + Duration::from_secs(31);
        let candidates = table.idle_candidates(later, TIMEOUT);
        assert_eq!(candidates.len(), 1);

        // A turn lands between the scan and the removal
        match table.checkout("k1", "acme", later - Duration::from_secs(2), TIMEOUT) {
            Checkout::Live { generation, .. } => {
                table.release_busy("k1", generation, later - Duration::from_secs(2))
            }
            _ => panic!("expected live checkout"),
        }
        assert!(table.remove_if_idle("k1", generation, later, TIMEOUT).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_generation_guards_removal() {
        let mut table = SessionTable::new(2);
        let now = Instant::now();
        let first = table.reserve("k1", "acme", now).unwrap();
        table.remove("k1");
        let second = table.reserve("k1", "acme", now).unwrap();
        assert_ne!(first, second);
        assert!(table.remove_generation("k1", first).is_none());
        assert!(table.remove_generation("k1", second).is_some());
    }

    #[test]
    fn test_touch_is_monotonic() {
        let mut table = SessionTable::new(1);
        let now = Instant::now();
        let generation = table.reserve("k1", "acme", now).unwrap();
        let later = now + Duration::from_secs(10);
        assert!(table.activate("k1", generation, live(), false, later));

        let _ = table.checkout("k1", "acme", now, TIMEOUT);
        assert_eq!(table.get("k1").unwrap().last_used, later);
    }

    #[test]
    fn test_release_touches_entry() {
        let mut table = SessionTable::new(1);
        let now = Instant::now();
        let generation = table.reserve("k1", "acme", now).unwrap();
        assert!(table.activate("k1", generation, live(), true, now));

        // A turn that outlasts the timeout is not idle the moment it ends
        let finished = now + Duration::from_secs(90);
        table.release_busy("k1", generation, finished);
        assert!(table.idle_candidates(finished + Duration::from_secs(1), TIMEOUT).is_empty());
    }

    #[test]
    fn test_drain_blocks_new_reservations() {
        let mut table = SessionTable::new(1);
        let now = Instant::now();
        table.reserve("k1", "acme", now).unwrap();
        assert_eq!(table.drain().len(), 1);
        assert!(table.is_shutting_down());
        assert_eq!(table.reserve("k2", "acme", now).unwrap_err().kind(), "shutting_down");
    }

    #[test]
    fn test_dropped_reservation_rolls_back() {
        let table = RwLock::new(SessionTable::new(1));
        let generation = table.write().reserve("k1", "acme", Instant::now()).unwrap();
        {
            let _reservation = Reservation::new(&table, "k1".to_string(), generation);
        }
        assert_eq!(table.read().len(), 0);
        assert_eq!(table.read().owner_count("acme"), 0);
    }

    #[test]
    fn test_committed_reservation_stays() {
        let table = RwLock::new(SessionTable::new(1));
        let generation = table.write().reserve("k1", "acme", Instant::now()).unwrap();
        let mut reservation = Reservation::new(&table, "k1".to_string(), generation);
        assert!(reservation.activate(live(), true));
        assert_eq!(table.read().get("k1").unwrap().busy, 1);
        reservation.commit();
        assert_eq!(table.read().get("k1").unwrap().busy, 0);
        assert_eq!(table.read().len(), 1);
    }
}

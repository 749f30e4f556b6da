//! Per-owner session quota
//!
//! The guard is plain data owned by the session table, so it can only be
//! mutated through the table's write lock. Counting and reserving therefore
//! happen in the same critical section as the table insertion.

use std::collections::HashMap;

/// Bounds the number of concurrently open sessions per owner
#[derive(Debug)]
pub struct QuotaGuard {
    limit: usize,
    live: HashMap<String, usize>,
}

impl QuotaGuard {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            live: HashMap::new(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Reserve a slot for `owner`, returning false when the owner is at the limit
    pub fn try_reserve(&mut self, owner: &str) -> bool {
        if self.count(owner) >= self.limit {
            return false;
        }
        *self.live.entry(owner.to_string()).or_insert(0) += 1;
        true
    }

    /// Return a slot previously taken with [`try_reserve`](Self::try_reserve)
    pub fn release(&mut self, owner: &str) {
        if let Some(count) = self.live.get_mut(owner) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.live.remove(owner);
            }
        }
    }

    /// Slots currently held by `owner`
    pub fn count(&self, owner: &str) -> usize {
        self.live.get(owner).copied().unwrap_or(0)
    }

    pub(crate) fn clear(&mut self) {
        self.live.clear();
    }
}

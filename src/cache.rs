//! Single-slot, TTL-bound memoization of the detection history.
//!
//! The cache is an optimization only. The backends stay the source of
//! truth; dropping the cache never loses data.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::clock::Clock;
use crate::history::DetectionHistory;

/// Default time-to-live for the cached history.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug)]
struct Slot {
    history: DetectionHistory,
    stored_at: i64,
}

/// Snapshot of the cache state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    /// A history is held (possibly expired).
    pub cached: bool,
    /// The held history is still within its TTL.
    pub fresh: bool,
    /// Age of the held history in ms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_ms: Option<i64>,
    /// Configured TTL in ms.
    pub ttl_ms: i64,
    /// Records in the held history.
    pub record_count: usize,
}

/// Read-through cache owned by one history engine.
pub struct StorageCache {
    slot: RefCell<Option<Slot>>,
    ttl_ms: i64,
    clock: Rc<dyn Clock>,
}

impl StorageCache {
    /// Create an empty cache.
    pub fn new(ttl: Duration, clock: Rc<dyn Clock>) -> Self {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        Self { slot: RefCell::new(None), ttl_ms, clock }
    }

    /// The cached history, or `None` when empty or past its TTL.
    pub fn get_cached_history(&self) -> Option<DetectionHistory> {
        let slot = self.slot.borrow();
        let slot = slot.as_ref()?;
        let age = self.clock.now_ms() - slot.stored_at;
        if age >= self.ttl_ms || age < 0 {
            debug!(age_ms = age, "history cache expired");
            return None;
        }
        debug!(age_ms = age, records = slot.history.records.len(), "history cache hit");
        Some(slot.history.clone())
    }

    /// Replace the cached history and restart its TTL.
    pub fn update_cache(&self, history: &DetectionHistory) {
        *self.slot.borrow_mut() =
            Some(Slot { history: history.clone(), stored_at: self.clock.now_ms() });
    }

    /// Drop the cached history.
    pub fn clear_cache(&self) {
        self.slot.borrow_mut().take();
    }

    /// Current state of the slot.
    pub fn get_cache_status(&self) -> CacheStatus {
        let now = self.clock.now_ms();
        match self.slot.borrow().as_ref() {
            Some(slot) => {
                let age = now - slot.stored_at;
                CacheStatus {
                    cached: true,
                    fresh: age >= 0 && age < self.ttl_ms,
                    age_ms: Some(age),
                    ttl_ms: self.ttl_ms,
                    record_count: slot.history.records.len(),
                }
            },
            None => CacheStatus {
                cached: false,
                fresh: false,
                age_ms: None,
                ttl_ms: self.ttl_ms,
                record_count: 0,
            },
        }
    }
}

impl std::fmt::Debug for StorageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageCache").field("status", &self.get_cache_status()).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn cache() -> (StorageCache, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::new(1_000_000));
        (StorageCache::new(DEFAULT_CACHE_TTL, clock.clone()), clock)
    }

    #[test]
    fn test_hit_within_ttl() {
        let (cache, clock) = cache();
        assert!(cache.get_cached_history().is_none());
        cache.update_cache(&DetectionHistory::empty(5));
        clock.advance(9 * 60 * 1000);
        assert_eq!(cache.get_cached_history().unwrap().last_updated, 5);
        assert!(cache.get_cache_status().fresh);
    }

    #[test]
    fn test_miss_after_ttl() {
        let (cache, clock) = cache();
        cache.update_cache(&DetectionHistory::empty(5));
        clock.advance(10 * 60 * 1000);
        assert!(cache.get_cached_history().is_none());
        let status = cache.get_cache_status();
        assert!(status.cached);
        assert!(!status.fresh);
    }

    #[test]
    fn test_clear() {
        let (cache, _) = cache();
        cache.update_cache(&DetectionHistory::empty(5));
        cache.clear_cache();
        cache.clear_cache();
        assert!(!cache.get_cache_status().cached);
    }

    #[test]
    fn test_clock_moving_backwards_is_a_miss() {
        let (cache, clock) = cache();
        cache.update_cache(&DetectionHistory::empty(5));
        clock.advance(-1);
        assert!(cache.get_cached_history().is_none());
    }
}

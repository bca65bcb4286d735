//! Dedup ledger — external interaction ids that have already been handled.
//!
//! `check_and_mark` is the atomic check-then-mark primitive the poll loops
//! rely on: two concurrent polls of the same mention get exactly one `true`.
//! Entries expire after a retention window so the set stays bounded over a
//! long run.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Mutex;

use crate::clock::Clock;

const DEFAULT_RETENTION_HOURS: i64 = 24;

/// Set of already-handled external interaction identifiers.
pub struct DedupLedger {
    seen: Mutex<HashMap<String, DateTime<Utc>>>,
    retention: Duration,
    clock: Clock,
}

impl DedupLedger {
    pub fn new(clock: Clock) -> Self {
        Self::with_retention(clock, Duration::hours(DEFAULT_RETENTION_HOURS))
    }

    pub fn with_retention(clock: Clock, retention: Duration) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            retention,
            clock,
        }
    }

    /// Atomically: if the id is unseen, mark it and return `true`; if it was
    /// already handled, return `false`. Expired entries are pruned on the way.
    pub fn check_and_mark(&self, id: &str) -> bool {
        let now = self.clock.now();
        let mut seen = self.seen.lock().unwrap();
        seen.retain(|_, at| now - *at < self.retention);
        match seen.entry(id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    /// Whether the id has been handled within the retention window.
    pub fn seen(&self, id: &str) -> bool {
        let now = self.clock.now();
        self.seen
            .lock()
            .unwrap()
            .get(id)
            .is_some_and(|at| now - *at < self.retention)
    }

    /// Mark an id as handled without checking.
    pub fn mark(&self, id: &str) {
        let now = self.clock.now();
        self.seen.lock().unwrap().insert(id.to_string(), now);
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_and_mark_is_once_only() {
        let ledger = DedupLedger::new(Clock::manual(Utc::now()));
        assert!(ledger.check_and_mark("tweet-1"));
        assert!(!ledger.check_and_mark("tweet-1"));
        assert!(ledger.check_and_mark("tweet-2"));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_entries_expire_after_retention() {
        let clock = Clock::manual(Utc::now());
        let ledger = DedupLedger::with_retention(clock.clone(), Duration::hours(1));
        assert!(ledger.check_and_mark("old"));
        assert!(ledger.seen("old"));

        clock.advance(Duration::hours(2));
        assert!(!ledger.seen("old"));
        // Pruned and accepted again once expired.
        assert!(ledger.check_and_mark("old"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_mark_then_seen() {
        let ledger = DedupLedger::new(Clock::manual(Utc::now()));
        assert!(!ledger.seen("x"));
        ledger.mark("x");
        assert!(ledger.seen("x"));
    }
}

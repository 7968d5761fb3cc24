// Process-local dedup cache for inbound block events.
//
// Each event id is processed at most once per TTL window. Entries are
// swept lazily when the map grows past its cap, so a quiet intake never
// pays for housekeeping.

use nodesync_common::config::EVENT_DEDUP_TTL_SECONDS;
use std::collections::HashMap;
use std::sync::Mutex;

const MAX_TRACKED_EVENTS: usize = 10_000;

pub struct EventCache {
    ttl_seconds: u64,
    seen: Mutex<HashMap<String, u64>>,
}

impl EventCache {
    pub fn new() -> Self {
        Self::with_ttl(EVENT_DEDUP_TTL_SECONDS)
    }

    pub fn with_ttl(ttl_seconds: u64) -> Self {
        EventCache {
            ttl_seconds,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Record `event_id` at time `now`. Returns `true` when the event is
    /// fresh; `false` when it was already seen inside the TTL window.
    pub fn check_and_insert(&self, event_id: &str, now: u64) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(at) = seen.get(event_id) {
            if now.saturating_sub(*at) <= self.ttl_seconds {
                return false;
            }
        }
        seen.insert(event_id.to_string(), now);

        if seen.len() > MAX_TRACKED_EVENTS {
            let ttl = self.ttl_seconds;
            seen.retain(|_, at| now.saturating_sub(*at) <= ttl);
        }
        true
    }

    pub fn tracked(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl Default for EventCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_within_window_is_rejected() {
        let cache = EventCache::with_ttl(900);
        assert!(cache.check_and_insert("event-a", 1000));
        assert!(!cache.check_and_insert("event-a", 1000 + 600));
        assert!(cache.check_and_insert("event-b", 1000));
    }

    #[test]
    fn expired_entries_are_accepted_again() {
        let cache = EventCache::with_ttl(900);
        assert!(cache.check_and_insert("event-a", 1000));
        assert!(cache.check_and_insert("event-a", 1000 + 901));
    }

    #[test]
    fn sweep_prunes_expired_entries() {
        let cache = EventCache::with_ttl(10);
        for index in 0..=MAX_TRACKED_EVENTS {
            assert!(cache.check_and_insert(&format!("event-{}", index), 1000));
        }
        // the overflow insert triggered a sweep; everything at t=1000 is
        // expired by t=2000
        assert!(cache.check_and_insert("late", 2000));
        assert!(cache.tracked() <= MAX_TRACKED_EVENTS + 2);
    }
}

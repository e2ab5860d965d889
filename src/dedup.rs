//! Per-instrument dedup tracker.
//!
//! The feed re-serves the same tick until a new one is printed, so a poll
//! may see a timestamp it already delivered. The tracker records the last
//! delivered timestamp per symbol and suppresses repeats. Entries are
//! created on first query and never removed.

use std::collections::HashMap;

use tokio::sync::Mutex;

/// Owned dedup state; hand a reference to whoever polls the feed.
#[derive(Debug, Default)]
pub struct TickTracker {
    last_times: Mutex<HashMap<String, i64>>,
}

impl TickTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether a tick with this timestamp is new information for the
    /// symbol, recording it in the same critical section when it is.
    ///
    /// Returns true iff no prior timestamp is recorded or the recorded one
    /// differs. Concurrent callers cannot both observe the same tick as new.
    pub async fn observe(&self, symbol: &str, time: i64) -> bool {
        let mut map = self.last_times.lock().await;
        match map.get(symbol) {
            Some(&prev) if prev == time => false,
            _ => {
                map.insert(symbol.to_string(), time);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_observation_is_always_deliverable() {
        let tracker = TickTracker::new();
        assert!(tracker.observe("R_50", 1700000000).await);
    }

    #[tokio::test]
    async fn repeated_timestamp_is_deliverable_only_once() {
        let tracker = TickTracker::new();
        assert!(tracker.observe("R_50", 1700000000).await);
        assert!(!tracker.observe("R_50", 1700000000).await);
        // a different timestamp is new again, even if it moves backwards
        assert!(tracker.observe("R_50", 1699999999).await);
    }

    #[tokio::test]
    async fn symbols_are_tracked_independently() {
        let tracker = TickTracker::new();
        assert!(tracker.observe("R_50", 42).await);
        assert!(tracker.observe("1HZ100V", 42).await);
        assert!(!tracker.observe("R_50", 42).await);
    }

    #[tokio::test]
    async fn concurrent_observers_race_for_one_delivery() {
        use std::sync::Arc;

        let tracker = Arc::new(TickTracker::new());
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let tracker = tracker.clone();
            tasks.push(tokio::spawn(
                async move { tracker.observe("R_50", 7).await },
            ));
        }
        let mut delivered = 0;
        for task in tasks {
            if task.await.unwrap() {
                delivered += 1;
            }
        }
        assert_eq!(delivered, 1);
    }
}

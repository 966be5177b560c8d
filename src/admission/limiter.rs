//! Sliding-window request counter.
//!
//! Counts admitted requests per key over the trailing window. A request at
//! any point counts against the trailing interval, so there is no
//! fixed-bucket boundary reset.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Thread-safe sliding-window counter keyed by an opaque string.
pub struct SlidingWindow {
    window: Duration,
    slots: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Record one request against `key` if it fits under `limit`.
    ///
    /// Returns `true` when the request is admitted. Denied requests are not
    /// recorded, so they never consume quota themselves.
    pub fn hit(&self, key: &str, limit: u32) -> bool {
        let mut slots = self.slots.lock().unwrap();
        let now = Instant::now();

        let hits = slots.entry(key.to_string()).or_default();
        while hits
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            hits.pop_front();
        }

        if hits.len() as u32 >= limit {
            return false;
        }
        hits.push_back(now);
        true
    }

    /// Number of requests currently counted against `key`.
    pub fn active(&self, key: &str) -> usize {
        let slots = self.slots.lock().unwrap();
        let now = Instant::now();
        slots
            .get(key)
            .map(|hits| {
                hits.iter()
                    .filter(|t| now.duration_since(**t) < self.window)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Drop keys whose hits have all slid out of the window.
    pub fn cleanup(&self) {
        let mut slots = self.slots.lock().unwrap();
        let now = Instant::now();
        slots.retain(|_, hits| {
            while hits
                .front()
                .is_some_and(|t| now.duration_since(*t) >= self.window)
            {
                hits.pop_front();
            }
            !hits.is_empty()
        });
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.slots.lock().unwrap().len()
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0

use crossbeam_utils::CachePadded;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Counts events entering a stream and derives its throughput
#[derive(Debug)]
pub struct StreamTracker {
    events_in: CachePadded<AtomicU64>,
    first_event_at: Mutex<Option<Instant>>,
}

impl StreamTracker {
    pub fn new() -> Self {
        Self {
            events_in: CachePadded::new(AtomicU64::new(0)),
            first_event_at: Mutex::new(None),
        }
    }

    #[inline]
    pub fn in_event(&self) {
        self.in_events(1);
    }

    pub fn in_events(&self, count: u64) {
        if self.events_in.fetch_add(count, Ordering::Relaxed) == 0 {
            if let Ok(mut first) = self.first_event_at.lock() {
                first.get_or_insert_with(Instant::now);
            }
        }
    }

    pub fn events_in(&self) -> u64 {
        self.events_in.load(Ordering::Relaxed)
    }

    /// Events per second since the first tracked event
    pub fn throughput(&self) -> f64 {
        let first = self.first_event_at.lock().ok().and_then(|f| *f);
        match first {
            Some(start) => {
                let elapsed = start.elapsed().as_secs_f64();
                if elapsed > 0.0 {
                    self.events_in() as f64 / elapsed
                } else {
                    0.0
                }
            }
            None => 0.0,
        }
    }
}

impl Default for StreamTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time statistics of one stream
#[derive(Debug, Clone, Serialize)]
pub struct StreamStatistics {
    pub stream_id: String,
    pub events_in: u64,
    pub events_dispatched: u64,
    pub events_dropped: u64,
    pub processing_errors: u64,
    pub throughput: f64,
    pub processor_count: usize,
    pub is_async: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_counts_events() {
        let tracker = StreamTracker::new();
        assert_eq!(tracker.throughput(), 0.0);
        tracker.in_event();
        tracker.in_events(4);
        assert_eq!(tracker.events_in(), 5);
        assert!(tracker.throughput() >= 0.0);
    }
}

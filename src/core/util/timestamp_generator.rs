// SPDX-License-Identifier: MIT OR Apache-2.0

//! Clock sources shared by streams, windows, patterns and the scheduler.

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};

/// Millisecond clock
pub trait TimestampGenerator: Debug + Send + Sync {
    fn current_timestamp(&self) -> i64;

    /// Move an event driven clock forward; wall clocks ignore it.
    ///
    /// Returns `true` when the clock advanced.
    fn advance_to(&self, _timestamp: i64) -> bool {
        false
    }

    fn is_event_driven(&self) -> bool {
        false
    }
}

/// Wall clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimestampGenerator;

impl TimestampGenerator for SystemTimestampGenerator {
    fn current_timestamp(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Playback clock driven by an attribute of the events flowing through the
/// application. It only ever moves forward; out of order values are ignored.
#[derive(Debug)]
pub struct EventTimestampGenerator {
    current: AtomicI64,
}

impl EventTimestampGenerator {
    pub fn new(start: i64) -> Self {
        Self {
            current: AtomicI64::new(start),
        }
    }
}

impl Default for EventTimestampGenerator {
    fn default() -> Self {
        Self::new(0)
    }
}

impl TimestampGenerator for EventTimestampGenerator {
    fn current_timestamp(&self) -> i64 {
        self.current.load(Ordering::Acquire)
    }

    fn advance_to(&self, timestamp: i64) -> bool {
        self.current.fetch_max(timestamp, Ordering::AcqRel) < timestamp
    }

    fn is_event_driven(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_clock_only_moves_forward() {
        let clock = EventTimestampGenerator::new(1000);
        assert!(clock.advance_to(1500));
        assert!(!clock.advance_to(1200));
        assert!(!clock.advance_to(1500));
        assert_eq!(clock.current_timestamp(), 1500);
    }

    #[test]
    fn test_system_clock_ignores_advance() {
        let clock = SystemTimestampGenerator;
        assert!(!clock.advance_to(0));
        assert!(clock.current_timestamp() > 0);
        assert!(!clock.is_event_driven());
    }
}

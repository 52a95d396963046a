// SPDX-License-Identifier: MIT OR Apache-2.0

//! Window Type Constants
//!
//! Namespaces under which the built-in windows are registered.

/// Time batch window: collects events for duration D, then emits batch (tumbling)
pub const WINDOW_TYPE_TIME_BATCH: &str = "timeBatch";

/// External idle time batch window: emits the batch once the gap between two
/// event-provided timestamps reaches the idle threshold
pub const WINDOW_TYPE_EXTERNAL_IDLE_TIME_BATCH: &str = "externalIdleTimeBatch";

/// Window length or idle threshold in milliseconds
pub const PROPERTY_DURATION: &str = "duration";

/// Attribute holding the external timestamp
pub const PROPERTY_TIMESTAMP_KEY: &str = "timestampKey";

/// Check if a window type is supported
pub fn is_supported_window_type(window_type: &str) -> bool {
    matches!(
        window_type,
        WINDOW_TYPE_TIME_BATCH | WINDOW_TYPE_EXTERNAL_IDLE_TIME_BATCH
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_window_types() {
        assert!(is_supported_window_type(WINDOW_TYPE_TIME_BATCH));
        assert!(is_supported_window_type(WINDOW_TYPE_EXTERNAL_IDLE_TIME_BATCH));
        assert!(!is_supported_window_type("length"));
        assert!(!is_supported_window_type("TIMEBATCH"));
    }
}

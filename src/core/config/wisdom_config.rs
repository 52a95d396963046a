// SPDX-License-Identifier: MIT OR Apache-2.0

use super::stream_config::{FlatConfig, PropertySource, StreamConfig, DEFAULT_BUFFER_SIZE};
use crate::core::error::{WisdomError, WisdomResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Application level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WisdomConfig {
    pub name: String,
    pub version: String,
    /// Default delivery mode for streams that do not set `async`
    pub is_async: bool,
    /// Default ring buffer size for async streams
    pub buffer_size: usize,
    /// Attribute carrying the playback timestamp; enables the event driven clock
    pub playback: Option<String>,
    /// Default for per-stream throughput tracking
    pub statistics: bool,
}

impl Default for WisdomConfig {
    fn default() -> Self {
        Self {
            name: "WisdomApp".to_string(),
            version: "1.0.0".to_string(),
            is_async: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
            playback: None,
            statistics: false,
        }
    }
}

impl WisdomConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_async(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Drive time from the given event attribute instead of the wall clock
    pub fn with_playback(mut self, attribute: impl Into<String>) -> Self {
        self.playback = Some(attribute.into());
        self
    }

    pub fn with_statistics(mut self, statistics: bool) -> Self {
        self.statistics = statistics;
        self
    }

    pub fn validate(&self) -> WisdomResult<()> {
        if self.name.trim().is_empty() {
            return Err(WisdomError::validation_with_field(
                "application name must not be empty",
                "name",
            ));
        }
        if matches!(&self.playback, Some(attr) if attr.trim().is_empty()) {
            return Err(WisdomError::validation_with_field(
                "playback attribute must not be empty",
                "playback",
            ));
        }
        self.stream_defaults().validate()
    }

    /// Stream settings inherited by every stream of the application
    pub fn stream_defaults(&self) -> StreamConfig {
        StreamConfig::new()
            .with_async(self.is_async)
            .with_buffer_size(self.buffer_size)
            .with_statistics(self.statistics)
    }

    /// Layered properties of one stream
    ///
    /// Built-in defaults, overridden by this configuration, overridden by the
    /// stream's own definition properties.
    pub fn stream_properties(&self, definition: &HashMap<String, String>) -> FlatConfig {
        let defaults = StreamConfig::default();
        let mut flat = defaults.to_flat_config(PropertySource::Default);
        flat.merge(&self.stream_defaults().overrides(&defaults, PropertySource::Application));
        flat.extend_from(definition, PropertySource::StreamDefinition);
        flat
    }

    pub fn thread_name(&self, component: &str) -> String {
        format!("{}-{}", self.name, component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_partial_config() {
        let config: WisdomConfig =
            serde_json::from_str(r#"{"name": "StockApp", "playback": "timestamp"}"#).unwrap();
        assert_eq!(config.name, "StockApp");
        assert_eq!(config.version, "1.0.0");
        assert_eq!(config.playback.as_deref(), Some("timestamp"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_buffer_size_fails_validation() {
        let config = WisdomConfig::new("App").with_buffer_size(100);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_stream_properties_layering() {
        use super::super::stream_config::{PROPERTY_ASYNC, PROPERTY_BUFFER, PROPERTY_STATISTICS};

        let config = WisdomConfig::new("App").with_buffer_size(256);
        let definition = HashMap::from([(PROPERTY_ASYNC.to_string(), "true".to_string())]);
        let flat = config.stream_properties(&definition);

        assert_eq!(
            flat.get_with_source(PROPERTY_ASYNC).map(|(_, s)| s),
            Some(PropertySource::StreamDefinition)
        );
        assert_eq!(
            flat.get_with_source(PROPERTY_BUFFER),
            Some((&"256".to_string(), PropertySource::Application))
        );
        assert_eq!(
            flat.get_with_source(PROPERTY_STATISTICS).map(|(_, s)| s.description()),
            Some("built-in default")
        );

        let resolved = StreamConfig::from_flat_config(&flat).unwrap();
        assert!(resolved.is_async);
        assert_eq!(resolved.buffer_size, 256);
    }

    #[test]
    fn test_empty_name_fails_validation() {
        assert!(WisdomConfig::new(" ").validate().is_err());
    }
}

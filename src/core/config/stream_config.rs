// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Stream Configuration Module
//!
//! Stream settings are resolved from layered properties. Each layer records
//! where a value came from and higher priority layers override lower ones.
//!
//! ## Configuration Sources (Priority: Low to High)
//!
//! 1. **Default** - Built-in defaults
//! 2. **Application** - `WisdomConfig` of the owning application
//! 3. **StreamDefinition** - Properties given when the stream is defined
//!
//! `WisdomApp::define_stream_with_properties` stacks the three layers and
//! resolves the result with [`StreamConfig::from_flat_config`].
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let mut config = FlatConfig::new();
//! config.set("async", "true", PropertySource::StreamDefinition);
//! config.set("buffer", "2048", PropertySource::StreamDefinition);
//!
//! let stream_config = StreamConfig::from_flat_config(&config)?;
//! assert!(stream_config.is_async);
//! ```

use crate::core::error::{WisdomError, WisdomResult};
use std::collections::HashMap;

pub const PROPERTY_ASYNC: &str = "async";
pub const PROPERTY_BUFFER: &str = "buffer";
pub const PROPERTY_STATISTICS: &str = "statistics";

pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Property source identifier with priority ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertySource {
    /// Built-in defaults (priority: 0)
    Default,
    /// Application configuration (priority: 1)
    Application,
    /// Stream definition properties (priority: 2)
    StreamDefinition,
}

impl PropertySource {
    #[inline]
    pub const fn priority(&self) -> u8 {
        match self {
            PropertySource::Default => 0,
            PropertySource::Application => 1,
            PropertySource::StreamDefinition => 2,
        }
    }

    #[inline]
    pub const fn description(&self) -> &'static str {
        match self {
            PropertySource::Default => "built-in default",
            PropertySource::Application => "application config",
            PropertySource::StreamDefinition => "stream definition",
        }
    }
}

/// Flat key-value configuration with source tracking
#[derive(Debug, Clone, Default)]
pub struct FlatConfig {
    properties: HashMap<String, String>,
    sources: HashMap<String, PropertySource>,
}

impl FlatConfig {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property unless a higher priority source already set it
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>, source: PropertySource) {
        let key = key.into();

        if let Some(existing_source) = self.sources.get(&key) {
            if existing_source.priority() > source.priority() {
                return;
            }
        }

        self.properties.insert(key.clone(), value.into());
        self.sources.insert(key, source);
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&String> {
        self.properties.get(key)
    }

    pub fn get_with_source(&self, key: &str) -> Option<(&String, PropertySource)> {
        self.properties
            .get(key)
            .and_then(|value| self.sources.get(key).map(|source| (value, *source)))
    }

    /// Merge another configuration into this one (respects priorities)
    pub fn merge(&mut self, other: &FlatConfig) {
        for (key, value) in &other.properties {
            if let Some(source) = other.sources.get(key) {
                self.set(key.clone(), value.clone(), *source);
            }
        }
    }

    pub fn extend_from(&mut self, properties: &HashMap<String, String>, source: PropertySource) {
        for (key, value) in properties {
            self.set(key.clone(), value.clone(), source);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Resolved dispatch settings of one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Deliver through the ring buffer and a dedicated consumer thread
    pub is_async: bool,
    /// Ring buffer capacity, a power of two
    pub buffer_size: usize,
    /// Track per-stream throughput
    pub statistics: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            is_async: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
            statistics: false,
        }
    }
}

impl StreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_async(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_statistics(mut self, statistics: bool) -> Self {
        self.statistics = statistics;
        self
    }

    pub fn from_flat_config(flat: &FlatConfig) -> WisdomResult<Self> {
        let mut config = Self::default();
        if let Some(value) = flat.get(PROPERTY_ASYNC) {
            config.is_async = parse_bool(PROPERTY_ASYNC, value)?;
        }
        if let Some(value) = flat.get(PROPERTY_BUFFER) {
            config.buffer_size = value.trim().parse::<usize>().map_err(|_| {
                WisdomError::invalid_property(PROPERTY_BUFFER, format!("'{value}' is not a size"))
            })?;
        }
        if let Some(value) = flat.get(PROPERTY_STATISTICS) {
            config.statistics = parse_bool(PROPERTY_STATISTICS, value)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> WisdomResult<()> {
        if self.buffer_size == 0 || !self.buffer_size.is_power_of_two() {
            return Err(WisdomError::invalid_property(
                PROPERTY_BUFFER,
                format!(
                    "buffer size must be a power of two greater than zero, got {}",
                    self.buffer_size
                ),
            ));
        }
        Ok(())
    }

    /// Properties of `self` that differ from `base`
    pub fn overrides(&self, base: &StreamConfig, source: PropertySource) -> FlatConfig {
        let mut flat = FlatConfig::new();
        if self.is_async != base.is_async {
            flat.set(PROPERTY_ASYNC, self.is_async.to_string(), source);
        }
        if self.buffer_size != base.buffer_size {
            flat.set(PROPERTY_BUFFER, self.buffer_size.to_string(), source);
        }
        if self.statistics != base.statistics {
            flat.set(PROPERTY_STATISTICS, self.statistics.to_string(), source);
        }
        flat
    }

    /// Flatten into properties of the given source
    pub fn to_flat_config(&self, source: PropertySource) -> FlatConfig {
        let mut flat = FlatConfig::new();
        flat.set(PROPERTY_ASYNC, self.is_async.to_string(), source);
        flat.set(PROPERTY_BUFFER, self.buffer_size.to_string(), source);
        flat.set(PROPERTY_STATISTICS, self.statistics.to_string(), source);
        flat
    }
}

fn parse_bool(property: &str, value: &str) -> WisdomResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(WisdomError::invalid_property(
            property,
            format!("expected true or false, got '{other}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_source_priority_ordering() {
        assert!(PropertySource::Default.priority() < PropertySource::Application.priority());
        assert!(
            PropertySource::Application.priority() < PropertySource::StreamDefinition.priority()
        );
    }

    #[test]
    fn test_flat_config_priority_no_override() {
        let mut config = FlatConfig::new();
        config.set("async", "true", PropertySource::StreamDefinition);
        config.set("async", "false", PropertySource::Application);

        assert_eq!(
            config.get_with_source("async"),
            Some((&"true".to_string(), PropertySource::StreamDefinition))
        );
    }

    #[test]
    fn test_flat_config_merge() {
        let mut app = StreamConfig::new()
            .with_buffer_size(4096)
            .to_flat_config(PropertySource::Application);
        let mut stream = FlatConfig::new();
        stream.set("async", "true", PropertySource::StreamDefinition);
        app.merge(&stream);

        let resolved = StreamConfig::from_flat_config(&app).unwrap();
        assert!(resolved.is_async);
        assert_eq!(resolved.buffer_size, 4096);
    }

    fn definition(properties: &[(&str, &str)]) -> FlatConfig {
        let properties: HashMap<String, String> = properties
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut flat = FlatConfig::new();
        flat.extend_from(&properties, PropertySource::StreamDefinition);
        flat
    }

    #[test]
    fn test_from_flat_config_rejects_bad_values() {
        assert!(matches!(
            StreamConfig::from_flat_config(&definition(&[("buffer", "1000")])),
            Err(WisdomError::InvalidProperty { .. })
        ));
        assert!(
            StreamConfig::from_flat_config(&definition(&[("buffer", "1024"), ("async", "maybe")]))
                .is_err()
        );
    }

    #[test]
    fn test_empty_layers_resolve_to_defaults() {
        let config = StreamConfig::from_flat_config(&FlatConfig::new()).unwrap();
        assert_eq!(config, StreamConfig::default());
    }
}

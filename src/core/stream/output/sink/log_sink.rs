// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::core::error::{WisdomError, WisdomResult};
use crate::core::event::Event;
use crate::core::stream::output::sink::sink_trait::Sink;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// LogSink - Debug sink that writes events to the log system
///
/// Each event is rendered as one JSON line prefixed with the configured
/// prefix. Published events are also retained so tests can inspect them.
#[derive(Debug, Clone)]
pub struct LogSink {
    pub prefix: String,
    pub events: Arc<Mutex<Vec<Event>>>,
}

#[derive(Serialize)]
struct LogLine<'a> {
    timestamp: i64,
    stream: Option<&'a str>,
    data: &'a crate::core::event::EventData,
}

impl LogSink {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Build from extension properties; `prefix` defaults to `LogSink`
    pub fn from_properties(properties: &HashMap<String, String>) -> WisdomResult<Self> {
        let prefix = properties
            .get("prefix")
            .cloned()
            .unwrap_or_else(|| "LogSink".to_string());
        Ok(Self::new(prefix))
    }

    pub fn published(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new("LogSink")
    }
}

impl Sink for LogSink {
    fn publish(&self, events: &[Event]) -> WisdomResult<()> {
        for event in events {
            let line = serde_json::to_string(&LogLine {
                timestamp: event.timestamp(),
                stream: event.stream_id(),
                data: event.data(),
            })
            .map_err(|e| {
                WisdomError::runtime_with_source("LogSink serialization failed", Box::new(e))
            })?;
            log::info!("{} {}", self.prefix, line);
        }

        self.events
            .lock()
            .map_err(|_| WisdomError::runtime("LogSink event buffer poisoned"))?
            .extend_from_slice(events);
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Sink> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_sink_records_events() {
        let sink = LogSink::new("[test]");
        sink.publish(&[Event::new(1).attribute("symbol", "IBM")])
            .unwrap();
        let published = sink.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].get_str("symbol"), Some("IBM"));
    }

    #[test]
    fn test_from_properties_default_prefix() {
        let sink = LogSink::from_properties(&HashMap::new()).unwrap();
        assert_eq!(sink.prefix, "LogSink");
    }
}

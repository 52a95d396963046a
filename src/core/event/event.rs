// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event envelope
//!
//! An [`Event`] carries a timestamp, an ordered attribute map, the id of the
//! stream it was last dispatched on and a reference to the root event it was
//! derived from. Every fan-out hop works on a copy; copies share the root
//! reference so derived events (pattern matches, window batches) can always
//! be traced back to the event that entered the first stream.

use super::value::AttributeValue;
use indexmap::IndexMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Ordered attribute map of an event
pub type EventData = IndexMap<String, AttributeValue>;

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

fn next_event_id() -> u64 {
    NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone)]
pub struct Event {
    id: u64,
    timestamp: i64,
    data: EventData,
    stream_id: Option<Arc<str>>,
    /// Root event; `None` while this event is itself a root
    original: Option<Arc<Event>>,
    expired: bool,
}

impl Event {
    pub fn new(timestamp: i64) -> Self {
        Self::with_data(timestamp, EventData::new())
    }

    pub fn with_data(timestamp: i64, data: EventData) -> Self {
        Self {
            id: next_event_id(),
            timestamp,
            data,
            stream_id: None,
            original: None,
            expired: false,
        }
    }

    /// Builder-style attribute setter
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Create a derived event whose root is the root of `source`
    pub fn derived_from(source: &Event, timestamp: i64, data: EventData) -> Self {
        Self {
            id: next_event_id(),
            timestamp,
            data,
            stream_id: source.stream_id.clone(),
            original: Some(source.root()),
            expired: false,
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }

    #[inline]
    pub fn data(&self) -> &EventData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut EventData {
        &mut self.data
    }

    pub fn into_data(self) -> EventData {
        self.data
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.data.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.data.get(key).and_then(AttributeValue::as_f64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(AttributeValue::as_i64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(AttributeValue::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn stream_id(&self) -> Option<&str> {
        self.stream_id.as_deref()
    }

    pub fn set_stream_id(&mut self, stream_id: Arc<str>) {
        self.stream_id = Some(stream_id);
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.expired
    }

    pub fn set_expired(&mut self, expired: bool) {
        self.expired = expired;
    }

    /// Root event this one was derived from, `None` for a root that has not
    /// been dispatched yet
    pub fn original(&self) -> Option<&Arc<Event>> {
        self.original.as_ref()
    }

    /// Id of the root event (own id for roots)
    pub fn root_id(&self) -> u64 {
        self.original.as_ref().map_or(self.id, |o| o.id)
    }

    /// Shared handle to the root event, snapshotting `self` if it is a root
    pub fn root(&self) -> Arc<Event> {
        match &self.original {
            Some(original) => Arc::clone(original),
            None => Arc::new(Event {
                original: None,
                ..self.clone()
            }),
        }
    }

    /// Pin the root reference so every later copy shares the same instance
    pub fn ensure_rooted(&mut self) {
        if self.original.is_none() {
            self.original = Some(self.root());
        }
    }

    /// Copy for one fan-out branch: fresh id, same data, same root,
    /// stream updated to the destination
    pub fn copy_for(&self, stream_id: &Arc<str>) -> Event {
        Event {
            id: next_event_id(),
            timestamp: self.timestamp,
            data: self.data.clone(),
            stream_id: Some(Arc::clone(stream_id)),
            original: Some(self.root()),
            expired: self.expired,
        }
    }

    /// Whether both events trace back to the same root instance
    pub fn same_origin(&self, other: &Event) -> bool {
        match (&self.original, &other.original) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => self.root_id() == other.root_id(),
        }
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Event {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_preserves_root_instance() {
        let mut root = Event::new(1000).attribute("symbol", "IBM");
        root.ensure_rooted();
        let stream: Arc<str> = Arc::from("StockStream");

        let first = root.copy_for(&stream);
        let second = first.copy_for(&Arc::from("OutputStream"));

        assert_ne!(first.id(), root.id());
        assert_eq!(second.stream_id(), Some("OutputStream"));
        assert!(Arc::ptr_eq(
            first.original().unwrap(),
            second.original().unwrap()
        ));
        assert_eq!(second.root_id(), root.id());
        assert!(first.same_origin(&second));
    }

    #[test]
    fn test_derived_event_keeps_root() {
        let stream: Arc<str> = Arc::from("S1");
        let mut root = Event::new(10).attribute("price", 55.6);
        root.ensure_rooted();
        let copy = root.copy_for(&stream);

        let mut data = EventData::new();
        data.insert("e1.price".to_string(), AttributeValue::Double(55.6));
        let derived = Event::derived_from(&copy, copy.timestamp(), data);

        assert_eq!(derived.root_id(), root.id());
        assert_eq!(derived.get_f64("e1.price"), Some(55.6));
        assert_eq!(derived.stream_id(), Some("S1"));
    }

    #[test]
    fn test_typed_getters() {
        let event = Event::new(0)
            .attribute("symbol", "WSO2")
            .attribute("volume", 10i64);
        assert_eq!(event.get_str("symbol"), Some("WSO2"));
        assert_eq!(event.get_i64("volume"), Some(10));
        assert!(event.get("missing").is_none());
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0

use super::Processor;
use crate::core::error::WisdomResult;
use crate::core::event::{AttributeValue, Event, EventData};
use std::sync::Arc;

/// Projects each event onto a list of attributes, optionally renaming them.
///
/// Attributes missing from the input are emitted as `Null` so every output
/// event has the same shape.
#[derive(Debug)]
pub struct SelectProcessor {
    /// `(source attribute, output name)` pairs
    attributes: Vec<(String, String)>,
    next: Arc<dyn Processor>,
}

impl SelectProcessor {
    pub fn new(attributes: Vec<(String, String)>, next: Arc<dyn Processor>) -> Self {
        Self { attributes, next }
    }

    fn project(&self, event: Event) -> Event {
        let mut data = EventData::with_capacity(self.attributes.len());
        for (source, alias) in &self.attributes {
            let value = event.get(source).cloned().unwrap_or(AttributeValue::Null);
            data.insert(alias.clone(), value);
        }
        let mut projected = Event::derived_from(&event, event.timestamp(), data);
        projected.set_expired(event.is_expired());
        projected
    }
}

impl Processor for SelectProcessor {
    fn process(&self, event: Event) -> WisdomResult<()> {
        self.next.process(self.project(event))
    }

    fn process_batch(&self, events: Vec<Event>) -> WisdomResult<()> {
        let projected = events.into_iter().map(|e| self.project(e)).collect();
        self.next.process_batch(projected)
    }

    fn copy(self: Arc<Self>) -> Arc<dyn Processor> {
        Arc::new(SelectProcessor {
            attributes: self.attributes.clone(),
            next: Arc::clone(&self.next).copy(),
        })
    }
}

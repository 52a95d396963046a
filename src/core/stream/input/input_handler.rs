// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::core::config::wisdom_context::WisdomContext;
use crate::core::error::WisdomResult;
use crate::core::event::{Event, EventData};
use crate::core::query::processor::Processor;
use crate::core::stream::stream::Stream;
use std::sync::Arc;

/// Entry point for external producers of one stream
///
/// Holds an `Arc` to the stream so the handle stays valid for its lifetime.
#[derive(Debug, Clone)]
pub struct InputHandler {
    stream: Arc<Stream>,
    context: Arc<WisdomContext>,
}

impl InputHandler {
    pub fn new(stream: Arc<Stream>, context: Arc<WisdomContext>) -> Self {
        Self { stream, context }
    }

    pub fn stream_id(&self) -> &str {
        self.stream.id()
    }

    /// Send an event keeping its own timestamp
    pub fn send(&self, event: Event) -> WisdomResult<()> {
        self.stream.process(event)
    }

    /// Send attributes stamped with the application clock
    pub fn send_data(&self, data: EventData) -> WisdomResult<()> {
        let event = Event::with_data(self.context.current_timestamp(), data);
        self.stream.process(event)
    }

    pub fn send_batch(&self, events: Vec<Event>) -> WisdomResult<()> {
        self.stream.process_batch(events)
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod log_sink;
pub mod sink_trait;

use crate::core::error::WisdomResult;
use crate::core::event::Event;
use crate::core::query::processor::Processor;
use std::sync::Arc;

pub use log_sink::LogSink;
pub use sink_trait::Sink;

/// Adapter that places a [`Sink`] at the end of a processor chain
#[derive(Debug)]
pub struct SinkProcessor {
    sink: Box<dyn Sink>,
}

impl SinkProcessor {
    pub fn new(sink: Box<dyn Sink>) -> Self {
        Self { sink }
    }
}

impl Processor for SinkProcessor {
    fn start(&self) -> WisdomResult<()> {
        self.sink.start()
    }

    fn stop(&self) -> WisdomResult<()> {
        self.sink.stop();
        Ok(())
    }

    fn process(&self, event: Event) -> WisdomResult<()> {
        self.sink.publish(std::slice::from_ref(&event))
    }

    fn process_batch(&self, events: Vec<Event>) -> WisdomResult<()> {
        self.sink.publish(&events)
    }

    fn copy(self: Arc<Self>) -> Arc<dyn Processor> {
        self
    }
}

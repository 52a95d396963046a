// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::core::error::WisdomResult;
use crate::core::event::Event;
use std::fmt::Debug;

/// Terminal consumer of a stream's events
pub trait Sink: Debug + Send + Sync {
    fn start(&self) -> WisdomResult<()> {
        Ok(())
    }

    fn stop(&self) {}

    /// Deliver one batch of events
    ///
    /// Errors are routed to the application's exception handler by the
    /// [`SinkProcessor`](super::SinkProcessor) driving the sink.
    fn publish(&self, events: &[Event]) -> WisdomResult<()>;

    fn clone_box(&self) -> Box<dyn Sink>;
}

impl Clone for Box<dyn Sink> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

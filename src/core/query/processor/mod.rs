// SPDX-License-Identifier: MIT OR Apache-2.0

//! Processor chain abstraction
//!
//! Every dispatch stage (stream, window, pattern, filter, projection,
//! callback, sink) implements [`Processor`]. Stages are wired at graph-build
//! time by handing each one its next processor; nothing points back up the
//! chain.

pub mod filter_processor;
pub mod select_processor;
pub mod stream;

use crate::core::config::wisdom_context::WisdomContext;
use crate::core::error::WisdomResult;
use crate::core::event::Event;
use std::fmt::Debug;
use std::sync::Arc;

pub use filter_processor::FilterProcessor;
pub use select_processor::SelectProcessor;

pub trait Processor: Debug + Send + Sync {
    fn start(&self) -> WisdomResult<()> {
        Ok(())
    }

    fn stop(&self) -> WisdomResult<()> {
        Ok(())
    }

    /// Wire the stage to the application's scheduler and clock
    fn init(&self, _context: &Arc<WisdomContext>) -> WisdomResult<()> {
        Ok(())
    }

    fn process(&self, event: Event) -> WisdomResult<()>;

    fn process_batch(&self, events: Vec<Event>) -> WisdomResult<()> {
        for event in events {
            self.process(event)?;
        }
        Ok(())
    }

    /// Independent instance of this stage and everything after it
    ///
    /// Stateless sinks of the chain (streams, callbacks) return themselves.
    fn copy(self: Arc<Self>) -> Arc<dyn Processor>;

    fn is_stateful(&self) -> bool {
        false
    }
}

/// Processor that forwards nothing; terminates chains in tests and copies
#[derive(Debug, Default)]
pub struct NoopProcessor;

impl Processor for NoopProcessor {
    fn process(&self, _event: Event) -> WisdomResult<()> {
        Ok(())
    }

    fn process_batch(&self, _events: Vec<Event>) -> WisdomResult<()> {
        Ok(())
    }

    fn copy(self: Arc<Self>) -> Arc<dyn Processor> {
        self
    }
}

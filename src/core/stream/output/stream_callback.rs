// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::core::error::WisdomResult;
use crate::core::event::Event;
use crate::core::query::processor::Processor;
use std::fmt::Debug;
use std::sync::Arc;

/// User callback receiving the events of one stream
pub trait StreamCallback: Send + Sync {
    fn receive_events(&self, events: &[Event]);
}

impl<F> StreamCallback for F
where
    F: Fn(&[Event]) + Send + Sync,
{
    fn receive_events(&self, events: &[Event]) {
        self(events)
    }
}

/// Processor adapter delivering to a [`StreamCallback`]
pub struct CallbackProcessor {
    callback: Arc<dyn StreamCallback>,
}

impl Debug for CallbackProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackProcessor").finish_non_exhaustive()
    }
}

impl CallbackProcessor {
    pub fn new(callback: Arc<dyn StreamCallback>) -> Self {
        Self { callback }
    }
}

impl Processor for CallbackProcessor {
    fn process(&self, event: Event) -> WisdomResult<()> {
        self.callback.receive_events(std::slice::from_ref(&event));
        Ok(())
    }

    fn process_batch(&self, events: Vec<Event>) -> WisdomResult<()> {
        self.callback.receive_events(&events);
        Ok(())
    }

    fn copy(self: Arc<Self>) -> Arc<dyn Processor> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_closure_callback_receives_batches() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let processor = CallbackProcessor::new(Arc::new(move |events: &[Event]| {
            sink.lock().unwrap().push(events.len());
        }));

        processor.process(Event::new(1)).unwrap();
        processor
            .process_batch(vec![Event::new(2), Event::new(3)])
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }
}

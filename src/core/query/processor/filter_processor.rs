// SPDX-License-Identifier: MIT OR Apache-2.0

use super::Processor;
use crate::core::error::WisdomResult;
use crate::core::event::Event;
use std::fmt::Debug;
use std::sync::Arc;

pub type EventPredicate = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Forwards only the events accepted by its predicate
pub struct FilterProcessor {
    predicate: EventPredicate,
    next: Arc<dyn Processor>,
}

impl Debug for FilterProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterProcessor")
            .field("next", &self.next)
            .finish()
    }
}

impl FilterProcessor {
    pub fn new(predicate: EventPredicate, next: Arc<dyn Processor>) -> Self {
        Self { predicate, next }
    }
}

impl Processor for FilterProcessor {
    fn process(&self, event: Event) -> WisdomResult<()> {
        if (self.predicate)(&event) {
            self.next.process(event)?;
        }
        Ok(())
    }

    fn process_batch(&self, events: Vec<Event>) -> WisdomResult<()> {
        let accepted: Vec<Event> = events.into_iter().filter(|e| (self.predicate)(e)).collect();
        if accepted.is_empty() {
            return Ok(());
        }
        self.next.process_batch(accepted)
    }

    fn copy(self: Arc<Self>) -> Arc<dyn Processor> {
        Arc::new(FilterProcessor {
            predicate: Arc::clone(&self.predicate),
            next: Arc::clone(&self.next).copy(),
        })
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0

use super::pattern_node::{PatternNode, Step};
use crate::core::event::Event;

/// Delivery rule for the children of a composite pattern
///
/// Children are offered an event in declaration order. A child only sees
/// events of the streams it listens on, and once one child consumes the
/// event the remaining children do not see it.
#[derive(Debug, Default)]
pub(crate) struct EventDistributor {
    consumed: bool,
}

impl EventDistributor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_deliver(&self, child: &PatternNode, event: &Event) -> bool {
        !self.consumed && child.listens_to(event.stream_id())
    }

    pub fn record(&mut self, step: &Step) {
        self.consumed |= step.consumed;
    }

    pub fn consumed(&self) -> bool {
        self.consumed
    }
}

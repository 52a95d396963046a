// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wisdom - complex event processing engine
//!
//! Events enter through [`Stream`](core::Stream)s, which fan them out to
//! processors: patterns that correlate events across streams, batching
//! windows, filters, projections, callbacks and sinks. Everything is wired
//! programmatically on a [`WisdomApp`](core::WisdomApp).

pub mod core;

pub use crate::core::*;

// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pattern matching over one or more streams
//!
//! Patterns are built with [`Pattern`] and the composition functions
//! ([`sequence`], [`and`], [`or`], [`not`], [`every`], [`times`]) and run by
//! a [`PatternProcessor`] registered on each stream they listen on.

mod event_distributor;
pub mod partial_match;
pub mod pattern;
pub(crate) mod pattern_node;
pub mod pattern_processor;

pub use partial_match::{MatchId, PartialMatch};
pub use pattern::{and, every, not, or, sequence, sequence_within, times, Pattern};
pub use pattern_node::{LogicalOp, PatternFilter};
pub use pattern_processor::PatternProcessor;

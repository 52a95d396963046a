// SPDX-License-Identifier: MIT OR Apache-2.0

//! Composable pattern definitions
//!
//! ```ignore
//! let e1 = Pattern::new("e1", "StockStream1").filter(|e| e.get_f64("price") > Some(45.0));
//! let e2 = Pattern::new("e2", "StockStream2")
//!     .filter_with(|e, captured| e.get_f64("price") > captured.get("e1.price").and_then(|v| v.as_f64()));
//! let pattern = sequence(every(e1), e2).within(Duration::from_secs(1));
//! ```
//!
//! Misuse (filtering a composite, bad bounds) is recorded on the pattern and
//! reported by [`Pattern::validate`], which the query builder calls before
//! any processor is wired.

use super::pattern_node::{LogicalOp, PatternFilter, PatternNode};
use crate::core::error::{WisdomError, WisdomResult};
use crate::core::event::{Event, EventData};
use std::sync::Arc;
use std::time::Duration;

pub const PATTERN_FOLLOWED_BY_INFIX: &str = "-followed-by-";
pub const PATTERN_AND_INFIX: &str = "-and-";
pub const PATTERN_OR_INFIX: &str = "-or-";
pub const PATTERN_NOT_PREFIX: &str = "not-";
pub const PATTERN_EVERY_PREFIX: &str = "every-";
pub const PATTERN_TIMES_INFIX: &str = "-times-";

#[derive(Debug, Clone)]
pub struct Pattern {
    id: String,
    node: PatternNode,
    errors: Vec<String>,
}

impl Pattern {
    /// Leaf pattern binding events of `stream_id` to `alias`
    pub fn new(alias: impl Into<String>, stream_id: impl Into<String>) -> Self {
        Self::on_streams(alias, [stream_id.into()])
    }

    /// Leaf pattern listening on several streams
    pub fn on_streams<I, S>(alias: impl Into<String>, streams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let alias = alias.into();
        let streams: Vec<String> = streams.into_iter().map(Into::into).collect();
        let mut errors = Vec::new();
        if alias.is_empty() {
            errors.push("Pattern alias cannot be empty".to_string());
        }
        if streams.is_empty() {
            errors.push(format!("Pattern '{alias}' must listen on at least one stream"));
        }
        Self {
            id: alias.clone(),
            node: PatternNode::leaf(alias, streams),
            errors,
        }
    }

    fn composite(id: String, node: PatternNode, errors: Vec<Vec<String>>) -> Self {
        Self {
            id,
            node,
            errors: errors.concat(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Accept only events matching `predicate`
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.filter_with(move |event, _| predicate(event))
    }

    /// Accept only events matching `predicate`, which also sees the
    /// attributes captured so far (`e1.price`, ...)
    pub fn filter_with<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Event, &EventData) -> bool + Send + Sync + 'static,
    {
        let filter: PatternFilter = Arc::new(predicate);
        if !self.node.set_filter(filter) {
            self.errors
                .push(format!("Composite pattern '{}' cannot have filter", self.id));
        }
        self
    }

    /// Bound the time between the first and last event of this pattern
    pub fn within(mut self, duration: Duration) -> Self {
        match i64::try_from(duration.as_millis()) {
            Ok(bound) if bound > 0 => self.node.set_within(bound),
            _ => self.errors.push(format!(
                "Within duration of pattern '{}' must be a positive number of milliseconds",
                self.id
            )),
        }
        self
    }

    /// Between `min` and `max` occurrences
    pub fn times(self, min: usize, max: usize) -> Self {
        times(self, min, max)
    }

    /// Exactly `count` occurrences
    pub fn times_exact(self, count: usize) -> Self {
        times(self, count, count)
    }

    pub fn min_times(self, min: usize) -> Self {
        times(self, min, usize::MAX)
    }

    pub fn max_times(self, max: usize) -> Self {
        times(self, 0, max)
    }

    /// Streams the pattern listens on
    pub fn streams(&self) -> Vec<String> {
        self.node.streams()
    }

    pub fn aliases(&self) -> Vec<String> {
        self.node.aliases()
    }

    pub fn within_bound(&self) -> Option<Duration> {
        self.node
            .within()
            .and_then(|ms| u64::try_from(ms).ok())
            .map(Duration::from_millis)
    }

    /// Whether matches are handed on as one batch per event
    pub fn is_batch(&self) -> bool {
        self.node.is_batch()
    }

    pub fn validate(&self) -> WisdomResult<()> {
        if let Some(error) = self.errors.first() {
            return Err(WisdomError::validation_with_field(error.clone(), self.id.clone()));
        }
        if self.node.completes_without_event() {
            return Err(WisdomError::validation_with_field(
                format!(
                    "Pattern '{}' can complete without any event; a negation needs a following pattern",
                    self.id
                ),
                self.id.clone(),
            ));
        }
        Ok(())
    }

    pub(crate) fn node(&self) -> &PatternNode {
        &self.node
    }
}

/// `first` followed by `next`
pub fn sequence(first: Pattern, next: Pattern) -> Pattern {
    let id = format!("{}{}{}", first.id, PATTERN_FOLLOWED_BY_INFIX, next.id);
    let node = PatternNode::sequence(first.node, next.node);
    Pattern::composite(id, node, vec![first.errors, next.errors])
}

/// `first` followed by `next` no later than `within` after `first`
pub fn sequence_within(first: Pattern, next: Pattern, within: Duration) -> Pattern {
    sequence(first, next).within(within)
}

pub fn and(left: Pattern, right: Pattern) -> Pattern {
    logical(LogicalOp::And, PATTERN_AND_INFIX, left, right)
}

pub fn or(left: Pattern, right: Pattern) -> Pattern {
    logical(LogicalOp::Or, PATTERN_OR_INFIX, left, right)
}

fn logical(op: LogicalOp, infix: &str, left: Pattern, right: Pattern) -> Pattern {
    let id = format!("{}{}{}", left.id, infix, right.id);
    let node = PatternNode::logical(op, left.node, right.node);
    Pattern::composite(id, node, vec![left.errors, right.errors])
}

/// Holds as long as `pattern` does not occur before what follows it
pub fn not(pattern: Pattern) -> Pattern {
    let id = format!("{PATTERN_NOT_PREFIX}{}", pattern.id);
    let node = PatternNode::not(pattern.node);
    Pattern::composite(id, node, vec![pattern.errors])
}

/// Match `pattern` again after every occurrence
pub fn every(pattern: Pattern) -> Pattern {
    let id = format!("{PATTERN_EVERY_PREFIX}{}", pattern.id);
    let node = PatternNode::every(pattern.node);
    Pattern::composite(id, node, vec![pattern.errors])
}

/// Between `min` and `max` occurrences of `pattern`
pub fn times(pattern: Pattern, min: usize, max: usize) -> Pattern {
    let id = format!("{}{}{}-{}", pattern.id, PATTERN_TIMES_INFIX, min, max);
    let mut errors = pattern.errors;
    if max == 0 || min > max {
        errors.push(format!(
            "Invalid occurrence bounds [{min}, {max}] for pattern '{}'",
            pattern.id
        ));
    }
    let node = PatternNode::count(pattern.node, min, max);
    Pattern::composite(id, node, vec![errors])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_follow_composition() {
        let pattern = sequence(
            every(Pattern::new("e1", "S1")),
            or(Pattern::new("e2", "S2"), not(Pattern::new("e3", "S3"))),
        );
        assert_eq!(pattern.id(), "every-e1-followed-by-e2-or-not-e3");
        assert_eq!(pattern.streams(), vec!["S1", "S2", "S3"]);
        assert_eq!(pattern.aliases(), vec!["e1", "e2", "e3"]);
    }

    #[test]
    fn test_filter_on_composite_fails_validation() {
        let pattern = sequence(Pattern::new("e1", "S1"), Pattern::new("e2", "S2"))
            .filter(|_| true);
        let error = pattern.validate().unwrap_err();
        assert!(error.is_validation());
        assert!(error.to_string().contains("cannot have filter"));
    }

    #[test]
    fn test_errors_propagate_from_children() {
        let pattern = and(
            Pattern::new("e1", "S1"),
            times(Pattern::new("e2", "S2"), 3, 1),
        );
        assert!(pattern.validate().is_err());
    }

    #[test]
    fn test_standalone_not_is_rejected() {
        assert!(not(Pattern::new("e1", "S1")).validate().is_err());
        assert!(sequence(not(Pattern::new("e1", "S1")), Pattern::new("e2", "S2"))
            .validate()
            .is_ok());
        assert!(Pattern::new("e1", "S1").max_times(2).validate().is_err());
    }

    #[test]
    fn test_within_must_be_positive() {
        let pattern = sequence(Pattern::new("e1", "S1"), Pattern::new("e2", "S2"))
            .within(Duration::ZERO);
        assert!(pattern.validate().is_err());

        let bounded = sequence_within(
            Pattern::new("e1", "S1"),
            Pattern::new("e2", "S2"),
            Duration::from_millis(100),
        );
        assert_eq!(bounded.within_bound(), Some(Duration::from_millis(100)));
    }
}

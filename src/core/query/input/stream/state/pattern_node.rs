// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pattern state machine
//!
//! A pattern is a tree of [`PatternNode`]s. Partial matches are armed into a
//! node from its parent, and the node reports what happened through a
//! [`Step`]: matches that completed at this node, previously emitted
//! matches that must be withdrawn, time scopes that ran out, and whether the
//! current event was consumed.
//!
//! Composite nodes never look at events themselves; they route them to
//! their children with an [`EventDistributor`] and combine what comes back.

use super::event_distributor::EventDistributor;
use super::partial_match::{MatchId, NodeId, PartialMatch};
use crate::core::event::{Event, EventData};
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Filter of a leaf pattern
///
/// Receives the candidate event and the attributes captured so far by the
/// partial match being extended (`e1.price`, ...).
pub type PatternFilter = Arc<dyn Fn(&Event, &EventData) -> bool + Send + Sync>;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// Outcome of arming, feeding or expiring a node
#[derive(Debug, Default)]
pub(crate) struct Step {
    pub matched: Vec<PartialMatch>,
    /// Ids of matches emitted earlier that no longer hold
    pub killed: Vec<MatchId>,
    /// `(owner, input)` of within scopes that ran out
    pub expired: Vec<(NodeId, MatchId)>,
    pub consumed: bool,
}

impl Step {
    fn merge(&mut self, other: Step) {
        self.matched.extend(other.matched);
        self.killed.extend(other.killed);
        self.expired.extend(other.expired);
        self.consumed |= other.consumed;
    }
}

/// Remove the matches whose time scope ran out at `now`
fn drain_expired(matches: &mut Vec<PartialMatch>, now: i64, step: &mut Step) {
    matches.retain(|m| {
        if m.is_expired(now) {
            step.expired.extend(m.expired_scopes(now));
            false
        } else {
            true
        }
    });
}

#[derive(Clone)]
pub(crate) struct Leaf {
    alias: String,
    streams: Vec<String>,
    filter: Option<PatternFilter>,
    pending: Vec<PartialMatch>,
    /// Root event id -> correlated event, for the latest successful match
    correlations: HashMap<u64, Event>,
}

impl Debug for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Leaf")
            .field("alias", &self.alias)
            .field("streams", &self.streams)
            .field("filtered", &self.filter.is_some())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl Leaf {
    fn feed(&mut self, event: &Event) -> Step {
        if self.pending.is_empty() {
            return Step::default();
        }

        let mut matched = Vec::new();
        let mut correlated = Vec::new();
        for input in std::mem::take(&mut self.pending) {
            let accepted = self
                .filter
                .as_ref()
                .map_or(true, |filter| filter(event, input.data()));
            if accepted {
                let (extended, correlated_event) = input.extend(&self.alias, event);
                matched.push(extended);
                correlated.push(correlated_event);
            } else {
                self.pending.push(input);
            }
        }

        if matched.is_empty() {
            return Step::default();
        }
        self.correlations.clear();
        for event in correlated {
            self.correlations.insert(event.root_id(), event);
        }
        Step {
            matched,
            consumed: true,
            ..Step::default()
        }
    }

    fn expire(&mut self, now: i64) -> Step {
        let mut step = Step::default();
        drain_expired(&mut self.pending, now, &mut step);
        step
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.correlations.clear();
    }
}

/// `first` followed by `next`
#[derive(Debug, Clone)]
pub(crate) struct Sequence {
    first: Box<PatternNode>,
    next: Box<PatternNode>,
}

impl Sequence {
    /// Hand what `first` produced over to `next`
    fn chain(&mut self, head: Step, step: &mut Step) {
        step.expired.extend(head.expired);
        step.consumed |= head.consumed;
        for id in head.killed {
            self.next.cancel(id);
        }
        for matched in head.matched {
            let armed = self.next.arm(matched);
            step.merge(armed);
        }
    }

    fn arm(&mut self, input: PartialMatch) -> Step {
        let head = self.first.arm(input);
        let mut step = Step::default();
        self.chain(head, &mut step);
        step
    }

    fn feed(&mut self, event: &Event) -> Step {
        let mut step = Step::default();
        let mut distributor = EventDistributor::new();
        if distributor.should_deliver(&self.first, event) {
            let head = self.first.feed(event);
            distributor.record(&head);
            self.chain(head, &mut step);
        }
        if distributor.should_deliver(&self.next, event) {
            let tail = self.next.feed(event);
            distributor.record(&tail);
            step.merge(tail);
        }
        step.consumed = distributor.consumed();
        step
    }

    fn expire(&mut self, now: i64) -> Step {
        let tail = self.next.expire(now);
        let head = self.first.expire(now);
        let mut step = Step::default();
        self.chain(head, &mut step);
        step.merge(tail);
        step
    }
}

#[derive(Debug, Clone)]
struct Branch {
    input: MatchId,
    side: Side,
    matched: PartialMatch,
}

/// AND / OR over two children armed with the same input
#[derive(Debug, Clone)]
pub(crate) struct Logical {
    op: LogicalOp,
    left: Box<PatternNode>,
    right: Box<PatternNode>,
    inputs: Vec<PartialMatch>,
    /// AND: matches of one side waiting for the other
    branches: Vec<Branch>,
}

impl Logical {
    fn absorb(&mut self, side: Side, result: Step, step: &mut Step) {
        step.expired.extend(result.expired);
        step.consumed |= result.consumed;

        for id in result.killed {
            let before = self.branches.len();
            self.branches.retain(|b| !b.matched.descends_from(id));
            if before == self.branches.len() {
                step.killed.push(id);
            }
        }

        for matched in result.matched {
            let position = self.inputs.iter().position(|x| matched.descends_from(x.id()));
            match self.op {
                LogicalOp::Or => {
                    if let Some(position) = position {
                        let input = self.inputs.remove(position);
                        let other = match side {
                            Side::Left => &mut self.right,
                            Side::Right => &mut self.left,
                        };
                        other.cancel(input.id());
                    }
                    step.matched.push(matched);
                }
                LogicalOp::And => {
                    let Some(position) = position else {
                        continue;
                    };
                    let base = self.inputs[position].clone();
                    let (partners, rest): (Vec<Branch>, Vec<Branch>) =
                        std::mem::take(&mut self.branches)
                            .into_iter()
                            .partition(|b| b.input == base.id() && b.side != side);
                    self.branches = rest;

                    if partners.is_empty() {
                        self.branches.push(Branch {
                            input: base.id(),
                            side,
                            matched,
                        });
                        continue;
                    }
                    for partner in partners {
                        let combined = match side {
                            Side::Left => PartialMatch::combine(&base, &matched, &partner.matched),
                            Side::Right => PartialMatch::combine(&base, &partner.matched, &matched),
                        };
                        step.matched.push(combined);
                    }
                }
            }
        }
    }

    fn arm(&mut self, input: PartialMatch) -> Step {
        self.inputs.push(input.clone());
        let mut step = Step::default();
        let left = self.left.arm(input.clone());
        self.absorb(Side::Left, left, &mut step);
        let right = self.right.arm(input);
        self.absorb(Side::Right, right, &mut step);
        step
    }

    fn feed(&mut self, event: &Event) -> Step {
        let mut step = Step::default();
        let mut distributor = EventDistributor::new();
        if distributor.should_deliver(&self.left, event) {
            let left = self.left.feed(event);
            distributor.record(&left);
            self.absorb(Side::Left, left, &mut step);
        }
        if distributor.should_deliver(&self.right, event) {
            let right = self.right.feed(event);
            distributor.record(&right);
            self.absorb(Side::Right, right, &mut step);
        }
        step.consumed = distributor.consumed();
        step
    }

    fn expire(&mut self, now: i64) -> Step {
        let mut step = Step::default();
        let left = self.left.expire(now);
        self.absorb(Side::Left, left, &mut step);
        let right = self.right.expire(now);
        self.absorb(Side::Right, right, &mut step);

        self.branches.retain(|b| {
            if b.matched.is_expired(now) {
                step.expired.extend(b.matched.expired_scopes(now));
                false
            } else {
                true
            }
        });
        drain_expired(&mut self.inputs, now, &mut step);
        step
    }

    fn cancel(&mut self, id: MatchId) {
        self.inputs.retain(|x| !x.descends_from(id));
        self.branches.retain(|b| !b.matched.descends_from(id));
        self.left.cancel(id);
        self.right.cancel(id);
    }
}

#[derive(Debug, Clone)]
struct Watch {
    input: MatchId,
    passthrough: PartialMatch,
    /// Bounded negations hold the passthrough back until this instant
    release_at: Option<i64>,
}

/// Passes its input on unless the inner pattern shows up
///
/// Without a bound the passthrough goes out at once and is withdrawn if the
/// inner pattern occurs before whatever follows completes. With a bound it
/// is held until the bound has elapsed and dropped if the inner pattern
/// occurs first.
#[derive(Debug, Clone)]
pub(crate) struct Not {
    inner: Box<PatternNode>,
    watches: Vec<Watch>,
}

impl Not {
    fn arm(&mut self, input: PartialMatch, bound: Option<i64>) -> Step {
        let watched = self.inner.arm(input.clone());
        let mut step = Step {
            expired: watched.expired,
            ..Step::default()
        };
        if !watched.matched.is_empty() {
            self.inner.cancel(input.id());
            return step;
        }
        let passthrough = input.derive();
        let release_at =
            bound.map(|bound| input.last_timestamp().saturating_add(bound).saturating_add(1));
        self.watches.push(Watch {
            input: input.id(),
            passthrough: passthrough.clone(),
            release_at,
        });
        if release_at.is_none() {
            step.matched.push(passthrough);
        }
        step
    }

    fn feed(&mut self, event: &Event) -> Step {
        if !self.inner.listens_to(event.stream_id()) {
            return Step::default();
        }
        let result = self.inner.feed(event);
        let mut step = Step {
            expired: result.expired,
            consumed: result.consumed,
            ..Step::default()
        };
        for matched in result.matched {
            if let Some(position) = self
                .watches
                .iter()
                .position(|w| matched.descends_from(w.input))
            {
                let watch = self.watches.remove(position);
                self.inner.cancel(watch.input);
                if watch.release_at.is_some() {
                    log::trace!("Negated pattern occurred within bound, dropping {}", watch.input);
                    continue;
                }
                log::trace!(
                    "Negated pattern occurred, withdrawing match {}",
                    watch.passthrough.id()
                );
                step.killed.push(watch.passthrough.id());
            }
        }
        step
    }

    /// Release held passthroughs whose bound elapsed by `now`
    fn expire(&mut self, now: i64) -> Step {
        let mut step = Step {
            expired: self.inner.expire(now).expired,
            ..Step::default()
        };
        let (due, kept): (Vec<Watch>, Vec<Watch>) = std::mem::take(&mut self.watches)
            .into_iter()
            .partition(|w| w.release_at.is_some_and(|at| at <= now));
        self.watches = kept;
        for watch in due {
            self.inner.cancel(watch.input);
            step.matched.push(watch.passthrough);
        }
        step
    }

    fn cancel(&mut self, id: MatchId) {
        self.watches.retain(|w| !w.passthrough.descends_from(id));
        self.inner.cancel(id);
    }

    fn release(&mut self, matched: &PartialMatch) {
        let (released, kept): (Vec<Watch>, Vec<Watch>) = std::mem::take(&mut self.watches)
            .into_iter()
            .partition(|w| w.release_at.is_none() && matched.descends_from(w.passthrough.id()));
        self.watches = kept;
        for watch in released {
            self.inner.cancel(watch.input);
        }
        self.inner.release(matched);
    }
}

/// Re-arms the inner pattern with the same input after each match
#[derive(Debug, Clone)]
pub(crate) struct Every {
    inner: Box<PatternNode>,
    inputs: Vec<PartialMatch>,
}

impl Every {
    fn arm(&mut self, input: PartialMatch) -> Step {
        self.inputs.push(input.clone());
        self.inner.arm(input)
    }

    /// Pass matches of the inner pattern on and re-arm their inputs
    fn rearm(&mut self, result: Step) -> Step {
        let mut step = Step {
            killed: result.killed,
            expired: result.expired,
            consumed: result.consumed,
            ..Step::default()
        };
        for matched in result.matched {
            let input = self
                .inputs
                .iter()
                .find(|x| matched.descends_from(x.id()))
                .cloned();
            step.matched.push(matched);
            if let Some(input) = input {
                self.inner.cancel(input.id());
                let rearmed = self.inner.arm(input);
                step.merge(rearmed);
            }
        }
        step
    }

    fn feed(&mut self, event: &Event) -> Step {
        if !self.inner.listens_to(event.stream_id()) {
            return Step::default();
        }
        let result = self.inner.feed(event);
        self.rearm(result)
    }

    fn expire(&mut self, now: i64) -> Step {
        let result = self.inner.expire(now);
        let mut step = self.rearm(result);
        drain_expired(&mut self.inputs, now, &mut step);
        step
    }

    fn cancel(&mut self, id: MatchId) {
        self.inputs.retain(|x| !x.descends_from(id));
        self.inner.cancel(id);
    }
}

#[derive(Debug, Clone)]
struct Tally {
    input: PartialMatch,
    occurrences: Vec<PartialMatch>,
    /// Last emitted snapshot, withdrawn when a newer one replaces it
    snapshot: Option<MatchId>,
}

/// Count that ends the pattern
///
/// Nothing after it can withdraw a snapshot, so matches are held until the
/// count can no longer grow.
#[derive(Debug, Clone, Copy)]
struct Closing {
    /// Node carrying the count's own within bound
    owner: NodeId,
    bound: Option<i64>,
}

/// Counts occurrences of the inner pattern, emitting once the count lies in
/// `[min, max]`; going past `max` withdraws the match for good
#[derive(Debug, Clone)]
pub(crate) struct Count {
    inner: Box<PatternNode>,
    min: usize,
    max: usize,
    tallies: Vec<Tally>,
    closing: Option<Closing>,
}

impl Count {
    fn count(&mut self, result: Step, step: &mut Step) {
        step.killed.extend(result.killed);
        step.expired.extend(result.expired);
        step.consumed |= result.consumed;

        for occurrence in result.matched {
            let Some(position) = self
                .tallies
                .iter()
                .position(|t| occurrence.descends_from(t.input.id()))
            else {
                continue;
            };

            let tally = &mut self.tallies[position];
            tally.occurrences.push(occurrence);
            let input = tally.input.clone();
            let seen = tally.occurrences.len();
            let previous = tally.snapshot.take();
            if let Some(previous) = previous {
                step.killed.push(previous);
            }

            self.inner.cancel(input.id());
            if self.closing.is_some() && seen >= self.max {
                let tally = self.tallies.remove(position);
                step.matched.push(PartialMatch::collect(&tally.input, &tally.occurrences));
                continue;
            }
            if seen > self.max {
                self.tallies.remove(position);
                continue;
            }
            if seen >= self.min && self.closing.is_none() {
                let tally = &mut self.tallies[position];
                let snapshot = PartialMatch::collect(&input, &tally.occurrences);
                tally.snapshot = Some(snapshot.id());
                step.matched.push(snapshot);
            }
            let rearmed = self.inner.arm(input);
            step.killed.extend(rearmed.killed);
            step.expired.extend(rearmed.expired);
        }
    }

    fn arm(&mut self, input: PartialMatch) -> Step {
        let mut tally = Tally {
            input: input.clone(),
            occurrences: Vec::new(),
            snapshot: None,
        };
        let mut step = Step::default();
        if self.min == 0 && self.closing.is_none() {
            let snapshot = PartialMatch::collect(&input, &[]);
            tally.snapshot = Some(snapshot.id());
            step.matched.push(snapshot);
        }
        self.tallies.push(tally);
        let result = self.inner.arm(input);
        self.count(result, &mut step);
        step
    }

    fn feed(&mut self, event: &Event) -> Step {
        if !self.inner.listens_to(event.stream_id()) {
            return Step::default();
        }
        let result = self.inner.feed(event);
        let mut step = Step::default();
        self.count(result, &mut step);
        step
    }

    fn expire(&mut self, now: i64) -> Step {
        let result = self.inner.expire(now);
        let mut step = Step::default();
        self.count(result, &mut step);

        let closing = self.closing;
        let min = self.min;
        let mut dropped = Vec::new();
        self.tallies.retain(|t| match t.occurrences.first() {
            Some(first) if first.is_expired(now) => {
                let scopes = first.expired_scopes(now);
                let own_bound = closing
                    .is_some_and(|c| scopes.iter().all(|(owner, _)| *owner == c.owner));
                if own_bound && t.occurrences.len() >= min {
                    // the count's own bound ends it; what was counted stands
                    step.matched.push(PartialMatch::collect(&t.input, &t.occurrences));
                } else {
                    step.expired.extend(scopes);
                    step.killed.extend(t.snapshot);
                }
                dropped.push(t.input.id());
                false
            }
            _ => true,
        });
        for id in dropped {
            self.inner.cancel(id);
        }
        step
    }

    /// When held matches of a closing count are released by its own bound
    fn release_times(&self, out: &mut Vec<i64>) {
        let Some(Closing {
            owner,
            bound: Some(bound),
        }) = self.closing
        else {
            return;
        };
        for tally in &self.tallies {
            if tally.occurrences.len() < self.min {
                continue;
            }
            if let Some(start) = tally
                .occurrences
                .first()
                .and_then(|first| first.scope_start(owner))
            {
                out.push(start.saturating_add(bound).saturating_add(1));
            }
        }
    }

    fn cancel(&mut self, id: MatchId) {
        self.tallies.retain(|t| !t.input.descends_from(id));
        self.inner.cancel(id);
    }
}

#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Leaf(Leaf),
    Sequence(Sequence),
    Logical(Logical),
    Not(Not),
    Every(Every),
    Count(Count),
}

#[derive(Debug, Clone)]
pub(crate) struct PatternNode {
    id: NodeId,
    within: Option<i64>,
    /// Inputs that opened a within scope here and have not completed yet
    armed: Vec<PartialMatch>,
    kind: NodeKind,
}

impl PatternNode {
    fn with_kind(kind: NodeKind) -> Self {
        Self {
            id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            within: None,
            armed: Vec::new(),
            kind,
        }
    }

    pub fn leaf(alias: impl Into<String>, streams: Vec<String>) -> Self {
        Self::with_kind(NodeKind::Leaf(Leaf {
            alias: alias.into(),
            streams,
            filter: None,
            pending: Vec::new(),
            correlations: HashMap::new(),
        }))
    }

    pub fn sequence(first: PatternNode, next: PatternNode) -> Self {
        Self::with_kind(NodeKind::Sequence(Sequence {
            first: Box::new(first),
            next: Box::new(next),
        }))
    }

    pub fn logical(op: LogicalOp, left: PatternNode, right: PatternNode) -> Self {
        Self::with_kind(NodeKind::Logical(Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
            inputs: Vec::new(),
            branches: Vec::new(),
        }))
    }

    pub fn not(inner: PatternNode) -> Self {
        Self::with_kind(NodeKind::Not(Not {
            inner: Box::new(inner),
            watches: Vec::new(),
        }))
    }

    pub fn every(inner: PatternNode) -> Self {
        Self::with_kind(NodeKind::Every(Every {
            inner: Box::new(inner),
            inputs: Vec::new(),
        }))
    }

    pub fn count(inner: PatternNode, min: usize, max: usize) -> Self {
        Self::with_kind(NodeKind::Count(Count {
            inner: Box::new(inner),
            min,
            max,
            tallies: Vec::new(),
            closing: None,
        }))
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn set_within(&mut self, bound: i64) {
        self.within = Some(bound);
    }

    pub fn within(&self) -> Option<i64> {
        self.within
    }

    /// Attach a filter; only leaves take one
    pub fn set_filter(&mut self, filter: PatternFilter) -> bool {
        match &mut self.kind {
            NodeKind::Leaf(leaf) => {
                leaf.filter = Some(filter);
                true
            }
            _ => false,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    /// EVERY and COUNT roots hand all matches of one event over as a batch
    pub fn is_batch(&self) -> bool {
        matches!(self.kind, NodeKind::Every(_) | NodeKind::Count(_))
    }

    fn children(&self) -> Vec<&PatternNode> {
        match &self.kind {
            NodeKind::Leaf(_) => Vec::new(),
            NodeKind::Sequence(s) => vec![&*s.first, &*s.next],
            NodeKind::Logical(l) => vec![&*l.left, &*l.right],
            NodeKind::Not(n) => vec![&*n.inner],
            NodeKind::Every(e) => vec![&*e.inner],
            NodeKind::Count(c) => vec![&*c.inner],
        }
    }

    fn children_mut(&mut self) -> Vec<&mut PatternNode> {
        match &mut self.kind {
            NodeKind::Leaf(_) => Vec::new(),
            NodeKind::Sequence(s) => vec![&mut *s.first, &mut *s.next],
            NodeKind::Logical(l) => vec![&mut *l.left, &mut *l.right],
            NodeKind::Not(n) => vec![&mut *n.inner],
            NodeKind::Every(e) => vec![&mut *e.inner],
            NodeKind::Count(c) => vec![&mut *c.inner],
        }
    }

    /// Streams the pattern listens on, in declaration order
    pub fn streams(&self) -> Vec<String> {
        let mut streams = Vec::new();
        self.collect_streams(&mut streams);
        streams
    }

    fn collect_streams(&self, out: &mut Vec<String>) {
        if let NodeKind::Leaf(leaf) = &self.kind {
            for stream in &leaf.streams {
                if !out.contains(stream) {
                    out.push(stream.clone());
                }
            }
        }
        for child in self.children() {
            child.collect_streams(out);
        }
    }

    /// Events without a stream reach every leaf
    pub fn listens_to(&self, stream_id: Option<&str>) -> bool {
        let Some(stream_id) = stream_id else {
            return true;
        };
        match &self.kind {
            NodeKind::Leaf(leaf) => leaf.streams.iter().any(|s| s == stream_id),
            _ => self.children().iter().any(|c| c.listens_to(Some(stream_id))),
        }
    }

    /// Aliases bound by leaves of this pattern
    pub fn aliases(&self) -> Vec<String> {
        let mut aliases = Vec::new();
        if let NodeKind::Leaf(leaf) = &self.kind {
            aliases.push(leaf.alias.clone());
        }
        for child in self.children() {
            aliases.extend(child.aliases());
        }
        aliases
    }

    /// Whether arming alone can complete the pattern
    pub fn completes_without_event(&self) -> bool {
        match &self.kind {
            NodeKind::Leaf(_) => false,
            NodeKind::Sequence(s) => s.first.completes_without_event() && s.next.completes_without_event(),
            NodeKind::Logical(l) => match l.op {
                LogicalOp::And => l.left.completes_without_event() && l.right.completes_without_event(),
                LogicalOp::Or => l.left.completes_without_event() || l.right.completes_without_event(),
            },
            NodeKind::Not(_) => true,
            NodeKind::Every(e) => e.inner.completes_without_event(),
            NodeKind::Count(c) => c.min == 0 || c.inner.completes_without_event(),
        }
    }

    /// Whether the first step of the pattern waits for an event
    ///
    /// Only such patterns start over once they go idle; one that opens
    /// with a negation is decided from the moment it is armed.
    pub fn starts_with_event(&self) -> bool {
        match &self.kind {
            NodeKind::Leaf(_) => true,
            NodeKind::Sequence(s) => s.first.starts_with_event(),
            NodeKind::Logical(l) => match l.op {
                LogicalOp::And => l.left.starts_with_event() || l.right.starts_with_event(),
                LogicalOp::Or => l.left.starts_with_event() && l.right.starts_with_event(),
            },
            NodeKind::Not(_) => false,
            NodeKind::Every(e) => e.inner.starts_with_event(),
            NodeKind::Count(c) => c.min > 0 && c.inner.starts_with_event(),
        }
    }

    /// Whether any partial match is still in flight
    pub fn is_waiting(&self) -> bool {
        let own = match &self.kind {
            NodeKind::Leaf(leaf) => !leaf.pending.is_empty(),
            NodeKind::Logical(l) => !l.branches.is_empty(),
            NodeKind::Count(c) => !c.tallies.is_empty(),
            NodeKind::Every(e) => !e.inputs.is_empty(),
            NodeKind::Sequence(_) | NodeKind::Not(_) => false,
        };
        own || self.children().iter().any(|c| c.is_waiting())
    }

    /// Correlated event recorded by leaf `alias` for the root event `root_id`
    pub fn correlated(&self, alias: &str, root_id: u64) -> Option<&Event> {
        if let NodeKind::Leaf(leaf) = &self.kind {
            if leaf.alias == alias {
                return leaf.correlations.get(&root_id);
            }
        }
        self.children()
            .into_iter()
            .find_map(|c| c.correlated(alias, root_id))
    }

    pub fn arm(&mut self, mut input: PartialMatch) -> Step {
        if let NodeKind::Not(n) = &mut self.kind {
            return n.arm(input, self.within);
        }
        if let Some(bound) = self.within {
            input.open_scope(self.id, bound, None);
            self.armed.push(input.clone());
        }
        let step = self.arm_kind(input);
        self.settle(step)
    }

    fn arm_kind(&mut self, input: PartialMatch) -> Step {
        let within = self.within;
        match &mut self.kind {
            NodeKind::Leaf(leaf) => {
                leaf.pending.push(input);
                Step::default()
            }
            NodeKind::Sequence(s) => s.arm(input),
            NodeKind::Logical(l) => l.arm(input),
            NodeKind::Not(n) => n.arm(input, within),
            NodeKind::Every(e) => e.arm(input),
            NodeKind::Count(c) => c.arm(input),
        }
    }

    pub fn feed(&mut self, event: &Event) -> Step {
        let listening = self.listens_to(event.stream_id());
        let step = match &mut self.kind {
            NodeKind::Leaf(leaf) if listening => leaf.feed(event),
            NodeKind::Leaf(_) => Step::default(),
            NodeKind::Sequence(s) => s.feed(event),
            NodeKind::Logical(l) => l.feed(event),
            NodeKind::Not(n) => n.feed(event),
            NodeKind::Every(e) => e.feed(event),
            NodeKind::Count(c) => c.feed(event),
        };
        self.settle(step)
    }

    /// Drop partial matches whose within bound ran out at `now`
    pub fn expire(&mut self, now: i64) -> Step {
        let step = match &mut self.kind {
            NodeKind::Leaf(leaf) => leaf.expire(now),
            NodeKind::Sequence(s) => s.expire(now),
            NodeKind::Logical(l) => l.expire(now),
            NodeKind::Not(n) => n.expire(now),
            NodeKind::Every(e) => e.expire(now),
            NodeKind::Count(c) => c.expire(now),
        };
        self.settle(step)
    }

    /// Forget everything that grew out of match `id`
    pub fn cancel(&mut self, id: MatchId) {
        self.armed.retain(|m| !m.descends_from(id));
        self.cancel_kind(id);
    }

    fn cancel_kind(&mut self, id: MatchId) {
        match &mut self.kind {
            NodeKind::Leaf(leaf) => leaf.pending.retain(|m| !m.descends_from(id)),
            NodeKind::Sequence(s) => {
                s.first.cancel(id);
                s.next.cancel(id);
            }
            NodeKind::Logical(l) => l.cancel(id),
            NodeKind::Not(n) => n.cancel(id),
            NodeKind::Every(e) => e.cancel(id),
            NodeKind::Count(c) => c.cancel(id),
        }
    }

    /// Stop watching negations that `matched` has already outlived
    pub fn release(&mut self, matched: &PartialMatch) {
        if let NodeKind::Not(n) = &mut self.kind {
            n.release(matched);
            return;
        }
        for child in self.children_mut() {
            child.release(matched);
        }
    }

    /// Hold back matches of counts that end the pattern
    ///
    /// Called on the root of a pattern once it is built.
    pub fn mark_closing(&mut self) {
        let (owner, bound) = (self.id, self.within);
        match &mut self.kind {
            NodeKind::Count(c) => c.closing = Some(Closing { owner, bound }),
            NodeKind::Sequence(s) => s.next.mark_closing(),
            NodeKind::Logical(l) => {
                l.left.mark_closing();
                l.right.mark_closing();
            }
            NodeKind::Leaf(_) | NodeKind::Not(_) | NodeKind::Every(_) => {}
        }
    }

    /// Instants at which a held match will be released without any event
    pub fn release_times(&self) -> Vec<i64> {
        let mut times = Vec::new();
        self.collect_release_times(&mut times);
        times
    }

    fn collect_release_times(&self, out: &mut Vec<i64>) {
        match &self.kind {
            NodeKind::Not(n) => out.extend(n.watches.iter().filter_map(|w| w.release_at)),
            NodeKind::Count(c) => c.release_times(out),
            _ => {}
        }
        for child in self.children() {
            child.collect_release_times(out);
        }
    }

    pub fn reset(&mut self) {
        self.armed.clear();
        match &mut self.kind {
            NodeKind::Leaf(leaf) => leaf.reset(),
            NodeKind::Sequence(_) => {}
            NodeKind::Logical(l) => {
                l.inputs.clear();
                l.branches.clear();
            }
            NodeKind::Not(n) => n.watches.clear(),
            NodeKind::Every(e) => e.inputs.clear(),
            NodeKind::Count(c) => c.tallies.clear(),
        }
        for child in self.children_mut() {
            child.reset();
        }
    }

    /// Handle this node's own within scopes in `step`
    ///
    /// An input whose bound ran out before it completed starts over; outputs
    /// leave the node's scope.
    fn settle(&mut self, mut step: Step) -> Step {
        if self.within.is_none() {
            return step;
        }

        let mut restart = Vec::new();
        step.expired.retain(|(owner, input)| {
            if *owner != self.id {
                return true;
            }
            if !restart.contains(input) {
                restart.push(*input);
            }
            false
        });
        for input in restart {
            let Some(original) = self.armed.iter().find(|m| m.id() == input).cloned() else {
                continue;
            };
            log::trace!("Within bound of pattern node {} elapsed, re-arming", self.id);
            self.cancel_kind(input);
            let rearmed = self.arm_kind(original);
            step.merge(rearmed);
        }

        for matched in &mut step.matched {
            if let Some(position) = self.armed.iter().position(|a| matched.descends_from(a.id())) {
                self.armed.swap_remove(position);
            }
            matched.close_scope(self.id);
        }
        step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on(stream: &str, timestamp: i64, symbol: &str, price: f64) -> Event {
        let mut event = Event::new(timestamp)
            .attribute("symbol", symbol)
            .attribute("price", price);
        event.set_stream_id(Arc::from(stream));
        event
    }

    fn symbol_is(symbol: &'static str) -> PatternFilter {
        Arc::new(move |event: &Event, _: &EventData| event.get_str("symbol") == Some(symbol))
    }

    fn leaf(alias: &str, stream: &str, symbol: &'static str) -> PatternNode {
        let mut node = PatternNode::leaf(alias, vec![stream.to_string()]);
        node.set_filter(symbol_is(symbol));
        node
    }

    fn symbols(step: &Step, key: &str) -> Vec<String> {
        step.matched
            .iter()
            .filter_map(|m| m.data().get(key).and_then(|v| v.as_str()).map(str::to_string))
            .collect()
    }

    #[test]
    fn test_leaf_consumes_pending_input() {
        let mut node = leaf("e1", "S1", "IBM");
        node.arm(PartialMatch::seed(0));

        assert!(node.feed(&on("S1", 1, "WSO2", 1.0)).matched.is_empty());
        let step = node.feed(&on("S1", 2, "IBM", 1.0));
        assert_eq!(symbols(&step, "e1.symbol"), vec!["IBM"]);
        assert!(step.consumed);
        assert!(!node.is_waiting());
        assert!(node.feed(&on("S1", 3, "IBM", 1.0)).matched.is_empty());
    }

    #[test]
    fn test_sequence_feeds_next_only_after_first() {
        let mut node = PatternNode::sequence(leaf("e1", "S1", "IBM"), leaf("e2", "S1", "IBM"));
        node.arm(PartialMatch::seed(0));

        let first = node.feed(&on("S1", 1, "IBM", 1.0));
        assert!(first.matched.is_empty());
        let second = node.feed(&on("S1", 2, "IBM", 2.0));
        assert_eq!(second.matched.len(), 1);
        assert_eq!(second.matched[0].events().len(), 2);
    }

    #[test]
    fn test_or_cancels_other_branch() {
        let mut node = PatternNode::logical(
            LogicalOp::Or,
            leaf("e1", "S1", "IBM"),
            leaf("e2", "S2", "WSO2"),
        );
        node.arm(PartialMatch::seed(0));

        let step = node.feed(&on("S1", 1, "IBM", 1.0));
        assert_eq!(step.matched.len(), 1);
        assert!(step.matched[0].data().get("e2.symbol").is_none());
        assert!(node.feed(&on("S2", 2, "WSO2", 1.0)).matched.is_empty());
        assert!(!node.is_waiting());
    }

    #[test]
    fn test_and_waits_for_both_sides_in_any_order() {
        let mut node = PatternNode::logical(
            LogicalOp::And,
            leaf("e1", "S1", "IBM"),
            leaf("e2", "S2", "WSO2"),
        );
        node.arm(PartialMatch::seed(0));

        assert!(node.feed(&on("S2", 1, "WSO2", 1.0)).matched.is_empty());
        let step = node.feed(&on("S1", 2, "IBM", 1.0));
        assert_eq!(step.matched.len(), 1);
        assert_eq!(symbols(&step, "e1.symbol"), vec!["IBM"]);
        assert_eq!(symbols(&step, "e2.symbol"), vec!["WSO2"]);
    }

    #[test]
    fn test_not_withdraws_passthrough() {
        let mut node = PatternNode::sequence(
            PatternNode::not(leaf("e1", "S1", "IBM")),
            leaf("e2", "S2", "WSO2"),
        );
        node.arm(PartialMatch::seed(0));

        let step = node.feed(&on("S1", 1, "IBM", 1.0));
        assert!(step.matched.is_empty());
        assert!(node.feed(&on("S2", 2, "WSO2", 1.0)).matched.is_empty());
        assert!(!node.is_waiting());
    }

    #[test]
    fn test_every_rearms_after_each_match() {
        let mut node = PatternNode::every(leaf("e1", "S1", "IBM"));
        node.arm(PartialMatch::seed(0));

        for timestamp in 1..=3 {
            let step = node.feed(&on("S1", timestamp, "IBM", 1.0));
            assert_eq!(step.matched.len(), 1);
        }
    }

    #[test]
    fn test_count_emits_within_range_and_withdraws_on_overflow() {
        let mut node = PatternNode::count(leaf("e1", "S1", "IBM"), 2, 3);
        node.arm(PartialMatch::seed(0));

        assert!(node.feed(&on("S1", 1, "IBM", 10.0)).matched.is_empty());

        let second = node.feed(&on("S1", 2, "IBM", 20.0));
        assert_eq!(second.matched.len(), 1);
        let snapshot = second.matched[0].id();
        assert_eq!(
            second.matched[0].data().get("e1[1].price").and_then(|v| v.as_f64()),
            Some(20.0)
        );

        let third = node.feed(&on("S1", 3, "IBM", 30.0));
        assert_eq!(third.killed, vec![snapshot]);
        assert_eq!(third.matched.len(), 1);

        let fourth = node.feed(&on("S1", 4, "IBM", 40.0));
        assert!(fourth.matched.is_empty());
        assert_eq!(fourth.killed.len(), 1);
        assert!(!node.is_waiting());
    }

    #[test]
    fn test_within_restarts_sequence_after_bound() {
        let mut node = PatternNode::sequence(leaf("e1", "S1", "IBM"), leaf("e2", "S2", "WSO2"));
        node.set_within(100);
        node.arm(PartialMatch::seed(0));

        node.feed(&on("S1", 1000, "IBM", 1.0));
        let expired = node.expire(1200);
        assert!(expired.matched.is_empty());
        assert!(expired.expired.is_empty());
        assert!(node.feed(&on("S2", 1200, "WSO2", 1.0)).matched.is_empty());

        // the first step is armed again
        node.feed(&on("S1", 1300, "IBM", 1.0));
        node.expire(1350);
        let step = node.feed(&on("S2", 1350, "WSO2", 1.0));
        assert_eq!(step.matched.len(), 1);
    }

    #[test]
    fn test_completion_analysis() {
        let not_first = PatternNode::sequence(
            PatternNode::not(leaf("e1", "S1", "IBM")),
            leaf("e2", "S2", "WSO2"),
        );
        assert!(!not_first.completes_without_event());
        assert!(!not_first.starts_with_event());

        let bare_not = PatternNode::not(leaf("e1", "S1", "IBM"));
        assert!(bare_not.completes_without_event());

        let optional = PatternNode::count(leaf("e1", "S1", "IBM"), 0, 2);
        assert!(optional.completes_without_event());
    }
}

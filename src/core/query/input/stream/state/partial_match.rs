// SPDX-License-Identifier: MIT OR Apache-2.0

//! Partial matches flowing between pattern nodes
//!
//! A [`PartialMatch`] is the data captured so far by one path through a
//! pattern. Every step that extends a match creates a new one with a fresh
//! id and remembers the ids it was derived from, so a node can later cancel
//! everything that grew out of a given input (OR branches, NOT
//! disqualification, count overflow, within expiry).

use crate::core::event::{Event, EventData};
use std::sync::atomic::{AtomicU64, Ordering};

pub type MatchId = u64;
pub type NodeId = u64;

static NEXT_MATCH_ID: AtomicU64 = AtomicU64::new(1);

fn next_match_id() -> MatchId {
    NEXT_MATCH_ID.fetch_add(1, Ordering::Relaxed)
}

/// Time bound opened by a node with a `within` duration
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WithinScope {
    /// Node that opened the scope
    pub owner: NodeId,
    /// Match armed into the owner when the scope opened
    pub input: MatchId,
    pub bound: i64,
    /// Timestamp of the first event matched inside the scope
    pub started_at: Option<i64>,
}

impl WithinScope {
    fn is_expired(&self, now: i64) -> bool {
        self.started_at.is_some_and(|start| now - start > self.bound)
    }
}

#[derive(Debug, Clone)]
pub struct PartialMatch {
    id: MatchId,
    lineage: Vec<MatchId>,
    data: EventData,
    events: Vec<Event>,
    scopes: Vec<WithinScope>,
    /// Timestamp of the last event matched, or of seeding
    last_timestamp: i64,
}

impl PartialMatch {
    /// Empty match a pattern starts from
    pub fn seed(timestamp: i64) -> Self {
        Self {
            id: next_match_id(),
            lineage: Vec::new(),
            data: EventData::new(),
            events: Vec::new(),
            scopes: Vec::new(),
            last_timestamp: timestamp,
        }
    }

    #[inline]
    pub fn id(&self) -> MatchId {
        self.id
    }

    pub fn data(&self) -> &EventData {
        &self.data
    }

    /// Correlated events in match order
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn last_timestamp(&self) -> i64 {
        self.last_timestamp
    }

    /// Whether this match is `id` itself or grew out of it
    pub fn descends_from(&self, id: MatchId) -> bool {
        self.id == id || self.lineage.contains(&id)
    }

    /// Same content under a fresh id
    pub fn derive(&self) -> Self {
        let mut lineage = Vec::with_capacity(self.lineage.len() + 1);
        lineage.extend_from_slice(&self.lineage);
        lineage.push(self.id);
        Self {
            id: next_match_id(),
            lineage,
            data: self.data.clone(),
            events: self.events.clone(),
            scopes: self.scopes.clone(),
            last_timestamp: self.last_timestamp,
        }
    }

    /// Extend with `event` captured under `alias`
    ///
    /// Returns the extended match and the correlated event recorded for it.
    pub fn extend(&self, alias: &str, event: &Event) -> (Self, Event) {
        let mut extended = self.derive();
        for (key, value) in event.data() {
            extended
                .data
                .insert(format!("{alias}.{key}"), value.clone());
        }
        let timestamp = event.timestamp();
        let correlated = Event::derived_from(event, timestamp, extended.data.clone());
        extended.events.push(correlated.clone());
        extended.last_timestamp = timestamp;
        for scope in &mut extended.scopes {
            scope.started_at.get_or_insert(timestamp);
        }
        (extended, correlated)
    }

    pub(crate) fn open_scope(&mut self, owner: NodeId, bound: i64, started_at: Option<i64>) {
        self.scopes.push(WithinScope {
            owner,
            input: self.id,
            bound,
            started_at,
        });
    }

    pub(crate) fn close_scope(&mut self, owner: NodeId) {
        self.scopes.retain(|s| s.owner != owner);
    }

    /// When the scope opened by `owner` started, if it has
    pub(crate) fn scope_start(&self, owner: NodeId) -> Option<i64> {
        self.scopes
            .iter()
            .find(|s| s.owner == owner)
            .and_then(|s| s.started_at)
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.scopes.iter().any(|s| s.is_expired(now))
    }

    /// `(owner, input)` of every scope that ran out at `now`
    pub(crate) fn expired_scopes(&self, now: i64) -> Vec<(NodeId, MatchId)> {
        self.scopes
            .iter()
            .filter(|s| s.is_expired(now))
            .map(|s| (s.owner, s.input))
            .collect()
    }

    /// Combine the matches of two branches that grew out of `base`
    pub(crate) fn combine(base: &PartialMatch, left: &PartialMatch, right: &PartialMatch) -> Self {
        let mut combined = base.derive();
        combined.lineage.extend(left.lineage.iter().copied());
        combined.lineage.push(left.id);
        combined.lineage.extend(right.lineage.iter().copied());
        combined.lineage.push(right.id);
        combined.lineage.sort_unstable();
        combined.lineage.dedup();

        for (key, value) in left.data.iter().chain(right.data.iter()) {
            combined.data.insert(key.clone(), value.clone());
        }

        combined.events = left.events.clone();
        for event in right.events.iter().skip(base.events.len()) {
            combined.events.push(event.clone());
        }
        combined.events.sort_by_key(Event::timestamp);

        combined.scopes = left.scopes.clone();
        for scope in &mut combined.scopes {
            let other = right
                .scopes
                .iter()
                .find(|s| s.owner == scope.owner && s.input == scope.input)
                .and_then(|s| s.started_at);
            scope.started_at = match (scope.started_at, other) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }
        combined.last_timestamp = left.last_timestamp.max(right.last_timestamp);
        combined
    }

    /// Fold the occurrences counted for `base` into one match
    ///
    /// Attributes of each occurrence are also exposed under an indexed
    /// alias (`e1[0].price`); the plain key keeps the latest occurrence.
    pub(crate) fn collect(base: &PartialMatch, occurrences: &[PartialMatch]) -> Self {
        let mut collected = base.derive();
        for (index, occurrence) in occurrences.iter().enumerate() {
            collected.lineage.push(occurrence.id);
            for (key, value) in &occurrence.data {
                if base.data.contains_key(key) {
                    continue;
                }
                let indexed = match key.split_once('.') {
                    Some((alias, attribute)) => format!("{alias}[{index}].{attribute}"),
                    None => format!("{key}[{index}]"),
                };
                collected.data.insert(indexed, value.clone());
                collected.data.insert(key.clone(), value.clone());
            }
            for event in occurrence.events.iter().skip(base.events.len()) {
                collected.events.push(event.clone());
            }
            collected.last_timestamp = occurrence.last_timestamp;
        }
        if let Some(first) = occurrences.first() {
            collected.scopes = first.scopes.clone();
        }
        collected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_prefixes_attributes_and_tracks_lineage() {
        let seed = PartialMatch::seed(0);
        let event = Event::new(100).attribute("symbol", "IBM").attribute("price", 50.0);
        let (first, correlated) = seed.extend("e1", &event);

        assert!(first.descends_from(seed.id()));
        assert_eq!(first.data().get("e1.symbol"), event.get("symbol"));
        assert_eq!(correlated.root_id(), event.root_id());
        assert_eq!(first.last_timestamp(), 100);

        let (second, _) = first.extend("e2", &Event::new(200).attribute("symbol", "WSO2"));
        assert!(second.descends_from(seed.id()));
        assert_eq!(second.events().len(), 2);
        assert_eq!(second.data().len(), 3);
    }

    #[test]
    fn test_scope_starts_at_first_event_and_expires() {
        let mut seed = PartialMatch::seed(0);
        seed.open_scope(7, 100, None);
        assert!(!seed.is_expired(10_000));

        let (matched, _) = seed.extend("e1", &Event::new(1000));
        assert!(!matched.is_expired(1100));
        assert!(matched.is_expired(1101));
        assert_eq!(matched.expired_scopes(1101), vec![(7, seed.id())]);

        let mut closed = matched.clone();
        closed.close_scope(7);
        assert!(!closed.is_expired(5000));
    }

    #[test]
    fn test_collect_indexes_occurrences() {
        let seed = PartialMatch::seed(0);
        let (a, _) = seed.extend("e1", &Event::new(1).attribute("price", 10.0));
        let (b, _) = seed.extend("e1", &Event::new(2).attribute("price", 20.0));
        let collected = PartialMatch::collect(&seed, &[a, b]);

        assert_eq!(collected.data().get("e1[0].price").and_then(|v| v.as_f64()), Some(10.0));
        assert_eq!(collected.data().get("e1[1].price").and_then(|v| v.as_f64()), Some(20.0));
        assert_eq!(collected.data().get("e1.price").and_then(|v| v.as_f64()), Some(20.0));
        assert_eq!(collected.events().len(), 2);
    }
}

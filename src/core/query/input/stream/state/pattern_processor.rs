// SPDX-License-Identifier: MIT OR Apache-2.0

use super::partial_match::PartialMatch;
use super::pattern::Pattern;
use super::pattern_node::PatternNode;
use crate::core::config::wisdom_context::WisdomContext;
use crate::core::error::WisdomResult;
use crate::core::event::Event;
use crate::core::query::processor::Processor;
use crate::core::util::scheduler::Executor;
use once_cell::sync::OnceCell;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

#[derive(Debug)]
struct PatternState {
    root: PatternNode,
    seeded: bool,
    /// Release times a timer is already pending for
    timers: BTreeSet<i64>,
}

impl PatternState {
    fn process(&mut self, event: &Event, restartable: bool) -> Vec<PartialMatch> {
        let timestamp = event.timestamp();
        if !self.seeded {
            self.root.arm(PartialMatch::seed(timestamp));
            self.seeded = true;
        }

        let mut matched = self.root.expire(timestamp).matched;
        matched.extend(self.root.feed(event).matched);
        self.complete(matched, timestamp, restartable)
    }

    /// Release what became due at `now` without an event
    fn advance(&mut self, now: i64, restartable: bool) -> Vec<PartialMatch> {
        self.timers.retain(|at| *at > now);
        if !self.seeded {
            return Vec::new();
        }
        let matched = self.root.expire(now).matched;
        self.complete(matched, now, restartable)
    }

    fn complete(
        &mut self,
        matched: Vec<PartialMatch>,
        timestamp: i64,
        restartable: bool,
    ) -> Vec<PartialMatch> {
        for m in &matched {
            self.root.release(m);
        }

        if restartable && !self.root.is_waiting() {
            log::trace!("Pattern idle at {timestamp}, starting over");
            self.root.arm(PartialMatch::seed(timestamp));
        }
        matched
    }

    /// Release times no timer has been requested for yet
    fn unscheduled(&mut self) -> Vec<i64> {
        self.root
            .release_times()
            .into_iter()
            .filter(|at| self.timers.insert(*at))
            .collect()
    }
}

#[derive(Debug)]
struct PatternCore {
    this: Weak<PatternCore>,
    id: String,
    state: Mutex<PatternState>,
    next: Arc<dyn Processor>,
    batch: bool,
    restartable: bool,
    context: OnceCell<Arc<WisdomContext>>,
}

/// Scheduler callback releasing held matches
struct ReleaseTick {
    pattern: Weak<PatternCore>,
}

impl Executor for ReleaseTick {
    fn execute(&self, timestamp: i64) -> WisdomResult<()> {
        match self.pattern.upgrade() {
            Some(pattern) => pattern.on_tick(timestamp),
            None => Ok(()),
        }
    }
}

impl PatternCore {
    fn lock(&self) -> MutexGuard<'_, PatternState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn process(&self, event: &Event) -> WisdomResult<()> {
        let (matched, timers) = {
            let mut state = self.lock();
            let matched = state.process(event, self.restartable);
            (matched, state.unscheduled())
        };
        self.schedule(timers);
        self.emit(matched)
    }

    fn on_tick(&self, timestamp: i64) -> WisdomResult<()> {
        let (matched, timers) = {
            let mut state = self.lock();
            let matched = state.advance(timestamp, self.restartable);
            (matched, state.unscheduled())
        };
        self.schedule(timers);
        self.emit(matched)
    }

    fn schedule(&self, timers: Vec<i64>) {
        if timers.is_empty() {
            return;
        }
        let Some(context) = self.context.get() else {
            log::trace!("Pattern '{}' not initialised, held matches wait for events", self.id);
            return;
        };
        for at in timers {
            log::trace!("Pattern '{}' release scheduled at {at}", self.id);
            context.get_scheduler().schedule_at(
                at,
                Arc::new(ReleaseTick {
                    pattern: self.this.clone(),
                }),
            );
        }
    }

    fn emit(&self, matched: Vec<PartialMatch>) -> WisdomResult<()> {
        if matched.is_empty() {
            return Ok(());
        }

        let events: Vec<Event> = matched.iter().filter_map(to_event).collect();
        log::trace!("Pattern '{}' matched {} time(s)", self.id, events.len());
        if self.batch {
            self.next.process_batch(events)
        } else {
            for event in events {
                self.next.process(event)?;
            }
            Ok(())
        }
    }
}

fn to_event(matched: &PartialMatch) -> Option<Event> {
    let last = matched.events().last()?;
    Some(Event::derived_from(
        last,
        last.timestamp(),
        matched.data().clone(),
    ))
}

/// Root of a pattern, registered on every stream the pattern listens on
///
/// The whole pattern tree sits behind one lock; matches are handed to the
/// next processor after the lock is released. Matches held back until a
/// bound elapses are released by scheduler timers, or by the next event if
/// the processor was never initialised.
#[derive(Debug)]
pub struct PatternProcessor {
    template: PatternNode,
    core: Arc<PatternCore>,
}

impl PatternProcessor {
    pub fn new(pattern: &Pattern, next: Arc<dyn Processor>) -> WisdomResult<Self> {
        pattern.validate()?;
        let mut template = pattern.node().clone();
        template.mark_closing();
        Ok(Self::from_template(pattern.id().to_string(), template, next))
    }

    fn from_template(id: String, template: PatternNode, next: Arc<dyn Processor>) -> Self {
        let core = Arc::new_cyclic(|this| PatternCore {
            this: this.clone(),
            id,
            batch: template.is_batch(),
            restartable: template.starts_with_event(),
            state: Mutex::new(PatternState {
                root: template.clone(),
                seeded: false,
                timers: BTreeSet::new(),
            }),
            next,
            context: OnceCell::new(),
        });
        Self { template, core }
    }

    pub fn id(&self) -> &str {
        &self.core.id
    }

    pub fn streams(&self) -> Vec<String> {
        self.template.streams()
    }

    /// Drop every partial match; the pattern starts over with the next event
    pub fn reset(&self) {
        let mut state = self.core.lock();
        state.root.reset();
        state.seeded = false;
    }

    /// Whether some partial match is in flight
    pub fn is_waiting(&self) -> bool {
        self.core.lock().root.is_waiting()
    }

    /// Event recorded by leaf `alias` when it last matched the root event
    /// `root_id`
    pub fn correlated(&self, alias: &str, root_id: u64) -> Option<Event> {
        self.core.lock().root.correlated(alias, root_id).cloned()
    }

    /// Release matches whose bound elapsed by `timestamp`
    pub fn advance(&self, timestamp: i64) -> WisdomResult<()> {
        self.core.on_tick(timestamp)
    }
}

impl Processor for PatternProcessor {
    fn start(&self) -> WisdomResult<()> {
        log::debug!("Pattern '{}' listening on {:?}", self.id(), self.streams());
        Ok(())
    }

    fn init(&self, context: &Arc<WisdomContext>) -> WisdomResult<()> {
        if self.core.context.set(Arc::clone(context)).is_err() {
            log::debug!("Pattern '{}' already initialised", self.id());
        }
        Ok(())
    }

    fn process(&self, event: Event) -> WisdomResult<()> {
        self.core.process(&event)
    }

    fn copy(self: Arc<Self>) -> Arc<dyn Processor> {
        let copy = Self::from_template(
            self.core.id.clone(),
            self.template.clone(),
            Arc::clone(&self.core.next).copy(),
        );
        if let Some(context) = self.core.context.get() {
            if let Err(e) = copy.init(context) {
                context.handle_exception(&e);
            }
        }
        Arc::new(copy)
    }

    fn is_stateful(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::super::pattern::{every, not, sequence};
    use std::time::Duration;
    use super::*;
    use crate::core::event::EventData;

    #[derive(Debug, Default)]
    struct Collector {
        batches: Mutex<Vec<Vec<Event>>>,
    }

    impl Collector {
        fn events(&self) -> Vec<Event> {
            self.batches.lock().unwrap().iter().flatten().cloned().collect()
        }

        fn batch_count(&self) -> usize {
            self.batches.lock().unwrap().len()
        }
    }

    impl Processor for Collector {
        fn process(&self, event: Event) -> WisdomResult<()> {
            self.batches.lock().unwrap().push(vec![event]);
            Ok(())
        }

        fn process_batch(&self, events: Vec<Event>) -> WisdomResult<()> {
            self.batches.lock().unwrap().push(events);
            Ok(())
        }

        fn copy(self: Arc<Self>) -> Arc<dyn Processor> {
            self
        }
    }

    fn stock(stream: &str, timestamp: i64, symbol: &str, price: f64) -> Event {
        let mut event = Event::new(timestamp)
            .attribute("symbol", symbol)
            .attribute("price", price);
        event.set_stream_id(Arc::from(stream));
        event.ensure_rooted();
        event
    }

    fn symbol(expected: &'static str) -> impl Fn(&Event) -> bool + Send + Sync + 'static {
        move |event: &Event| event.get_str("symbol") == Some(expected)
    }

    #[test]
    fn test_match_carries_aliases_and_last_root() {
        let collector = Arc::new(Collector::default());
        let pattern = sequence(
            Pattern::new("e1", "S1").filter(symbol("IBM")),
            Pattern::new("e2", "S2").filter(symbol("WSO2")),
        );
        let processor = PatternProcessor::new(&pattern, collector.clone()).unwrap();

        let ibm = stock("S1", 1000, "IBM", 50.0);
        let wso2 = stock("S2", 1100, "WSO2", 60.0);
        processor.process(ibm.clone()).unwrap();
        processor.process(wso2.clone()).unwrap();

        let events = collector.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].get_str("e1.symbol"), Some("IBM"));
        assert_eq!(events[0].get_str("e2.symbol"), Some("WSO2"));
        assert_eq!(events[0].timestamp(), 1100);
        assert_eq!(events[0].root_id(), wso2.root_id());

        let correlated = processor.correlated("e1", ibm.root_id()).unwrap();
        assert_eq!(correlated.get_str("e1.symbol"), Some("IBM"));
    }

    #[test]
    fn test_pattern_starts_over_after_match() {
        let collector = Arc::new(Collector::default());
        let pattern = sequence(
            Pattern::new("e1", "S1").filter(symbol("IBM")),
            Pattern::new("e2", "S2").filter(symbol("WSO2")),
        );
        let processor = PatternProcessor::new(&pattern, collector.clone()).unwrap();

        for round in 0..2 {
            processor.process(stock("S1", round * 10, "IBM", 50.0)).unwrap();
            processor.process(stock("S2", round * 10 + 1, "WSO2", 50.0)).unwrap();
        }
        assert_eq!(collector.events().len(), 2);
    }

    #[test]
    fn test_leading_negation_does_not_start_over() {
        let collector = Arc::new(Collector::default());
        let pattern = sequence(
            not(Pattern::new("e1", "S1").filter(symbol("IBM"))),
            Pattern::new("e2", "S2").filter(symbol("WSO2")),
        );
        let processor = PatternProcessor::new(&pattern, collector.clone()).unwrap();

        processor.process(stock("S1", 1, "IBM", 50.0)).unwrap();
        processor.process(stock("S2", 2, "WSO2", 50.0)).unwrap();
        assert!(collector.events().is_empty());
    }

    #[test]
    fn test_every_root_emits_batches() {
        let collector = Arc::new(Collector::default());
        let pattern = every(Pattern::new("e1", "S1").filter(symbol("IBM")));
        let processor = PatternProcessor::new(&pattern, collector.clone()).unwrap();

        processor.process(stock("S1", 1, "IBM", 50.0)).unwrap();
        processor.process(stock("S1", 2, "IBM", 55.0)).unwrap();
        assert_eq!(collector.batch_count(), 2);
        let prices: Vec<f64> = collector
            .events()
            .iter()
            .filter_map(|e| e.get_f64("e1.price"))
            .collect();
        assert_eq!(prices, vec![50.0, 55.0]);
    }

    #[test]
    fn test_copy_has_independent_state() {
        let collector = Arc::new(Collector::default());
        let pattern = sequence(
            Pattern::new("e1", "S1").filter(symbol("IBM")),
            Pattern::new("e2", "S2").filter_with(|event: &Event, captured: &EventData| {
                event.get_f64("price") > captured.get("e1.price").and_then(|v| v.as_f64())
            }),
        );
        let original = Arc::new(PatternProcessor::new(&pattern, collector.clone()).unwrap());
        original.process(stock("S1", 1, "IBM", 50.0)).unwrap();

        let copy = Arc::clone(&original).copy();
        copy.process(stock("S2", 2, "WSO2", 60.0)).unwrap();
        assert!(collector.events().is_empty());

        original.process(stock("S2", 3, "WSO2", 40.0)).unwrap();
        assert!(collector.events().is_empty());
        original.process(stock("S2", 4, "WSO2", 60.0)).unwrap();
        assert_eq!(collector.events().len(), 1);
    }

    #[test]
    fn test_reset_drops_partial_matches() {
        let collector = Arc::new(Collector::default());
        let pattern = sequence(
            Pattern::new("e1", "S1").filter(symbol("IBM")),
            Pattern::new("e2", "S2").filter(symbol("WSO2")),
        );
        let processor = PatternProcessor::new(&pattern, collector.clone()).unwrap();

        processor.process(stock("S1", 1, "IBM", 50.0)).unwrap();
        assert!(processor.is_waiting());
        processor.reset();
        processor.process(stock("S2", 2, "WSO2", 50.0)).unwrap();
        assert!(collector.events().is_empty());
    }

    #[test]
    fn test_bounded_negation_held_until_bound_elapses() {
        let collector = Arc::new(Collector::default());
        let pattern = sequence(
            Pattern::new("e1", "S1").filter(symbol("IBM")),
            not(Pattern::new("e2", "S2").filter(symbol("WSO2"))).within(Duration::from_secs(1)),
        );
        let processor = PatternProcessor::new(&pattern, collector.clone()).unwrap();

        processor.process(stock("S1", 1000, "IBM", 50.0)).unwrap();
        assert!(collector.events().is_empty());
        processor.advance(2000).unwrap();
        assert!(collector.events().is_empty());

        processor.advance(2001).unwrap();
        let events = collector.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].get_str("e1.symbol"), Some("IBM"));
        assert!(events[0].get("e2.symbol").is_none());
    }

    #[test]
    fn test_bounded_negation_dropped_when_negated_event_arrives() {
        let collector = Arc::new(Collector::default());
        let pattern = sequence(
            Pattern::new("e1", "S1").filter(symbol("IBM")),
            not(Pattern::new("e2", "S2").filter(symbol("WSO2"))).within(Duration::from_secs(1)),
        );
        let processor = PatternProcessor::new(&pattern, collector.clone()).unwrap();

        processor.process(stock("S1", 1000, "IBM", 50.0)).unwrap();
        processor.process(stock("S2", 1500, "WSO2", 60.0)).unwrap();
        processor.advance(5000).unwrap();
        assert!(collector.events().is_empty());
    }

    #[test]
    fn test_root_count_emits_once_at_max() {
        let collector = Arc::new(Collector::default());
        let pattern = Pattern::new("e1", "S1").filter(symbol("IBM")).times(2, 3);
        let processor = PatternProcessor::new(&pattern, collector.clone()).unwrap();

        processor.process(stock("S1", 1, "IBM", 50.0)).unwrap();
        processor.process(stock("S1", 2, "IBM", 55.0)).unwrap();
        assert!(collector.events().is_empty());
        processor.process(stock("S1", 3, "IBM", 60.0)).unwrap();

        let events = collector.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].get_f64("e1[0].price"), Some(50.0));
        assert_eq!(events[0].get_f64("e1[2].price"), Some(60.0));
    }

    #[test]
    fn test_root_count_released_when_own_bound_ends() {
        let collector = Arc::new(Collector::default());
        let pattern = Pattern::new("e1", "S1")
            .filter(symbol("IBM"))
            .times(2, 5)
            .within(Duration::from_millis(500));
        let processor = PatternProcessor::new(&pattern, collector.clone()).unwrap();

        processor.process(stock("S1", 1000, "IBM", 50.0)).unwrap();
        processor.process(stock("S1", 1200, "IBM", 55.0)).unwrap();
        processor.advance(1500).unwrap();
        assert!(collector.events().is_empty());

        processor.advance(1501).unwrap();
        let events = collector.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].get_f64("e1[1].price"), Some(55.0));
        assert!(events[0].get("e1[2].price").is_none());
    }
}

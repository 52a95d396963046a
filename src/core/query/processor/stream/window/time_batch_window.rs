// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tumbling time batch window
//!
//! Buffers events until the current batch boundary, then hands the buffer
//! on as one batch. The first event opens a batch of `duration`; later
//! boundaries stay aligned to the first one. An empty boundary closes the
//! batch so the next event opens a fresh one.
//!
//! The duration may be bound to a [`Variable`](crate::core::util::variable::Variable).
//! Rebinding it moves the pending boundary by the difference.

use super::types::{PROPERTY_DURATION, WINDOW_TYPE_TIME_BATCH};
use super::{duration_update, DurationSource, Window, WindowProperties};
use crate::core::config::wisdom_context::WisdomContext;
use crate::core::error::{WisdomError, WisdomResult};
use crate::core::event::{AttributeValue, Event};
use crate::core::query::processor::Processor;
use crate::core::util::scheduler::Executor;
use crate::core::util::variable::{ListenerId, VariableListener};
use once_cell::sync::OnceCell;
use std::sync::{Arc, Mutex, PoisonError, Weak};

const NO_BOUNDARY: i64 = -1;

#[derive(Debug)]
struct BatchState {
    events: Vec<Event>,
    end_time: i64,
    duration: i64,
    /// Bumped whenever pending ticks become meaningless
    generation: u64,
    next: Option<Arc<dyn Processor>>,
}

#[derive(Debug)]
struct TimeBatchCore {
    this: Weak<TimeBatchCore>,
    state: Mutex<BatchState>,
    context: OnceCell<Arc<WisdomContext>>,
}

/// Scheduler callback for one boundary
struct BatchTick {
    window: Weak<TimeBatchCore>,
    generation: u64,
}

impl Executor for BatchTick {
    fn execute(&self, timestamp: i64) -> WisdomResult<()> {
        match self.window.upgrade() {
            Some(window) => window.on_tick(timestamp, self.generation),
            None => Ok(()),
        }
    }
}

/// Next boundary after `timestamp`, aligned to `previous_end`
fn next_end_time(timestamp: i64, previous_end: i64, duration: i64) -> i64 {
    timestamp + (duration - (timestamp - previous_end) % duration)
}

impl TimeBatchCore {
    fn new(duration: i64) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            state: Mutex::new(BatchState {
                events: Vec::new(),
                end_time: NO_BOUNDARY,
                duration,
                generation: 0,
                next: None,
            }),
            context: OnceCell::new(),
        })
    }

    fn context(&self) -> WisdomResult<&Arc<WisdomContext>> {
        self.context.get().ok_or_else(|| {
            WisdomError::initialization_with_component(
                "Window received an event before init",
                WINDOW_TYPE_TIME_BATCH,
            )
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule(&self, context: &WisdomContext, at: i64, generation: u64) {
        log::trace!("{WINDOW_TYPE_TIME_BATCH} boundary scheduled at {at}");
        context.get_scheduler().schedule_at(
            at,
            Arc::new(BatchTick {
                window: self.this.clone(),
                generation,
            }),
        );
    }

    fn process(&self, event: Event, next: &Arc<dyn Processor>) -> WisdomResult<()> {
        let context = self.context()?;
        let mut state = self.lock();
        state.next = Some(Arc::clone(next));
        if state.end_time == NO_BOUNDARY {
            state.end_time = context.current_timestamp() + state.duration;
            self.schedule(context, state.end_time, state.generation);
        }
        state.events.push(event);
        Ok(())
    }

    fn on_tick(&self, timestamp: i64, generation: u64) -> WisdomResult<()> {
        let context = self.context()?;
        let (batch, next) = {
            let mut state = self.lock();
            if generation != state.generation || state.end_time == NO_BOUNDARY {
                return Ok(());
            }
            if timestamp < state.end_time {
                self.schedule(context, state.end_time, generation);
                return Ok(());
            }
            if state.events.is_empty() {
                state.end_time = NO_BOUNDARY;
                return Ok(());
            }
            let batch = std::mem::take(&mut state.events);
            state.end_time = next_end_time(timestamp, state.end_time, state.duration);
            self.schedule(context, state.end_time, generation);
            (batch, state.next.clone())
        };

        log::debug!(
            "{WINDOW_TYPE_TIME_BATCH} emitting {} event(s) at {timestamp}",
            batch.len()
        );
        match next {
            Some(next) => next.process_batch(batch),
            None => Ok(()),
        }
    }

    fn rebind(&self, duration: i64) {
        let mut state = self.lock();
        let delta = duration - state.duration;
        state.duration = duration;
        if state.end_time == NO_BOUNDARY || delta == 0 {
            return;
        }
        state.end_time += delta;
        state.generation += 1;
        if let Some(context) = self.context.get() {
            self.schedule(context, state.end_time, state.generation);
        }
    }

    fn clear(&self) {
        let mut state = self.lock();
        state.events.clear();
        state.end_time = NO_BOUNDARY;
        state.generation += 1;
    }
}

impl VariableListener for TimeBatchCore {
    fn on_update(&self, value: &AttributeValue) {
        if let Some(duration) = duration_update(WINDOW_TYPE_TIME_BATCH, value) {
            self.rebind(duration);
        }
    }
}

#[derive(Debug)]
pub struct TimeBatchWindow {
    duration: DurationSource,
    core: Arc<TimeBatchCore>,
    subscription: Mutex<Option<ListenerId>>,
}

impl TimeBatchWindow {
    pub fn new(properties: &WindowProperties) -> WisdomResult<Self> {
        let duration =
            DurationSource::from_properties(properties, PROPERTY_DURATION, WINDOW_TYPE_TIME_BATCH)?;
        Ok(Self::with_duration(duration))
    }

    fn with_duration(duration: DurationSource) -> Self {
        // validated on construction, so the fallback is never taken
        let core = TimeBatchCore::new(duration.current_or(1));
        let weak = Arc::downgrade(&core);
        let listener: Weak<dyn VariableListener> = weak;
        let subscription = duration.subscribe(listener);
        Self {
            duration,
            core,
            subscription: Mutex::new(subscription),
        }
    }

    /// Current batch length in milliseconds
    pub fn duration(&self) -> i64 {
        self.core.lock().duration
    }

    /// Pending boundary, or `None` when no batch is open
    pub fn end_time(&self) -> Option<i64> {
        Some(self.core.lock().end_time).filter(|t| *t != NO_BOUNDARY)
    }

    pub fn buffered(&self) -> usize {
        self.core.lock().events.len()
    }
}

impl Window for TimeBatchWindow {
    fn init(&self, context: &Arc<WisdomContext>) -> WisdomResult<()> {
        if self.core.context.set(Arc::clone(context)).is_err() {
            log::debug!("{WINDOW_TYPE_TIME_BATCH} window already initialised");
        }
        Ok(())
    }

    fn process(&self, event: Event, next: &Arc<dyn Processor>) -> WisdomResult<()> {
        self.core.process(event, next)
    }

    fn clear(&self) {
        self.core.clear();
    }

    fn destroy(&self) {
        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(id) = subscription {
            self.duration.unsubscribe(id);
        }
        self.core.clear();
    }

    fn copy(&self) -> Box<dyn Window> {
        Box::new(Self::with_duration(self.duration.clone()))
    }
}

impl Drop for TimeBatchWindow {
    fn drop(&mut self) {
        self.destroy();
    }
}

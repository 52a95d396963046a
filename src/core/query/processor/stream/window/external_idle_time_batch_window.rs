// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batch window closed by an idle gap in event-provided time
//!
//! Events are buffered until one arrives whose `timestampKey` attribute is
//! at least `duration` past the previous event's. The buffered events go
//! out as one batch and the late event opens the next batch. No timer is
//! involved: a trailing batch stays buffered until a later event arrives.

use super::types::{PROPERTY_DURATION, PROPERTY_TIMESTAMP_KEY, WINDOW_TYPE_EXTERNAL_IDLE_TIME_BATCH};
use super::{duration_update, DurationSource, PropertyValue, Window, WindowProperties};
use crate::core::config::wisdom_context::WisdomContext;
use crate::core::error::{WisdomError, WisdomResult};
use crate::core::event::{AttributeValue, Event};
use crate::core::query::processor::Processor;
use crate::core::util::variable::{ListenerId, VariableListener};
use std::sync::{Arc, Mutex, PoisonError, Weak};

#[derive(Debug)]
struct IdleState {
    events: Vec<Event>,
    last_timestamp: i64,
    min_idle: i64,
}

#[derive(Debug)]
struct IdleCore {
    state: Mutex<IdleState>,
}

impl IdleCore {
    fn lock(&self) -> std::sync::MutexGuard<'_, IdleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl VariableListener for IdleCore {
    fn on_update(&self, value: &AttributeValue) {
        if let Some(min_idle) = duration_update(WINDOW_TYPE_EXTERNAL_IDLE_TIME_BATCH, value) {
            self.lock().min_idle = min_idle;
        }
    }
}

#[derive(Debug)]
pub struct ExternalIdleTimeBatchWindow {
    timestamp_key: String,
    duration: DurationSource,
    core: Arc<IdleCore>,
    subscription: Mutex<Option<ListenerId>>,
}

impl ExternalIdleTimeBatchWindow {
    pub fn new(properties: &WindowProperties) -> WisdomResult<Self> {
        let timestamp_key = match properties.get(PROPERTY_TIMESTAMP_KEY) {
            None => return Err(WisdomError::missing_property(PROPERTY_TIMESTAMP_KEY)),
            Some(PropertyValue::Value(AttributeValue::String(key))) if !key.is_empty() => {
                key.clone()
            }
            Some(_) => {
                return Err(WisdomError::invalid_property(
                    PROPERTY_TIMESTAMP_KEY,
                    format!(
                        "{PROPERTY_TIMESTAMP_KEY} of {WINDOW_TYPE_EXTERNAL_IDLE_TIME_BATCH} must be an attribute name"
                    ),
                ))
            }
        };
        let duration = DurationSource::from_properties(
            properties,
            PROPERTY_DURATION,
            WINDOW_TYPE_EXTERNAL_IDLE_TIME_BATCH,
        )?;
        Ok(Self::with_config(timestamp_key, duration))
    }

    fn with_config(timestamp_key: String, duration: DurationSource) -> Self {
        let core = Arc::new(IdleCore {
            state: Mutex::new(IdleState {
                events: Vec::new(),
                last_timestamp: 0,
                min_idle: duration.current_or(1),
            }),
        });
        let weak = Arc::downgrade(&core);
        let listener: Weak<dyn VariableListener> = weak;
        let subscription = duration.subscribe(listener);
        Self {
            timestamp_key,
            duration,
            core,
            subscription: Mutex::new(subscription),
        }
    }

    pub fn timestamp_key(&self) -> &str {
        &self.timestamp_key
    }

    pub fn min_idle(&self) -> i64 {
        self.core.lock().min_idle
    }

    pub fn buffered(&self) -> usize {
        self.core.lock().events.len()
    }
}

impl Window for ExternalIdleTimeBatchWindow {
    fn init(&self, _context: &Arc<WisdomContext>) -> WisdomResult<()> {
        Ok(())
    }

    fn process(&self, event: Event, next: &Arc<dyn Processor>) -> WisdomResult<()> {
        let timestamp = event.get_i64(&self.timestamp_key).ok_or_else(|| {
            WisdomError::runtime(format!(
                "Event {} has no numeric '{}' attribute",
                event.id(),
                self.timestamp_key
            ))
        })?;

        let flushed = {
            let mut state = self.core.lock();
            if state.events.is_empty() {
                state.last_timestamp = timestamp;
            }
            let idle = timestamp - state.last_timestamp >= state.min_idle;
            let batch = idle.then(|| std::mem::take(&mut state.events));
            state.events.push(event);
            state.last_timestamp = timestamp;
            batch
        };

        match flushed {
            Some(batch) => {
                log::debug!(
                    "{WINDOW_TYPE_EXTERNAL_IDLE_TIME_BATCH} emitting {} event(s) after idle gap at {timestamp}",
                    batch.len()
                );
                next.process_batch(batch)
            }
            None => Ok(()),
        }
    }

    fn clear(&self) {
        let mut state = self.core.lock();
        state.events.clear();
        state.last_timestamp = 0;
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
        self.clear();
    }

    fn copy(&self) -> Box<dyn Window> {
        Box::new(Self::with_config(
            self.timestamp_key.clone(),
            self.duration.clone(),
        ))
    }
}

impl Drop for ExternalIdleTimeBatchWindow {
    fn drop(&mut self) {
        self.destroy();
    }
}

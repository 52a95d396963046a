// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batching windows
//!
//! A [`Window`] buffers events and hands them on as batches. Windows are
//! created from a property map through the extension registry; numeric
//! properties may be bound to a [`Variable`] so they can be changed while
//! the window runs.

pub mod external_idle_time_batch_window;
pub mod time_batch_window;
pub mod types;
pub mod window_processor;

use crate::core::config::wisdom_context::WisdomContext;
use crate::core::error::{WisdomError, WisdomResult};
use crate::core::event::{AttributeValue, Event};
use crate::core::query::processor::Processor;
use crate::core::util::variable::{ListenerId, Variable, VariableListener};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Weak};

pub use external_idle_time_batch_window::ExternalIdleTimeBatchWindow;
pub use time_batch_window::TimeBatchWindow;
pub use window_processor::WindowProcessor;

pub trait Window: Debug + Send + Sync {
    /// Wire the window to the application's scheduler and clock
    fn init(&self, context: &Arc<WisdomContext>) -> WisdomResult<()>;

    fn process(&self, event: Event, next: &Arc<dyn Processor>) -> WisdomResult<()>;

    /// Drop buffered events and boundary state
    fn clear(&self);

    /// Stop following bound variables
    fn destroy(&self);

    /// Fresh window with the same configuration and no buffered events
    fn copy(&self) -> Box<dyn Window>;
}

/// Value of a window property: a constant or a live variable
#[derive(Debug, Clone)]
pub enum PropertyValue {
    Value(AttributeValue),
    Variable(Arc<Variable>),
}

impl From<AttributeValue> for PropertyValue {
    fn from(value: AttributeValue) -> Self {
        PropertyValue::Value(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Value(AttributeValue::Long(value))
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Value(AttributeValue::String(value.to_string()))
    }
}

impl From<Arc<Variable>> for PropertyValue {
    fn from(variable: Arc<Variable>) -> Self {
        PropertyValue::Variable(variable)
    }
}

pub type WindowProperties = HashMap<String, PropertyValue>;

/// Build a property map from `(key, value)` pairs
pub fn window_properties<I, K, V>(entries: I) -> WindowProperties
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<PropertyValue>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

fn positive_millis(value: &AttributeValue) -> Option<i64> {
    value.as_i64().filter(|ms| *ms > 0)
}

/// Millisecond length property, fixed or bound to a variable
#[derive(Debug, Clone)]
pub(crate) enum DurationSource {
    Fixed(i64),
    Bound(Arc<Variable>),
}

impl DurationSource {
    pub fn from_properties(
        properties: &WindowProperties,
        key: &str,
        window: &str,
    ) -> WisdomResult<Self> {
        let invalid = || {
            WisdomError::invalid_property(
                key,
                format!("{key} of {window} must be a positive number of milliseconds"),
            )
        };
        match properties.get(key) {
            None => Err(WisdomError::missing_property(key)),
            Some(PropertyValue::Value(value)) => {
                positive_millis(value).map(DurationSource::Fixed).ok_or_else(invalid)
            }
            Some(PropertyValue::Variable(variable)) => {
                positive_millis(&variable.get()).ok_or_else(invalid)?;
                Ok(DurationSource::Bound(Arc::clone(variable)))
            }
        }
    }

    /// Current length; a variable rebound to an invalid value keeps `fallback`
    pub fn current_or(&self, fallback: i64) -> i64 {
        match self {
            DurationSource::Fixed(ms) => *ms,
            DurationSource::Bound(variable) => positive_millis(&variable.get()).unwrap_or(fallback),
        }
    }

    pub fn subscribe(&self, listener: Weak<dyn VariableListener>) -> Option<ListenerId> {
        match self {
            DurationSource::Fixed(_) => None,
            DurationSource::Bound(variable) => Some(variable.add_listener(listener)),
        }
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        if let DurationSource::Bound(variable) = self {
            variable.remove_listener(id);
        }
    }
}

/// Parse a duration update pushed by a bound variable
pub(crate) fn duration_update(window: &str, value: &AttributeValue) -> Option<i64> {
    let parsed = positive_millis(value);
    if parsed.is_none() {
        log::warn!("Ignoring non positive duration {value} for {window}");
    }
    parsed
}

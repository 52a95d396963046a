// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mutable application variables
//!
//! A [`Variable`] holds one [`AttributeValue`] that can be rebound at
//! runtime. Windows bind their duration to a variable and are notified on
//! every update so they can shift their boundaries without dropping the
//! events they already buffered.

use crate::core::event::value::AttributeValue;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, Weak};

/// Handle returned by [`Variable::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub trait VariableListener: Send + Sync {
    fn on_update(&self, value: &AttributeValue);
}

pub struct Variable {
    id: String,
    value: RwLock<AttributeValue>,
    listeners: RwLock<Vec<(ListenerId, Weak<dyn VariableListener>)>>,
    next_listener: AtomicU64,
}

impl Debug for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variable")
            .field("id", &self.id)
            .field("value", &self.get())
            .finish()
    }
}

impl Variable {
    pub fn new(id: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self {
            id: id.into(),
            value: RwLock::new(value.into()),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get(&self) -> AttributeValue {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rebind the value and notify every live listener
    pub fn set(&self, value: impl Into<AttributeValue>) {
        let value = value.into();
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = value.clone();

        let live: Vec<_> = {
            let mut listeners = self
                .listeners
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            listeners.retain(|(_, l)| l.strong_count() > 0);
            listeners.iter().filter_map(|(_, l)| l.upgrade()).collect()
        };
        log::debug!("Variable '{}' updated to {}", self.id, value);
        for listener in live {
            listener.on_update(&value);
        }
    }

    pub fn add_listener(&self, listener: Weak<dyn VariableListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(listener_id, _)| *listener_id != id);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .map(|l| l.iter().filter(|(_, w)| w.strong_count() > 0).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder(Mutex<Vec<AttributeValue>>);

    impl VariableListener for Recorder {
        fn on_update(&self, value: &AttributeValue) {
            self.0.lock().unwrap().push(value.clone());
        }
    }

    #[test]
    fn test_listeners_receive_updates_until_removed() {
        let variable = Variable::new("window_duration", 1000i64);
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let weak: Weak<dyn VariableListener> = Arc::downgrade(&recorder) as Weak<dyn VariableListener>;
        let id = variable.add_listener(weak);

        variable.set(2000i64);
        variable.remove_listener(id);
        variable.set(3000i64);

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![AttributeValue::Long(2000)]
        );
        assert_eq!(variable.get(), AttributeValue::Long(3000));
    }

    #[test]
    fn test_dropped_listener_is_pruned() {
        let variable = Variable::new("x", 1i64);
        {
            let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
            let weak: Weak<dyn VariableListener> = Arc::downgrade(&recorder) as Weak<dyn VariableListener>;
            variable.add_listener(weak);
            assert_eq!(variable.listener_count(), 1);
        }
        variable.set(2i64);
        assert_eq!(variable.listener_count(), 0);
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Exception Handler - Runtime Error Routing
//!
//! Runtime errors raised while a processor handles an event are caught at
//! the stream fan-out boundary (and inside scheduler callbacks) and handed
//! to the application's [`ExceptionHandler`].
//!
//! ## Routing
//!
//! Listeners are registered per [`ErrorKind`]. An error is delivered to every
//! listener registered for its kind. When no listener matches, the error is
//! logged and processing continues.
//!
//! ```rust,ignore
//! app.add_exception_listener(ErrorKind::Runtime, |error: &WisdomError| {
//!     metrics.record_failure(error);
//! });
//! ```

use crate::core::error::{ErrorKind, WisdomError};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};

/// Receives errors of the kind it was registered for.
pub trait ExceptionListener: Send + Sync {
    fn on_exception(&self, error: &WisdomError);
}

impl<F> ExceptionListener for F
where
    F: Fn(&WisdomError) + Send + Sync,
{
    fn on_exception(&self, error: &WisdomError) {
        self(error)
    }
}

/// Per-kind exception listener registry with log-and-continue fallback
pub struct ExceptionHandler {
    /// Application name used as log prefix
    app_name: String,

    listeners: RwLock<HashMap<ErrorKind, Vec<Arc<dyn ExceptionListener>>>>,
}

impl Debug for ExceptionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<ErrorKind> = self
            .listeners
            .read()
            .map(|l| l.keys().copied().collect())
            .unwrap_or_default();
        f.debug_struct("ExceptionHandler")
            .field("app_name", &self.app_name)
            .field("kinds", &kinds)
            .finish()
    }
}

impl ExceptionHandler {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// Register a listener for one error kind
    pub fn add_listener(&self, kind: ErrorKind, listener: Arc<dyn ExceptionListener>) {
        match self.listeners.write() {
            Ok(mut listeners) => listeners.entry(kind).or_default().push(listener),
            Err(_) => log::error!(
                "[{}] Exception listener registry poisoned, listener for {:?} dropped",
                self.app_name,
                kind
            ),
        }
    }

    /// Route an error to its listeners
    ///
    /// # Returns
    /// `true` if at least one listener received the error, `false` if the
    /// default log-and-continue handling was applied
    pub fn handle(&self, error: &WisdomError) -> bool {
        let targets: Vec<Arc<dyn ExceptionListener>> = match self.listeners.read() {
            Ok(listeners) => listeners
                .get(&error.kind())
                .map(|l| l.iter().map(Arc::clone).collect())
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        };

        if targets.is_empty() {
            log::error!("[{}] Error in Wisdom app: {}", self.app_name, error);
            return false;
        }

        for listener in targets {
            listener.on_exception(error);
        }
        true
    }

    pub fn has_listener(&self, kind: ErrorKind) -> bool {
        self.listeners
            .read()
            .map(|l| l.get(&kind).is_some_and(|v| !v.is_empty()))
            .unwrap_or(false)
    }
}

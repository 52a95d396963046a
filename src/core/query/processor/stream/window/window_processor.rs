// SPDX-License-Identifier: MIT OR Apache-2.0

use super::Window;
use crate::core::config::wisdom_context::WisdomContext;
use crate::core::error::WisdomResult;
use crate::core::event::Event;
use crate::core::query::processor::Processor;
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Adapts a [`Window`] to the processor chain
#[derive(Debug)]
pub struct WindowProcessor {
    name: String,
    window: Box<dyn Window>,
    next: Arc<dyn Processor>,
    context: OnceCell<Arc<WisdomContext>>,
}

impl WindowProcessor {
    pub fn new(name: impl Into<String>, window: Box<dyn Window>, next: Arc<dyn Processor>) -> Self {
        Self {
            name: name.into(),
            window,
            next,
            context: OnceCell::new(),
        }
    }

    /// Namespace the window was created from
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn clear(&self) {
        self.window.clear();
    }
}

impl Processor for WindowProcessor {
    fn init(&self, context: &Arc<WisdomContext>) -> WisdomResult<()> {
        if self.context.set(Arc::clone(context)).is_err() {
            log::debug!("Window processor '{}' already initialised", self.name);
        }
        self.window.init(context)
    }

    fn process(&self, event: Event) -> WisdomResult<()> {
        self.window.process(event, &self.next)
    }

    fn copy(self: Arc<Self>) -> Arc<dyn Processor> {
        let copy = Self::new(
            self.name.clone(),
            self.window.copy(),
            Arc::clone(&self.next).copy(),
        );
        if let Some(context) = self.context.get() {
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

impl Drop for WindowProcessor {
    fn drop(&mut self) {
        self.window.destroy();
    }
}

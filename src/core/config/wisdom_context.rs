// SPDX-License-Identifier: MIT OR Apache-2.0

//! Services shared by every component of one application: clock,
//! scheduler, thread barrier, exception routing and extension registry.

use super::wisdom_config::WisdomConfig;
use crate::core::error::handler::ExceptionHandler;
use crate::core::error::{WisdomError, WisdomResult};
use crate::core::extension::ExtensionRegistry;
use crate::core::util::scheduler::Scheduler;
use crate::core::util::thread_barrier::ThreadBarrier;
use crate::core::util::timestamp_generator::{
    EventTimestampGenerator, SystemTimestampGenerator, TimestampGenerator,
};
use std::sync::Arc;

#[derive(Debug)]
pub struct WisdomContext {
    config: WisdomConfig,
    timestamp_generator: Arc<dyn TimestampGenerator>,
    scheduler: Arc<Scheduler>,
    thread_barrier: Arc<ThreadBarrier>,
    exception_handler: Arc<ExceptionHandler>,
    extensions: ExtensionRegistry,
}

impl WisdomContext {
    pub fn new(config: WisdomConfig) -> WisdomResult<Self> {
        config.validate()?;

        let timestamp_generator: Arc<dyn TimestampGenerator> = if config.playback.is_some() {
            Arc::new(EventTimestampGenerator::default())
        } else {
            Arc::new(SystemTimestampGenerator)
        };
        let exception_handler = Arc::new(ExceptionHandler::new(config.name.clone()));
        let scheduler = Arc::new(Scheduler::new(
            config.thread_name("scheduler"),
            Arc::clone(&timestamp_generator),
            Arc::clone(&exception_handler),
        ));

        let extensions = ExtensionRegistry::new();
        extensions.register_default_extensions();

        Ok(Self {
            config,
            timestamp_generator,
            scheduler,
            thread_barrier: Arc::new(ThreadBarrier::new()),
            exception_handler,
            extensions,
        })
    }

    pub fn config(&self) -> &WisdomConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn get_scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn get_timestamp_generator(&self) -> &Arc<dyn TimestampGenerator> {
        &self.timestamp_generator
    }

    pub fn current_timestamp(&self) -> i64 {
        self.timestamp_generator.current_timestamp()
    }

    pub fn thread_barrier(&self) -> &Arc<ThreadBarrier> {
        &self.thread_barrier
    }

    pub fn exception_handler(&self) -> &Arc<ExceptionHandler> {
        &self.exception_handler
    }

    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    /// Route a runtime error to the registered listeners
    pub fn handle_exception(&self, error: &WisdomError) {
        self.exception_handler.handle(error);
    }

    pub fn playback_attribute(&self) -> Option<&str> {
        self.config.playback.as_deref()
    }

    /// Move the playback clock and fire the timers that became due
    ///
    /// Ignored with a wall clock and for values behind the current time.
    pub fn advance_time(&self, timestamp: i64) {
        if self.timestamp_generator.advance_to(timestamp) {
            self.scheduler.advance(timestamp);
        }
    }
}

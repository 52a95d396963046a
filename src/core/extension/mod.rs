// SPDX-License-Identifier: MIT OR Apache-2.0

//! Extension registry
//!
//! Windows and sinks are created by namespace while a query graph is built.
//! Each namespace maps to a factory registered explicitly on the
//! application's [`ExtensionRegistry`]; the built-ins are installed by
//! [`ExtensionRegistry::register_default_extensions`].
//!
//! | Extension Type | Trait | Built-ins |
//! |---------------|-------|-----------|
//! | Windows | `WindowFactory` | `timeBatch`, `externalIdleTimeBatch` |
//! | Sinks | `SinkFactory` | `log` |
//!
//! # Example: Adding a Custom Sink
//!
//! ```ignore
//! #[derive(Debug, Clone)]
//! pub struct ConsoleSinkFactory;
//!
//! impl SinkFactory for ConsoleSinkFactory {
//!     fn name(&self) -> &'static str { "console" }
//!     fn required_parameters(&self) -> &[&str] { &[] }
//!     fn create_initialized(&self, _: &HashMap<String, String>) -> WisdomResult<Box<dyn Sink>> {
//!         Ok(Box::new(ConsoleSink))
//!     }
//!     fn clone_box(&self) -> Box<dyn SinkFactory> { Box::new(self.clone()) }
//! }
//!
//! app.context().extensions().register_sink(Box::new(ConsoleSinkFactory));
//! ```

use crate::core::error::{WisdomError, WisdomResult};
use crate::core::query::processor::stream::window::types::{
    WINDOW_TYPE_EXTERNAL_IDLE_TIME_BATCH, WINDOW_TYPE_TIME_BATCH,
};
use crate::core::query::processor::stream::window::{
    ExternalIdleTimeBatchWindow, TimeBatchWindow, Window, WindowProperties,
};
use crate::core::stream::output::sink::{LogSink, Sink};
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt::Debug;

pub trait WindowFactory: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Create a window from its properties; bad properties are validation
    /// errors
    fn create(&self, properties: &WindowProperties) -> WisdomResult<Box<dyn Window>>;

    fn clone_box(&self) -> Box<dyn WindowFactory>;
}
impl Clone for Box<dyn WindowFactory> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

pub trait SinkFactory: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// List required configuration properties
    fn required_parameters(&self) -> &[&str];

    /// List optional configuration properties
    fn optional_parameters(&self) -> &[&str] {
        &[]
    }

    /// Create a fully initialized, ready-to-use Sink instance
    fn create_initialized(&self, config: &HashMap<String, String>) -> WisdomResult<Box<dyn Sink>>;

    fn clone_box(&self) -> Box<dyn SinkFactory>;
}
impl Clone for Box<dyn SinkFactory> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[derive(Debug, Clone)]
pub struct TimeBatchWindowFactory;

impl WindowFactory for TimeBatchWindowFactory {
    fn name(&self) -> &'static str {
        WINDOW_TYPE_TIME_BATCH
    }

    fn create(&self, properties: &WindowProperties) -> WisdomResult<Box<dyn Window>> {
        Ok(Box::new(TimeBatchWindow::new(properties)?))
    }

    fn clone_box(&self) -> Box<dyn WindowFactory> {
        Box::new(self.clone())
    }
}

#[derive(Debug, Clone)]
pub struct ExternalIdleTimeBatchWindowFactory;

impl WindowFactory for ExternalIdleTimeBatchWindowFactory {
    fn name(&self) -> &'static str {
        WINDOW_TYPE_EXTERNAL_IDLE_TIME_BATCH
    }

    fn create(&self, properties: &WindowProperties) -> WisdomResult<Box<dyn Window>> {
        Ok(Box::new(ExternalIdleTimeBatchWindow::new(properties)?))
    }

    fn clone_box(&self) -> Box<dyn WindowFactory> {
        Box::new(self.clone())
    }
}

#[derive(Debug, Clone)]
pub struct LogSinkFactory;

impl SinkFactory for LogSinkFactory {
    fn name(&self) -> &'static str {
        "log"
    }

    fn required_parameters(&self) -> &[&str] {
        &[]
    }

    fn optional_parameters(&self) -> &[&str] {
        &["prefix"]
    }

    fn create_initialized(&self, config: &HashMap<String, String>) -> WisdomResult<Box<dyn Sink>> {
        Ok(Box::new(LogSink::from_properties(config)?))
    }

    fn clone_box(&self) -> Box<dyn SinkFactory> {
        Box::new(self.clone())
    }
}

/// Namespace to factory table, one per application
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    windows: DashMap<String, Box<dyn WindowFactory>>,
    sinks: DashMap<String, Box<dyn SinkFactory>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_default_extensions(&self) {
        self.register_window(Box::new(TimeBatchWindowFactory));
        self.register_window(Box::new(ExternalIdleTimeBatchWindowFactory));
        self.register_sink(Box::new(LogSinkFactory));
    }

    /// Register under the factory's name, replacing an earlier registration
    pub fn register_window(&self, factory: Box<dyn WindowFactory>) {
        let name = factory.name().to_string();
        if self.windows.insert(name.clone(), factory).is_some() {
            log::warn!("Window extension '{name}' replaced");
        }
    }

    pub fn register_sink(&self, factory: Box<dyn SinkFactory>) {
        let name = factory.name().to_string();
        if self.sinks.insert(name.clone(), factory).is_some() {
            log::warn!("Sink extension '{name}' replaced");
        }
    }

    pub fn get_window_factory(&self, namespace: &str) -> Option<Box<dyn WindowFactory>> {
        self.windows.get(namespace).map(|f| f.value().clone())
    }

    pub fn get_sink_factory(&self, namespace: &str) -> Option<Box<dyn SinkFactory>> {
        self.sinks.get(namespace).map(|f| f.value().clone())
    }

    pub fn window_namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.windows.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn create_window(
        &self,
        namespace: &str,
        properties: &WindowProperties,
    ) -> WisdomResult<Box<dyn Window>> {
        let factory = self
            .get_window_factory(namespace)
            .ok_or_else(|| WisdomError::extension_not_found("window", namespace))?;
        factory.create(properties)
    }

    pub fn create_sink(
        &self,
        namespace: &str,
        config: &HashMap<String, String>,
    ) -> WisdomResult<Box<dyn Sink>> {
        let factory = self
            .get_sink_factory(namespace)
            .ok_or_else(|| WisdomError::extension_not_found("sink", namespace))?;
        if let Some(missing) = factory
            .required_parameters()
            .iter()
            .find(|p| !config.contains_key(**p))
        {
            return Err(WisdomError::missing_property(*missing));
        }
        factory.create_initialized(config)
    }
}

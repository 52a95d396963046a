// SPDX-License-Identifier: MIT OR Apache-2.0

//! WisdomApp - one complete processing graph
//!
//! The app owns the streams, variables and query processors defined on it
//! and the [`WisdomContext`] they share. It is the context handed to
//! processors that need the scheduler, the clock, another stream or the
//! exception handler.
//!
//! ```ignore
//! let app = WisdomApp::new(WisdomConfig::new("StockApp"))?;
//! app.define_stream("StockStream")?;
//! app.define_stream("OutputStream")?;
//! app.define_query("Expensive")
//!     .from_stream("StockStream")
//!     .filter(|e| e.get_f64("price") > Some(100.0))
//!     .insert_into("OutputStream")?;
//! app.add_callback("OutputStream", |events: &[Event]| println!("{events:?}"))?;
//! app.start()?;
//! app.send("StockStream", Event::new(0).attribute("price", 120.0))?;
//! app.shutdown();
//! ```

use crate::core::config::stream_config::{
    StreamConfig, PROPERTY_ASYNC, PROPERTY_BUFFER, PROPERTY_STATISTICS,
};
use crate::core::config::wisdom_config::WisdomConfig;
use crate::core::config::wisdom_context::WisdomContext;
use crate::core::error::handler::ExceptionListener;
use crate::core::error::{ErrorKind, WisdomError, WisdomResult};
use crate::core::event::{AttributeValue, Event};
use crate::core::query::processor::Processor;
use crate::core::query::QueryBuilder;
use crate::core::stream::{CallbackProcessor, InputHandler, SinkProcessor, Stream, StreamCallback};
use crate::core::util::scheduler::Scheduler;
use crate::core::util::thread_barrier::ThreadBarrier;
use crate::core::util::timestamp_generator::TimestampGenerator;
use crate::core::util::variable::Variable;
use dashmap::DashMap;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

pub struct WisdomApp {
    context: Arc<WisdomContext>,
    /// Streams in definition order; started in this order
    streams: RwLock<IndexMap<String, Arc<Stream>>>,
    variables: DashMap<String, Arc<Variable>>,
    /// Windows, patterns and sinks wired by this app
    processors: Mutex<Vec<Arc<dyn Processor>>>,
    started: AtomicBool,
}

impl std::fmt::Debug for WisdomApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WisdomApp")
            .field("name", &self.name())
            .field("streams", &self.stream_ids())
            .field("started", &self.is_started())
            .finish()
    }
}

impl WisdomApp {
    pub fn new(config: WisdomConfig) -> WisdomResult<Self> {
        let context = Arc::new(WisdomContext::new(config)?);
        log::info!("[{}] WisdomApp created", context.name());
        Ok(Self {
            context,
            streams: RwLock::new(IndexMap::new()),
            variables: DashMap::new(),
            processors: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        self.context.name()
    }

    pub fn context(&self) -> &Arc<WisdomContext> {
        &self.context
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    // ========================================================================
    // Definitions
    // ========================================================================

    /// Define a stream with the application's stream defaults
    pub fn define_stream(&self, stream_id: &str) -> WisdomResult<Arc<Stream>> {
        self.define_stream_with_properties(stream_id, &HashMap::new())
    }

    /// Define a stream from definition properties (`async`, `buffer`,
    /// `statistics`) layered over the application's stream defaults
    pub fn define_stream_with_properties(
        &self,
        stream_id: &str,
        properties: &HashMap<String, String>,
    ) -> WisdomResult<Arc<Stream>> {
        let flat = self.context.config().stream_properties(properties);
        for key in [PROPERTY_ASYNC, PROPERTY_BUFFER, PROPERTY_STATISTICS] {
            if let Some((value, source)) = flat.get_with_source(key) {
                log::debug!(
                    "[{}] Stream '{}' {}={} ({})",
                    self.name(),
                    stream_id,
                    key,
                    value,
                    source.description()
                );
            }
        }
        let config = StreamConfig::from_flat_config(&flat)?;
        self.define_stream_with(stream_id, config)
    }

    pub fn define_stream_with(&self, stream_id: &str, config: StreamConfig) -> WisdomResult<Arc<Stream>> {
        let mut streams = self.streams.write().unwrap_or_else(PoisonError::into_inner);
        if streams.contains_key(stream_id) {
            return Err(WisdomError::validation_with_field(
                format!("Stream '{stream_id}' is already defined"),
                stream_id,
            ));
        }
        let stream = Arc::new(Stream::new(stream_id, Arc::clone(&self.context), config)?);
        streams.insert(stream_id.to_string(), Arc::clone(&stream));
        log::debug!("[{}] Stream '{}' defined", self.name(), stream_id);
        Ok(stream)
    }

    pub fn define_variable(
        &self,
        variable_id: &str,
        value: impl Into<AttributeValue>,
    ) -> WisdomResult<Arc<Variable>> {
        match self.variables.entry(variable_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(WisdomError::validation_with_field(
                format!("Variable '{variable_id}' is already defined"),
                variable_id,
            )),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let variable = Arc::new(Variable::new(variable_id, value));
                entry.insert(Arc::clone(&variable));
                Ok(variable)
            }
        }
    }

    pub fn get_variable(&self, variable_id: &str) -> Option<Arc<Variable>> {
        self.variables.get(variable_id).map(|v| Arc::clone(v.value()))
    }

    pub fn define_query(&self, query_id: impl Into<String>) -> QueryBuilder<'_> {
        QueryBuilder::new(self, query_id)
    }

    // ========================================================================
    // Context for processors
    // ========================================================================

    pub fn get_stream(&self, stream_id: &str) -> WisdomResult<Arc<Stream>> {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(stream_id)
            .cloned()
            .ok_or_else(|| WisdomError::stream_not_found(stream_id))
    }

    pub fn stream_ids(&self) -> Vec<String> {
        self.streams
            .read()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_scheduler(&self) -> &Arc<Scheduler> {
        self.context.get_scheduler()
    }

    pub fn get_timestamp_generator(&self) -> &Arc<dyn TimestampGenerator> {
        self.context.get_timestamp_generator()
    }

    pub fn thread_barrier(&self) -> &Arc<ThreadBarrier> {
        self.context.thread_barrier()
    }

    pub fn add_processor(&self, stream_id: &str, processor: Arc<dyn Processor>) -> WisdomResult<()> {
        self.get_stream(stream_id)?.add_processor(processor);
        Ok(())
    }

    pub fn add_processor_at(
        &self,
        stream_id: &str,
        index: usize,
        processor: Arc<dyn Processor>,
    ) -> WisdomResult<()> {
        self.get_stream(stream_id)?.add_processor_at(index, processor);
        Ok(())
    }

    pub fn add_exception_listener<L>(&self, kind: ErrorKind, listener: L)
    where
        L: ExceptionListener + 'static,
    {
        self.context
            .exception_handler()
            .add_listener(kind, Arc::new(listener));
    }

    pub fn handle_exception(&self, error: &WisdomError) {
        self.context.handle_exception(error);
    }

    // ========================================================================
    // Input and output
    // ========================================================================

    /// Receive the events of `stream_id` ahead of every other processor
    pub fn add_callback<C>(&self, stream_id: &str, callback: C) -> WisdomResult<()>
    where
        C: StreamCallback + 'static,
    {
        let stream = self.get_stream(stream_id)?;
        stream.add_processor_at(0, Arc::new(CallbackProcessor::new(Arc::new(callback))));
        Ok(())
    }

    /// Publish `stream_id` through the sink registered under `namespace`
    pub fn add_sink(
        &self,
        stream_id: &str,
        namespace: &str,
        config: &HashMap<String, String>,
    ) -> WisdomResult<()> {
        let stream = self.get_stream(stream_id)?;
        let sink = self.context.extensions().create_sink(namespace, config)?;
        let processor: Arc<dyn Processor> = Arc::new(SinkProcessor::new(sink));
        stream.add_processor(Arc::clone(&processor));
        self.register_processors(vec![processor])
    }

    pub fn input_handler(&self, stream_id: &str) -> WisdomResult<InputHandler> {
        let stream = self.get_stream(stream_id)?;
        Ok(InputHandler::new(stream, Arc::clone(&self.context)))
    }

    pub fn send(&self, stream_id: &str, event: Event) -> WisdomResult<()> {
        self.get_stream(stream_id)?.process(event)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub(crate) fn register_processors(&self, added: Vec<Arc<dyn Processor>>) -> WisdomResult<()> {
        if self.is_started() {
            for processor in &added {
                processor.init(&self.context)?;
                processor.start()?;
            }
        }
        self.processors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(added);
        Ok(())
    }

    fn streams_snapshot(&self) -> Vec<Arc<Stream>> {
        self.streams
            .read()
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Initialise registered processors, then start the scheduler and every
    /// stream
    pub fn start(&self) -> WisdomResult<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let processors = self
            .processors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let result = processors
            .iter()
            .try_for_each(|p| {
                p.init(&self.context)?;
                p.start()
            })
            .and_then(|()| self.context.get_scheduler().start())
            .and_then(|()| self.streams_snapshot().iter().try_for_each(|s| s.start()));

        match result {
            Ok(()) => {
                log::info!("[{}] WisdomApp started", self.name());
                Ok(())
            }
            Err(e) => {
                log::error!("[{}] WisdomApp failed to start: {}", self.name(), e);
                self.shutdown_components();
                self.started.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Stop every stream, draining async buffers, then the scheduler
    pub fn shutdown(&self) {
        if !self.started.swap(false, Ordering::AcqRel) {
            return;
        }
        self.shutdown_components();
        log::info!("[{}] WisdomApp shutdown", self.name());
    }

    fn shutdown_components(&self) {
        for stream in self.streams_snapshot() {
            stream.stop();
        }
        self.context.get_scheduler().stop();
        let processors = self
            .processors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for processor in processors {
            if let Err(e) = processor.stop() {
                self.handle_exception(&e);
            }
        }
    }
}

impl Drop for WisdomApp {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stream - the dispatch hub of the processing graph
//!
//! A [`Stream`] delivers every incoming event to each of its registered
//! processors, copying the event per processor so one branch never observes
//! another branch's changes.
//!
//! # Processing Modes
//!
//! **Synchronous (default):** the calling thread iterates the processors
//! before `process` returns.
//!
//! **Asynchronous:** events are pushed onto a fixed capacity ring buffer
//! (`crossbeam_queue::ArrayQueue`) shared by any number of producers and
//! drained by exactly one consumer thread per stream, which keeps fan-out in
//! submission order. The consumer spins and yields while the buffer is empty.
//! Producers only wait for a free slot.
//!
//! Errors returned by a processor are routed to the application's exception
//! handler and never stop delivery to the remaining processors.

use crate::core::config::stream_config::StreamConfig;
use crate::core::config::wisdom_context::WisdomContext;
use crate::core::error::{WisdomError, WisdomResult};
use crate::core::event::{AttributeValue, Event};
use crate::core::query::processor::Processor;
use crate::core::stream::stream_tracker::{StreamStatistics, StreamTracker};

use crossbeam::utils::CachePadded;
use crossbeam_queue::ArrayQueue;
use crossbeam_utils::Backoff;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

/// Unit of work travelling through the async ring buffer
#[derive(Debug)]
enum Dispatch {
    Single(Event),
    Batch(Vec<Event>),
}

/// State shared between the stream handle and its async consumer
struct StreamCore {
    id: Arc<str>,
    context: Arc<WisdomContext>,
    /// Fixed processor array captured by `start()`
    processors: RwLock<Arc<[Arc<dyn Processor>]>>,
    events_dispatched: CachePadded<AtomicU64>,
    events_dropped: CachePadded<AtomicU64>,
    processing_errors: CachePadded<AtomicU64>,
}

impl StreamCore {
    fn snapshot(&self) -> Arc<[Arc<dyn Processor>]> {
        Arc::clone(&self.processors.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn advance_playback_clock(&self, event: &Event) {
        if let Some(attribute) = self.context.playback_attribute() {
            if let Some(ts) = event.get(attribute).and_then(AttributeValue::as_i64) {
                self.context.advance_time(ts);
            }
        }
    }

    fn report(&self, error: WisdomError) {
        self.processing_errors.fetch_add(1, Ordering::Relaxed);
        log::debug!("[{}] Processor failed: {}", self.id, error);
        self.context.handle_exception(&error);
    }

    fn dispatch(&self, event: Event) {
        self.advance_playback_clock(&event);
        let processors = self.snapshot();
        for processor in processors.iter() {
            let copy = event.copy_for(&self.id);
            let _permit = self.context.thread_barrier().pass();
            if let Err(e) = processor.process(copy) {
                self.report(e);
            }
        }
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    fn dispatch_batch(&self, events: Vec<Event>) {
        if let Some(last) = events.last() {
            self.advance_playback_clock(last);
        }
        let processors = self.snapshot();
        for processor in processors.iter() {
            let copies: Vec<Event> = events.iter().map(|e| e.copy_for(&self.id)).collect();
            let _permit = self.context.thread_barrier().pass();
            if let Err(e) = processor.process_batch(copies) {
                self.report(e);
            }
        }
        self.events_dispatched
            .fetch_add(events.len() as u64, Ordering::Relaxed);
    }

    fn run(&self, item: Dispatch) {
        match item {
            Dispatch::Single(event) => self.dispatch(event),
            Dispatch::Batch(events) => self.dispatch_batch(events),
        }
    }
}

/// Ring buffer plus the consumer thread draining it
struct AsyncDispatcher {
    buffer: Arc<ArrayQueue<Dispatch>>,
    shutdown: Arc<AtomicBool>,
    consumer: JoinHandle<()>,
}

impl AsyncDispatcher {
    fn start(core: Arc<StreamCore>, buffer_size: usize) -> WisdomResult<Self> {
        let buffer = Arc::new(ArrayQueue::new(buffer_size));
        let shutdown = Arc::new(AtomicBool::new(false));

        let consumer_buffer = Arc::clone(&buffer);
        let consumer_shutdown = Arc::clone(&shutdown);
        let thread_name = core.context.config().thread_name(&core.id);
        let stream_id = Arc::clone(&core.id);

        let consumer = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let backoff = Backoff::new();
                let mut consumed: u64 = 0;
                loop {
                    match consumer_buffer.pop() {
                        Some(item) => {
                            core.run(item);
                            consumed += 1;
                            backoff.reset();
                        }
                        // Buffer drained after shutdown was requested
                        None if consumer_shutdown.load(Ordering::Acquire) => break,
                        None if backoff.is_completed() => thread::yield_now(),
                        None => backoff.snooze(),
                    }
                }
                log::debug!("[{}] Consumer completed after {} dispatches", core.id, consumed);
            })
            .map_err(|e| {
                WisdomError::initialization_with_component(
                    format!("failed to spawn consumer thread: {e}"),
                    stream_id.to_string(),
                )
            })?;

        Ok(Self {
            buffer,
            shutdown,
            consumer,
        })
    }

    fn shutdown(self, stream_id: &str) {
        self.shutdown.store(true, Ordering::Release);
        if self.consumer.join().is_err() {
            log::error!("[{}] Consumer thread panicked", stream_id);
        }
    }
}

pub struct Stream {
    core: Arc<StreamCore>,
    config: StreamConfig,

    /// Registered processors; copied into the core's array on `start()`
    processor_list: RwLock<Vec<Arc<dyn Processor>>>,

    enabled: AtomicBool,
    started: AtomicBool,
    tracker: Option<StreamTracker>,
    dispatcher: Mutex<Option<AsyncDispatcher>>,
}

impl Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.core.id)
            .field("is_async", &self.config.is_async)
            .field("buffer_size", &self.config.buffer_size)
            .field("processor_count", &self.processor_count())
            .field("enabled", &self.enabled.load(Ordering::Relaxed))
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish()
    }
}

impl Stream {
    pub fn new(
        id: impl Into<String>,
        context: Arc<WisdomContext>,
        config: StreamConfig,
    ) -> WisdomResult<Self> {
        let id: String = id.into();
        if id.trim().is_empty() {
            return Err(WisdomError::validation_with_field(
                "stream id must not be empty",
                "id",
            ));
        }
        config.validate()?;

        let tracker = config.statistics.then(StreamTracker::new);
        Ok(Self {
            core: Arc::new(StreamCore {
                id: Arc::from(id),
                context,
                processors: RwLock::new(Arc::from(Vec::new())),
                events_dispatched: CachePadded::new(AtomicU64::new(0)),
                events_dropped: CachePadded::new(AtomicU64::new(0)),
                processing_errors: CachePadded::new(AtomicU64::new(0)),
            }),
            config,
            processor_list: RwLock::new(Vec::new()),
            enabled: AtomicBool::new(true),
            started: AtomicBool::new(false),
            tracker,
            dispatcher: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.core.id
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Register a processor at the end of the list; duplicates are ignored
    pub fn add_processor(&self, processor: Arc<dyn Processor>) {
        let mut list = self
            .processor_list
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let len = list.len();
        Self::insert_unique(&mut list, len, processor);
        self.warn_if_started();
    }

    /// Register a processor at `index` (clamped to the list length)
    pub fn add_processor_at(&self, index: usize, processor: Arc<dyn Processor>) {
        let mut list = self
            .processor_list
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Self::insert_unique(&mut list, index, processor);
        self.warn_if_started();
    }

    fn insert_unique(list: &mut Vec<Arc<dyn Processor>>, index: usize, processor: Arc<dyn Processor>) {
        if !list.iter().any(|p| Arc::ptr_eq(p, &processor)) {
            let index = index.min(list.len());
            list.insert(index, processor);
        }
    }

    pub fn remove_processor(&self, processor: &Arc<dyn Processor>) {
        self.processor_list
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|p| !Arc::ptr_eq(p, processor));
        self.warn_if_started();
    }

    pub fn processor_count(&self) -> usize {
        self.processor_list.read().map(|l| l.len()).unwrap_or(0)
    }

    fn warn_if_started(&self) {
        if self.started.load(Ordering::Acquire) {
            log::warn!(
                "[{}] Processor list changed after start; takes effect on the next start",
                self.core.id
            );
        }
    }

    /// Snapshot the processor list and start the async consumer if configured
    ///
    /// Idempotent. Failure to start the consumer aborts startup.
    pub fn start(&self) -> WisdomResult<()> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return Ok(());
        }

        let snapshot: Arc<[Arc<dyn Processor>]> = Arc::from(
            self.processor_list
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        );
        *self
            .core
            .processors
            .write()
            .unwrap_or_else(PoisonError::into_inner) = snapshot;

        if self.config.is_async {
            match AsyncDispatcher::start(Arc::clone(&self.core), self.config.buffer_size) {
                Ok(dispatcher) => {
                    *self.dispatcher.lock().unwrap_or_else(PoisonError::into_inner) =
                        Some(dispatcher);
                }
                Err(e) => {
                    self.started.store(false, Ordering::Release);
                    return Err(e);
                }
            }
        }

        log::debug!(
            "[{}] Stream started with {} processors (async: {})",
            self.core.id,
            self.processor_count(),
            self.config.is_async
        );
        Ok(())
    }

    /// Stop accepting events; async streams drain their buffer first
    pub fn stop(&self) {
        if !self.started.swap(false, Ordering::AcqRel) {
            return;
        }
        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(dispatcher) = dispatcher {
            dispatcher.shutdown(&self.core.id);
        }
        log::debug!("[{}] Stream stopped", self.core.id);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    /// Disabled streams silently drop every event
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn accept(&self, count: usize) -> WisdomResult<bool> {
        if !self.is_enabled() {
            self.core
                .events_dropped
                .fetch_add(count as u64, Ordering::Relaxed);
            return Ok(false);
        }
        if !self.is_started() {
            return Err(WisdomError::runtime(format!(
                "stream '{}' is not started",
                self.core.id
            )));
        }
        if let Some(tracker) = &self.tracker {
            tracker.in_events(count as u64);
        }
        Ok(true)
    }

    fn submit(&self, item: Dispatch) -> WisdomResult<()> {
        let dispatcher = self.dispatcher.lock().unwrap_or_else(PoisonError::into_inner);
        match dispatcher.as_ref() {
            Some(dispatcher) => {
                // Publishing may wait for a slot; release the handle lock first
                let buffer = Arc::clone(&dispatcher.buffer);
                let shutdown = Arc::clone(&dispatcher.shutdown);
                drop(dispatcher);
                let publisher = AsyncPublisher { buffer, shutdown };
                publisher.publish(&self.core.id, item)
            }
            None => {
                drop(dispatcher);
                self.core.run(item);
                Ok(())
            }
        }
    }

    pub fn statistics(&self) -> StreamStatistics {
        StreamStatistics {
            stream_id: self.core.id.to_string(),
            events_in: self.tracker.as_ref().map_or(0, StreamTracker::events_in),
            events_dispatched: self.core.events_dispatched.load(Ordering::Relaxed),
            events_dropped: self.core.events_dropped.load(Ordering::Relaxed),
            processing_errors: self.core.processing_errors.load(Ordering::Relaxed),
            throughput: self.tracker.as_ref().map_or(0.0, StreamTracker::throughput),
            processor_count: self.processor_count(),
            is_async: self.config.is_async,
        }
    }

    pub fn tracker(&self) -> Option<&StreamTracker> {
        self.tracker.as_ref()
    }
}

/// Producer side of the ring buffer, detached from the dispatcher handle
struct AsyncPublisher {
    buffer: Arc<ArrayQueue<Dispatch>>,
    shutdown: Arc<AtomicBool>,
}

impl AsyncPublisher {
    fn publish(&self, stream_id: &str, mut item: Dispatch) -> WisdomResult<()> {
        let backoff = Backoff::new();
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return Err(WisdomError::runtime(format!(
                    "stream '{stream_id}' is shutting down"
                )));
            }
            match self.buffer.push(item) {
                Ok(()) => return Ok(()),
                Err(rejected) => {
                    item = rejected;
                    backoff.snooze();
                }
            }
        }
    }
}

impl Processor for Stream {
    fn start(&self) -> WisdomResult<()> {
        Stream::start(self)
    }

    fn stop(&self) -> WisdomResult<()> {
        Stream::stop(self);
        Ok(())
    }

    fn process(&self, mut event: Event) -> WisdomResult<()> {
        if !self.accept(1)? {
            return Ok(());
        }
        event.ensure_rooted();
        self.submit(Dispatch::Single(event))
    }

    fn process_batch(&self, mut events: Vec<Event>) -> WisdomResult<()> {
        if events.is_empty() || !self.accept(events.len())? {
            return Ok(());
        }
        events.iter_mut().for_each(Event::ensure_rooted);
        self.submit(Dispatch::Batch(events))
    }

    fn copy(self: Arc<Self>) -> Arc<dyn Processor> {
        self
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.stop();
    }
}

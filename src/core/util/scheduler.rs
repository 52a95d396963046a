// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Scheduler
//!
//! One-shot timers ordered in a min-heap by due time.
//!
//! ## Modes
//!
//! - **Wall clock**: `start()` spawns a dedicated timer thread that sleeps
//!   until the earliest due time and fires every expired timer. Scheduling
//!   an earlier timer wakes it through a signal channel; dropping the
//!   channel's sender on `stop()` ends the thread.
//! - **Playback**: with an event driven clock no thread is started; timers
//!   fire synchronously from [`Scheduler::advance`] whenever the clock moves.
//!
//! Executors run outside the heap lock with the clock value at firing time.
//! Errors they return go to the application's exception handler.

use crate::core::error::handler::ExceptionHandler;
use crate::core::error::{WisdomError, WisdomResult};
use crate::core::util::timestamp_generator::TimestampGenerator;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

/// Callback fired by the scheduler
pub trait Executor: Send + Sync {
    fn execute(&self, timestamp: i64) -> WisdomResult<()>;
}

impl<F> Executor for F
where
    F: Fn(i64) -> WisdomResult<()> + Send + Sync,
{
    fn execute(&self, timestamp: i64) -> WisdomResult<()> {
        self(timestamp)
    }
}

struct ScheduledTask {
    due: i64,
    seq: u64,
    executor: Arc<dyn Executor>,
}

impl PartialEq for ScheduledTask {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for ScheduledTask {}

impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reverse ordering for min-heap behavior, FIFO among equal due times
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

struct TimerQueue {
    timers: BinaryHeap<ScheduledTask>,
}

struct Shared {
    queue: Mutex<TimerQueue>,
    running: AtomicBool,
}

pub struct Scheduler {
    thread_name: String,
    clock: Arc<dyn TimestampGenerator>,
    exception_handler: Arc<ExceptionHandler>,
    shared: Arc<Shared>,
    next_seq: AtomicU64,
    /// Wakes the timer thread; `None` when no thread runs
    wakeup: Mutex<Option<Sender<()>>>,
    worker: Mutex<Option<(ThreadId, JoinHandle<()>)>>,
}

impl Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("thread_name", &self.thread_name)
            .field("playback", &self.clock.is_event_driven())
            .field("pending_timers", &self.pending_timers())
            .field("running", &self.shared.running.load(Ordering::Relaxed))
            .finish()
    }
}

impl Scheduler {
    pub fn new(
        thread_name: impl Into<String>,
        clock: Arc<dyn TimestampGenerator>,
        exception_handler: Arc<ExceptionHandler>,
    ) -> Self {
        Self {
            thread_name: thread_name.into(),
            clock,
            exception_handler,
            shared: Arc::new(Shared {
                queue: Mutex::new(TimerQueue {
                    timers: BinaryHeap::new(),
                }),
                running: AtomicBool::new(false),
            }),
            next_seq: AtomicU64::new(0),
            wakeup: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    pub fn clock(&self) -> &Arc<dyn TimestampGenerator> {
        &self.clock
    }

    /// Fire `executor` once after `delay` on the scheduler's clock
    pub fn schedule(&self, delay: Duration, executor: Arc<dyn Executor>) {
        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        let due = self.clock.current_timestamp().saturating_add(delay_ms);
        self.schedule_at(due, executor);
    }

    /// Fire `executor` once when the clock reaches `timestamp`
    pub fn schedule_at(&self, timestamp: i64, executor: Arc<dyn Executor>) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let mut queue = self
            .shared
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        queue.timers.push(ScheduledTask {
            due: timestamp,
            seq,
            executor,
        });
        drop(queue);

        let wakeup = self.wakeup.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = wakeup.as_ref() {
            // a pending signal already wakes the thread
            let _ = sender.try_send(());
        }
    }

    pub fn pending_timers(&self) -> usize {
        self.shared
            .queue
            .lock()
            .map(|q| q.timers.len())
            .unwrap_or(0)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Start firing timers
    ///
    /// Spawns the timer thread for wall clock time; playback schedulers only
    /// flip their running flag. Idempotent.
    pub fn start(&self) -> WisdomResult<()> {
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return Ok(());
        }

        if self.clock.is_event_driven() {
            return Ok(());
        }

        let (sender, signals) = bounded(1);
        *self.wakeup.lock().unwrap_or_else(PoisonError::into_inner) = Some(sender);
        let shared = Arc::clone(&self.shared);
        let clock = Arc::clone(&self.clock);
        let handler = Arc::clone(&self.exception_handler);
        let handle = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || Self::run_timer_loop(&shared, &signals, clock.as_ref(), &handler))
            .map_err(|e| {
                self.shared.running.store(false, Ordering::Release);
                self.wakeup
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                WisdomError::initialization_with_component(
                    format!("failed to spawn timer thread: {e}"),
                    self.thread_name.clone(),
                )
            })?;

        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        *worker = Some((handle.thread().id(), handle));
        log::debug!("[{}] Scheduler started", self.thread_name);
        Ok(())
    }

    /// Stop firing timers and join the timer thread
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        // disconnecting the signal channel ends the timer thread
        self.wakeup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((thread_id, handle)) = worker {
            // A timer callback stopping the app must not join itself
            if thread_id != thread::current().id() && handle.join().is_err() {
                log::error!("[{}] Timer thread panicked", self.thread_name);
            }
        }
        log::debug!("[{}] Scheduler stopped", self.thread_name);
    }

    /// Fire every timer due at or before `timestamp`
    ///
    /// Drives playback schedulers; timers registered by a firing executor
    /// that are already due fire in the same call.
    pub fn advance(&self, timestamp: i64) -> usize {
        let mut fired = 0;
        while let Some(task) = self.pop_due(timestamp) {
            Self::fire(&self.exception_handler, task, timestamp);
            fired += 1;
        }
        fired
    }

    fn pop_due(&self, timestamp: i64) -> Option<ScheduledTask> {
        let mut queue = self
            .shared
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match queue.timers.peek() {
            Some(task) if task.due <= timestamp => queue.timers.pop(),
            _ => None,
        }
    }

    fn fire(handler: &ExceptionHandler, task: ScheduledTask, timestamp: i64) {
        if let Err(e) = task.executor.execute(timestamp) {
            handler.handle(&e);
        }
    }

    fn run_timer_loop(
        shared: &Shared,
        signals: &Receiver<()>,
        clock: &dyn TimestampGenerator,
        handler: &ExceptionHandler,
    ) {
        while shared.running.load(Ordering::Acquire) {
            let now = clock.current_timestamp();
            let (next_due, task) = {
                let mut queue = shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
                match queue.timers.peek().map(|t| t.due) {
                    Some(due) if due <= now => (Some(due), queue.timers.pop()),
                    next_due => (next_due, None),
                }
            };

            if let Some(task) = task {
                Self::fire(handler, task, now);
                continue;
            }
            let signal = match next_due {
                Some(due) => {
                    let wait = Duration::from_millis(u64::try_from(due - now).unwrap_or(1));
                    signals.recv_deadline(Instant::now() + wait)
                }
                None => signals.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            if let Err(RecvTimeoutError::Disconnected) = signal {
                break;
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quiescence gate between event dispatch and graph maintenance
//!
//! Dispatching threads take a shared permit per event through
//! [`ThreadBarrier::pass`]. A maintenance operation takes the exclusive
//! permit through [`ThreadBarrier::lock`], which waits until every in-flight
//! dispatch has released its permit and holds new dispatches back until the
//! returned guard is dropped.
//!
//! Permits are re-entrant per thread: a processor that forwards an event to
//! another stream on the same thread does not take a second shared permit.

use crate::core::error::{WisdomError, WisdomResult};
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};

static NEXT_BARRIER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static HELD_PERMITS: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug)]
pub struct ThreadBarrier {
    id: u64,
    gate: RwLock<()>,
}

/// Shared permit held while one event is dispatched
#[derive(Debug)]
pub struct BarrierPermit<'a> {
    barrier_id: u64,
    _guard: Option<RwLockReadGuard<'a, ()>>,
}

/// Exclusive permit held by a maintenance operation
#[derive(Debug)]
pub struct BarrierGuard<'a> {
    _guard: RwLockWriteGuard<'a, ()>,
}

impl ThreadBarrier {
    pub fn new() -> Self {
        Self {
            id: NEXT_BARRIER_ID.fetch_add(1, Ordering::Relaxed),
            gate: RwLock::new(()),
        }
    }

    fn held_by_current_thread(&self) -> bool {
        HELD_PERMITS.with(|held| held.borrow().contains(&self.id))
    }

    /// Take a shared permit, blocking while the barrier is locked
    pub fn pass(&self) -> BarrierPermit<'_> {
        let guard = if self.held_by_current_thread() {
            None
        } else {
            Some(self.gate.read().unwrap_or_else(PoisonError::into_inner))
        };
        HELD_PERMITS.with(|held| held.borrow_mut().push(self.id));
        BarrierPermit {
            barrier_id: self.id,
            _guard: guard,
        }
    }

    /// Pause all dispatching threads
    ///
    /// Fails when called from a thread that is itself dispatching through
    /// this barrier, since waiting for that dispatch would never finish.
    pub fn lock(&self) -> WisdomResult<BarrierGuard<'_>> {
        if self.held_by_current_thread() {
            return Err(WisdomError::validation(
                "thread barrier cannot be locked from a dispatching thread",
            ));
        }
        Ok(BarrierGuard {
            _guard: self.gate.write().unwrap_or_else(PoisonError::into_inner),
        })
    }

    pub fn is_locked(&self) -> bool {
        match self.gate.try_read() {
            Ok(_) => false,
            Err(TryLockError::WouldBlock) => true,
            Err(TryLockError::Poisoned(_)) => false,
        }
    }
}

impl Default for ThreadBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BarrierPermit<'_> {
    fn drop(&mut self) {
        HELD_PERMITS.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|id| *id == self.barrier_id) {
                held.remove(pos);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_pass_is_reentrant() {
        let barrier = ThreadBarrier::new();
        let outer = barrier.pass();
        let inner = barrier.pass();
        drop(inner);
        drop(outer);
        assert!(!barrier.is_locked());
    }

    #[test]
    fn test_lock_from_dispatching_thread_is_rejected() {
        let barrier = ThreadBarrier::new();
        let _permit = barrier.pass();
        assert!(barrier.lock().is_err());
    }

    #[test]
    fn test_lock_blocks_dispatch_until_released() {
        let barrier = Arc::new(ThreadBarrier::new());
        let passed = Arc::new(AtomicBool::new(false));

        let guard = barrier.lock().unwrap();
        assert!(barrier.is_locked());

        let worker = {
            let barrier = Arc::clone(&barrier);
            let passed = Arc::clone(&passed);
            thread::spawn(move || {
                let _permit = barrier.pass();
                passed.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(
            !passed.load(Ordering::SeqCst),
            "dispatch must wait while the barrier is locked"
        );

        drop(guard);
        worker.join().unwrap();
        assert!(passed.load(Ordering::SeqCst));
    }
}

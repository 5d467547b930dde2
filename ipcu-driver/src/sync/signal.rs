//! Pending-cancellation flag of a caller's execution context.
//!
//! A `CancelSignal` belongs to whoever drives a send (a process, a kernel
//! task). Raising it makes any interruptible wait that observes it give up
//! with [`Interrupted`]. The flag stays raised until the owner clears it.

use core::sync::atomic::{AtomicBool, Ordering};
use core::task::Waker;
use spinning_top::Spinlock;

/// Returned by waits that were abandoned because a cancellation was pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

pub struct CancelSignal {
    pending: AtomicBool,
    /// Task currently parked in an interruptible wait, if any.
    waiting: Spinlock<Option<Waker>>,
}

impl CancelSignal {
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            waiting: Spinlock::new(None),
        }
    }

    /// Request cancellation and wake the waiting task.
    pub fn raise(&self) {
        self.pending.store(true, Ordering::Release);
        if let Some(waker) = self.waiting.lock().take() {
            waker.wake();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Clear a delivered cancellation.
    pub fn clear(&self) {
        self.pending.store(false, Ordering::Release);
    }

    /// Register the task to wake on `raise`.
    pub(crate) fn set_waiting(&self, waker: &Waker) {
        let mut waiting = self.waiting.lock();
        match waiting.as_ref() {
            Some(current) if current.will_wake(waker) => {}
            _ => *waiting = Some(waker.clone()),
        }
    }

    pub(crate) fn clear_waiting(&self) {
        self.waiting.lock().take();
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

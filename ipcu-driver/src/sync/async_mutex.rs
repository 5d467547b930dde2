//! An async-aware mutex for serializing senders on one mailbox.
//!
//! Unlike a spinlock, this mutex can be held across `.await` points. When the
//! lock is contended, the waiting task yields (returns `Poll::Pending`) and is
//! woken when the lock becomes available. Waiters are woken in FIFO order.
//!
//! Acquisition can be made interruptible by passing a [`CancelSignal`]: a
//! raised signal makes the pending acquisition resolve to [`Interrupted`]
//! instead of the guard. A free mutex is taken even while the signal is
//! pending, and once acquired the guard is never revoked.

use alloc::collections::VecDeque;
use core::cell::UnsafeCell;
use core::future::Future;
use core::ops::{Deref, DerefMut};
use core::pin::Pin;
use core::task::{Context, Poll, Waker};
use spinning_top::Spinlock;

use super::signal::{CancelSignal, Interrupted};

/// Internal state protected by a spinlock (only held briefly, never across awaits).
struct Inner {
    locked: bool,
    waiters: VecDeque<(u64, Waker)>,
    next_waiter: u64,
}

/// An async-aware mutex.
///
/// The underlying data is only accessible through the returned `AsyncMutexGuard`.
pub struct AsyncMutex<T> {
    inner: Spinlock<Inner>,
    data: UnsafeCell<T>,
}

// Safety: access to `data` is serialized by the `locked` flag.
unsafe impl<T: Send> Send for AsyncMutex<T> {}
unsafe impl<T: Send> Sync for AsyncMutex<T> {}

impl<T> AsyncMutex<T> {
    /// Create a new unlocked `AsyncMutex` wrapping `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Spinlock::new(Inner {
                locked: false,
                waiters: VecDeque::new(),
                next_waiter: 0,
            }),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquire the mutex, returning a guard that releases on drop.
    pub fn lock(&self) -> AsyncMutexLock<'_, '_, T> {
        AsyncMutexLock {
            mutex: self,
            cancel: None,
            ticket: None,
        }
    }

    /// Acquire the mutex unless `cancel` is raised first.
    pub fn lock_interruptible<'a, 's>(
        &'a self,
        cancel: &'s CancelSignal,
    ) -> AsyncMutexLock<'a, 's, T> {
        AsyncMutexLock {
            mutex: self,
            cancel: Some(cancel),
            ticket: None,
        }
    }

    /// Whether some task currently holds the mutex.
    pub fn is_locked(&self) -> bool {
        self.inner.lock().locked
    }

    /// Number of tasks queued for the mutex.
    pub fn waiter_count(&self) -> usize {
        self.inner.lock().waiters.len()
    }
}

/// Future returned by [`AsyncMutex::lock`] and
/// [`AsyncMutex::lock_interruptible`].
pub struct AsyncMutexLock<'a, 's, T> {
    mutex: &'a AsyncMutex<T>,
    cancel: Option<&'s CancelSignal>,
    /// Queue position handed out on the first contended poll.
    ticket: Option<u64>,
}

impl<'a, T> AsyncMutexLock<'a, '_, T> {
    /// Drop our queue entry. Returns `true` if it was no longer queued,
    /// meaning a release already popped it to wake us.
    fn leave_queue(inner: &mut Inner, ticket: u64) -> bool {
        match inner.waiters.iter().position(|(t, _)| *t == ticket) {
            Some(pos) => {
                inner.waiters.remove(pos);
                false
            }
            None => true,
        }
    }
}

impl<'a, T> Future for AsyncMutexLock<'a, '_, T> {
    type Output = Result<AsyncMutexGuard<'a, T>, Interrupted>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mutex = self.mutex;

        let mut inner = mutex.inner.lock();
        if !inner.locked {
            inner.locked = true;
            if let Some(ticket) = self.ticket.take() {
                Self::leave_queue(&mut inner, ticket);
            }
            drop(inner);
            if let Some(cancel) = self.cancel {
                cancel.clear_waiting();
            }
            return Poll::Ready(Ok(AsyncMutexGuard { mutex }));
        }

        // Only a contended acquisition can be interrupted.
        if let Some(cancel) = self.cancel {
            if cancel.is_pending() {
                drop(inner);
                cancel.clear_waiting();
                // Dropping `self` later hands any wake-up we consumed onward.
                return Poll::Ready(Err(Interrupted));
            }
        }

        // Register (or refresh) our place in the queue and yield.
        match self.ticket {
            Some(ticket) => match inner.waiters.iter_mut().find(|(t, _)| *t == ticket) {
                Some(entry) => entry.1 = cx.waker().clone(),
                // Woken but another task got the lock first: queue again at the front.
                None => inner.waiters.push_front((ticket, cx.waker().clone())),
            },
            None => {
                let ticket = inner.next_waiter;
                inner.next_waiter += 1;
                inner.waiters.push_back((ticket, cx.waker().clone()));
                self.ticket = Some(ticket);
            }
        }
        drop(inner);

        if let Some(cancel) = self.cancel {
            cancel.set_waiting(cx.waker());
            // A raise between the first check and registration would be lost otherwise.
            if cancel.is_pending() {
                cx.waker().wake_by_ref();
            }
        }
        Poll::Pending
    }
}

impl<T> Drop for AsyncMutexLock<'_, '_, T> {
    fn drop(&mut self) {
        let Some(ticket) = self.ticket.take() else {
            return;
        };
        let mut inner = self.mutex.inner.lock();
        let was_woken = Self::leave_queue(&mut inner, ticket);
        // We were chosen as the next owner but are going away: pass it on.
        if was_woken && !inner.locked {
            if let Some((_, waker)) = inner.waiters.pop_front() {
                waker.wake();
            }
        }
    }
}

/// RAII guard that releases the [`AsyncMutex`] on drop.
pub struct AsyncMutexGuard<'a, T> {
    mutex: &'a AsyncMutex<T>,
}

impl<T> Deref for AsyncMutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // Safety: we hold the mutex, so exclusive access is guaranteed.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for AsyncMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: we hold the mutex, so exclusive access is guaranteed.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for AsyncMutexGuard<'_, T> {
    fn drop(&mut self) {
        let mut inner = self.mutex.inner.lock();
        inner.locked = false;
        // Wake the next waiter, if any
        if let Some((_, waker)) = inner.waiters.pop_front() {
            waker.wake();
        }
    }
}

//! Single-waiter completion signal.
//!
//! The sender re-arms the completion before starting a transfer and then
//! awaits it; the interrupt side calls [`Completion::complete`]. `complete`
//! only touches an atomic flag and a short spinlock, so it is safe to call
//! from interrupt context.

use core::future::Future;
use core::pin::Pin;
use core::sync::atomic::{AtomicBool, Ordering};
use core::task::{Context, Poll, Waker};
use spinning_top::Spinlock;

pub struct Completion {
    done: AtomicBool,
    waiting: Spinlock<Option<Waker>>,
}

impl Completion {
    pub const fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
            waiting: Spinlock::new(None),
        }
    }

    /// Reset to "not yet satisfied".
    pub fn reinit(&self) {
        self.done.store(false, Ordering::Release);
    }

    /// Mark the completion satisfied and wake the waiter.
    pub fn complete(&self) {
        self.done.store(true, Ordering::Release);
        if let Some(waker) = self.waiting.lock().take() {
            waker.wake();
        }
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Wait until [`complete`](Self::complete) is called. There is no
    /// timeout.
    pub fn wait(&self) -> CompletionWait<'_> {
        CompletionWait { completion: self }
    }

    /// Poll-style check used by [`CompletionWait`] and by combinators that
    /// race the completion against something else.
    pub fn poll_done(&self, cx: &mut Context<'_>) -> Poll<()> {
        if self.is_done() {
            return Poll::Ready(());
        }
        *self.waiting.lock() = Some(cx.waker().clone());
        // `complete` may have run between the check and the registration.
        if self.is_done() {
            self.waiting.lock().take();
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

/// Future returned by [`Completion::wait`].
pub struct CompletionWait<'a> {
    completion: &'a Completion,
}

impl Future for CompletionWait<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.completion.poll_done(cx)
    }
}

impl Drop for CompletionWait<'_> {
    fn drop(&mut self) {
        self.completion.waiting.lock().take();
    }
}

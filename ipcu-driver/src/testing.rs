//! Helpers for driving the engine's futures by hand.
//!
//! The driver never spawns tasks itself; bring-up code and tests poll its
//! futures directly. A [`CountingWaker`] records how often a future asked to
//! be polled again, which makes interleavings between senders and the
//! interrupt side explicit.
//!
//! Only compiled for this crate's unit tests or with the `testing` feature.

use alloc::sync::Arc;
use alloc::task::Wake;
use core::future::Future;
use core::pin::Pin;
use core::sync::atomic::{AtomicUsize, Ordering};
use core::task::{Context, Poll, Waker};

struct Counter {
    wakes: AtomicUsize,
}

impl Wake for Counter {
    fn wake(self: Arc<Self>) {
        self.wakes.fetch_add(1, Ordering::SeqCst);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.wakes.fetch_add(1, Ordering::SeqCst);
    }
}

/// A waker that counts how many times it was woken.
#[derive(Clone)]
pub struct CountingWaker {
    counter: Arc<Counter>,
}

impl CountingWaker {
    pub fn new() -> Self {
        Self {
            counter: Arc::new(Counter {
                wakes: AtomicUsize::new(0),
            }),
        }
    }

    /// Number of wake-ups so far.
    pub fn count(&self) -> usize {
        self.counter.wakes.load(Ordering::SeqCst)
    }

    pub fn waker(&self) -> Waker {
        Waker::from(self.counter.clone())
    }
}

impl Default for CountingWaker {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll a future exactly once.
pub fn poll_once<F>(future: Pin<&mut F>, waker: &CountingWaker) -> Poll<F::Output>
where
    F: Future + ?Sized,
{
    let waker = waker.waker();
    let mut cx = Context::from_waker(&waker);
    future.poll(&mut cx)
}

//! Synchronization primitives for the mailbox engine.
//!
//! Everything here is poll-based: "blocking" means returning
//! `Poll::Pending` and being woken through the task's `Waker`, so the
//! primitives work under any cooperative executor. Spinlocks are only held
//! for a few instructions and never across an `.await`.

pub mod async_mutex;
pub mod completion;
pub mod signal;

pub use async_mutex::{AsyncMutex, AsyncMutexGuard};
pub use completion::Completion;
pub use signal::{CancelSignal, Interrupted};

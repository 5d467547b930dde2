//! Error types for the mailbox transport.

use ipcu_abi::{EACCES, EBUSY, EFAULT, EINTR, EINVAL, ETIMEDOUT};

use crate::sync::Interrupted;

/// Errors surfaced to callers of the mailbox engine.
///
/// None of these are retried internally; retry policy belongs to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcuError {
    /// The mailbox has not been initialized.
    NotInitialized,
    /// The mailbox still holds an unacknowledged message.
    Busy,
    /// A register did not read back what was written.
    Fault,
    /// Waiting for the mailbox was abandoned because of a pending cancellation.
    Interrupted,
    /// A caller-supplied deadline expired before the peer acknowledged.
    TimedOut,
    /// The unit or mailbox index is not part of the configuration.
    InvalidMailbox,
    /// The mailbox is already open through another channel.
    AlreadyOpen,
    /// A byte buffer does not fit in one message.
    InvalidLength,
}

impl IpcuError {
    /// Errno value (positive) reported to user space.
    pub fn errno(self) -> i32 {
        match self {
            IpcuError::NotInitialized => EACCES,
            IpcuError::Busy | IpcuError::AlreadyOpen => EBUSY,
            IpcuError::Fault => EFAULT,
            IpcuError::Interrupted => EINTR,
            IpcuError::TimedOut => ETIMEDOUT,
            IpcuError::InvalidMailbox | IpcuError::InvalidLength => EINVAL,
        }
    }

    /// Whether the same call may succeed if simply issued again later.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            IpcuError::Busy | IpcuError::Interrupted | IpcuError::TimedOut
        )
    }
}

impl From<Interrupted> for IpcuError {
    fn from(_: Interrupted) -> Self {
        IpcuError::Interrupted
    }
}

impl core::fmt::Display for IpcuError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let text = match self {
            IpcuError::NotInitialized => "mailbox not initialized",
            IpcuError::Busy => "mailbox busy",
            IpcuError::Fault => "register readback mismatch",
            IpcuError::Interrupted => "interrupted",
            IpcuError::TimedOut => "timed out waiting for ack",
            IpcuError::InvalidMailbox => "no such mailbox",
            IpcuError::AlreadyOpen => "mailbox already open",
            IpcuError::InvalidLength => "message too long",
        };
        f.write_str(text)
    }
}

/// Convert an operation result into the signed status returned to user space.
pub fn status<T>(result: &Result<T, IpcuError>) -> i32 {
    match result {
        Ok(_) => ipcu_abi::STATUS_OK,
        Err(e) => -e.errno(),
    }
}

//! Per-mailbox state.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use ipcu_abi::Payload;

use crate::config::MailboxConfig;
use crate::sync::{AsyncMutex, Completion};

/// Address of one logical mailbox: the IPCU unit and the mailbox within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MailboxAddr {
    pub unit: u8,
    pub mailbox: u8,
}

impl MailboxAddr {
    pub const fn new(unit: u8, mailbox: u8) -> Self {
        Self { unit, mailbox }
    }
}

impl fmt::Display for MailboxAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit={} mb={}", self.unit, self.mailbox)
    }
}

/// Protocol state of a mailbox as seen by the local side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxState {
    Uninitialized,
    Idle,
    /// A sender holds the mailbox and has written the trigger.
    Sending,
}

/// Software state of one configured mailbox.
///
/// Slots are created for every configured mailbox when the engine is built
/// and live as long as the engine. Only `initialized`, `in_flight` and the
/// completion change afterwards.
pub(crate) struct MailboxSlot {
    pub(crate) source_channel: u8,
    pub(crate) dest_channel: u8,
    initialized: AtomicBool,
    /// Set just before the send trigger, cleared by the ack handler.
    in_flight: AtomicBool,
    /// Serializes senders on this mailbox.
    pub(crate) lock: AsyncMutex<()>,
    pub(crate) completion: Completion,
}

impl MailboxSlot {
    pub(crate) fn new(cfg: &MailboxConfig) -> Self {
        Self {
            source_channel: cfg.source_channel,
            dest_channel: cfg.dest_channel,
            initialized: AtomicBool::new(false),
            in_flight: AtomicBool::new(false),
            lock: AsyncMutex::new(()),
            completion: Completion::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub(crate) fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn set_in_flight(&self, value: bool) {
        self.in_flight.store(value, Ordering::Release);
    }

    /// Swap the in-flight flag to `false`, returning whether it was set.
    pub(crate) fn take_in_flight(&self) -> bool {
        self.in_flight.swap(false, Ordering::AcqRel)
    }

    pub fn state(&self) -> MailboxState {
        if !self.is_initialized() {
            MailboxState::Uninitialized
        } else if self.is_in_flight() {
            MailboxState::Sending
        } else {
            MailboxState::Idle
        }
    }
}

/// Register and software state of one mailbox, captured for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxSnapshot {
    pub addr: MailboxAddr,
    pub state: MailboxState,
    pub source_channel: u8,
    pub dest_channel: u8,
    pub occupied: bool,
    pub source: u32,
    pub dest_stat: u32,
    pub mode: u32,
    pub ack_stat: u32,
    pub data: Payload,
    pub sender_waiting: bool,
}

//! Mailbox transport over the Milbeaut/Karine Inter-Processor Communication
//! Unit (IPCU).
//!
//! The IPCU exposes a small set of hardware mailboxes shared between the
//! application CPUs and a companion DSP/RTOS core. This crate implements the
//! rendezvous protocol on top of them: a sender claims a mailbox, writes the
//! message and waits until the peer acknowledges it; the receiving side is
//! driven by interrupts.
//!
//! - [`engine::Ipcu`] is the protocol engine for one or more units, and
//!   [`dsp::DspIpcu`] the single-unit variant.
//! - [`irq::IrqQueue`] turns interrupt lines into deferred receive/ack work.
//! - [`channel::IpcuDevice`] provides exclusive per-mailbox endpoints with a
//!   receive queue for upper layers.
//! - [`sim::SimRegisters`] models a unit in memory for bring-up and tests.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod channel;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod irq;
pub mod logging;
pub mod mailbox;
pub mod regs;
pub mod sim;
pub mod sync;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use channel::{IpcuChannel, IpcuDevice};
pub use config::{ConfigError, IpcuConfig, MailboxConfig, UnitConfig};
pub use dsp::DspIpcu;
pub use engine::Ipcu;
pub use error::IpcuError;
pub use irq::{IrqEvent, IrqKind, IrqQueue, MessageSink};
pub use mailbox::{MailboxAddr, MailboxSnapshot, MailboxState};
pub use regs::{MmioRegion, RegisterIo};
pub use sim::SimRegisters;
pub use sync::CancelSignal;

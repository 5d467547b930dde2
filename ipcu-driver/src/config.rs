//! Init-time configuration of the mailbox units.
//!
//! The platform layer fills these structures in from its own description of
//! the SoC (device tree, board tables) and hands them to the engine once.
//! Nothing here is reconfigured afterwards.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;

use ipcu_abi::{CHANNEL_COUNT, MAILBOX_COUNT, UNIT_REGION_SIZE};

/// Default depth of the per-channel receive queue.
pub const DEFAULT_RX_QUEUE_DEPTH: usize = 16;

/// Configuration errors found by [`IpcuConfig::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No units configured.
    NoUnits,
    /// Mailbox index outside the unit.
    MailboxOutOfRange { unit: usize, mailbox: u8 },
    /// Channel index outside the unit.
    ChannelOutOfRange { unit: usize, mailbox: u8, channel: u8 },
    /// The same mailbox appears twice in one unit.
    DuplicateMailbox { unit: usize, mailbox: u8 },
    /// The same interrupt line is routed to two events.
    DuplicateIrq(u32),
    /// Register window smaller than one unit.
    RegionTooSmall { unit: usize },
    /// Number of register blocks does not match the number of units.
    UnitCountMismatch { expected: usize, found: usize },
    /// Receive queues need room for at least one message.
    ZeroQueueDepth,
}

/// One logical mailbox and its fixed channel assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxConfig {
    pub mailbox: u8,
    /// Channel this side raises when it sends on this mailbox.
    pub source_channel: u8,
    /// Destination channel of this mailbox: the receiving side's channel.
    /// Cleared and acked by this side when it consumes a message.
    pub dest_channel: u8,
    /// Interrupt line signalling a message arrived in this mailbox.
    pub rx_irq: Option<u32>,
    /// Interrupt line signalling the peer acknowledged our message.
    pub ack_irq: Option<u32>,
}

impl MailboxConfig {
    pub const fn new(mailbox: u8, source_channel: u8, dest_channel: u8) -> Self {
        Self {
            mailbox,
            source_channel,
            dest_channel,
            rx_irq: None,
            ack_irq: None,
        }
    }

    pub const fn with_irqs(mut self, rx_irq: u32, ack_irq: u32) -> Self {
        self.rx_irq = Some(rx_irq);
        self.ack_irq = Some(ack_irq);
        self
    }
}

/// One hardware IPCU instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitConfig {
    /// Mapped address of the unit's register window.
    pub base: usize,
    pub size: usize,
    pub mailboxes: Vec<MailboxConfig>,
}

impl UnitConfig {
    pub fn new(base: usize, mailboxes: Vec<MailboxConfig>) -> Self {
        Self {
            base,
            size: UNIT_REGION_SIZE,
            mailboxes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcuConfig {
    pub units: Vec<UnitConfig>,
    pub rx_queue_depth: usize,
}

impl IpcuConfig {
    pub fn new(units: Vec<UnitConfig>) -> Self {
        Self {
            units,
            rx_queue_depth: DEFAULT_RX_QUEUE_DEPTH,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.units.is_empty() {
            return Err(ConfigError::NoUnits);
        }
        if self.rx_queue_depth == 0 {
            return Err(ConfigError::ZeroQueueDepth);
        }

        let mut irqs = BTreeSet::new();
        for (unit, unit_cfg) in self.units.iter().enumerate() {
            if unit_cfg.size < UNIT_REGION_SIZE {
                return Err(ConfigError::RegionTooSmall { unit });
            }

            let mut seen = BTreeSet::new();
            for mb in &unit_cfg.mailboxes {
                if mb.mailbox as usize >= MAILBOX_COUNT {
                    return Err(ConfigError::MailboxOutOfRange {
                        unit,
                        mailbox: mb.mailbox,
                    });
                }
                for channel in [mb.source_channel, mb.dest_channel] {
                    if channel as usize >= CHANNEL_COUNT {
                        return Err(ConfigError::ChannelOutOfRange {
                            unit,
                            mailbox: mb.mailbox,
                            channel,
                        });
                    }
                }
                if !seen.insert(mb.mailbox) {
                    return Err(ConfigError::DuplicateMailbox {
                        unit,
                        mailbox: mb.mailbox,
                    });
                }
                for irq in [mb.rx_irq, mb.ack_irq].into_iter().flatten() {
                    if !irqs.insert(irq) {
                        return Err(ConfigError::DuplicateIrq(irq));
                    }
                }
            }
        }
        Ok(())
    }
}

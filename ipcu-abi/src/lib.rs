//! Shared definitions for the IPCU mailbox transport.
//!
//! This crate contains the register layout, protocol constants and status
//! codes that the application-side driver, the DSP firmware and the upper
//! channel layers need to agree on.

#![cfg_attr(not(test), no_std)]

// =============================================================================
// Geometry
// =============================================================================

/// Number of logical mailboxes in one IPCU unit.
pub const MAILBOX_COUNT: usize = 8;

/// Number of interrupt channels in one IPCU unit. Source and destination
/// registers hold one bit per channel.
pub const CHANNEL_COUNT: usize = 16;

/// Number of 32-bit data words carried by one mailbox message.
pub const PAYLOAD_WORDS: usize = 9;

/// Size in bytes of one mailbox message.
pub const PAYLOAD_BYTES: usize = PAYLOAD_WORDS * 4;

/// One mailbox message, as laid out in the data registers.
pub type Payload = [u32; PAYLOAD_WORDS];

// =============================================================================
// Register layout
// =============================================================================

/// Distance between the register blocks of consecutive mailboxes.
pub const MAILBOX_STRIDE: usize = 0x80;

// Offsets within one mailbox block.

/// Source channel bitmap. Writing a non-zero value claims the mailbox.
pub const REG_SOURCE: usize = 0x00;
/// Transfer mode.
pub const REG_MODE: usize = 0x04;
/// Send trigger.
pub const REG_SEND: usize = 0x08;
/// Set bits in the destination bitmap.
pub const REG_DEST_SET: usize = 0x10;
/// Clear bits in the destination bitmap.
pub const REG_DEST_CLR: usize = 0x14;
/// Destination bitmap status (read-only).
pub const REG_DEST_STAT: usize = 0x18;
/// Set bits in the acknowledge bitmap.
pub const REG_ACK_SET: usize = 0x30;
/// Clear bits in the acknowledge bitmap.
pub const REG_ACK_CLR: usize = 0x34;
/// Acknowledge bitmap status (read-only).
pub const REG_ACK_STAT: usize = 0x38;
/// First of the `PAYLOAD_WORDS` data registers.
pub const REG_DATA: usize = 0x40;

/// Global mailbox status: one bit per mailbox, set while it holds a message.
pub const REG_MBSTAT: usize = MAILBOX_COUNT * MAILBOX_STRIDE;

/// Size of the register window of one unit.
pub const UNIT_REGION_SIZE: usize = REG_MBSTAT + 4;

/// Byte offset of a register inside the window of one unit.
pub const fn mailbox_reg(mailbox: usize, reg: usize) -> usize {
    mailbox * MAILBOX_STRIDE + reg
}

// =============================================================================
// Protocol constants
// =============================================================================

/// `REG_MODE` value selecting manual mode with an explicit send trigger.
pub const MODE_MANUAL_SEND: u32 = 0x1;

/// Value written to `REG_SEND` to start a transfer.
pub const SEND_REQUEST: u32 = 0x1;

// =============================================================================
// Status codes
// =============================================================================

// Errno-style codes returned to user space by the channel layer. Negated on
// the wire, like the kernel's own return convention.

pub const STATUS_OK: i32 = 0;
pub const EINTR: i32 = 4;
pub const EACCES: i32 = 13;
pub const EFAULT: i32 = 14;
pub const EBUSY: i32 = 16;
pub const EINVAL: i32 = 22;
pub const ETIMEDOUT: i32 = 110;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_registers_fit_in_mailbox_block() {
        assert!(REG_DATA + PAYLOAD_BYTES <= MAILBOX_STRIDE);
    }

    #[test]
    fn mbstat_follows_last_mailbox() {
        assert!(mailbox_reg(MAILBOX_COUNT - 1, REG_DATA) + PAYLOAD_BYTES <= REG_MBSTAT);
        assert_eq!(REG_MBSTAT, 0x400);
    }

    #[test]
    fn mailbox_bits_fit_in_mbstat() {
        assert!(MAILBOX_COUNT <= 32);
        assert!(CHANNEL_COUNT <= 32);
    }
}

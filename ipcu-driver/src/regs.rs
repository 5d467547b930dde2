//! IPCU register access.
//!
//! All mailbox register traffic goes through the [`RegisterIo`] trait so the
//! protocol engine can run against real device memory ([`MmioRegion`]) or
//! the in-memory model in [`crate::sim`]. [`MailboxRegs`] computes offsets
//! for a single mailbox and gives each register a typed accessor. Nothing in
//! this module interprets register contents.

use core::ptr::{read_volatile, write_volatile};
use core::sync::atomic::{Ordering, fence};

use ipcu_abi::{
    MODE_MANUAL_SEND, PAYLOAD_WORDS, Payload, REG_ACK_CLR, REG_ACK_SET, REG_ACK_STAT, REG_DATA,
    REG_DEST_CLR, REG_DEST_SET, REG_DEST_STAT, REG_MBSTAT, REG_MODE, REG_SEND, REG_SOURCE,
    SEND_REQUEST, mailbox_reg,
};

/// 32-bit register access to one IPCU unit's register window.
///
/// Offsets are byte offsets from the start of the window. Accesses are not
/// idempotent: several registers clear or set hardware state when written.
pub trait RegisterIo: Send + Sync {
    /// Read a register.
    fn read(&self, offset: usize) -> u32;

    /// Write a register, ordered after all earlier memory accesses.
    fn write(&self, offset: usize, value: u32);

    /// Write a register with no ordering guarantee against other writes.
    fn write_relaxed(&self, offset: usize, value: u32) {
        self.write(offset, value);
    }

    /// Make all earlier writes visible to the device before any later one.
    fn write_barrier(&self) {
        fence(Ordering::SeqCst);
    }
}

/// Volatile access to a memory-mapped IPCU register window.
///
/// # Example
///
/// ```ignore
/// let regs = unsafe { MmioRegion::new(0x1c25_1000, ipcu_abi::UNIT_REGION_SIZE) };
/// let busy = regs.read(ipcu_abi::REG_MBSTAT);
/// ```
pub struct MmioRegion {
    base: usize,
    size: usize,
}

impl MmioRegion {
    /// Wrap an already-mapped device region.
    ///
    /// # Safety
    ///
    /// `base..base + size` must be mapped as device memory for the lifetime
    /// of the returned value and must belong to an IPCU unit.
    pub const unsafe fn new(base: usize, size: usize) -> Self {
        Self { base, size }
    }

    /// Address of the start of the window.
    pub fn base(&self) -> usize {
        self.base
    }

    /// Size of the window in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    fn reg_ptr(&self, offset: usize) -> *mut u32 {
        assert!(
            offset % 4 == 0 && offset + 4 <= self.size,
            "IPCU register access out of bounds"
        );
        (self.base + offset) as *mut u32
    }
}

impl RegisterIo for MmioRegion {
    fn read(&self, offset: usize) -> u32 {
        // Safety: the constructor's contract covers every in-bounds offset.
        unsafe { read_volatile(self.reg_ptr(offset)) }
    }

    fn write(&self, offset: usize, value: u32) {
        fence(Ordering::Release);
        self.write_relaxed(offset, value);
    }

    fn write_relaxed(&self, offset: usize, value: u32) {
        // Safety: see `read`.
        unsafe { write_volatile(self.reg_ptr(offset), value) }
    }

    fn write_barrier(&self) {
        fence(Ordering::SeqCst);
        // The fence only orders the CPU's view; device memory needs a DSB.
        #[cfg(target_arch = "aarch64")]
        unsafe {
            core::arch::asm!("dsb st", options(nostack, preserves_flags))
        };
    }
}

/// Bit for `index` in a channel or mailbox bitmap.
pub const fn bit(index: u8) -> u32 {
    1 << index
}

/// Typed accessor for the registers of one mailbox.
pub struct MailboxRegs<'a> {
    io: &'a dyn RegisterIo,
    mailbox: u8,
}

impl<'a> MailboxRegs<'a> {
    pub fn new(io: &'a dyn RegisterIo, mailbox: u8) -> Self {
        Self { io, mailbox }
    }

    fn offset(&self, reg: usize) -> usize {
        mailbox_reg(self.mailbox as usize, reg)
    }

    /// The unit-wide `mbstat` bitmap.
    pub fn mbstat(&self) -> u32 {
        self.io.read(REG_MBSTAT)
    }

    /// Whether `mbstat` reports this mailbox as holding a message.
    pub fn is_occupied(&self) -> bool {
        self.mbstat() & bit(self.mailbox) != 0
    }

    pub fn source(&self) -> u32 {
        self.io.read(self.offset(REG_SOURCE))
    }

    pub fn set_source(&self, value: u32) {
        self.io.write(self.offset(REG_SOURCE), value);
    }

    pub fn set_dest(&self, bits: u32) {
        self.io.write(self.offset(REG_DEST_SET), bits);
    }

    pub fn clear_dest(&self, bits: u32) {
        self.io.write(self.offset(REG_DEST_CLR), bits);
    }

    pub fn dest_stat(&self) -> u32 {
        self.io.read(self.offset(REG_DEST_STAT))
    }

    pub fn mode(&self) -> u32 {
        self.io.read(self.offset(REG_MODE))
    }

    pub fn set_manual_send_mode(&self) {
        self.io.write(self.offset(REG_MODE), MODE_MANUAL_SEND);
    }

    /// Write the payload into the data registers, in order, relaxed.
    pub fn write_data_relaxed(&self, payload: &Payload) {
        for (i, word) in payload.iter().enumerate() {
            self.io.write_relaxed(self.offset(REG_DATA + i * 4), *word);
        }
    }

    /// Read all data registers.
    pub fn read_data(&self) -> Payload {
        let mut payload = [0u32; PAYLOAD_WORDS];
        for (i, word) in payload.iter_mut().enumerate() {
            *word = self.io.read(self.offset(REG_DATA + i * 4));
        }
        payload
    }

    pub fn write_barrier(&self) {
        self.io.write_barrier();
    }

    pub fn trigger_send(&self) {
        self.io.write(self.offset(REG_SEND), SEND_REQUEST);
    }

    pub fn ack_stat(&self) -> u32 {
        self.io.read(self.offset(REG_ACK_STAT))
    }

    pub fn clear_ack(&self, bits: u32) {
        self.io.write(self.offset(REG_ACK_CLR), bits);
    }

    pub fn set_ack(&self, bits: u32) {
        self.io.write(self.offset(REG_ACK_SET), bits);
    }
}

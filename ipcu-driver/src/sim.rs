//! In-memory model of one IPCU unit.
//!
//! `SimRegisters` behaves like the register window of a real unit as far as
//! the mailbox protocol can observe: set/clear registers update their status
//! registers, `mbstat` reports a mailbox as occupied while its `source` is
//! non-zero, and status registers ignore writes. Every write the driver
//! issues is appended to an access log so tests can check ordering.
//!
//! The `peer_*` methods act as the remote core and change state without
//! going through the log.

use alloc::vec::Vec;
use spinning_top::Spinlock;

use ipcu_abi::{
    MAILBOX_COUNT, MAILBOX_STRIDE, PAYLOAD_WORDS, Payload, REG_ACK_CLR, REG_ACK_SET, REG_ACK_STAT,
    REG_DATA, REG_DEST_CLR, REG_DEST_SET, REG_DEST_STAT, REG_MBSTAT, REG_SEND, REG_SOURCE,
    UNIT_REGION_SIZE, mailbox_reg,
};

use crate::regs::RegisterIo;

/// One driver-side access recorded by [`SimRegisters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegAccess {
    Write { offset: usize, value: u32 },
    WriteRelaxed { offset: usize, value: u32 },
    Barrier,
}

impl RegAccess {
    /// Offset written, or `None` for a barrier.
    pub fn offset(&self) -> Option<usize> {
        match self {
            RegAccess::Write { offset, .. } | RegAccess::WriteRelaxed { offset, .. } => {
                Some(*offset)
            }
            RegAccess::Barrier => None,
        }
    }
}

struct SimState {
    regs: [u32; UNIT_REGION_SIZE / 4],
    log: Vec<RegAccess>,
    /// Mailboxes forced busy regardless of their `source` register.
    forced_occupied: u32,
    /// Per-mailbox value that `source` reads back as, whatever was written.
    stuck_source: [Option<u32>; MAILBOX_COUNT],
    triggers: [usize; MAILBOX_COUNT],
}

/// Software model of an IPCU register window.
pub struct SimRegisters {
    state: Spinlock<SimState>,
}

impl SimRegisters {
    pub fn new() -> Self {
        Self {
            state: Spinlock::new(SimState {
                regs: [0; UNIT_REGION_SIZE / 4],
                log: Vec::new(),
                forced_occupied: 0,
                stuck_source: [None; MAILBOX_COUNT],
                triggers: [0; MAILBOX_COUNT],
            }),
        }
    }

    /// Raw register value, bypassing the access log.
    pub fn peek(&self, offset: usize) -> u32 {
        self.read(offset)
    }

    /// Current value of a mailbox register.
    pub fn mailbox_reg(&self, mailbox: u8, reg: usize) -> u32 {
        self.peek(mailbox_reg(mailbox as usize, reg))
    }

    /// Remove and return the recorded accesses.
    pub fn take_log(&self) -> Vec<RegAccess> {
        core::mem::take(&mut self.state.lock().log)
    }

    /// Recorded accesses touching one mailbox's register block.
    pub fn mailbox_log(&self, mailbox: u8) -> Vec<RegAccess> {
        let start = mailbox_reg(mailbox as usize, 0);
        self.state
            .lock()
            .log
            .iter()
            .filter(|a| matches!(a.offset(), Some(o) if o >= start && o < start + MAILBOX_STRIDE))
            .copied()
            .collect()
    }

    /// Number of send triggers written to a mailbox so far.
    pub fn trigger_count(&self, mailbox: u8) -> usize {
        self.state.lock().triggers[mailbox as usize]
    }

    /// Make `mbstat` report `mailbox` as occupied.
    pub fn set_occupied(&self, mailbox: u8) {
        self.state.lock().forced_occupied |= 1 << mailbox;
    }

    pub fn clear_occupied(&self, mailbox: u8) {
        self.state.lock().forced_occupied &= !(1 << mailbox);
    }

    /// Make `source` of `mailbox` read back as `value` (bus fault injection).
    pub fn stick_source(&self, mailbox: u8, value: u32) {
        self.state.lock().stuck_source[mailbox as usize] = Some(value);
    }

    /// Remote core places a message in `mailbox`.
    pub fn peer_send(&self, mailbox: u8, source: u32, dest: u32, payload: &Payload) {
        let mut state = self.state.lock();
        let mailbox = mailbox as usize;
        state.regs[mailbox_reg(mailbox, REG_SOURCE) / 4] = source;
        state.regs[mailbox_reg(mailbox, REG_DEST_STAT) / 4] |= dest;
        for (i, word) in payload.iter().enumerate() {
            state.regs[mailbox_reg(mailbox, REG_DATA + i * 4) / 4] = *word;
        }
    }

    /// Remote core acknowledges the message in `mailbox`.
    pub fn peer_ack(&self, mailbox: u8, bits: u32) {
        let mut state = self.state.lock();
        let idx = mailbox_reg(mailbox as usize, REG_ACK_STAT) / 4;
        state.regs[idx] |= bits;
    }

    /// Payload currently in the data registers of `mailbox`.
    pub fn payload(&self, mailbox: u8) -> Payload {
        let mut payload = [0; PAYLOAD_WORDS];
        for (i, word) in payload.iter_mut().enumerate() {
            *word = self.mailbox_reg(mailbox, REG_DATA + i * 4);
        }
        payload
    }

    fn store(state: &mut SimState, offset: usize, value: u32) {
        let mailbox = offset / MAILBOX_STRIDE;
        let reg = offset % MAILBOX_STRIDE;
        let idx = offset / 4;
        if offset >= REG_MBSTAT {
            return;
        }
        match reg {
            REG_DEST_SET => state.regs[(offset - REG_DEST_SET + REG_DEST_STAT) / 4] |= value,
            REG_DEST_CLR => state.regs[(offset - REG_DEST_CLR + REG_DEST_STAT) / 4] &= !value,
            REG_ACK_SET => state.regs[(offset - REG_ACK_SET + REG_ACK_STAT) / 4] |= value,
            REG_ACK_CLR => state.regs[(offset - REG_ACK_CLR + REG_ACK_STAT) / 4] &= !value,
            REG_DEST_STAT | REG_ACK_STAT => {}
            REG_SEND => {
                state.regs[idx] = value;
                state.triggers[mailbox] += 1;
            }
            _ => state.regs[idx] = value,
        }
    }
}

impl Default for SimRegisters {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterIo for SimRegisters {
    fn read(&self, offset: usize) -> u32 {
        assert!(
            offset % 4 == 0 && offset + 4 <= UNIT_REGION_SIZE,
            "IPCU register access out of bounds"
        );
        let state = self.state.lock();
        if offset == REG_MBSTAT {
            let mut mbstat = state.forced_occupied;
            for mailbox in 0..MAILBOX_COUNT {
                if state.regs[mailbox_reg(mailbox, REG_SOURCE) / 4] != 0 {
                    mbstat |= 1 << mailbox;
                }
            }
            return mbstat;
        }
        if offset % MAILBOX_STRIDE == REG_SOURCE {
            if let Some(value) = state.stuck_source[offset / MAILBOX_STRIDE] {
                return value;
            }
        }
        state.regs[offset / 4]
    }

    fn write(&self, offset: usize, value: u32) {
        let mut state = self.state.lock();
        state.log.push(RegAccess::Write { offset, value });
        Self::store(&mut state, offset, value);
    }

    fn write_relaxed(&self, offset: usize, value: u32) {
        let mut state = self.state.lock();
        state.log.push(RegAccess::WriteRelaxed { offset, value });
        Self::store(&mut state, offset, value);
    }

    fn write_barrier(&self) {
        self.state.lock().log.push(RegAccess::Barrier);
    }
}

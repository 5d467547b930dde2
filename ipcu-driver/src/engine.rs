//! The mailbox send/acknowledge protocol.
//!
//! [`Ipcu`] owns the mailbox unit table: for every configured (unit, mailbox)
//! pair a [`MailboxSlot`] holding the init flag, the sender mutex and the
//! completion the ack interrupt signals. The register block itself belongs to
//! the device and is only referenced.
//!
//! A send claims the mailbox in hardware, programs destination, mode and
//! payload, issues a write barrier and writes the trigger, then waits for the
//! peer's acknowledgement. The ack interrupt drains the ack status, releases
//! `source` and completes the waiting sender. Only the mutex acquisition is
//! interruptible; once the trigger is written the sender waits for the peer
//! with no timeout unless it asked for a deadline.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::future::{Future, poll_fn};
use core::pin::pin;
use core::task::Poll;
use log::{debug, error, trace, warn};
use spinning_top::Spinlock;

use ipcu_abi::{MAILBOX_COUNT, Payload};

use crate::config::{ConfigError, IpcuConfig};
use crate::error::IpcuError;
use crate::mailbox::{MailboxAddr, MailboxSlot, MailboxSnapshot, MailboxState};
use crate::regs::{MailboxRegs, MmioRegion, RegisterIo, bit};
use crate::sync::CancelSignal;

/// One IPCU instance: its register window and its mailbox slots.
struct Unit {
    regs: Arc<dyn RegisterIo>,
    /// Indexed by mailbox id; `None` for mailboxes not in the configuration.
    slots: Vec<Option<MailboxSlot>>,
}

impl Unit {
    fn mailbox_regs(&self, mailbox: u8) -> MailboxRegs<'_> {
        MailboxRegs::new(&*self.regs, mailbox)
    }
}

/// The mailbox communication engine for one or more IPCU units.
pub struct Ipcu {
    units: Vec<Unit>,
    config: IpcuConfig,
    /// Serializes initialization across the whole table.
    table_lock: Spinlock<()>,
}

impl Ipcu {
    /// Build the engine over one register block per configured unit.
    pub fn new(config: IpcuConfig, regs: Vec<Arc<dyn RegisterIo>>) -> Result<Self, ConfigError> {
        config.validate()?;
        if regs.len() != config.units.len() {
            return Err(ConfigError::UnitCountMismatch {
                expected: config.units.len(),
                found: regs.len(),
            });
        }

        let units = config
            .units
            .iter()
            .zip(regs)
            .map(|(unit_cfg, regs)| {
                let mut slots: Vec<Option<MailboxSlot>> =
                    (0..MAILBOX_COUNT).map(|_| None).collect();
                for mb in &unit_cfg.mailboxes {
                    slots[mb.mailbox as usize] = Some(MailboxSlot::new(mb));
                }
                Unit { regs, slots }
            })
            .collect();

        debug!("ipcu: {} unit(s) configured", config.units.len());
        Ok(Self {
            units,
            config,
            table_lock: Spinlock::new(()),
        })
    }

    /// Build the engine over the memory-mapped register windows named in
    /// the configuration.
    ///
    /// # Safety
    ///
    /// Every unit's `base..base + size` must be a mapped IPCU register window
    /// that stays mapped for the lifetime of the engine.
    pub unsafe fn probe_mmio(config: IpcuConfig) -> Result<Self, ConfigError> {
        let regs = config
            .units
            .iter()
            .map(|unit| {
                // Safety: guaranteed by the caller.
                let region = unsafe { MmioRegion::new(unit.base, unit.size) };
                Arc::new(region) as Arc<dyn RegisterIo>
            })
            .collect();
        Self::new(config, regs)
    }

    pub fn config(&self) -> &IpcuConfig {
        &self.config
    }

    /// Addresses of every configured mailbox, in unit then mailbox order.
    pub fn mailboxes(&self) -> impl Iterator<Item = MailboxAddr> + '_ {
        self.units.iter().enumerate().flat_map(|(unit, u)| {
            u.slots
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.is_some())
                .map(move |(mailbox, _)| MailboxAddr::new(unit as u8, mailbox as u8))
        })
    }

    fn slot(&self, addr: MailboxAddr) -> Result<(&Unit, &MailboxSlot), IpcuError> {
        let unit = self
            .units
            .get(addr.unit as usize)
            .ok_or(IpcuError::InvalidMailbox)?;
        let slot = unit
            .slots
            .get(addr.mailbox as usize)
            .and_then(Option::as_ref)
            .ok_or(IpcuError::InvalidMailbox)?;
        Ok((unit, slot))
    }

    /// Look up an initialized slot.
    fn ready_slot(&self, addr: MailboxAddr) -> Result<(&Unit, &MailboxSlot), IpcuError> {
        let (unit, slot) = self.slot(addr)?;
        if !slot.is_initialized() {
            return Err(IpcuError::NotInitialized);
        }
        Ok((unit, slot))
    }

    /// Mark a mailbox ready for use. Calling it again has no further effect.
    pub fn initialize(&self, addr: MailboxAddr) -> Result<(), IpcuError> {
        let (_, slot) = self.slot(addr)?;
        let _table = self.table_lock.lock();
        slot.mark_initialized();
        debug!(
            "ipcu: {} initialized (src ch {}, dst ch {})",
            addr, slot.source_channel, slot.dest_channel
        );
        Ok(())
    }

    pub fn is_initialized(&self, addr: MailboxAddr) -> bool {
        self.slot(addr).is_ok_and(|(_, slot)| slot.is_initialized())
    }

    pub fn state(&self, addr: MailboxAddr) -> Result<MailboxState, IpcuError> {
        Ok(self.slot(addr)?.1.state())
    }

    /// Send `payload` on a mailbox and wait for the peer's acknowledgement.
    ///
    /// Fails without touching any register if the mailbox is not initialized
    /// or `mbstat` reports it occupied. Raising `cancel` aborts the call only
    /// while it is still waiting for another sender to finish. After the
    /// trigger is written there is no timeout: a peer that never acks blocks
    /// the caller forever. Use [`send_with_deadline`](Self::send_with_deadline)
    /// to bound the wait.
    pub async fn send(
        &self,
        addr: MailboxAddr,
        payload: &Payload,
        cancel: &CancelSignal,
    ) -> Result<(), IpcuError> {
        self.transmit(addr, payload, cancel, None::<core::future::Pending<()>>)
            .await
    }

    /// Like [`send`](Self::send), but gives up with
    /// [`IpcuError::TimedOut`] when `deadline` resolves before the ack.
    ///
    /// A timed-out message stays in the mailbox: the hardware has no abort,
    /// so the mailbox reports busy until the peer's late ack arrives.
    pub async fn send_with_deadline<D>(
        &self,
        addr: MailboxAddr,
        payload: &Payload,
        cancel: &CancelSignal,
        deadline: D,
    ) -> Result<(), IpcuError>
    where
        D: Future<Output = ()>,
    {
        self.transmit(addr, payload, cancel, Some(deadline)).await
    }

    async fn transmit<D>(
        &self,
        addr: MailboxAddr,
        payload: &Payload,
        cancel: &CancelSignal,
        deadline: Option<D>,
    ) -> Result<(), IpcuError>
    where
        D: Future<Output = ()>,
    {
        let (unit, slot) = self.ready_slot(addr).inspect_err(|e| {
            error!("ipcu: send on {}: {}", addr, e);
        })?;

        let _guard = slot.lock.lock_interruptible(cancel).await.map_err(|_| {
            debug!("ipcu: send on {} interrupted while waiting for mailbox", addr);
            IpcuError::Interrupted
        })?;

        let regs = unit.mailbox_regs(addr.mailbox);
        if regs.is_occupied() {
            warn!("ipcu: {} busy (mbstat {:#x})", addr, regs.mbstat());
            return Err(IpcuError::Busy);
        }

        let source = bit(slot.source_channel);
        regs.set_source(source);
        let readback = regs.source();
        if readback != source {
            error!(
                "ipcu: {} source readback {:#x}, wrote {:#x}",
                addr, readback, source
            );
            return Err(IpcuError::Fault);
        }

        let dest = bit(slot.dest_channel);
        regs.set_dest(dest);
        regs.set_manual_send_mode();
        regs.write_data_relaxed(payload);
        trace!(
            "ipcu: {} src {:#x} dst {:#x} data {:x?}",
            addr, source, dest, payload
        );

        // The peer may read the data as soon as it sees the trigger.
        regs.write_barrier();
        slot.completion.reinit();
        slot.set_in_flight(true);
        regs.trigger_send();
        debug!("ipcu: {} sent, waiting for ack", addr);

        match deadline {
            None => slot.completion.wait().await,
            Some(deadline) => {
                let mut deadline = pin!(deadline);
                let acked = poll_fn(|cx| {
                    if slot.completion.poll_done(cx).is_ready() {
                        return Poll::Ready(true);
                    }
                    deadline.as_mut().poll(cx).map(|()| false)
                })
                .await;
                if !acked {
                    warn!("ipcu: {} no ack before deadline", addr);
                    return Err(IpcuError::TimedOut);
                }
            }
        }

        debug!("ipcu: {} acked", addr);
        Ok(())
    }

    /// Tell the peer that the last message received on this mailbox has been
    /// consumed.
    pub fn send_ack(&self, addr: MailboxAddr) -> Result<(), IpcuError> {
        let (unit, slot) = self.ready_slot(addr).inspect_err(|e| {
            error!("ipcu: ack on {}: {}", addr, e);
        })?;
        let regs = unit.mailbox_regs(addr.mailbox);
        let dest = bit(slot.dest_channel);
        regs.clear_dest(dest);
        regs.set_ack(dest);
        trace!("ipcu: {} ack sent (bits {:#x})", addr, dest);
        Ok(())
    }

    /// Receive-interrupt handler: drain the payload of `addr` and clear its
    /// destination bit. Returns `None` if the mailbox cannot be serviced.
    ///
    /// Runs in interrupt context; never blocks.
    pub fn handle_receive(&self, irq: u32, addr: MailboxAddr) -> Option<Payload> {
        let (unit, slot) = match self.ready_slot(addr) {
            Ok(found) => found,
            Err(e) => {
                error!("ipcu: irq {} receive on {}: {}", irq, addr, e);
                return None;
            }
        };
        let regs = unit.mailbox_regs(addr.mailbox);
        let payload = regs.read_data();
        regs.clear_dest(bit(slot.dest_channel));
        trace!("ipcu: irq {} {} received {:x?}", irq, addr, payload);
        Some(payload)
    }

    /// Ack-interrupt handler: clear the observed ack bits, release `source`
    /// and wake the sender waiting on `addr`.
    ///
    /// An ack with no send in flight is drained the same way but reported as
    /// spurious and wakes nobody. Runs in interrupt context; never blocks.
    pub fn handle_ack(&self, irq: u32, addr: MailboxAddr) {
        let (unit, slot) = match self.ready_slot(addr) {
            Ok(found) => found,
            Err(e) => {
                error!("ipcu: irq {} ack on {}: {}", irq, addr, e);
                return;
            }
        };
        let regs = unit.mailbox_regs(addr.mailbox);
        let stat = regs.ack_stat();
        regs.clear_ack(stat);
        regs.set_source(0);

        if slot.take_in_flight() {
            trace!("ipcu: irq {} {} ack stat {:#x}", irq, addr, stat);
            slot.completion.complete();
        } else {
            warn!(
                "ipcu: irq {} spurious ack on {} (stat {:#x})",
                irq, addr, stat
            );
        }
    }

    /// Capture the registers and software state of a mailbox.
    pub fn snapshot(&self, addr: MailboxAddr) -> Result<MailboxSnapshot, IpcuError> {
        let (unit, slot) = self.slot(addr)?;
        let regs = unit.mailbox_regs(addr.mailbox);
        Ok(MailboxSnapshot {
            addr,
            state: slot.state(),
            source_channel: slot.source_channel,
            dest_channel: slot.dest_channel,
            occupied: regs.is_occupied(),
            source: regs.source(),
            dest_stat: regs.dest_stat(),
            mode: regs.mode(),
            ack_stat: regs.ack_stat(),
            data: regs.read_data(),
            sender_waiting: slot.lock.is_locked(),
        })
    }
}

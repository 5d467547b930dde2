//! Single-unit variant of the engine for the DSP mailbox.
//!
//! The DSP side has exactly one IPCU instance, so its callers address
//! mailboxes by number alone.

use alloc::sync::Arc;
use alloc::vec;
use core::future::Future;

use ipcu_abi::Payload;

use crate::config::{ConfigError, IpcuConfig, UnitConfig};
use crate::engine::Ipcu;
use crate::error::IpcuError;
use crate::mailbox::{MailboxAddr, MailboxSnapshot};
use crate::regs::RegisterIo;
use crate::sync::CancelSignal;

/// Unit index the DSP mailboxes live on inside the wrapped engine.
const DSP_UNIT: u8 = 0;

pub struct DspIpcu {
    ipcu: Ipcu,
}

impl DspIpcu {
    pub fn new(unit: UnitConfig, regs: Arc<dyn RegisterIo>) -> Result<Self, ConfigError> {
        let ipcu = Ipcu::new(IpcuConfig::new(vec![unit]), vec![regs])?;
        Ok(Self { ipcu })
    }

    /// # Safety
    ///
    /// See [`Ipcu::probe_mmio`].
    pub unsafe fn probe_mmio(unit: UnitConfig) -> Result<Self, ConfigError> {
        // Safety: forwarded from the caller.
        let ipcu = unsafe { Ipcu::probe_mmio(IpcuConfig::new(vec![unit]))? };
        Ok(Self { ipcu })
    }

    /// The multi-unit engine underneath, for the interrupt dispatcher and
    /// the channel layer.
    pub fn engine(&self) -> &Ipcu {
        &self.ipcu
    }

    pub const fn addr(mailbox: u8) -> MailboxAddr {
        MailboxAddr::new(DSP_UNIT, mailbox)
    }

    pub fn initialize(&self, mailbox: u8) -> Result<(), IpcuError> {
        self.ipcu.initialize(Self::addr(mailbox))
    }

    pub async fn send(
        &self,
        mailbox: u8,
        payload: &Payload,
        cancel: &CancelSignal,
    ) -> Result<(), IpcuError> {
        self.ipcu.send(Self::addr(mailbox), payload, cancel).await
    }

    pub async fn send_with_deadline<D>(
        &self,
        mailbox: u8,
        payload: &Payload,
        cancel: &CancelSignal,
        deadline: D,
    ) -> Result<(), IpcuError>
    where
        D: Future<Output = ()>,
    {
        self.ipcu
            .send_with_deadline(Self::addr(mailbox), payload, cancel, deadline)
            .await
    }

    pub fn send_ack(&self, mailbox: u8) -> Result<(), IpcuError> {
        self.ipcu.send_ack(Self::addr(mailbox))
    }

    pub fn handle_receive(&self, irq: u32, mailbox: u8) -> Option<Payload> {
        self.ipcu.handle_receive(irq, Self::addr(mailbox))
    }

    pub fn handle_ack(&self, irq: u32, mailbox: u8) {
        self.ipcu.handle_ack(irq, Self::addr(mailbox))
    }

    pub fn snapshot(&self, mailbox: u8) -> Result<MailboxSnapshot, IpcuError> {
        self.ipcu.snapshot(Self::addr(mailbox))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MailboxConfig;
    use crate::sim::SimRegisters;
    use crate::testing::{CountingWaker, poll_once};
    use core::pin::pin;
    use core::task::Poll;
    use ipcu_abi::REG_SOURCE;

    fn dsp() -> (DspIpcu, Arc<SimRegisters>) {
        let sim = Arc::new(SimRegisters::new());
        let unit = UnitConfig::new(0, vec![MailboxConfig::new(1, 0, 3)]);
        (DspIpcu::new(unit, sim.clone()).unwrap(), sim)
    }

    #[test]
    fn send_before_initialize_fails() {
        let (dsp, sim) = dsp();
        let cancel = CancelSignal::new();
        let waker = CountingWaker::new();
        let mut send = pin!(dsp.send(1, &[0; 9], &cancel));
        assert_eq!(
            poll_once(send.as_mut(), &waker),
            Poll::Ready(Err(IpcuError::NotInitialized))
        );
        assert!(sim.take_log().is_empty());
    }

    #[test]
    fn handshake_without_unit_index() {
        let (dsp, sim) = dsp();
        dsp.initialize(1).unwrap();
        let cancel = CancelSignal::new();
        let waker = CountingWaker::new();

        let mut send = pin!(dsp.send(1, &[5; 9], &cancel));
        assert!(poll_once(send.as_mut(), &waker).is_pending());
        assert_eq!(sim.payload(1), [5; 9]);

        dsp.handle_ack(7, 1);
        assert_eq!(poll_once(send.as_mut(), &waker), Poll::Ready(Ok(())));
        assert_eq!(sim.mailbox_reg(1, REG_SOURCE), 0);
    }

    #[test]
    fn receive_drains_payload() {
        let (dsp, sim) = dsp();
        dsp.initialize(1).unwrap();
        sim.peer_send(1, 1 << 3, 1 << 3, &[9; 9]);
        assert_eq!(dsp.handle_receive(8, 1), Some([9; 9]));
        assert_eq!(dsp.snapshot(1).unwrap().dest_stat, 0);
    }
}

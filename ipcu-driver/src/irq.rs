//! Interrupt routing and deferred handling.
//!
//! The platform's interrupt handler calls [`IrqQueue::on_interrupt`] with the
//! raised line. That call only looks the line up and queues an [`IrqEvent`];
//! the register work happens later in [`IrqQueue::dispatch`], normally run by
//! the handler task [`IrqQueue::run`]. Neither path ever takes a mailbox's
//! sender mutex.
//!
//! `on_interrupt` and the task side share the event queue's spinlock. On a
//! single core the platform must keep the IPCU lines masked while task code
//! holds that lock, since `spinning_top` does not disable interrupts: an
//! interrupt arriving mid-`dispatch` would spin forever. The queue is sized for
//! one event per routed line up front, so it only allocates from interrupt
//! context when the same line fires again before the task catches up.

use alloc::collections::{BTreeMap, VecDeque};
use core::future::poll_fn;
use core::task::{Poll, Waker};
use log::{error, trace};
use spinning_top::Spinlock;

use ipcu_abi::Payload;

use crate::config::IpcuConfig;
use crate::engine::Ipcu;
use crate::mailbox::MailboxAddr;

/// What an interrupt line reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqKind {
    /// A message arrived in the mailbox.
    Receive,
    /// The peer acknowledged our message in the mailbox.
    Ack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqEvent {
    pub irq: u32,
    pub kind: IrqKind,
    pub addr: MailboxAddr,
}

/// Consumer of received messages.
pub trait MessageSink: Send + Sync {
    fn deliver(&self, addr: MailboxAddr, payload: Payload);
}

/// Routing table plus the queue of interrupts awaiting handling.
pub struct IrqQueue {
    routes: BTreeMap<u32, (IrqKind, MailboxAddr)>,
    pending: Spinlock<VecDeque<IrqEvent>>,
    /// The handler task, parked while the queue is empty.
    handler: Spinlock<Option<Waker>>,
}

impl IrqQueue {
    /// Build the routing table from the interrupt lines in `config`.
    pub fn new(config: &IpcuConfig) -> Self {
        let mut routes = BTreeMap::new();
        for (unit, unit_cfg) in config.units.iter().enumerate() {
            for mb in &unit_cfg.mailboxes {
                let addr = MailboxAddr::new(unit as u8, mb.mailbox);
                if let Some(irq) = mb.rx_irq {
                    routes.insert(irq, (IrqKind::Receive, addr));
                }
                if let Some(irq) = mb.ack_irq {
                    routes.insert(irq, (IrqKind::Ack, addr));
                }
            }
        }
        let pending = VecDeque::with_capacity(routes.len());
        Self {
            routes,
            pending: Spinlock::new(pending),
            handler: Spinlock::new(None),
        }
    }

    pub fn route(&self, irq: u32) -> Option<(IrqKind, MailboxAddr)> {
        self.routes.get(&irq).copied()
    }

    /// Interrupt entry point. Returns `false` for lines this driver does not
    /// own.
    pub fn on_interrupt(&self, irq: u32) -> bool {
        let Some((kind, addr)) = self.route(irq) else {
            error!("ipcu: unexpected irq {}", irq);
            return false;
        };
        self.post(IrqEvent { irq, kind, addr });
        true
    }

    /// Queue an event for the handler task.
    pub fn post(&self, event: IrqEvent) {
        self.pending.lock().push_back(event);
        if let Some(waker) = self.handler.lock().take() {
            waker.wake();
        }
    }

    /// Number of events not yet dispatched.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Handle every queued event. Returns how many were handled.
    pub fn dispatch(&self, ipcu: &Ipcu, sink: &dyn MessageSink) -> usize {
        let mut handled = 0;
        loop {
            // Pop under the lock, handle outside it.
            let Some(event) = self.pending.lock().pop_front() else {
                break;
            };
            trace!("ipcu: dispatch {:?}", event);
            match event.kind {
                IrqKind::Receive => {
                    if let Some(payload) = ipcu.handle_receive(event.irq, event.addr) {
                        sink.deliver(event.addr, payload);
                    }
                }
                IrqKind::Ack => ipcu.handle_ack(event.irq, event.addr),
            }
            handled += 1;
        }
        handled
    }

    /// Handler task body: dispatch events as they are queued. Never returns.
    pub async fn run(&self, ipcu: &Ipcu, sink: &dyn MessageSink) {
        loop {
            self.wait_for_events().await;
            self.dispatch(ipcu, sink);
        }
    }

    async fn wait_for_events(&self) {
        poll_fn(|cx| {
            if self.pending() > 0 {
                return Poll::Ready(());
            }
            *self.handler.lock() = Some(cx.waker().clone());
            // An event posted before the waker was stored would be missed.
            if self.pending() > 0 {
                self.handler.lock().take();
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MailboxConfig, UnitConfig};
    use alloc::vec;

    #[test]
    fn routes_cover_every_configured_line() {
        let cfg = IpcuConfig::new(vec![
            UnitConfig::new(0, vec![MailboxConfig::new(0, 0, 1).with_irqs(40, 41)]),
            UnitConfig::new(0, vec![MailboxConfig::new(2, 0, 1).with_irqs(50, 51)]),
        ]);
        let queue = IrqQueue::new(&cfg);
        assert_eq!(queue.route(40), Some((IrqKind::Receive, MailboxAddr::new(0, 0))));
        assert_eq!(queue.route(41), Some((IrqKind::Ack, MailboxAddr::new(0, 0))));
        assert_eq!(queue.route(51), Some((IrqKind::Ack, MailboxAddr::new(1, 2))));
        assert_eq!(queue.route(42), None);
    }

    #[test]
    fn queue_holds_one_event_per_line_without_growing() {
        let cfg = IpcuConfig::new(vec![UnitConfig::new(
            0,
            vec![
                MailboxConfig::new(0, 0, 1).with_irqs(40, 41),
                MailboxConfig::new(1, 0, 1).with_irqs(42, 43),
            ],
        )]);
        let queue = IrqQueue::new(&cfg);
        let reserved = queue.pending.lock().capacity();
        assert!(reserved >= 4);
        for irq in 40..44 {
            assert!(queue.on_interrupt(irq));
        }
        assert_eq!(queue.pending(), 4);
        assert_eq!(queue.pending.lock().capacity(), reserved);
    }

    #[test]
    fn unrouted_interrupt_is_not_queued() {
        let cfg = IpcuConfig::new(vec![UnitConfig::new(0, vec![])]);
        let queue = IrqQueue::new(&cfg);
        assert!(!queue.on_interrupt(99));
        assert_eq!(queue.pending(), 0);
    }
}

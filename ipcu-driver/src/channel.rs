//! Character-device style endpoints on top of the mailbox engine.
//!
//! An [`IpcuChannel`] is an exclusive handle on one mailbox: opening it
//! initializes the mailbox, and it offers send, ack and a receive queue fed
//! by the interrupt dispatcher through [`IpcuDevice`]'s [`MessageSink`]
//! implementation. Messages arriving for a mailbox nobody has open are
//! dropped.

use alloc::collections::{BTreeMap, VecDeque};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::future::{Future, poll_fn};
use core::task::{Poll, Waker};
use log::{debug, warn};
use spinning_top::Spinlock;
use zerocopy::IntoBytes;

use ipcu_abi::{PAYLOAD_BYTES, PAYLOAD_WORDS, Payload};

use crate::engine::Ipcu;
use crate::error::{IpcuError, status};
use crate::irq::MessageSink;
use crate::mailbox::MailboxAddr;
use crate::sync::CancelSignal;

struct Endpoint {
    /// Received messages not yet read, oldest first.
    queue: VecDeque<Payload>,
    /// Messages discarded because the queue was full.
    dropped: u64,
    /// Readers blocked in `recv`. All are woken on delivery; the ones that
    /// find the queue empty again register anew.
    readers: Vec<Waker>,
}

impl Endpoint {
    fn park(&mut self, waker: &Waker) {
        if !self.readers.iter().any(|w| w.will_wake(waker)) {
            self.readers.push(waker.clone());
        }
    }
}

/// The set of open endpoints over one engine.
pub struct IpcuDevice {
    ipcu: Arc<Ipcu>,
    depth: usize,
    endpoints: Spinlock<BTreeMap<MailboxAddr, Endpoint>>,
}

impl IpcuDevice {
    pub fn new(ipcu: Arc<Ipcu>) -> Arc<Self> {
        let depth = ipcu.config().rx_queue_depth;
        Arc::new(Self {
            ipcu,
            depth,
            endpoints: Spinlock::new(BTreeMap::new()),
        })
    }

    pub fn ipcu(&self) -> &Arc<Ipcu> {
        &self.ipcu
    }

    /// Open a mailbox for exclusive use, initializing it if needed.
    pub fn open(self: &Arc<Self>, addr: MailboxAddr) -> Result<IpcuChannel, IpcuError> {
        self.ipcu.initialize(addr)?;

        let mut endpoints = self.endpoints.lock();
        if endpoints.contains_key(&addr) {
            return Err(IpcuError::AlreadyOpen);
        }
        endpoints.insert(
            addr,
            Endpoint {
                queue: VecDeque::with_capacity(self.depth),
                dropped: 0,
                readers: Vec::new(),
            },
        );
        debug!("ipcu: {} opened", addr);
        Ok(IpcuChannel {
            device: self.clone(),
            addr,
        })
    }

    pub fn is_open(&self, addr: MailboxAddr) -> bool {
        self.endpoints.lock().contains_key(&addr)
    }

    fn close(&self, addr: MailboxAddr) {
        if let Some(endpoint) = self.endpoints.lock().remove(&addr) {
            if !endpoint.queue.is_empty() {
                debug!(
                    "ipcu: {} closed with {} unread message(s)",
                    addr,
                    endpoint.queue.len()
                );
            }
        }
    }
}

impl MessageSink for IpcuDevice {
    /// Queue a received message, dropping the oldest one if the queue is
    /// full.
    fn deliver(&self, addr: MailboxAddr, payload: Payload) {
        let mut endpoints = self.endpoints.lock();
        let Some(endpoint) = endpoints.get_mut(&addr) else {
            warn!("ipcu: {} not open, message dropped", addr);
            return;
        };

        if endpoint.queue.len() >= self.depth {
            endpoint.queue.pop_front();
            endpoint.dropped += 1;
            warn!(
                "ipcu: {} receive queue full, dropped oldest ({} total)",
                addr, endpoint.dropped
            );
        }
        endpoint.queue.push_back(payload);

        for waker in endpoint.readers.drain(..) {
            waker.wake();
        }
    }
}

/// Exclusive handle on one mailbox. Closing happens on drop.
pub struct IpcuChannel {
    device: Arc<IpcuDevice>,
    addr: MailboxAddr,
}

impl IpcuChannel {
    pub fn addr(&self) -> MailboxAddr {
        self.addr
    }

    /// Send a message and wait for the peer's acknowledgement.
    pub async fn send(&self, payload: &Payload, cancel: &CancelSignal) -> Result<(), IpcuError> {
        self.device.ipcu.send(self.addr, payload, cancel).await
    }

    /// Send with a caller-supplied deadline on the acknowledgement.
    pub async fn send_with_deadline<D>(
        &self,
        payload: &Payload,
        cancel: &CancelSignal,
        deadline: D,
    ) -> Result<(), IpcuError>
    where
        D: Future<Output = ()>,
    {
        self.device
            .ipcu
            .send_with_deadline(self.addr, payload, cancel, deadline)
            .await
    }

    /// Acknowledge the last message received on this mailbox.
    pub fn send_ack(&self) -> Result<(), IpcuError> {
        self.device.ipcu.send_ack(self.addr)
    }

    /// Send in the form the ioctl layer reports to user space: `0` on
    /// success, otherwise the negated errno.
    pub async fn send_status(&self, payload: &Payload, cancel: &CancelSignal) -> i32 {
        status(&self.send(payload, cancel).await)
    }

    pub fn send_ack_status(&self) -> i32 {
        status(&self.send_ack())
    }

    /// Take the oldest queued message, if any.
    pub fn try_recv(&self) -> Option<Payload> {
        self.device
            .endpoints
            .lock()
            .get_mut(&self.addr)
            .and_then(|endpoint| endpoint.queue.pop_front())
    }

    /// Wait for the next message.
    pub async fn recv(&self) -> Payload {
        poll_fn(|cx| {
            let mut endpoints = self.device.endpoints.lock();
            // The endpoint lives as long as `self`.
            let Some(endpoint) = endpoints.get_mut(&self.addr) else {
                return Poll::Pending;
            };
            match endpoint.queue.pop_front() {
                Some(payload) => Poll::Ready(payload),
                None => {
                    endpoint.park(cx.waker());
                    Poll::Pending
                }
            }
        })
        .await
    }

    /// Wait for the next message unless `cancel` is raised first.
    pub async fn recv_interruptible(&self, cancel: &CancelSignal) -> Result<Payload, IpcuError> {
        let result = poll_fn(|cx| {
            if cancel.is_pending() {
                return Poll::Ready(Err(IpcuError::Interrupted));
            }
            let mut endpoints = self.device.endpoints.lock();
            let Some(endpoint) = endpoints.get_mut(&self.addr) else {
                return Poll::Pending;
            };
            if let Some(payload) = endpoint.queue.pop_front() {
                return Poll::Ready(Ok(payload));
            }
            endpoint.park(cx.waker());
            drop(endpoints);
            cancel.set_waiting(cx.waker());
            if cancel.is_pending() {
                cx.waker().wake_by_ref();
            }
            Poll::Pending
        })
        .await;
        cancel.clear_waiting();
        result
    }

    /// Send up to one message worth of bytes, zero-padded, in native word
    /// byte order. Returns the number of bytes sent.
    pub async fn write(&self, bytes: &[u8], cancel: &CancelSignal) -> Result<usize, IpcuError> {
        if bytes.len() > PAYLOAD_BYTES {
            return Err(IpcuError::InvalidLength);
        }
        let mut payload: Payload = [0; PAYLOAD_WORDS];
        payload.as_mut_bytes()[..bytes.len()].copy_from_slice(bytes);
        self.send(&payload, cancel).await?;
        Ok(bytes.len())
    }

    /// Receive the next message into `buf`, truncating to its length.
    /// Returns the number of bytes copied.
    pub async fn read(&self, buf: &mut [u8]) -> usize {
        let payload = self.recv().await;
        let len = buf.len().min(PAYLOAD_BYTES);
        buf[..len].copy_from_slice(&payload.as_bytes()[..len]);
        len
    }

    /// Number of messages queued for reading.
    pub fn queued(&self) -> usize {
        self.device
            .endpoints
            .lock()
            .get(&self.addr)
            .map_or(0, |endpoint| endpoint.queue.len())
    }

    /// Number of messages lost to queue overflow since opening.
    pub fn dropped(&self) -> u64 {
        self.device
            .endpoints
            .lock()
            .get(&self.addr)
            .map_or(0, |endpoint| endpoint.dropped)
    }
}

impl Drop for IpcuChannel {
    fn drop(&mut self) {
        self.device.close(self.addr);
        debug!("ipcu: {} closed", self.addr);
    }
}

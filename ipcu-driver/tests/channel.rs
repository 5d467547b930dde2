//! Endpoint tests: open/close, the receive queue and byte-level I/O.

use std::pin::pin;
use std::sync::Arc;
use std::task::Poll;

use ipcu_abi::{PAYLOAD_BYTES, REG_ACK_STAT};
use ipcu_driver::testing::{CountingWaker, poll_once};
use ipcu_driver::{
    CancelSignal, Ipcu, IpcuConfig, IpcuDevice, IpcuError, MailboxAddr, MailboxConfig,
    MailboxState, MessageSink, RegisterIo, SimRegisters, UnitConfig,
};

const MB1: MailboxAddr = MailboxAddr::new(0, 1);
const MB2: MailboxAddr = MailboxAddr::new(0, 2);

fn setup(depth: usize) -> (Arc<IpcuDevice>, Arc<SimRegisters>) {
    let sim = Arc::new(SimRegisters::new());
    let mut cfg = IpcuConfig::new(vec![UnitConfig::new(
        0,
        vec![MailboxConfig::new(1, 0, 4), MailboxConfig::new(2, 0, 5)],
    )]);
    cfg.rx_queue_depth = depth;
    let ipcu = Ipcu::new(cfg, vec![sim.clone() as Arc<dyn RegisterIo>]).unwrap();
    (IpcuDevice::new(Arc::new(ipcu)), sim)
}

#[test]
fn open_initializes_and_is_exclusive() {
    let (device, _sim) = setup(4);
    assert_eq!(device.ipcu().state(MB1), Ok(MailboxState::Uninitialized));

    let channel = device.open(MB1).unwrap();
    assert_eq!(channel.addr(), MB1);
    assert!(device.is_open(MB1));
    assert_eq!(device.ipcu().state(MB1), Ok(MailboxState::Idle));
    assert_eq!(device.open(MB1).err(), Some(IpcuError::AlreadyOpen));

    // Another mailbox is unaffected.
    let _other = device.open(MB2).unwrap();

    drop(channel);
    assert!(!device.is_open(MB1));
    let _reopened = device.open(MB1).unwrap();
}

#[test]
fn open_unknown_mailbox_fails() {
    let (device, _sim) = setup(4);
    assert_eq!(
        device.open(MailboxAddr::new(0, 7)).err(),
        Some(IpcuError::InvalidMailbox)
    );
    assert_eq!(
        device.open(MailboxAddr::new(1, 1)).err(),
        Some(IpcuError::InvalidMailbox)
    );
}

/// A blocked reader is woken by delivery and gets the message.
#[test]
fn recv_waits_for_delivery() {
    let (device, _sim) = setup(4);
    let channel = device.open(MB1).unwrap();
    let waker = CountingWaker::new();

    let mut recv = pin!(channel.recv());
    assert!(poll_once(recv.as_mut(), &waker).is_pending());

    device.deliver(MB1, [7; 9]);
    assert_eq!(waker.count(), 1);
    assert_eq!(poll_once(recv.as_mut(), &waker), Poll::Ready([7; 9]));
}

#[test]
fn messages_are_read_in_arrival_order() {
    let (device, _sim) = setup(4);
    let channel = device.open(MB1).unwrap();
    for n in 1..=3 {
        device.deliver(MB1, [n; 9]);
    }
    assert_eq!(channel.queued(), 3);
    assert_eq!(channel.try_recv(), Some([1; 9]));
    assert_eq!(channel.try_recv(), Some([2; 9]));
    assert_eq!(channel.try_recv(), Some([3; 9]));
    assert_eq!(channel.try_recv(), None);
}

/// A full queue discards its oldest message and counts the loss.
#[test]
fn full_queue_drops_oldest() {
    let (device, _sim) = setup(2);
    let channel = device.open(MB1).unwrap();
    for n in 1..=5 {
        device.deliver(MB1, [n; 9]);
    }
    assert_eq!(channel.queued(), 2);
    assert_eq!(channel.dropped(), 3);
    assert_eq!(channel.try_recv(), Some([4; 9]));
    assert_eq!(channel.try_recv(), Some([5; 9]));
}

#[test]
fn delivery_to_closed_mailbox_is_discarded() {
    let (device, _sim) = setup(4);
    device.deliver(MB2, [1; 9]);
    let channel = device.open(MB2).unwrap();
    assert_eq!(channel.try_recv(), None);
}

#[test]
fn reopening_starts_with_empty_queue() {
    let (device, _sim) = setup(4);
    let channel = device.open(MB1).unwrap();
    device.deliver(MB1, [1; 9]);
    drop(channel);

    let channel = device.open(MB1).unwrap();
    assert_eq!(channel.queued(), 0);
    assert_eq!(channel.dropped(), 0);
}

#[test]
fn interruptible_recv_honours_cancel() {
    let (device, _sim) = setup(4);
    let channel = device.open(MB1).unwrap();
    let cancel = CancelSignal::new();
    let waker = CountingWaker::new();

    let mut recv = pin!(channel.recv_interruptible(&cancel));
    assert!(poll_once(recv.as_mut(), &waker).is_pending());
    cancel.raise();
    assert!(waker.count() >= 1);
    assert_eq!(
        poll_once(recv.as_mut(), &waker),
        Poll::Ready(Err(IpcuError::Interrupted))
    );
}

/// Bytes are packed into the payload words in native order and padded with
/// zeroes.
#[test]
fn write_packs_bytes_into_payload() {
    let (device, sim) = setup(4);
    let channel = device.open(MB1).unwrap();
    let cancel = CancelSignal::new();
    let waker = CountingWaker::new();

    let mut write = pin!(channel.write(&[1, 0, 0, 0, 2, 0, 0, 0, 3], &cancel));
    assert!(poll_once(write.as_mut(), &waker).is_pending());
    let sent = sim.payload(1);
    assert_eq!(sent[0], u32::from_ne_bytes([1, 0, 0, 0]));
    assert_eq!(sent[1], u32::from_ne_bytes([2, 0, 0, 0]));
    assert_eq!(sent[2], u32::from_ne_bytes([3, 0, 0, 0]));
    assert_eq!(sent[3..], [0; 6]);

    device.ipcu().handle_ack(0, MB1);
    assert_eq!(poll_once(write.as_mut(), &waker), Poll::Ready(Ok(9)));
}

#[test]
fn oversized_write_is_rejected() {
    let (device, sim) = setup(4);
    let channel = device.open(MB1).unwrap();
    let cancel = CancelSignal::new();
    let waker = CountingWaker::new();

    let bytes = [0u8; PAYLOAD_BYTES + 1];
    let mut write = pin!(channel.write(&bytes, &cancel));
    assert_eq!(
        poll_once(write.as_mut(), &waker),
        Poll::Ready(Err(IpcuError::InvalidLength))
    );
    assert!(sim.take_log().is_empty());
}

/// Reads copy at most the caller's buffer and at most one payload.
#[test]
fn read_truncates_to_buffer() {
    let (device, _sim) = setup(4);
    let channel = device.open(MB1).unwrap();
    let waker = CountingWaker::new();

    let mut payload = [0u32; 9];
    payload[0] = u32::from_ne_bytes([0xde, 0xad, 0xbe, 0xef]);
    payload[1] = u32::from_ne_bytes([1, 2, 3, 4]);
    device.deliver(MB1, payload);
    device.deliver(MB1, payload);

    let mut small = [0u8; 6];
    {
        let mut read = pin!(channel.read(&mut small));
        assert_eq!(poll_once(read.as_mut(), &waker), Poll::Ready(6));
    }
    assert_eq!(small, [0xde, 0xad, 0xbe, 0xef, 1, 2]);

    let mut large = [0xffu8; PAYLOAD_BYTES + 4];
    {
        let mut read = pin!(channel.read(&mut large));
        assert_eq!(poll_once(read.as_mut(), &waker), Poll::Ready(PAYLOAD_BYTES));
    }
    assert_eq!(large[PAYLOAD_BYTES..], [0xff; 4]);
}

#[test]
fn channel_ack_reaches_peer() {
    let (device, sim) = setup(4);
    let channel = device.open(MB2).unwrap();
    channel.send_ack().unwrap();
    assert_eq!(sim.mailbox_reg(2, REG_ACK_STAT), 1 << 5);
}

/// Status-code forms report `0` or the negated errno.
#[test]
fn status_codes_for_ioctl_callers() {
    let (device, sim) = setup(4);
    let channel = device.open(MB1).unwrap();
    let cancel = CancelSignal::new();
    let waker = CountingWaker::new();

    assert_eq!(channel.send_ack_status(), 0);

    sim.set_occupied(1);
    let mut busy = pin!(channel.send_status(&[1; 9], &cancel));
    assert_eq!(poll_once(busy.as_mut(), &waker), Poll::Ready(-ipcu_abi::EBUSY));

    sim.clear_occupied(1);
    let mut sent = pin!(channel.send_status(&[2; 9], &cancel));
    assert!(poll_once(sent.as_mut(), &waker).is_pending());
    device.ipcu().handle_ack(0, MB1);
    assert_eq!(poll_once(sent.as_mut(), &waker), Poll::Ready(0));
}

/// Two tasks reading one channel are both woken; each delivery reaches one
/// of them and the other keeps waiting.
#[test]
fn concurrent_readers_are_all_woken() {
    let (device, _sim) = setup(4);
    let channel = device.open(MB1).unwrap();
    let waker_a = CountingWaker::new();
    let waker_b = CountingWaker::new();

    let mut a = pin!(channel.recv());
    let mut b = pin!(channel.recv());
    assert!(poll_once(a.as_mut(), &waker_a).is_pending());
    assert!(poll_once(b.as_mut(), &waker_b).is_pending());
    // Re-polling the same task does not register it twice.
    assert!(poll_once(a.as_mut(), &waker_a).is_pending());

    device.deliver(MB1, [1; 9]);
    assert_eq!(waker_a.count(), 1);
    assert_eq!(waker_b.count(), 1);

    assert_eq!(poll_once(b.as_mut(), &waker_b), Poll::Ready([1; 9]));
    assert!(poll_once(a.as_mut(), &waker_a).is_pending());

    device.deliver(MB1, [2; 9]);
    assert_eq!(waker_a.count(), 2);
    assert_eq!(poll_once(a.as_mut(), &waker_a), Poll::Ready([2; 9]));
}

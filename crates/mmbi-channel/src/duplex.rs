use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::error::{ChannelError, Result};
use crate::ring::{RingChannel, RECORD_PREFIX_SIZE};
use crate::traits::{Channel, ChannelOpener};

/// One end of a [`DuplexChannel`].
///
/// By convention the host attaches as `A` and the management controller as `B`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    A,
    B,
}

impl Side {
    /// The opposite end.
    pub fn peer(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }

    fn index(self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => f.write_str("A"),
            Side::B => f.write_str("B"),
        }
    }
}

/// Simulated full-duplex device: two rings, one per direction.
///
/// `A` writes into the A→B ring and reads from B→A; `B` does the inverse. The
/// value is cheap to clone and every clone refers to the same pair of rings, so
/// a test harness and the endpoints it hands out share one device without any
/// process-wide state.
#[derive(Clone)]
pub struct DuplexChannel {
    shared: Arc<DuplexShared>,
}

struct DuplexShared {
    a_to_b: RingChannel,
    b_to_a: RingChannel,
    attached: [AtomicBool; 2],
    closed: [AtomicBool; 2],
}

impl DuplexShared {
    fn tx_ring(&self, side: Side) -> &RingChannel {
        match side {
            Side::A => &self.a_to_b,
            Side::B => &self.b_to_a,
        }
    }

    fn rx_ring(&self, side: Side) -> &RingChannel {
        self.tx_ring(side.peer())
    }

    fn is_closed(&self, side: Side) -> bool {
        self.closed[side.index()].load(Ordering::SeqCst)
    }
}

impl DuplexChannel {
    /// Create a duplex device whose rings each hold `capacity` bytes.
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            shared: Arc::new(DuplexShared {
                a_to_b: RingChannel::new(capacity)?,
                b_to_a: RingChannel::new(capacity)?,
                attached: [AtomicBool::new(false), AtomicBool::new(false)],
                closed: [AtomicBool::new(false), AtomicBool::new(false)],
            }),
        })
    }

    /// Per-direction ring capacity.
    pub fn capacity(&self) -> usize {
        self.shared.a_to_b.capacity()
    }

    /// Raw byte write issued by `side`; lands in the ring toward its peer.
    pub fn write(&self, side: Side, data: &[u8]) -> usize {
        self.shared.tx_ring(side).write(data)
    }

    /// Raw byte read issued by `side`; drains the ring coming from its peer.
    pub fn read(&self, side: Side, buf: &mut [u8]) -> usize {
        self.shared.rx_ring(side).read(buf)
    }

    /// The ring carrying traffic sent by `from`.
    pub fn ring(&self, from: Side) -> &RingChannel {
        self.shared.tx_ring(from)
    }

    /// Attach a frame endpoint for `side`.
    ///
    /// Only one endpoint per side may exist at a time; a second attach fails
    /// with [`ChannelError::EndpointBusy`] until the first is dropped.
    pub fn endpoint(&self, side: Side) -> Result<DuplexEndpoint> {
        let slot = &self.shared.attached[side.index()];
        if slot
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ChannelError::EndpointBusy(format!("duplex:{side}")));
        }
        self.shared.closed[side.index()].store(false, Ordering::SeqCst);
        debug!(%side, "duplex endpoint attached");

        Ok(DuplexEndpoint {
            shared: Arc::clone(&self.shared),
            side,
            closed: AtomicBool::new(false),
        })
    }

    /// An opener that attaches `side` on each `open()`.
    pub fn opener(&self, side: Side) -> DuplexOpener {
        DuplexOpener {
            channel: self.clone(),
            side,
        }
    }
}

impl fmt::Debug for DuplexChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplexChannel")
            .field("a_to_b", &self.shared.a_to_b)
            .field("b_to_a", &self.shared.b_to_a)
            .finish()
    }
}

/// Frame handle onto one side of a [`DuplexChannel`].
///
/// Frames are stored as length-prefixed records so a read never returns more
/// than one frame. Dropping the endpoint closes it; the peer then sees
/// [`ChannelError::Closed`] on writes, and on reads once it has drained what
/// was already queued.
pub struct DuplexEndpoint {
    shared: Arc<DuplexShared>,
    side: Side,
    closed: AtomicBool,
}

impl DuplexEndpoint {
    /// Which side this endpoint is attached to.
    pub fn side(&self) -> Side {
        self.side
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        Ok(())
    }
}

impl Channel for DuplexEndpoint {
    fn write(&self, frame: &[u8]) -> Result<usize> {
        self.check_open()?;
        if self.shared.is_closed(self.side.peer()) {
            return Err(ChannelError::Closed);
        }

        let ring = self.shared.tx_ring(self.side);
        if RECORD_PREFIX_SIZE + frame.len() > ring.capacity() {
            return Err(ChannelError::InvalidArgument(format!(
                "frame of {} bytes can never fit a {} byte ring",
                frame.len(),
                ring.capacity()
            )));
        }
        Ok(ring.write_record(frame))
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.check_open()?;
        match self.shared.rx_ring(self.side).read_record(buf) {
            Some(len) => Ok(len.min(buf.len())),
            None if self.shared.is_closed(self.side.peer()) => Err(ChannelError::Closed),
            None => Ok(0),
        }
    }

    fn bytes_available(&self) -> Result<usize> {
        self.check_open()?;
        let pending = self.shared.rx_ring(self.side).next_record_len();
        if pending == 0 && self.shared.is_closed(self.side.peer()) {
            return Err(ChannelError::Closed);
        }
        Ok(pending)
    }

    fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.shared.closed[self.side.index()].store(true, Ordering::SeqCst);
            debug!(side = %self.side, "duplex endpoint closed");
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "duplex-ring"
    }
}

impl Drop for DuplexEndpoint {
    fn drop(&mut self) {
        let _ = self.close();
        self.shared.attached[self.side.index()].store(false, Ordering::SeqCst);
    }
}

impl fmt::Debug for DuplexEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplexEndpoint")
            .field("side", &self.side)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// [`ChannelOpener`] for one side of a [`DuplexChannel`].
#[derive(Debug, Clone)]
pub struct DuplexOpener {
    channel: DuplexChannel,
    side: Side,
}

impl ChannelOpener for DuplexOpener {
    fn open(&self) -> Result<Box<dyn Channel>> {
        Ok(Box::new(self.channel.endpoint(self.side)?))
    }

    fn address(&self) -> String {
        format!("duplex:{}", self.side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_dispatch_routes_by_side() {
        let duplex = DuplexChannel::new(32).unwrap();
        assert_eq!(duplex.write(Side::A, b"to-b"), 4);
        assert_eq!(duplex.write(Side::B, b"to-a!"), 5);

        let mut buf = [0u8; 16];
        assert_eq!(duplex.read(Side::B, &mut buf), 4);
        assert_eq!(&buf[..4], b"to-b");
        assert_eq!(duplex.read(Side::A, &mut buf), 5);
        assert_eq!(&buf[..5], b"to-a!");

        assert_eq!(duplex.read(Side::A, &mut buf), 0);
        assert_eq!(duplex.read(Side::B, &mut buf), 0);
    }

    #[test]
    fn directions_are_independent() {
        let duplex = DuplexChannel::new(8).unwrap();
        assert_eq!(duplex.write(Side::A, b"12345678"), 8);
        assert_eq!(duplex.write(Side::A, b"9"), 0);
        assert_eq!(duplex.write(Side::B, b"abc"), 3);
        assert_eq!(duplex.ring(Side::A).len(), 8);
        assert_eq!(duplex.ring(Side::B).len(), 3);
    }

    #[test]
    fn endpoints_exchange_whole_frames() {
        let duplex = DuplexChannel::new(128).unwrap();
        let host = duplex.endpoint(Side::A).unwrap();
        let bmc = duplex.endpoint(Side::B).unwrap();

        assert_eq!(host.write(b"frame-one").unwrap(), 9);
        assert_eq!(host.write(b"frame-two").unwrap(), 9);
        assert_eq!(bmc.bytes_available().unwrap(), 9);

        let mut buf = [0u8; 64];
        assert_eq!(bmc.read(&mut buf).unwrap(), 9);
        assert_eq!(&buf[..9], b"frame-one");
        assert_eq!(bmc.read(&mut buf).unwrap(), 9);
        assert_eq!(&buf[..9], b"frame-two");
        assert_eq!(bmc.read(&mut buf).unwrap(), 0);
        assert_eq!(host.bytes_available().unwrap(), 0);
    }

    #[test]
    fn full_ring_reports_zero_written() {
        let duplex = DuplexChannel::new(16).unwrap();
        let host = duplex.endpoint(Side::A).unwrap();
        let _bmc = duplex.endpoint(Side::B).unwrap();

        assert_eq!(host.write(&[1u8; 10]).unwrap(), 10);
        assert_eq!(host.write(&[2u8; 4]).unwrap(), 0);
        assert_eq!(duplex.ring(Side::A).len(), 14);
    }

    #[test]
    fn frame_larger_than_ring_is_rejected() {
        let duplex = DuplexChannel::new(16).unwrap();
        let host = duplex.endpoint(Side::A).unwrap();
        let err = host.write(&[0u8; 13]).unwrap_err();
        assert!(matches!(err, ChannelError::InvalidArgument(_)));
        assert!(duplex.ring(Side::A).is_empty());
    }

    #[test]
    fn second_attach_is_busy_until_drop() {
        let duplex = DuplexChannel::new(16).unwrap();
        let first = duplex.endpoint(Side::A).unwrap();
        let err = duplex.endpoint(Side::A).unwrap_err();
        assert!(matches!(err, ChannelError::EndpointBusy(_)));
        assert!(err.is_transient());

        drop(first);
        assert!(duplex.endpoint(Side::A).is_ok());
    }

    #[test]
    fn peer_drop_is_seen_as_closed_after_drain() {
        let duplex = DuplexChannel::new(64).unwrap();
        let host = duplex.endpoint(Side::A).unwrap();
        let bmc = duplex.endpoint(Side::B).unwrap();

        bmc.write(b"last words").unwrap();
        drop(bmc);

        let mut buf = [0u8; 32];
        assert_eq!(host.read(&mut buf).unwrap(), 10);
        assert!(matches!(host.read(&mut buf), Err(ChannelError::Closed)));
        assert!(matches!(host.bytes_available(), Err(ChannelError::Closed)));
        assert!(matches!(host.write(b"x"), Err(ChannelError::Closed)));
    }

    #[test]
    fn closed_endpoint_fails_fast() {
        let duplex = DuplexChannel::new(64).unwrap();
        let host = duplex.endpoint(Side::A).unwrap();
        host.close().unwrap();
        assert!(matches!(host.write(b"x"), Err(ChannelError::Closed)));
        assert!(matches!(host.read(&mut [0u8; 4]), Err(ChannelError::Closed)));
    }

    #[test]
    fn opener_attaches_requested_side() {
        let duplex = DuplexChannel::new(64).unwrap();
        let opener = duplex.opener(Side::B);
        assert_eq!(opener.address(), "duplex:B");

        let channel = opener.open().unwrap();
        assert_eq!(channel.kind(), "duplex-ring");
        let host = duplex.endpoint(Side::A).unwrap();
        host.write(b"hi").unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(channel.read(&mut buf).unwrap(), 2);
    }

    #[test]
    fn instances_are_isolated() {
        let first = DuplexChannel::new(32).unwrap();
        let second = DuplexChannel::new(32).unwrap();
        first.write(Side::A, b"one");
        assert!(second.ring(Side::A).is_empty());
        assert_eq!(first.ring(Side::A).len(), 3);
    }
}

//! Frame channels for the MMBI device link.
//!
//! Provides the byte-moving layer under the MCTP binding:
//! - [`RingChannel`], a fixed-capacity circular buffer for one direction
//! - [`DuplexChannel`], two rings forming a simulated host/BMC device
//! - Unix datagram sockets as a real inter-process device (Linux/macOS)
//!
//! Everything above this crate talks to a device through the [`Channel`]
//! and [`ChannelOpener`] traits.

pub mod duplex;
pub mod error;
pub mod ring;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use duplex::{DuplexChannel, DuplexEndpoint, DuplexOpener, Side};
pub use error::{ChannelError, Result};
pub use ring::{RingChannel, RingSnapshot, DEFAULT_RING_CAPACITY, RECORD_PREFIX_SIZE};
pub use traits::{Channel, ChannelOpener};

#[cfg(unix)]
pub use uds::{UnixDatagramChannel, UnixDatagramOpener};

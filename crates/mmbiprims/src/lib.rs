//! MCTP over MMBI.
//!
//! mmbiprims moves MCTP messages between a host and a management controller
//! over MMBI ring buffers. For development and tests the shared-memory device
//! is simulated by an in-process [`channel::DuplexChannel`] or a pair of Unix
//! datagram sockets.
//!
//! # Crate Structure
//!
//! - [`channel`]: byte rings, the duplex device and the `Channel` seam
//! - [`frame`]: MCTP packet header codec, packetizer and reassembler
//! - [`binding`]: binding adapter, protocol stack and `TransportContext`

/// Re-export channel types.
pub mod channel {
    pub use mmbi_channel::*;
}

/// Re-export frame types.
pub mod frame {
    pub use mmbi_frame::*;
}

/// Re-export binding types.
pub mod binding {
    pub use mmbi_binding::*;
}

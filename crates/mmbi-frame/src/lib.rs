//! MCTP packet framing for the MMBI binding.
//!
//! Every packet on the wire is one frame:
//! - A 4-byte header: version, destination EID, source EID, flags/seq/tag
//! - Up to 64 KiB of payload
//!
//! [`Packetizer`] splits an outbound message into frames that fit a binding's
//! frame limit; [`Reassembler`] rebuilds inbound messages packet by packet.

pub mod codec;
pub mod error;
pub mod packetizer;
pub mod reassembly;

pub use codec::{
    decode_packet, encode_packet, Packet, PacketHeader, BASELINE_MTU, DEFAULT_MAX_FRAME,
    EID_BROADCAST, EID_NULL, FLAG_EOM, FLAG_SOM, FLAG_TO, HEADER_SIZE, MAX_PACKET_PAYLOAD,
    MCTP_VERSION, MIN_FRAME, SEQ_MASK, SEQ_SHIFT, TAG_MASK,
};
pub use error::{FrameError, Result};
pub use packetizer::{MessageRoute, Packetizer};
pub use reassembly::{Message, Reassembler, DEFAULT_MAX_MESSAGE_SIZE, MAX_REASSEMBLY_CONTEXTS};

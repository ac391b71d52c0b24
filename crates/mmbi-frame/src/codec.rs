use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Packet header: version (1) + destination (1) + source (1) + flags/seq/tag (1).
pub const HEADER_SIZE: usize = 4;

/// Header version emitted and accepted (low nibble of byte 0).
pub const MCTP_VERSION: u8 = 0x01;

/// Largest payload a single packet may carry.
pub const MAX_PACKET_PAYLOAD: usize = 64 * 1024;

/// Smallest payload every binding must carry per packet.
pub const BASELINE_MTU: usize = 64;

/// Default maximum frame size: header plus the largest packet payload.
pub const DEFAULT_MAX_FRAME: usize = HEADER_SIZE + MAX_PACKET_PAYLOAD;

/// Smallest frame size a binding may advertise.
pub const MIN_FRAME: usize = HEADER_SIZE + BASELINE_MTU;

/// The null endpoint id; accepted as a destination by every endpoint.
pub const EID_NULL: u8 = 0x00;

/// The broadcast endpoint id.
pub const EID_BROADCAST: u8 = 0xFF;

pub const FLAG_SOM: u8 = 0x80;
pub const FLAG_EOM: u8 = 0x40;
pub const FLAG_TO: u8 = 0x08;
pub const SEQ_SHIFT: u8 = 4;
pub const SEQ_MASK: u8 = 0x03;
pub const TAG_MASK: u8 = 0x07;

const VERSION_MASK: u8 = 0x0F;

/// Decoded packet header.
///
/// Wire format:
/// ```text
/// ┌──────────┬──────────┬──────────┬─────┬─────┬────────┬────┬─────────┐
/// │ Version  │ Dest EID │ Src EID  │ SOM │ EOM │ Seq(2) │ TO │ Tag(3)  │
/// │ (1B)     │ (1B)     │ (1B)     │ b7  │ b6  │ b5..4  │ b3 │ b2..0   │
/// └──────────┴──────────┴──────────┴─────┴─────┴────────┴────┴─────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub dest: u8,
    pub src: u8,
    pub som: bool,
    pub eom: bool,
    pub seq: u8,
    pub tag_owner: bool,
    pub tag: u8,
}

impl PacketHeader {
    /// A header for a single-packet message (SOM and EOM set, seq 0).
    pub fn single(dest: u8, src: u8, tag_owner: bool, tag: u8) -> Self {
        Self {
            dest,
            src,
            som: true,
            eom: true,
            seq: 0,
            tag_owner,
            tag,
        }
    }

    /// Pack the header into its four wire bytes.
    pub fn to_bytes(&self) -> Result<[u8; HEADER_SIZE]> {
        if self.seq > SEQ_MASK {
            return Err(FrameError::FieldOutOfRange {
                field: "seq",
                value: self.seq,
                max: SEQ_MASK,
            });
        }
        if self.tag > TAG_MASK {
            return Err(FrameError::FieldOutOfRange {
                field: "tag",
                value: self.tag,
                max: TAG_MASK,
            });
        }

        let mut flags = (self.seq << SEQ_SHIFT) | self.tag;
        if self.som {
            flags |= FLAG_SOM;
        }
        if self.eom {
            flags |= FLAG_EOM;
        }
        if self.tag_owner {
            flags |= FLAG_TO;
        }
        Ok([MCTP_VERSION, self.dest, self.src, flags])
    }

    /// Unpack a header from the start of `frame`.
    pub fn parse(frame: &[u8]) -> Result<Self> {
        if frame.len() < HEADER_SIZE {
            return Err(FrameError::Truncated {
                len: frame.len(),
                min: HEADER_SIZE,
            });
        }

        let version = frame[0] & VERSION_MASK;
        if version != MCTP_VERSION {
            return Err(FrameError::UnsupportedVersion(version));
        }

        let flags = frame[3];
        Ok(Self {
            dest: frame[1],
            src: frame[2],
            som: flags & FLAG_SOM != 0,
            eom: flags & FLAG_EOM != 0,
            seq: (flags >> SEQ_SHIFT) & SEQ_MASK,
            tag_owner: flags & FLAG_TO != 0,
            tag: flags & TAG_MASK,
        })
    }
}

/// One packet: header plus the payload slice it carries.
#[derive(Debug, Clone)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Bytes,
}

impl Packet {
    /// The total wire size of this packet (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a packet into `dst`.
pub fn encode_packet(header: &PacketHeader, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PACKET_PAYLOAD {
        return Err(FrameError::MessageTooLarge {
            size: payload.len(),
            max: MAX_PACKET_PAYLOAD,
        });
    }
    let header = header.to_bytes()?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&header);
    dst.put_slice(payload);
    Ok(())
}

/// Decode one received frame.
///
/// The frame is a whole packet; everything after the header is payload.
pub fn decode_packet(frame: &[u8]) -> Result<Packet> {
    let header = PacketHeader::parse(frame)?;
    Ok(Packet {
        header,
        payload: Bytes::copy_from_slice(&frame[HEADER_SIZE..]),
    })
}

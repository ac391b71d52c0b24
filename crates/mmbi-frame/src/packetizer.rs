use bytes::{Bytes, BytesMut};

use crate::codec::{
    encode_packet, PacketHeader, HEADER_SIZE, MAX_PACKET_PAYLOAD, SEQ_MASK, TAG_MASK,
};
use crate::error::{FrameError, Result};

/// Addressing and tagging shared by every packet of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRoute {
    pub src: u8,
    pub dest: u8,
    pub tag_owner: bool,
    pub tag: u8,
}

/// Splits one message into encoded packets no larger than a frame limit.
///
/// The first packet carries SOM, the last EOM, and the sequence number starts
/// at 0 and wraps modulo 4. An empty message yields a single header-only
/// packet.
#[derive(Debug)]
pub struct Packetizer<'a> {
    route: MessageRoute,
    payload: &'a [u8],
    chunk: usize,
    offset: usize,
    seq: u8,
    done: bool,
}

impl<'a> Packetizer<'a> {
    /// Prepare to split `payload` into frames of at most `max_frame` bytes.
    pub fn new(route: MessageRoute, payload: &'a [u8], max_frame: usize) -> Result<Self> {
        if max_frame <= HEADER_SIZE {
            return Err(FrameError::FrameTooSmall {
                size: max_frame,
                min: HEADER_SIZE + 1,
            });
        }
        if route.tag > TAG_MASK {
            return Err(FrameError::FieldOutOfRange {
                field: "tag",
                value: route.tag,
                max: TAG_MASK,
            });
        }

        Ok(Self {
            route,
            payload,
            chunk: (max_frame - HEADER_SIZE).min(MAX_PACKET_PAYLOAD),
            offset: 0,
            seq: 0,
            done: false,
        })
    }

    /// Number of packets this message splits into.
    pub fn packet_count(&self) -> usize {
        self.payload.len().div_ceil(self.chunk).max(1)
    }

    fn next_packet(&mut self) -> Result<Bytes> {
        let start = self.offset;
        let end = (start + self.chunk).min(self.payload.len());
        let header = PacketHeader {
            dest: self.route.dest,
            src: self.route.src,
            som: start == 0,
            eom: end == self.payload.len(),
            seq: self.seq,
            tag_owner: self.route.tag_owner,
            tag: self.route.tag,
        };

        let mut frame = BytesMut::with_capacity(HEADER_SIZE + end - start);
        encode_packet(&header, &self.payload[start..end], &mut frame)?;

        self.offset = end;
        self.seq = (self.seq + 1) & SEQ_MASK;
        self.done = header.eom;
        Ok(frame.freeze())
    }
}

impl Iterator for Packetizer<'_> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let packet = self.next_packet();
        if packet.is_err() {
            self.done = true;
        }
        Some(packet)
    }
}

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::codec::{Packet, SEQ_MASK};
use crate::error::{FrameError, Result};

/// Default limit on a reassembled message: 64 KiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Messages that may be in flight at once.
pub const MAX_REASSEMBLY_CONTEXTS: usize = 16;

/// A complete, reassembled message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub src: u8,
    pub dest: u8,
    pub tag_owner: bool,
    pub tag: u8,
    pub payload: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ContextKey {
    src: u8,
    tag: u8,
    tag_owner: bool,
}

#[derive(Debug)]
struct Partial {
    dest: u8,
    next_seq: u8,
    buf: BytesMut,
}

/// Rebuilds messages from packets, one context per `(source, tag, tag owner)`.
///
/// A start-of-message packet opens a context (replacing any stale one with the
/// same key). Each following packet must carry the next sequence number; the
/// end-of-message packet completes it. Any violation drops the context and is
/// reported as an error so the caller can log and move on.
#[derive(Debug)]
pub struct Reassembler {
    max_message_size: usize,
    contexts: HashMap<ContextKey, Partial>,
}

impl Reassembler {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            contexts: HashMap::new(),
        }
    }

    /// Feed one packet. Returns the message once its last packet arrives.
    pub fn accept(&mut self, packet: Packet) -> Result<Option<Message>> {
        let header = packet.header;
        let key = ContextKey {
            src: header.src,
            tag: header.tag,
            tag_owner: header.tag_owner,
        };

        if header.som {
            if self.contexts.remove(&key).is_some() {
                debug!(src = key.src, tag = key.tag, "discarding stale partial message");
            }
            self.check_size(packet.payload.len())?;

            if header.eom {
                return Ok(Some(Message {
                    src: header.src,
                    dest: header.dest,
                    tag_owner: header.tag_owner,
                    tag: header.tag,
                    payload: packet.payload,
                }));
            }

            if self.contexts.len() >= MAX_REASSEMBLY_CONTEXTS {
                return Err(FrameError::ContextsExhausted {
                    max: MAX_REASSEMBLY_CONTEXTS,
                });
            }

            let mut buf = BytesMut::with_capacity(packet.payload.len() * 2);
            buf.extend_from_slice(&packet.payload);
            self.contexts.insert(
                key,
                Partial {
                    dest: header.dest,
                    next_seq: (header.seq + 1) & SEQ_MASK,
                    buf,
                },
            );
            return Ok(None);
        }

        let Some(mut partial) = self.contexts.remove(&key) else {
            return Err(FrameError::Orphan {
                src: key.src,
                tag: key.tag,
            });
        };

        if header.seq != partial.next_seq {
            return Err(FrameError::OutOfSequence {
                src: key.src,
                tag: key.tag,
                expected: partial.next_seq,
                got: header.seq,
            });
        }
        self.check_size(partial.buf.len() + packet.payload.len())?;
        partial.buf.extend_from_slice(&packet.payload);

        if header.eom {
            return Ok(Some(Message {
                src: key.src,
                dest: partial.dest,
                tag_owner: key.tag_owner,
                tag: key.tag,
                payload: partial.buf.freeze(),
            }));
        }

        partial.next_seq = (header.seq + 1) & SEQ_MASK;
        self.contexts.insert(key, partial);
        Ok(None)
    }

    /// Messages currently partially received.
    pub fn pending(&self) -> usize {
        self.contexts.len()
    }

    /// Drop every partial message.
    pub fn clear(&mut self) {
        self.contexts.clear();
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    fn check_size(&self, size: usize) -> Result<()> {
        if size > self.max_message_size {
            return Err(FrameError::MessageTooLarge {
                size,
                max: self.max_message_size,
            });
        }
        Ok(())
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_packet, PacketHeader};
    use crate::packetizer::{MessageRoute, Packetizer};

    fn packet(src: u8, som: bool, eom: bool, seq: u8, payload: &[u8]) -> Packet {
        Packet {
            header: PacketHeader {
                dest: 8,
                src,
                som,
                eom,
                seq,
                tag_owner: false,
                tag: 0,
            },
            payload: Bytes::copy_from_slice(payload),
        }
    }

    #[test]
    fn single_packet_message_completes_immediately() {
        let mut reassembler = Reassembler::default();
        let message = reassembler
            .accept(packet(10, true, true, 0, &[1, 2, 3, 4]))
            .unwrap()
            .unwrap();
        assert_eq!(message.src, 10);
        assert_eq!(message.dest, 8);
        assert_eq!(message.payload.as_ref(), &[1, 2, 3, 4]);
        assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn packetized_message_reassembles() {
        let payload: Vec<u8> = (0..1000u32).map(|i| (i % 256) as u8).collect();
        let route = MessageRoute {
            src: 8,
            dest: 9,
            tag_owner: true,
            tag: 1,
        };
        let mut reassembler = Reassembler::default();
        let mut out = None;
        for frame in Packetizer::new(route, &payload, 100).unwrap() {
            let frame = frame.unwrap();
            assert!(out.is_none());
            out = reassembler.accept(decode_packet(&frame).unwrap()).unwrap();
        }

        let message = out.unwrap();
        assert_eq!(message.payload.as_ref(), payload.as_slice());
        assert!(message.tag_owner);
        assert_eq!(message.tag, 1);
    }

    #[test]
    fn out_of_sequence_drops_context() {
        let mut reassembler = Reassembler::default();
        assert!(reassembler.accept(packet(10, true, false, 0, b"ab")).unwrap().is_none());
        let err = reassembler.accept(packet(10, false, false, 2, b"cd")).unwrap_err();
        assert!(matches!(err, FrameError::OutOfSequence { expected: 1, got: 2, .. }));
        assert_eq!(reassembler.pending(), 0);

        let err = reassembler.accept(packet(10, false, true, 3, b"ef")).unwrap_err();
        assert!(matches!(err, FrameError::Orphan { src: 10, .. }));
    }

    #[test]
    fn orphan_end_packet_is_rejected() {
        let mut reassembler = Reassembler::default();
        let err = reassembler.accept(packet(3, false, true, 1, b"x")).unwrap_err();
        assert!(matches!(err, FrameError::Orphan { src: 3, tag: 0 }));
    }

    #[test]
    fn new_start_replaces_stale_context() {
        let mut reassembler = Reassembler::default();
        reassembler.accept(packet(10, true, false, 0, b"old")).unwrap();
        reassembler.accept(packet(10, true, false, 0, b"new")).unwrap();
        let message = reassembler
            .accept(packet(10, false, true, 1, b"-tail"))
            .unwrap()
            .unwrap();
        assert_eq!(message.payload.as_ref(), b"new-tail");
    }

    #[test]
    fn sources_reassemble_independently() {
        let mut reassembler = Reassembler::default();
        reassembler.accept(packet(1, true, false, 0, b"one-")).unwrap();
        reassembler.accept(packet(2, true, false, 0, b"two-")).unwrap();
        assert_eq!(reassembler.pending(), 2);

        let two = reassembler.accept(packet(2, false, true, 1, b"end")).unwrap().unwrap();
        let one = reassembler.accept(packet(1, false, true, 1, b"end")).unwrap().unwrap();
        assert_eq!(two.payload.as_ref(), b"two-end");
        assert_eq!(one.payload.as_ref(), b"one-end");
    }

    #[test]
    fn sequence_wraps_modulo_four() {
        let mut reassembler = Reassembler::default();
        reassembler.accept(packet(5, true, false, 2, b"a")).unwrap();
        reassembler.accept(packet(5, false, false, 3, b"b")).unwrap();
        let message = reassembler.accept(packet(5, false, true, 0, b"c")).unwrap().unwrap();
        assert_eq!(message.payload.as_ref(), b"abc");
    }

    #[test]
    fn oversize_message_is_dropped() {
        let mut reassembler = Reassembler::new(4);
        reassembler.accept(packet(1, true, false, 0, b"abc")).unwrap();
        let err = reassembler.accept(packet(1, false, true, 1, b"de")).unwrap_err();
        assert!(matches!(err, FrameError::MessageTooLarge { size: 5, max: 4 }));
        assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn context_table_is_bounded() {
        let mut reassembler = Reassembler::default();
        for src in 0..MAX_REASSEMBLY_CONTEXTS as u8 {
            reassembler.accept(packet(src, true, false, 0, b"x")).unwrap();
        }
        let err = reassembler.accept(packet(200, true, false, 0, b"x")).unwrap_err();
        assert!(matches!(err, FrameError::ContextsExhausted { .. }));

        reassembler.clear();
        assert_eq!(reassembler.pending(), 0);
    }
}

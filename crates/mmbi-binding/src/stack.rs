use std::sync::Arc;

use mmbi_frame::{
    decode_packet, FrameError, Message, MessageRoute, Packetizer, Reassembler,
    DEFAULT_MAX_MESSAGE_SIZE, EID_BROADCAST, EID_NULL,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{BindingError, Result};

/// Callback invoked for every reassembled message.
pub type ReceiveHandler = Arc<dyn Fn(&Message) + Send + Sync>;

/// Where a protocol stack sends its packets.
pub trait PacketSink: Send + Sync {
    /// Transmit one encoded packet as a single frame.
    fn transmit(&self, frame: &[u8]) -> Result<()>;

    /// Largest frame the sink accepts.
    fn max_frame_size(&self) -> usize;
}

/// The message layer above a binding.
///
/// Implementations are internally synchronized; every method takes `&self` so
/// transmit and receive can run on different threads.
pub trait ProtocolStack: Send + Sync {
    /// Attach `binding` as the bus for endpoint `local_id`.
    fn register_channel(&self, binding: Arc<dyn PacketSink>, local_id: u8) -> Result<()>;

    /// Detach the binding. No further packets are transmitted through it.
    fn unregister_channel(&self);

    /// Hand one received frame to the stack.
    fn deliver_frame(&self, frame: &[u8]);

    /// Packetize `payload` and transmit it to `dest`.
    fn transmit_message(&self, dest: u8, tag_owner: bool, tag: u8, payload: &[u8]) -> Result<()>;

    /// Replace the catch-all receive handler.
    fn set_receive_handler(&self, handler: ReceiveHandler);
}

/// Message-size limits for [`MctpStack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageConfig {
    pub max_message_size: usize,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

#[derive(Clone)]
struct Registration {
    binding: Arc<dyn PacketSink>,
    local_id: u8,
}

/// MCTP-style stack: packetization, EID routing and reassembly.
///
/// The receive handler is never called with one of the stack's locks held.
/// The binding is called only under `tx_lock`, which keeps the packets of one
/// message contiguous on the wire and is never taken on the receive path.
pub struct MctpStack {
    config: MessageConfig,
    registration: RwLock<Option<Registration>>,
    reassembler: Mutex<Reassembler>,
    handler: RwLock<Option<ReceiveHandler>>,
    tx_lock: Mutex<()>,
}

impl MctpStack {
    pub fn new(config: MessageConfig) -> Self {
        Self {
            config,
            registration: RwLock::new(None),
            reassembler: Mutex::new(Reassembler::new(config.max_message_size)),
            handler: RwLock::new(None),
            tx_lock: Mutex::new(()),
        }
    }

    /// The endpoint id registered with the binding, if any.
    pub fn local_id(&self) -> Option<u8> {
        self.registration.read().as_ref().map(|r| r.local_id)
    }

    /// Messages currently partially received.
    pub fn pending_messages(&self) -> usize {
        self.reassembler.lock().pending()
    }

    fn accepts(local_id: u8, dest: u8) -> bool {
        dest == local_id || dest == EID_NULL || dest == EID_BROADCAST
    }
}

impl Default for MctpStack {
    fn default() -> Self {
        Self::new(MessageConfig::default())
    }
}

impl ProtocolStack for MctpStack {
    fn register_channel(&self, binding: Arc<dyn PacketSink>, local_id: u8) -> Result<()> {
        let mut registration = self.registration.write();
        if registration.is_some() {
            return Err(BindingError::InvalidArgument(
                "a binding is already registered".to_string(),
            ));
        }
        debug!(local_id, "binding registered");
        *registration = Some(Registration { binding, local_id });
        Ok(())
    }

    fn unregister_channel(&self) {
        if self.registration.write().take().is_some() {
            debug!("binding unregistered");
        }
        self.reassembler.lock().clear();
    }

    fn deliver_frame(&self, frame: &[u8]) {
        let Some(local_id) = self.local_id() else {
            debug!(len = frame.len(), "dropping frame: no binding registered");
            return;
        };

        let packet = match decode_packet(frame) {
            Ok(packet) => packet,
            Err(err) => {
                warn!(error = %err, "dropping malformed packet");
                return;
            }
        };

        let (dest, src) = (packet.header.dest, packet.header.src);
        if !Self::accepts(local_id, dest) {
            debug!(dest, local_id, "dropping packet for another endpoint");
            return;
        }

        let accepted = self.reassembler.lock().accept(packet);
        let message = match accepted {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(err) => {
                warn!(src, error = %err, "dropping packet");
                return;
            }
        };

        let handler = self.handler.read().clone();
        match handler {
            Some(handler) => handler(&message),
            None => debug!(src = message.src, len = message.payload.len(), "no receive handler"),
        }
    }

    fn transmit_message(&self, dest: u8, tag_owner: bool, tag: u8, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_message_size {
            return Err(FrameError::MessageTooLarge {
                size: payload.len(),
                max: self.config.max_message_size,
            }
            .into());
        }

        let Registration { binding, local_id } = self
            .registration
            .read()
            .clone()
            .ok_or(BindingError::NotRegistered)?;

        let route = MessageRoute {
            src: local_id,
            dest,
            tag_owner,
            tag,
        };
        let packetizer = Packetizer::new(route, payload, binding.max_frame_size())?;
        debug!(
            dest,
            len = payload.len(),
            packets = packetizer.packet_count(),
            "transmitting message"
        );

        let _tx = self.tx_lock.lock();
        for packet in packetizer {
            binding.transmit(&packet?)?;
        }
        Ok(())
    }

    fn set_receive_handler(&self, handler: ReceiveHandler) {
        *self.handler.write() = Some(handler);
    }
}

impl std::fmt::Debug for MctpStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MctpStack")
            .field("local_id", &self.local_id())
            .field("max_message_size", &self.config.max_message_size)
            .finish()
    }
}

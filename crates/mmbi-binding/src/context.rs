use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mmbi_channel::ChannelOpener;
use mmbi_frame::{Message, EID_BROADCAST, EID_NULL, TAG_MASK};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::adapter::{AdapterConfig, AdapterStats, BindingAdapter, LinkStatus, PollStatus};
use crate::error::{BindingError, Result};
use crate::stack::{MctpStack, MessageConfig, ProtocolStack};

/// Callback for received messages: `(source_id, payload)`.
pub type RxCallback = Arc<dyn Fn(u8, &[u8]) + Send + Sync>;

/// Tag-owner bit and message tag used by [`TransportContext::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagPolicy {
    pub tag_owner: bool,
    pub tag: u8,
}

impl Default for TagPolicy {
    fn default() -> Self {
        Self {
            tag_owner: true,
            tag: 0,
        }
    }
}

/// Everything fixed at [`TransportContext::init`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Endpoint id registered for this side.
    pub local_id: u8,
    pub adapter: AdapterConfig,
    pub message: MessageConfig,
    pub tag_policy: TagPolicy,
    /// Emit an `info!` event for every message sent and received.
    pub debug: bool,
}

impl TransportConfig {
    pub fn new(local_id: u8) -> Self {
        Self {
            local_id,
            adapter: AdapterConfig::default(),
            message: MessageConfig::default(),
            tag_policy: TagPolicy::default(),
            debug: false,
        }
    }

    pub fn with_adapter(mut self, adapter: AdapterConfig) -> Self {
        self.adapter = adapter;
        self
    }

    pub fn with_message(mut self, message: MessageConfig) -> Self {
        self.message = message;
        self
    }

    pub fn with_tag_policy(mut self, tag_policy: TagPolicy) -> Self {
        self.tag_policy = tag_policy;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// A binding and a protocol stack wired together.
///
/// Byte messages go out through [`send`](Self::send); inbound frames are pulled
/// by [`poll`](Self::poll) and surface on the single receive callback. The
/// context is `Sync`: share it with `Arc` to send and poll from different
/// threads.
///
/// Teardown (on [`destroy`](Self::destroy) or drop) unregisters the binding from
/// the stack, closes the binding, then releases the stack.
pub struct TransportContext<S: ProtocolStack = MctpStack> {
    // Field order is drop order: adapter before stack.
    adapter: Arc<BindingAdapter>,
    stack: Arc<S>,
    callback: Arc<RwLock<Option<RxCallback>>>,
    debug: Arc<AtomicBool>,
    local_id: u8,
    tag_policy: TagPolicy,
    torn_down: AtomicBool,
}

impl TransportContext<MctpStack> {
    /// Open the channel behind `opener` and bring up an [`MctpStack`] on it.
    pub fn init(opener: &dyn ChannelOpener, config: TransportConfig) -> Result<Self> {
        let stack = MctpStack::new(config.message);
        Self::with_stack(stack, opener, config)
    }
}

impl<S: ProtocolStack> TransportContext<S> {
    /// Bring up `stack` on the channel behind `opener`.
    ///
    /// Opens the channel (with retries), registers the binding under the local
    /// id, enables transmit and installs the receive trampoline. On any failure
    /// everything already set up is released before the error is returned.
    pub fn with_stack(
        stack: S,
        opener: &dyn ChannelOpener,
        config: TransportConfig,
    ) -> Result<Self> {
        let local_id = config.local_id;
        if local_id == EID_NULL || local_id == EID_BROADCAST {
            return Err(BindingError::InvalidArgument(format!(
                "endpoint id {local_id:#04x} is reserved"
            )));
        }
        if config.tag_policy.tag > TAG_MASK {
            return Err(BindingError::InvalidArgument(format!(
                "tag {} out of range (max {TAG_MASK})",
                config.tag_policy.tag
            )));
        }

        let adapter = Arc::new(BindingAdapter::new(config.adapter)?);
        adapter.open(opener)?;

        let stack = Arc::new(stack);
        if let Err(err) = stack.register_channel(adapter.clone(), local_id) {
            let _ = adapter.close();
            return Err(err);
        }
        adapter.set_tx_enabled(true);

        let callback: Arc<RwLock<Option<RxCallback>>> = Arc::new(RwLock::new(None));
        let debug_flag = Arc::new(AtomicBool::new(config.debug));
        {
            let callback = Arc::clone(&callback);
            let debug_flag = Arc::clone(&debug_flag);
            stack.set_receive_handler(Arc::new(move |message: &Message| {
                if debug_flag.load(Ordering::Relaxed) {
                    info!(
                        src = message.src,
                        dest = message.dest,
                        tag = message.tag,
                        tag_owner = message.tag_owner,
                        len = message.payload.len(),
                        "rx message"
                    );
                }
                let current = callback.read().clone();
                if let Some(cb) = current {
                    cb(message.src, &message.payload);
                }
            }));
        }

        info!(local_id, address = %opener.address(), "transport up");
        Ok(Self {
            adapter,
            stack,
            callback,
            debug: debug_flag,
            local_id,
            tag_policy: config.tag_policy,
            torn_down: AtomicBool::new(false),
        })
    }

    /// Send `payload` to `dest` with the configured tag policy.
    pub fn send(&self, dest: u8, payload: &[u8]) -> Result<()> {
        self.send_with_tag(dest, self.tag_policy.tag_owner, self.tag_policy.tag, payload)
    }

    /// Send `payload` to `dest` with an explicit tag-owner bit and tag.
    pub fn send_with_tag(&self, dest: u8, tag_owner: bool, tag: u8, payload: &[u8]) -> Result<()> {
        if tag > TAG_MASK {
            return Err(BindingError::InvalidArgument(format!(
                "tag {tag} out of range (max {TAG_MASK})"
            )));
        }
        if self.debug.load(Ordering::Relaxed) {
            info!(src = self.local_id, dest, tag, tag_owner, len = payload.len(), "tx message");
        }
        self.stack.transmit_message(dest, tag_owner, tag, payload)
    }

    /// Poll the binding once, feeding at most one frame to the stack.
    ///
    /// An inbound frame above the adapter's max frame size is dropped and
    /// counted in [`AdapterStats::rx_oversize`]; polling continues normally.
    pub fn poll(&self) -> Result<PollStatus> {
        let stack = &self.stack;
        self.adapter.poll(|frame| stack.deliver_frame(frame))
    }

    /// Poll until `done` returns true or `timeout` passes.
    ///
    /// Sleeps `idle` whenever a poll finds nothing pending.
    pub fn poll_until(
        &self,
        timeout: Duration,
        idle: Duration,
        mut done: impl FnMut() -> bool,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while !done() {
            if Instant::now() >= deadline {
                return Err(BindingError::Timeout(timeout));
            }
            if self.poll()? == PollStatus::NoData && !idle.is_zero() {
                std::thread::sleep(idle);
            }
        }
        Ok(())
    }

    /// Replace the receive callback.
    pub fn set_receive_callback(&self, callback: impl Fn(u8, &[u8]) + Send + Sync + 'static) {
        *self.callback.write() = Some(Arc::new(callback));
    }

    /// Remove the receive callback; later messages are dropped after reassembly.
    pub fn clear_receive_callback(&self) {
        *self.callback.write() = None;
    }

    /// Toggle per-message trace events.
    pub fn set_debug(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::Relaxed);
        debug!(enabled, "transport debug trace");
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    pub fn local_id(&self) -> u8 {
        self.local_id
    }

    pub fn tag_policy(&self) -> TagPolicy {
        self.tag_policy
    }

    pub fn status(&self) -> LinkStatus {
        self.adapter.status()
    }

    pub fn stats(&self) -> AdapterStats {
        self.adapter.stats()
    }

    pub fn adapter(&self) -> &BindingAdapter {
        &self.adapter
    }

    pub fn stack(&self) -> &S {
        &self.stack
    }

    /// Tear the transport down now instead of at drop.
    pub fn destroy(self) {
        self.teardown();
    }

    fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stack.unregister_channel();
        if let Err(err) = self.adapter.close() {
            warn!(error = %err, "error closing binding");
        }
        debug!(local_id = self.local_id, "transport down");
    }
}

impl<S: ProtocolStack> Drop for TransportContext<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<S: ProtocolStack> std::fmt::Debug for TransportContext<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportContext")
            .field("local_id", &self.local_id)
            .field("status", &self.status())
            .field("tag_policy", &self.tag_policy)
            .field("debug", &self.debug_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use mmbi_channel::{DuplexChannel, Side};
    use parking_lot::Mutex;

    use super::*;
    use crate::retry::RetryPolicy;

    fn config(local_id: u8) -> TransportConfig {
        TransportConfig::new(local_id).with_adapter(
            AdapterConfig::default()
                .with_open_retry(RetryPolicy::immediate(5))
                .with_tx_retry(RetryPolicy::immediate(3)),
        )
    }

    #[test]
    fn send_and_receive_over_duplex() {
        let duplex = DuplexChannel::new(64 * 1024).unwrap();
        let host = TransportContext::init(&duplex.opener(Side::A), config(8)).unwrap();
        let bmc = TransportContext::init(&duplex.opener(Side::B), config(9)).unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        bmc.set_receive_callback(move |src, payload| sink.lock().push((src, payload.to_vec())));

        host.send(9, &[1, 2, 3, 4]).unwrap();
        assert_eq!(bmc.poll().unwrap(), PollStatus::Delivered(8));
        assert_eq!(bmc.poll().unwrap(), PollStatus::NoData);

        assert_eq!(*received.lock(), vec![(8, vec![1, 2, 3, 4])]);
    }

    #[test]
    fn reserved_local_ids_rejected() {
        let duplex = DuplexChannel::new(1024).unwrap();
        for id in [EID_NULL, EID_BROADCAST] {
            let err = TransportContext::init(&duplex.opener(Side::A), config(id)).unwrap_err();
            assert!(matches!(err, BindingError::InvalidArgument(_)));
        }
        assert!(duplex.endpoint(Side::A).is_ok(), "nothing left attached");
    }

    #[test]
    fn failed_open_leaves_nothing_attached() {
        let duplex = DuplexChannel::new(1024).unwrap();
        let _holder = duplex.endpoint(Side::A).unwrap();
        let err = TransportContext::init(&duplex.opener(Side::A), config(8)).unwrap_err();
        assert!(matches!(
            err,
            BindingError::ChannelUnavailable { attempts: 5, .. }
        ));
    }

    #[test]
    fn bad_tag_rejected() {
        let duplex = DuplexChannel::new(1024).unwrap();
        let host = TransportContext::init(&duplex.opener(Side::A), config(8)).unwrap();
        let err = host.send_with_tag(9, true, 8, b"x").unwrap_err();
        assert!(matches!(err, BindingError::InvalidArgument(_)));
    }

    #[test]
    fn drop_releases_the_endpoint() {
        let duplex = DuplexChannel::new(1024).unwrap();
        let host = TransportContext::init(&duplex.opener(Side::A), config(8)).unwrap();
        assert!(duplex.endpoint(Side::A).is_err());
        drop(host);
        assert!(duplex.endpoint(Side::A).is_ok());
    }

    #[test]
    fn poll_until_times_out() {
        let duplex = DuplexChannel::new(1024).unwrap();
        let host = TransportContext::init(&duplex.opener(Side::A), config(8)).unwrap();
        let err = host
            .poll_until(Duration::from_millis(20), Duration::from_millis(1), || false)
            .unwrap_err();
        assert!(matches!(err, BindingError::Timeout(_)));
    }

    #[test]
    fn debug_toggle_does_not_change_behaviour() {
        let duplex = DuplexChannel::new(4096).unwrap();
        let host =
            TransportContext::init(&duplex.opener(Side::A), config(8).with_debug(true)).unwrap();
        let bmc = TransportContext::init(&duplex.opener(Side::B), config(9)).unwrap();
        assert!(host.debug_enabled());

        host.send(9, b"traced").unwrap();
        host.set_debug(false);
        host.send(9, b"quiet").unwrap();

        let count = Arc::new(Mutex::new(0));
        let seen = Arc::clone(&count);
        bmc.set_receive_callback(move |_, _| *seen.lock() += 1);
        bmc.poll().unwrap();
        bmc.poll().unwrap();
        assert_eq!(*count.lock(), 2);
    }
}

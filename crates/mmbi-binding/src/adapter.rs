use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use mmbi_channel::{Channel, ChannelError, ChannelOpener};
use mmbi_frame::{DEFAULT_MAX_FRAME, HEADER_SIZE};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::{BindingError, Result};
use crate::retry::{Attempt, RetryError, RetryPolicy};
use crate::stack::PacketSink;

/// Configuration for a [`BindingAdapter`].
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Largest frame accepted for transmit or delivered from poll.
    pub max_frame_size: usize,
    /// Retry policy for opening the channel.
    pub open_retry: RetryPolicy,
    /// Retry policy for each transmitted frame.
    pub tx_retry: RetryPolicy,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME,
            open_retry: RetryPolicy::open_default(),
            tx_retry: RetryPolicy::transmit_default(),
        }
    }
}

impl AdapterConfig {
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn with_open_retry(mut self, policy: RetryPolicy) -> Self {
        self.open_retry = policy;
        self
    }

    pub fn with_tx_retry(mut self, policy: RetryPolicy) -> Self {
        self.tx_retry = policy;
        self
    }
}

/// Observable adapter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Closed,
    Opening,
    Open,
    /// Closed after an error; see [`BindingAdapter::transmit`] and
    /// [`BindingAdapter::poll`] for how each failure kind behaves.
    Failed(FailureKind),
}

/// What moved the adapter into [`LinkStatus::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The channel never opened.
    Unavailable,
    /// Transmit retries ran out.
    Io,
    /// The peer went away.
    Disconnected,
}

impl FailureKind {
    /// Whether a channel was lost after opening. Transmit and poll both fail
    /// fast with [`BindingError::ChannelClosed`] until the adapter is reopened.
    pub fn is_terminal(self) -> bool {
        matches!(self, FailureKind::Io | FailureKind::Disconnected)
    }
}

/// Result of one [`BindingAdapter::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// Nothing pending; no side effects.
    NoData,
    /// One frame of this many bytes was handed to the receiver.
    Delivered(usize),
}

/// Counter snapshot from [`BindingAdapter::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub tx_retries: u64,
    pub rx_oversize: u64,
}

#[derive(Default)]
struct Counters {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    tx_retries: AtomicU64,
    rx_oversize: AtomicU64,
}

enum LinkState {
    Closed,
    Opening,
    Open(Arc<dyn Channel>),
    Failed(FailureKind),
}

impl LinkState {
    fn status(&self) -> LinkStatus {
        match self {
            LinkState::Closed => LinkStatus::Closed,
            LinkState::Opening => LinkStatus::Opening,
            LinkState::Open(_) => LinkStatus::Open,
            LinkState::Failed(kind) => LinkStatus::Failed(*kind),
        }
    }
}

enum TxError {
    Transient(String),
    Fatal(BindingError),
}

/// Maps the stack's packet contract onto a frame channel.
///
/// State moves `Closed → Opening → Open → Failed` and is published under a
/// read-write lock. I/O never runs with that lock held: each operation clones
/// the channel handle and releases the lock first, so a transmit stuck in its
/// retry delay does not stall a concurrent poll.
pub struct BindingAdapter {
    config: AdapterConfig,
    state: RwLock<LinkState>,
    tx_enabled: AtomicBool,
    counters: Counters,
}

impl BindingAdapter {
    pub fn new(config: AdapterConfig) -> Result<Self> {
        if config.max_frame_size <= HEADER_SIZE {
            return Err(BindingError::InvalidArgument(format!(
                "max frame size {} leaves no room for payload",
                config.max_frame_size
            )));
        }
        Ok(Self {
            config,
            state: RwLock::new(LinkState::Closed),
            tx_enabled: AtomicBool::new(false),
            counters: Counters::default(),
        })
    }

    /// Open the channel through `opener`, retrying transient unavailability.
    pub fn open(&self, opener: &dyn ChannelOpener) -> Result<()> {
        {
            let mut state = self.state.write();
            if matches!(*state, LinkState::Open(_) | LinkState::Opening) {
                return Err(BindingError::InvalidArgument(
                    "binding is already open".to_string(),
                ));
            }
            *state = LinkState::Opening;
        }

        let address = opener.address();
        debug!(%address, "opening channel");

        let outcome = self.config.open_retry.run(|attempt| match opener.open() {
            Ok(channel) => Attempt::Done(channel),
            Err(err) if err.is_transient() => {
                warn!(%address, attempt, error = %err, "channel not available yet");
                Attempt::Retry(err)
            }
            Err(err) => Attempt::Fail(err),
        });

        match outcome {
            Ok(channel) => {
                info!(%address, kind = channel.kind(), "channel open");
                *self.state.write() = LinkState::Open(Arc::from(channel));
                Ok(())
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                error!(%address, attempts, error = %last, "giving up on channel");
                *self.state.write() = LinkState::Failed(FailureKind::Unavailable);
                Err(BindingError::ChannelUnavailable {
                    address,
                    attempts,
                    source: last,
                })
            }
            Err(RetryError::Aborted { error, .. }) => {
                error!(%address, %error, "channel open failed");
                *self.state.write() = LinkState::Failed(FailureKind::Unavailable);
                Err(match error {
                    ChannelError::Unsupported(what) => BindingError::Unsupported(what),
                    ChannelError::InvalidArgument(msg) => BindingError::InvalidArgument(msg),
                    other => BindingError::Channel(other),
                })
            }
        }
    }

    /// Write one frame, retrying short or transiently failed writes.
    ///
    /// Oversize and empty frames are rejected before the channel is touched.
    /// Only a complete write succeeds. Once retries run out, or the peer is
    /// gone, the adapter moves to `Failed` and later transmits fail fast with
    /// [`BindingError::ChannelClosed`].
    pub fn transmit(&self, frame: &[u8]) -> Result<()> {
        let max = self.config.max_frame_size;
        if frame.len() > max {
            return Err(BindingError::OversizeFrame {
                size: frame.len(),
                max,
            });
        }
        if frame.is_empty() {
            return Err(BindingError::InvalidArgument("empty frame".to_string()));
        }
        if !self.tx_enabled.load(Ordering::SeqCst) {
            return Err(BindingError::TxDisabled);
        }

        let channel = match &*self.state.read() {
            LinkState::Open(channel) => Arc::clone(channel),
            LinkState::Failed(kind) if kind.is_terminal() => {
                return Err(BindingError::ChannelClosed)
            }
            _ => return Err(BindingError::NotOpen),
        };

        let outcome = self.config.tx_retry.run(|attempt| {
            if attempt > 1 {
                self.counters.tx_retries.fetch_add(1, Ordering::Relaxed);
            }
            match channel.write(frame) {
                Ok(n) if n == frame.len() => Attempt::Done(()),
                Ok(n) => {
                    debug!(attempt, written = n, len = frame.len(), "short write");
                    Attempt::Retry(TxError::Transient(format!(
                        "short write ({n} of {} bytes)",
                        frame.len()
                    )))
                }
                Err(ChannelError::Closed) => {
                    Attempt::Fail(TxError::Fatal(BindingError::ChannelClosed))
                }
                Err(err) if err.is_transient() => {
                    debug!(attempt, error = %err, "transient write failure");
                    Attempt::Retry(TxError::Transient(err.to_string()))
                }
                Err(err) => Attempt::Fail(TxError::Fatal(BindingError::Channel(err))),
            }
        });

        match outcome {
            Ok(()) => {
                self.counters.frames_sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                let reason = match last {
                    TxError::Transient(reason) => reason,
                    TxError::Fatal(err) => err.to_string(),
                };
                error!(attempts, %reason, "transmit retries exhausted");
                self.fail(&channel, FailureKind::Io);
                Err(BindingError::IoFailure { attempts, reason })
            }
            Err(RetryError::Aborted { error, .. }) => match error {
                TxError::Fatal(BindingError::ChannelClosed) => {
                    warn!("peer closed the channel during transmit");
                    self.fail(&channel, FailureKind::Disconnected);
                    Err(BindingError::ChannelClosed)
                }
                TxError::Fatal(err) => Err(err),
                TxError::Transient(reason) => Err(BindingError::IoFailure {
                    attempts: 1,
                    reason,
                }),
            },
        }
    }

    /// Check for one pending frame and hand it to `deliver`.
    ///
    /// Returns [`PollStatus::NoData`] immediately when nothing is pending, and
    /// also when the adapter was never opened or was closed explicitly. After a
    /// peer disconnect or exhausted transmit retries it fails with
    /// [`BindingError::ChannelClosed`], like [`BindingAdapter::transmit`]. A
    /// pending frame larger than the max frame size is read, counted in
    /// [`AdapterStats::rx_oversize`], dropped, and reported as `NoData`.
    pub fn poll<F: FnOnce(&[u8])>(&self, deliver: F) -> Result<PollStatus> {
        let channel = match &*self.state.read() {
            LinkState::Open(channel) => Arc::clone(channel),
            LinkState::Failed(kind) if kind.is_terminal() => {
                return Err(BindingError::ChannelClosed)
            }
            _ => return Ok(PollStatus::NoData),
        };

        let available = match channel.bytes_available() {
            Ok(n) => n,
            Err(err) => return Err(self.rx_failure(&channel, err)),
        };
        if available == 0 {
            return Ok(PollStatus::NoData);
        }

        let max = self.config.max_frame_size;
        let mut buf = Vec::new();
        let len = available.min(max);
        buf.try_reserve_exact(len)
            .map_err(|_| BindingError::OutOfMemory(len))?;
        buf.resize(len, 0);

        let read = match channel.read(&mut buf) {
            Ok(n) => n,
            Err(err) => return Err(self.rx_failure(&channel, err)),
        };

        if available > max {
            warn!(size = available, max, "discarding oversize frame");
            self.counters.rx_oversize.fetch_add(1, Ordering::Relaxed);
            return Ok(PollStatus::NoData);
        }
        if read == 0 {
            return Ok(PollStatus::NoData);
        }

        self.counters.frames_received.fetch_add(1, Ordering::Relaxed);
        deliver(&buf[..read]);
        Ok(PollStatus::Delivered(read))
    }

    /// Release the channel. The adapter returns to `Closed`.
    pub fn close(&self) -> Result<()> {
        let previous = std::mem::replace(&mut *self.state.write(), LinkState::Closed);
        self.tx_enabled.store(false, Ordering::SeqCst);
        if let LinkState::Open(channel) = previous {
            debug!(kind = channel.kind(), "closing channel");
            match channel.close() {
                Ok(()) | Err(ChannelError::Closed) => {}
                Err(err) => return Err(BindingError::Channel(err)),
            }
        }
        Ok(())
    }

    pub fn set_tx_enabled(&self, enabled: bool) {
        self.tx_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn tx_enabled(&self) -> bool {
        self.tx_enabled.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> LinkStatus {
        self.state.read().status()
    }

    pub fn max_frame_size(&self) -> usize {
        self.config.max_frame_size
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn stats(&self) -> AdapterStats {
        AdapterStats {
            frames_sent: self.counters.frames_sent.load(Ordering::Relaxed),
            frames_received: self.counters.frames_received.load(Ordering::Relaxed),
            tx_retries: self.counters.tx_retries.load(Ordering::Relaxed),
            rx_oversize: self.counters.rx_oversize.load(Ordering::Relaxed),
        }
    }

    fn rx_failure(&self, channel: &Arc<dyn Channel>, err: ChannelError) -> BindingError {
        match err {
            ChannelError::Closed => {
                warn!("peer closed the channel");
                self.fail(channel, FailureKind::Disconnected);
                BindingError::ChannelClosed
            }
            other => BindingError::Channel(other),
        }
    }

    // Only transition if `channel` is still the live one; a concurrent close
    // or reopen wins.
    fn fail(&self, channel: &Arc<dyn Channel>, kind: FailureKind) {
        let released = {
            let mut state = self.state.write();
            let live = matches!(&*state, LinkState::Open(current) if Arc::ptr_eq(current, channel));
            if !live {
                return;
            }
            std::mem::replace(&mut *state, LinkState::Failed(kind))
        };
        if let LinkState::Open(channel) = released {
            let _ = channel.close();
        }
    }
}

impl PacketSink for BindingAdapter {
    fn transmit(&self, frame: &[u8]) -> Result<()> {
        BindingAdapter::transmit(self, frame)
    }

    fn max_frame_size(&self) -> usize {
        self.config.max_frame_size
    }
}

impl std::fmt::Debug for BindingAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingAdapter")
            .field("status", &self.status())
            .field("tx_enabled", &self.tx_enabled())
            .field("max_frame_size", &self.config.max_frame_size)
            .finish()
    }
}

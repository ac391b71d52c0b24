use std::time::Duration;

/// Errors that can occur in binding and transport operations.
#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    /// A caller-supplied argument is unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The frame exceeds the binding's maximum frame size.
    #[error("frame too large ({size} bytes, max {max})")]
    OversizeFrame { size: usize, max: usize },

    /// The channel could not be opened within the retry budget.
    #[error("channel {address} unavailable after {attempts} attempts: {source}")]
    ChannelUnavailable {
        address: String,
        attempts: u32,
        #[source]
        source: mmbi_channel::ChannelError,
    },

    /// Transient write failures persisted past the retry budget.
    #[error("transmit failed after {attempts} attempts: {reason}")]
    IoFailure { attempts: u32, reason: String },

    /// The peer disconnected or the channel broke.
    #[error("channel closed")]
    ChannelClosed,

    /// A receive buffer could not be allocated.
    #[error("out of memory allocating {0} bytes")]
    OutOfMemory(usize),

    /// The operation is not available on this platform or backend.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// The adapter has not been opened, or was closed explicitly.
    #[error("binding not open")]
    NotOpen,

    /// Transmission has not been enabled on the binding.
    #[error("transmit disabled")]
    TxDisabled,

    /// The protocol stack has no binding registered.
    #[error("no binding registered")]
    NotRegistered,

    /// A wall-clock wait expired.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Packet codec error.
    #[error("frame error: {0}")]
    Frame(#[from] mmbi_frame::FrameError),

    /// Channel-level error not covered by a more specific variant.
    #[error("channel error: {0}")]
    Channel(#[from] mmbi_channel::ChannelError),
}

pub type Result<T> = std::result::Result<T, BindingError>;

use std::io::ErrorKind;
use std::path::PathBuf;

/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// A channel was configured with an unusable parameter (zero capacity, empty path).
    #[error("invalid channel argument: {0}")]
    InvalidArgument(String),

    /// Failed to bind the local end of a device channel.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The far end of the channel is not available yet.
    #[error("channel {address} unavailable: {source}")]
    Unavailable {
        address: String,
        source: std::io::Error,
    },

    /// The endpoint is already attached to another handle.
    #[error("channel endpoint {0} already in use")]
    EndpointBusy(String),

    /// An I/O error occurred on the channel.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// The peer went away or this end was closed.
    #[error("channel closed")]
    Closed,

    /// The operation is not implemented on this backend or platform.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

impl ChannelError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ChannelError::Unavailable { .. } | ChannelError::EndpointBusy(_) => true,
            ChannelError::Io(err) => is_transient_kind(err.kind()),
            _ => false,
        }
    }

    /// Classify a raw I/O error from an OS-level channel.
    ///
    /// Peer-gone conditions become [`ChannelError::Closed`] so callers can tell a
    /// disconnect apart from a transient failure.
    pub fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::BrokenPipe
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected => ChannelError::Closed,
            _ => ChannelError::Io(err),
        }
    }
}

fn is_transient_kind(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::WouldBlock | ErrorKind::Interrupted | ErrorKind::TimedOut
    )
}

pub type Result<T> = std::result::Result<T, ChannelError>;

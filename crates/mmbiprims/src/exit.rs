use std::fmt;
use std::io;

use mmbi_binding::BindingError;
use mmbi_channel::ChannelError;

// Exit code constants aligned with sysexits-style semantics.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound => USAGE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    let code = match &err {
        ChannelError::InvalidArgument(_) | ChannelError::PathTooLong { .. } => USAGE,
        ChannelError::Closed => FAILURE,
        ChannelError::Unsupported(_) => USAGE,
        ChannelError::Unavailable { .. }
        | ChannelError::EndpointBusy(_)
        | ChannelError::Bind { .. }
        | ChannelError::Io(_) => TRANSPORT_ERROR,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn binding_error(context: &str, err: BindingError) -> CliError {
    let code = match err {
        BindingError::Channel(inner) => return channel_error(context, inner),
        BindingError::InvalidArgument(_) | BindingError::Unsupported(_) => USAGE,
        BindingError::OversizeFrame { .. } | BindingError::Frame(_) => DATA_INVALID,
        BindingError::ChannelUnavailable { .. } | BindingError::IoFailure { .. } => {
            TRANSPORT_ERROR
        }
        BindingError::ChannelClosed => FAILURE,
        BindingError::Timeout(_) => TIMEOUT,
        BindingError::OutOfMemory(_)
        | BindingError::NotOpen
        | BindingError::TxDisabled
        | BindingError::NotRegistered => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

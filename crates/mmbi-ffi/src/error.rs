use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;

use mmbi_binding::BindingError;
use mmbi_channel::ChannelError;

use crate::types::MmbiResult;

thread_local! {
    static LAST_ERROR: RefCell<CString> = RefCell::new(CString::default());
}

pub(crate) fn clear_error_state() {
    LAST_ERROR.with(|state| {
        *state.borrow_mut() = CString::default();
    });
}

pub(crate) fn set_error_message(message: impl Into<String>) {
    let message = message.into();
    let sanitized = message.replace('\0', "?");
    LAST_ERROR.with(|state| {
        *state.borrow_mut() = CString::new(sanitized).unwrap_or_default();
    });
}

pub(crate) fn set_invalid_argument(message: impl Into<String>) -> MmbiResult {
    set_error_message(message);
    MmbiResult::InvalidArgument
}

pub(crate) fn set_panic_error() {
    set_error_message("panic across FFI boundary");
}

pub(crate) fn map_binding_error(err: &BindingError) -> MmbiResult {
    set_error_message(err.to_string());
    match err {
        BindingError::InvalidArgument(_) => MmbiResult::InvalidArgument,
        BindingError::OversizeFrame { .. } => MmbiResult::OversizeFrame,
        BindingError::ChannelUnavailable { .. } => MmbiResult::ChannelUnavailable,
        BindingError::IoFailure { .. } => MmbiResult::IoFailure,
        BindingError::ChannelClosed => MmbiResult::ChannelClosed,
        BindingError::OutOfMemory(_) => MmbiResult::OutOfMemory,
        BindingError::Unsupported(_) => MmbiResult::Unsupported,
        BindingError::NotOpen | BindingError::TxDisabled | BindingError::NotRegistered => {
            MmbiResult::NotOpen
        }
        BindingError::Timeout(_) => MmbiResult::Timeout,
        BindingError::Frame(_) => MmbiResult::FrameError,
        BindingError::Channel(inner) => channel_result(inner),
    }
}

pub(crate) fn map_channel_error(err: &ChannelError) -> MmbiResult {
    set_error_message(err.to_string());
    channel_result(err)
}

fn channel_result(err: &ChannelError) -> MmbiResult {
    match err {
        ChannelError::InvalidArgument(_) | ChannelError::PathTooLong { .. } => {
            MmbiResult::InvalidArgument
        }
        ChannelError::Unavailable { .. } | ChannelError::EndpointBusy(_) => {
            MmbiResult::ChannelUnavailable
        }
        ChannelError::Closed => MmbiResult::ChannelClosed,
        ChannelError::Unsupported(_) => MmbiResult::Unsupported,
        ChannelError::Bind { .. } | ChannelError::Io(_) => MmbiResult::IoFailure,
    }
}

pub(crate) fn last_error_ptr() -> *const c_char {
    LAST_ERROR.with(|state| state.borrow().as_ptr())
}

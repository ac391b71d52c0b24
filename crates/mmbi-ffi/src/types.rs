use std::ffi::c_void;

use mmbi_binding::TransportContext;
use mmbi_channel::DuplexChannel;

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmbiResult {
    Ok = 0,
    InvalidArgument = 1,
    OversizeFrame = 2,
    ChannelUnavailable = 3,
    IoFailure = 4,
    ChannelClosed = 5,
    OutOfMemory = 6,
    Unsupported = 7,
    NotOpen = 8,
    FrameError = 9,
    Timeout = 10,
    Internal = 99,
}

#[allow(dead_code)]
pub const MMBI_OK: MmbiResult = MmbiResult::Ok;
#[allow(dead_code)]
pub const MMBI_ERR_INVALID_ARGUMENT: MmbiResult = MmbiResult::InvalidArgument;
#[allow(dead_code)]
pub const MMBI_ERR_OVERSIZE_FRAME: MmbiResult = MmbiResult::OversizeFrame;
#[allow(dead_code)]
pub const MMBI_ERR_CHANNEL_UNAVAILABLE: MmbiResult = MmbiResult::ChannelUnavailable;
#[allow(dead_code)]
pub const MMBI_ERR_IO_FAILURE: MmbiResult = MmbiResult::IoFailure;
#[allow(dead_code)]
pub const MMBI_ERR_CHANNEL_CLOSED: MmbiResult = MmbiResult::ChannelClosed;
#[allow(dead_code)]
pub const MMBI_ERR_OUT_OF_MEMORY: MmbiResult = MmbiResult::OutOfMemory;
#[allow(dead_code)]
pub const MMBI_ERR_UNSUPPORTED: MmbiResult = MmbiResult::Unsupported;
#[allow(dead_code)]
pub const MMBI_ERR_NOT_OPEN: MmbiResult = MmbiResult::NotOpen;
#[allow(dead_code)]
pub const MMBI_ERR_FRAME: MmbiResult = MmbiResult::FrameError;
#[allow(dead_code)]
pub const MMBI_ERR_TIMEOUT: MmbiResult = MmbiResult::Timeout;
#[allow(dead_code)]
pub const MMBI_ERR_INTERNAL: MmbiResult = MmbiResult::Internal;

/// Host side of a duplex device.
pub const MMBI_SIDE_A: u8 = 0;
/// Management controller side of a duplex device.
pub const MMBI_SIDE_B: u8 = 1;

/// Receive callback: `(src_eid, data, len, user_context)`.
///
/// `data` is only valid for the duration of the call.
pub type MmbiRxCallback = Option<
    unsafe extern "C" fn(src_eid: u8, data: *const u8, len: usize, user_context: *mut c_void),
>;

pub type MmbiTransportHandle = *mut c_void;
pub type MmbiDuplexHandle = *mut c_void;

pub(crate) struct TransportHandle {
    pub(crate) ctx: TransportContext,
}

pub(crate) struct DuplexHandle {
    pub(crate) duplex: DuplexChannel,
}

/// A C callback plus the opaque pointer handed back to it.
#[derive(Clone, Copy)]
pub(crate) struct CallbackTarget {
    pub(crate) callback: unsafe extern "C" fn(u8, *const u8, usize, *mut c_void),
    pub(crate) user_context: *mut c_void,
}

// SAFETY: the library never dereferences `user_context`; it is passed back to
// the caller's callback, and the caller is responsible for its thread safety.
unsafe impl Send for CallbackTarget {}
// SAFETY: see `Send` above.
unsafe impl Sync for CallbackTarget {}

impl CallbackTarget {
    pub(crate) fn invoke(&self, src_eid: u8, payload: &[u8]) {
        // SAFETY: `callback` was supplied by the caller for exactly this
        // signature; `payload` outlives the call.
        unsafe { (self.callback)(src_eid, payload.as_ptr(), payload.len(), self.user_context) }
    }
}

use mmbi_channel::{DuplexChannel, DEFAULT_RING_CAPACITY};

use crate::error;
use crate::types::{DuplexHandle, MmbiDuplexHandle};

/// Create a simulated duplex device with `capacity` bytes per direction.
///
/// A `capacity` of 0 selects the default (1 MiB). Returns null on failure.
#[no_mangle]
pub extern "C" fn mmbi_duplex_new(capacity: usize) -> MmbiDuplexHandle {
    crate::ffi_boundary(std::ptr::null_mut(), || {
        error::clear_error_state();

        let capacity = if capacity == 0 {
            DEFAULT_RING_CAPACITY
        } else {
            capacity
        };

        match DuplexChannel::new(capacity) {
            Ok(duplex) => Box::into_raw(Box::new(DuplexHandle { duplex })) as MmbiDuplexHandle,
            Err(err) => {
                let _ = error::map_channel_error(&err);
                std::ptr::null_mut()
            }
        }
    })
}

/// Free a duplex device handle.
///
/// Transports attached to the device keep it alive until they are destroyed.
///
/// # Safety
/// `duplex` must be null or a handle previously returned by `mmbi_duplex_new`.
#[no_mangle]
pub unsafe extern "C" fn mmbi_duplex_free(duplex: MmbiDuplexHandle) {
    crate::ffi_boundary((), || {
        if duplex.is_null() {
            return;
        }

        // SAFETY: Caller guarantees this handle was allocated by mmbi_duplex_new.
        unsafe {
            drop(Box::from_raw(duplex as *mut DuplexHandle));
        }
    });
}

pub(crate) fn with_duplex<T>(
    handle: MmbiDuplexHandle,
    on_error: T,
    f: impl FnOnce(&DuplexHandle) -> T,
) -> T {
    if handle.is_null() {
        let _ = error::set_invalid_argument("duplex handle cannot be null");
        return on_error;
    }

    let duplex_handle = {
        // SAFETY: Pointer validity is guaranteed by the caller.
        unsafe { &*(handle as *const DuplexHandle) }
    };

    f(duplex_handle)
}

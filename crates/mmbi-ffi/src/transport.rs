use std::ffi::c_void;
use std::os::raw::c_char;

use mmbi_binding::{TransportConfig, TransportContext};
use mmbi_channel::Side;

use crate::args;
use crate::duplex::with_duplex;
use crate::error;
use crate::types::{
    CallbackTarget, MmbiDuplexHandle, MmbiResult, MmbiRxCallback, MmbiTransportHandle,
    TransportHandle, MMBI_SIDE_A, MMBI_SIDE_B,
};

fn with_transport<T>(
    handle: MmbiTransportHandle,
    on_error: T,
    f: impl FnOnce(&TransportHandle) -> T,
) -> T {
    if handle.is_null() {
        let _ = error::set_invalid_argument("transport handle cannot be null");
        return on_error;
    }

    let transport_handle = {
        // SAFETY: Pointer validity is guaranteed by the caller.
        unsafe { &*(handle as *const TransportHandle) }
    };

    f(transport_handle)
}

fn into_handle(result: mmbi_binding::Result<TransportContext>) -> MmbiTransportHandle {
    match result {
        Ok(ctx) => Box::into_raw(Box::new(TransportHandle { ctx })) as MmbiTransportHandle,
        Err(err) => {
            let _ = error::map_binding_error(&err);
            std::ptr::null_mut()
        }
    }
}

/// Bring up a transport on a Unix datagram device.
///
/// Binds `local_path`, connects to `peer_path` (retrying while the peer is not
/// there yet) and registers `local_eid`. Returns null on failure; see
/// `mmbi_last_error`.
///
/// # Safety
/// `local_path` and `peer_path` must be non-null pointers to valid UTF-8,
/// NUL-terminated C strings.
#[no_mangle]
pub unsafe extern "C" fn mmbi_transport_init(
    local_path: *const c_char,
    peer_path: *const c_char,
    local_eid: u8,
) -> MmbiTransportHandle {
    crate::ffi_boundary(std::ptr::null_mut(), || {
        error::clear_error_state();

        let local = {
            // SAFETY: We validate null and UTF-8 in helper.
            match unsafe { args::required_str_arg(local_path, "local_path") } {
                Some(v) => v,
                None => return std::ptr::null_mut(),
            }
        };
        let peer = {
            // SAFETY: We validate null and UTF-8 in helper.
            match unsafe { args::required_str_arg(peer_path, "peer_path") } {
                Some(v) => v,
                None => return std::ptr::null_mut(),
            }
        };

        #[cfg(not(unix))]
        {
            let _ = (local, peer, local_eid);
            let _ = error::map_binding_error(&mmbi_binding::BindingError::Unsupported(
                "unix datagram devices are not available on this platform",
            ));
            return std::ptr::null_mut();
        }

        #[cfg(unix)]
        {
            let opener = mmbi_channel::UnixDatagramOpener::new(local, peer);
            into_handle(TransportContext::init(&opener, TransportConfig::new(local_eid)))
        }
    })
}

/// Bring up a transport on one side of a simulated duplex device.
///
/// `side` is `MMBI_SIDE_A` (host) or `MMBI_SIDE_B` (management controller).
///
/// # Safety
/// `duplex` must be a valid handle returned by `mmbi_duplex_new`.
#[no_mangle]
pub unsafe extern "C" fn mmbi_transport_init_duplex(
    duplex: MmbiDuplexHandle,
    side: u8,
    local_eid: u8,
) -> MmbiTransportHandle {
    crate::ffi_boundary(std::ptr::null_mut(), || {
        error::clear_error_state();

        let side = match side {
            MMBI_SIDE_A => Side::A,
            MMBI_SIDE_B => Side::B,
            other => {
                let _ = error::set_invalid_argument(format!("unknown duplex side {other}"));
                return std::ptr::null_mut();
            }
        };

        with_duplex(duplex, std::ptr::null_mut(), |handle| {
            let opener = handle.duplex.opener(side);
            into_handle(TransportContext::init(&opener, TransportConfig::new(local_eid)))
        })
    })
}

/// Install (or, with a null `cb`, clear) the receive callback.
///
/// The callback runs on the thread calling `mmbi_transport_poll`.
///
/// # Safety
/// `ctx` must be a valid transport handle. `user_context` is passed back to
/// `cb` untouched and must stay valid while the callback is installed.
#[no_mangle]
pub unsafe extern "C" fn mmbi_transport_set_rx_callback(
    ctx: MmbiTransportHandle,
    cb: MmbiRxCallback,
    user_context: *mut c_void,
) -> MmbiResult {
    crate::ffi_boundary(MmbiResult::Internal, || {
        error::clear_error_state();

        with_transport(ctx, MmbiResult::InvalidArgument, |handle| {
            match cb {
                Some(callback) => {
                    let target = CallbackTarget {
                        callback,
                        user_context,
                    };
                    handle
                        .ctx
                        .set_receive_callback(move |src, payload| target.invoke(src, payload));
                }
                None => handle.ctx.clear_receive_callback(),
            }
            MmbiResult::Ok
        })
    })
}

/// Send `len` bytes to `dst_eid`.
///
/// # Safety
/// `ctx` must be a valid transport handle. If `len > 0`, `data` must be
/// non-null and readable for `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn mmbi_transport_send(
    ctx: MmbiTransportHandle,
    dst_eid: u8,
    data: *const u8,
    len: usize,
) -> MmbiResult {
    crate::ffi_boundary(MmbiResult::Internal, || {
        error::clear_error_state();

        let payload = {
            // SAFETY: We validate pointer/length pairing in helper.
            match unsafe { args::bytes_arg(data, len, "data") } {
                Some(v) => v,
                None => return MmbiResult::InvalidArgument,
            }
        };

        with_transport(ctx, MmbiResult::InvalidArgument, |handle| {
            match handle.ctx.send(dst_eid, payload) {
                Ok(()) => MmbiResult::Ok,
                Err(err) => error::map_binding_error(&err),
            }
        })
    })
}

/// Poll once; delivers at most one frame. Returns `MMBI_OK` when a frame was
/// processed and when nothing was pending.
///
/// # Safety
/// `ctx` must be a valid transport handle.
#[no_mangle]
pub unsafe extern "C" fn mmbi_transport_poll(ctx: MmbiTransportHandle) -> MmbiResult {
    crate::ffi_boundary(MmbiResult::Internal, || {
        error::clear_error_state();

        with_transport(ctx, MmbiResult::InvalidArgument, |handle| {
            match handle.ctx.poll() {
                Ok(_) => MmbiResult::Ok,
                Err(err) => error::map_binding_error(&err),
            }
        })
    })
}

/// Toggle per-message trace events.
///
/// # Safety
/// `ctx` must be a valid transport handle.
#[no_mangle]
pub unsafe extern "C" fn mmbi_transport_set_debug(
    ctx: MmbiTransportHandle,
    enable: bool,
) -> MmbiResult {
    crate::ffi_boundary(MmbiResult::Internal, || {
        error::clear_error_state();

        with_transport(ctx, MmbiResult::InvalidArgument, |handle| {
            handle.ctx.set_debug(enable);
            MmbiResult::Ok
        })
    })
}

/// Tear down a transport: unregister, close the channel, free the handle.
///
/// # Safety
/// `ctx` must be null or a handle previously returned by one of the
/// `mmbi_transport_init*` functions, and not used afterwards.
#[no_mangle]
pub unsafe extern "C" fn mmbi_transport_destroy(ctx: MmbiTransportHandle) {
    crate::ffi_boundary((), || {
        if ctx.is_null() {
            return;
        }

        // SAFETY: Caller guarantees this handle was allocated by an init function.
        let handle = unsafe { Box::from_raw(ctx as *mut TransportHandle) };
        handle.ctx.destroy();
    });
}

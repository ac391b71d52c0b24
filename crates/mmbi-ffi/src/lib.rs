//! mmbi-ffi: C-ABI exports for the MMBI transport.

mod args;
mod duplex;
mod error;
mod transport;
mod types;

use std::panic::AssertUnwindSafe;

pub use duplex::{mmbi_duplex_free, mmbi_duplex_new};
pub use transport::{
    mmbi_transport_destroy, mmbi_transport_init, mmbi_transport_init_duplex, mmbi_transport_poll,
    mmbi_transport_send, mmbi_transport_set_debug, mmbi_transport_set_rx_callback,
};
pub use types::{
    MmbiDuplexHandle, MmbiResult, MmbiRxCallback, MmbiTransportHandle, MMBI_ERR_CHANNEL_CLOSED,
    MMBI_ERR_CHANNEL_UNAVAILABLE, MMBI_ERR_FRAME, MMBI_ERR_INTERNAL, MMBI_ERR_INVALID_ARGUMENT,
    MMBI_ERR_IO_FAILURE, MMBI_ERR_NOT_OPEN, MMBI_ERR_OUT_OF_MEMORY, MMBI_ERR_OVERSIZE_FRAME,
    MMBI_ERR_TIMEOUT, MMBI_ERR_UNSUPPORTED, MMBI_OK, MMBI_SIDE_A, MMBI_SIDE_B,
};

fn ffi_boundary<T>(on_panic: T, f: impl FnOnce() -> T) -> T {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            error::set_panic_error();
            on_panic
        }
    }
}

#[no_mangle]
pub extern "C" fn mmbi_last_error() -> *const std::os::raw::c_char {
    ffi_boundary(std::ptr::null(), error::last_error_ptr)
}

#[cfg(test)]
mod tests {
    use std::ffi::{c_void, CStr, CString};
    use std::sync::Mutex;

    use super::*;

    fn last_error() -> String {
        let ptr = mmbi_last_error();
        assert!(!ptr.is_null());
        // SAFETY: mmbi_last_error returns a pointer to a thread-local CString.
        unsafe { CStr::from_ptr(ptr).to_string_lossy().into_owned() }
    }

    type Inbox = Mutex<Vec<(u8, Vec<u8>)>>;

    unsafe extern "C" fn collect(
        src_eid: u8,
        data: *const u8,
        len: usize,
        user_context: *mut c_void,
    ) {
        // SAFETY: tests pass a live `Inbox` as user_context and the library
        // passes a buffer valid for `len` bytes.
        let (inbox, payload) = unsafe {
            (
                &*(user_context as *const Inbox),
                std::slice::from_raw_parts(data, len),
            )
        };
        inbox.lock().unwrap().push((src_eid, payload.to_vec()));
    }

    #[test]
    fn last_error_starts_empty() {
        let _ = mmbi_duplex_new(64);
        assert!(last_error().is_empty());
    }

    #[test]
    fn duplex_round_trip_through_c_api() {
        let duplex = mmbi_duplex_new(0);
        assert!(!duplex.is_null());

        // SAFETY: handles come from this library and are freed at the end.
        unsafe {
            let host = mmbi_transport_init_duplex(duplex, MMBI_SIDE_A, 8);
            let bmc = mmbi_transport_init_duplex(duplex, MMBI_SIDE_B, 9);
            assert!(!host.is_null(), "{}", last_error());
            assert!(!bmc.is_null(), "{}", last_error());

            let inbox: Inbox = Mutex::new(Vec::new());
            let user = &inbox as *const Inbox as *mut c_void;
            assert_eq!(mmbi_transport_set_rx_callback(bmc, Some(collect), user), MmbiResult::Ok);
            assert_eq!(mmbi_transport_set_debug(host, true), MmbiResult::Ok);

            let payload = [1u8, 2, 3, 4];
            assert_eq!(
                mmbi_transport_send(host, 9, payload.as_ptr(), payload.len()),
                MmbiResult::Ok
            );
            assert_eq!(mmbi_transport_poll(bmc), MmbiResult::Ok);
            assert_eq!(mmbi_transport_poll(bmc), MmbiResult::Ok);

            assert_eq!(*inbox.lock().unwrap(), vec![(8, payload.to_vec())]);

            assert_eq!(
                mmbi_transport_set_rx_callback(bmc, None, std::ptr::null_mut()),
                MmbiResult::Ok
            );
            mmbi_transport_destroy(bmc);
            assert_eq!(mmbi_transport_poll(host), MmbiResult::ChannelClosed);
            assert!(last_error().contains("closed"));

            mmbi_transport_destroy(host);
            mmbi_duplex_free(duplex);
        }
    }

    #[test]
    fn null_arguments_are_rejected() {
        // SAFETY: null handles are explicitly allowed and rejected.
        unsafe {
            assert_eq!(mmbi_transport_poll(std::ptr::null_mut()), MmbiResult::InvalidArgument);
            assert!(last_error().contains("null"));

            assert_eq!(
                mmbi_transport_send(std::ptr::null_mut(), 9, std::ptr::null(), 4),
                MmbiResult::InvalidArgument
            );
            assert!(mmbi_transport_init(std::ptr::null(), std::ptr::null(), 8).is_null());
            assert!(mmbi_transport_init_duplex(std::ptr::null_mut(), MMBI_SIDE_A, 8).is_null());

            mmbi_transport_destroy(std::ptr::null_mut());
            mmbi_duplex_free(std::ptr::null_mut());
        }
    }

    #[test]
    fn unknown_side_is_rejected() {
        let duplex = mmbi_duplex_new(1024);
        // SAFETY: `duplex` is a live handle from this library.
        unsafe {
            assert!(mmbi_transport_init_duplex(duplex, 7, 8).is_null());
            assert!(last_error().contains("side"));
            mmbi_duplex_free(duplex);
        }
    }

    #[test]
    fn reserved_eid_is_invalid_argument() {
        let duplex = mmbi_duplex_new(1024);
        // SAFETY: `duplex` is a live handle from this library.
        unsafe {
            assert!(mmbi_transport_init_duplex(duplex, MMBI_SIDE_A, 0).is_null());
            assert!(last_error().contains("reserved"));
            mmbi_duplex_free(duplex);
        }
    }

    #[cfg(unix)]
    #[test]
    fn unix_datagram_transport_pair() {
        let dir = std::env::temp_dir().join(format!(
            "mmbi-ffi-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        let host_path = CString::new(dir.join("host.sock").to_string_lossy().into_owned()).unwrap();
        let bmc_path = CString::new(dir.join("bmc.sock").to_string_lossy().into_owned()).unwrap();

        let bmc_paths = (bmc_path.clone(), host_path.clone());
        let bmc_thread = std::thread::spawn(move || {
            // SAFETY: both strings live for the duration of the call.
            let handle =
                unsafe { mmbi_transport_init(bmc_paths.0.as_ptr(), bmc_paths.1.as_ptr(), 9) };
            handle as usize
        });

        // SAFETY: both strings live for the duration of the call.
        let host = unsafe { mmbi_transport_init(host_path.as_ptr(), bmc_path.as_ptr(), 8) };
        let bmc = bmc_thread.join().unwrap() as MmbiTransportHandle;
        assert!(!host.is_null(), "{}", last_error());
        assert!(!bmc.is_null());

        // SAFETY: handles are live until destroyed below.
        unsafe {
            let inbox: Inbox = Mutex::new(Vec::new());
            let user = &inbox as *const Inbox as *mut c_void;
            mmbi_transport_set_rx_callback(bmc, Some(collect), user);

            assert_eq!(mmbi_transport_send(host, 9, b"hi".as_ptr(), 2), MmbiResult::Ok);
            for _ in 0..100 {
                mmbi_transport_poll(bmc);
                if !inbox.lock().unwrap().is_empty() {
                    break;
                }
                std::thread::sleep(std::time::Duration::from_millis(5));
            }
            assert_eq!(*inbox.lock().unwrap(), vec![(8, b"hi".to_vec())]);

            mmbi_transport_destroy(bmc);
            mmbi_transport_destroy(host);
        }
        let _ = std::fs::remove_dir_all(&dir);
    }
}

use crate::error::Result;

/// A connected frame channel.
///
/// Every implementation preserves frame boundaries: one `write` deposits one
/// frame, one `read` returns at most one frame. Neither call blocks waiting for
/// the peer; "no room" and "nothing pending" are reported as `Ok(0)`.
///
/// Backends are the simulated [`DuplexEndpoint`](crate::DuplexEndpoint) and,
/// on Unix, [`UnixDatagramChannel`](crate::UnixDatagramChannel).
pub trait Channel: Send + Sync {
    /// Write one frame.
    ///
    /// Returns the number of bytes accepted. Anything short of `frame.len()`
    /// means the frame did not land; callers decide whether to retry.
    fn write(&self, frame: &[u8]) -> Result<usize>;

    /// Read the next pending frame into `buf`.
    ///
    /// Returns `Ok(0)` when nothing is pending. A frame longer than `buf` is
    /// truncated and the remainder discarded.
    fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Size of the next pending frame without consuming it (0 if none).
    fn bytes_available(&self) -> Result<usize>;

    /// Close this end. Further operations fail with `ChannelError::Closed`.
    fn close(&self) -> Result<()>;

    /// Backend name for diagnostics.
    fn kind(&self) -> &'static str;
}

/// Acquires a [`Channel`] handle.
///
/// Openers are the "address" of a channel: they carry whatever is needed to
/// reach the device and may be asked to open repeatedly. A transient failure
/// (peer not there yet) is reported through
/// [`ChannelError::is_transient`](crate::ChannelError::is_transient).
pub trait ChannelOpener: Send + Sync {
    /// Try once to open the channel.
    fn open(&self) -> Result<Box<dyn Channel>>;

    /// Human-readable address for logs and errors.
    fn address(&self) -> String;
}

impl<T: Channel + ?Sized> Channel for Box<T> {
    fn write(&self, frame: &[u8]) -> Result<usize> {
        (**self).write(frame)
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn bytes_available(&self) -> Result<usize> {
        (**self).bytes_available()
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }

    fn kind(&self) -> &'static str {
        (**self).kind()
    }
}

impl<T: ChannelOpener + ?Sized> ChannelOpener for Box<T> {
    fn open(&self) -> Result<Box<dyn Channel>> {
        (**self).open()
    }

    fn address(&self) -> String {
        (**self).address()
    }
}

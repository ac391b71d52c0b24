use std::io::ErrorKind;
use std::net::Shutdown;
use std::os::fd::AsRawFd;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{ChannelError, Result};
use crate::traits::{Channel, ChannelOpener};

/// Maximum socket path length.
/// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
#[cfg(target_os = "linux")]
const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const MAX_PATH_LEN: usize = 104;

/// Device channel over a connected, non-blocking Unix datagram socket.
///
/// Datagrams keep frame boundaries, so this satisfies the same contract as the
/// simulated duplex endpoint. The socket is bound to a local path and connected
/// to the peer's path; the local socket file is removed on drop if it is still
/// the one this channel created.
///
/// A connected datagram socket gets no notice when its peer goes away, so the
/// peer's socket file is remembered on [`UnixDatagramChannel::connect`]. Once
/// nothing is queued, [`Channel::bytes_available`] reports
/// [`ChannelError::Closed`] if that file is gone or has been replaced.
pub struct UnixDatagramChannel {
    socket: UnixDatagram,
    local_path: Option<PathBuf>,
    created_inode: Option<(u64, u64)>,
    peer: Mutex<Option<PeerIdentity>>,
    closed: AtomicBool,
}

#[derive(Debug, Clone)]
struct PeerIdentity {
    path: PathBuf,
    dev: u64,
    ino: u64,
}

impl PeerIdentity {
    fn capture(path: &Path) -> Option<Self> {
        let metadata = std::fs::symlink_metadata(path).ok()?;
        Some(Self {
            path: path.to_path_buf(),
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    fn is_present(&self) -> bool {
        std::fs::symlink_metadata(&self.path)
            .map(|m| m.file_type().is_socket() && m.dev() == self.dev && m.ino() == self.ino)
            .unwrap_or(false)
    }
}

impl UnixDatagramChannel {
    /// A connected pair of unnamed sockets, for in-process use.
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = UnixDatagram::pair()?;
        Ok((Self::from_socket(left, None, None)?, Self::from_socket(right, None, None)?))
    }

    /// Bind to `local` without connecting.
    ///
    /// An existing socket file at `local` is treated as stale and removed; any
    /// other kind of file is left alone and reported as a bind error.
    pub fn bind(local: impl AsRef<Path>) -> Result<Self> {
        let path = local.as_ref().to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes == 0 {
            return Err(ChannelError::InvalidArgument(
                "socket path must not be empty".to_string(),
            ));
        }
        if path_bytes >= MAX_PATH_LEN {
            return Err(ChannelError::PathTooLong {
                path,
                len: path_bytes,
                max: MAX_PATH_LEN,
            });
        }

        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path).map_err(|e| ChannelError::Bind {
                path: path.clone(),
                source: e,
            })?;
            if metadata.file_type().is_socket() {
                debug!(?path, "removing stale socket");
                std::fs::remove_file(&path).map_err(|e| ChannelError::Bind {
                    path: path.clone(),
                    source: e,
                })?;
            } else {
                return Err(ChannelError::Bind {
                    path: path.clone(),
                    source: std::io::Error::new(
                        ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                });
            }
        }

        let socket = UnixDatagram::bind(&path).map_err(|e| ChannelError::Bind {
            path: path.clone(),
            source: e,
        })?;
        let created = std::fs::symlink_metadata(&path).map_err(|e| ChannelError::Bind {
            path: path.clone(),
            source: e,
        })?;
        let inode = Some((created.dev(), created.ino()));

        debug!(?path, "bound unix datagram socket");
        Self::from_socket(socket, Some(path), inode)
    }

    /// Connect this socket to the peer bound at `peer`.
    ///
    /// Fails with [`ChannelError::Unavailable`] while the peer has not bound yet.
    pub fn connect(&self, peer: impl AsRef<Path>) -> Result<()> {
        let peer = peer.as_ref();
        self.socket
            .connect(peer)
            .map_err(|e| ChannelError::Unavailable {
                address: peer.display().to_string(),
                source: e,
            })?;
        *self.peer.lock() = PeerIdentity::capture(peer);
        info!(local = ?self.local_path, ?peer, "unix datagram channel connected");
        Ok(())
    }

    /// Bind to `local` and connect to `peer` in one step.
    pub fn bind_connect(local: impl AsRef<Path>, peer: impl AsRef<Path>) -> Result<Self> {
        let channel = Self::bind(local)?;
        channel.connect(peer)?;
        Ok(channel)
    }

    fn from_socket(
        socket: UnixDatagram,
        local_path: Option<PathBuf>,
        created_inode: Option<(u64, u64)>,
    ) -> Result<Self> {
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            local_path,
            created_inode,
            peer: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// The path this socket is bound to, if any.
    pub fn local_path(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        Ok(())
    }
}

impl Channel for UnixDatagramChannel {
    fn write(&self, frame: &[u8]) -> Result<usize> {
        self.check_open()?;
        match self.socket.send(frame) {
            Ok(n) => Ok(n),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(err) => Err(ChannelError::from_io(err)),
        }
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.check_open()?;
        match self.socket.recv(buf) {
            Ok(n) => Ok(n),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(err) => Err(ChannelError::from_io(err)),
        }
    }

    fn bytes_available(&self) -> Result<usize> {
        self.check_open()?;
        let mut pending: libc::c_int = 0;

        // SAFETY: `pending` is a valid writable c_int, which is what FIONREAD
        // stores into, and the descriptor is an open socket owned by `self`.
        let rc = unsafe { libc::ioctl(self.socket.as_raw_fd(), libc::FIONREAD, &mut pending) };
        if rc < 0 {
            return Err(ChannelError::from_io(std::io::Error::last_os_error()));
        }
        if pending > 0 {
            return Ok(pending as usize);
        }
        if let Some(peer) = self.peer.lock().as_ref() {
            if !peer.is_present() {
                debug!(path = ?peer.path, "peer socket vanished");
                return Err(ChannelError::Closed);
            }
        }
        Ok(0)
    }

    fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            match self.socket.shutdown(Shutdown::Both) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotConnected => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "unix-datagram"
    }
}

impl Drop for UnixDatagramChannel {
    fn drop(&mut self) {
        let (Some(path), Some((expected_dev, expected_ino))) =
            (&self.local_path, self.created_inode)
        else {
            return;
        };

        if let Ok(metadata) = std::fs::symlink_metadata(path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(?path, "cleaning up socket file");
                let _ = std::fs::remove_file(path);
            } else {
                debug!(?path, "socket path identity changed; skipping cleanup");
            }
        }
    }
}

impl std::fmt::Debug for UnixDatagramChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixDatagramChannel")
            .field("local_path", &self.local_path)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// [`ChannelOpener`] for a Unix datagram device.
///
/// The local socket is bound on the first attempt and kept across retries, so
/// two peers opening at the same time each find the other's path eventually.
pub struct UnixDatagramOpener {
    local: PathBuf,
    peer: PathBuf,
    bound: Mutex<Option<UnixDatagramChannel>>,
}

impl UnixDatagramOpener {
    pub fn new(local: impl Into<PathBuf>, peer: impl Into<PathBuf>) -> Self {
        Self {
            local: local.into(),
            peer: peer.into(),
            bound: Mutex::new(None),
        }
    }
}

impl ChannelOpener for UnixDatagramOpener {
    fn open(&self) -> Result<Box<dyn Channel>> {
        let mut bound = self.bound.lock();
        if bound.is_none() {
            *bound = Some(UnixDatagramChannel::bind(&self.local)?);
        }
        if let Some(channel) = bound.as_ref() {
            channel.connect(&self.peer)?;
        }
        match bound.take() {
            Some(channel) => Ok(Box::new(channel)),
            None => Err(ChannelError::Closed),
        }
    }

    fn address(&self) -> String {
        format!("{} -> {}", self.local.display(), self.peer.display())
    }
}

impl std::fmt::Debug for UnixDatagramOpener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixDatagramOpener")
            .field("local", &self.local)
            .field("peer", &self.peer)
            .finish()
    }
}

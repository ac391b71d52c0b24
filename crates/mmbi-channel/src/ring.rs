use parking_lot::Mutex;

use crate::error::{ChannelError, Result};

/// Default ring capacity: 1 MiB, enough to absorb bursts of full-size frames.
pub const DEFAULT_RING_CAPACITY: usize = 1024 * 1024;

/// Size of the length prefix stored in front of each record.
pub const RECORD_PREFIX_SIZE: usize = 4;

/// A fixed-capacity circular byte buffer carrying one direction of traffic.
///
/// `write` and `read` never block: a full buffer accepts 0 bytes and an empty
/// one yields 0 bytes. Every operation runs under the ring's own lock, which is
/// held only for the index and copy work.
pub struct RingChannel {
    capacity: usize,
    state: Mutex<RingState>,
}

/// Point-in-time view of the ring's cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingSnapshot {
    pub capacity: usize,
    pub write_cursor: usize,
    pub read_cursor: usize,
    pub count: usize,
}

struct RingState {
    storage: Box<[u8]>,
    write_cursor: usize,
    read_cursor: usize,
    // Authoritative fill level; cursors alone cannot tell full from empty.
    count: usize,
}

impl RingState {
    fn capacity(&self) -> usize {
        self.storage.len()
    }

    fn free(&self) -> usize {
        self.capacity() - self.count
    }

    fn put(&mut self, data: &[u8]) -> usize {
        let capacity = self.capacity();
        let n = data.len().min(self.free());
        if n == 0 {
            return 0;
        }

        let first = n.min(capacity - self.write_cursor);
        self.storage[self.write_cursor..self.write_cursor + first].copy_from_slice(&data[..first]);
        let second = n - first;
        if second > 0 {
            self.storage[..second].copy_from_slice(&data[first..n]);
        }

        self.write_cursor = (self.write_cursor + n) % capacity;
        self.count += n;
        n
    }

    /// Copy up to `buf.len()` queued bytes starting `offset` bytes past the read
    /// cursor, without consuming them.
    fn copy_out(&self, offset: usize, buf: &mut [u8]) -> usize {
        let capacity = self.capacity();
        let n = buf.len().min(self.count.saturating_sub(offset));
        if n == 0 {
            return 0;
        }

        let start = (self.read_cursor + offset) % capacity;
        let first = n.min(capacity - start);
        buf[..first].copy_from_slice(&self.storage[start..start + first]);
        let second = n - first;
        if second > 0 {
            buf[first..n].copy_from_slice(&self.storage[..second]);
        }
        n
    }

    fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.count);
        self.read_cursor = (self.read_cursor + n) % self.capacity();
        self.count -= n;
    }

    fn take(&mut self, buf: &mut [u8]) -> usize {
        let n = self.copy_out(0, buf);
        self.consume(n);
        n
    }

    fn peek_record_len(&self) -> Option<usize> {
        let mut prefix = [0u8; RECORD_PREFIX_SIZE];
        if self.copy_out(0, &mut prefix) < RECORD_PREFIX_SIZE {
            return None;
        }
        Some(u32::from_le_bytes(prefix) as usize)
    }
}

impl RingChannel {
    /// Create a ring with `capacity` bytes of backing storage.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ChannelError::InvalidArgument(
                "ring capacity must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            capacity,
            state: Mutex::new(RingState {
                storage: vec![0u8; capacity].into_boxed_slice(),
                write_cursor: 0,
                read_cursor: 0,
                count: 0,
            }),
        })
    }

    /// Write as much of `data` as fits.
    ///
    /// Returns the number of bytes written: `min(data.len(), free)`. A full ring
    /// returns 0; that is a signal, not an error.
    pub fn write(&self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }
        self.state.lock().put(data)
    }

    /// Read up to `buf.len()` bytes in FIFO order.
    ///
    /// Returns the number of bytes read: `min(buf.len(), count)`. An empty ring
    /// returns 0.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        self.state.lock().take(buf)
    }

    /// Store `frame` as one length-prefixed record, all or nothing.
    ///
    /// Returns `frame.len()` when the record landed and 0 when it does not fit
    /// in the free space right now (or `frame` is empty).
    pub fn write_record(&self, frame: &[u8]) -> usize {
        if frame.is_empty() || frame.len() > u32::MAX as usize {
            return 0;
        }

        let mut state = self.state.lock();
        if RECORD_PREFIX_SIZE + frame.len() > state.free() {
            return 0;
        }
        state.put(&(frame.len() as u32).to_le_bytes());
        state.put(frame);
        frame.len()
    }

    /// Pop the oldest record into `buf`.
    ///
    /// Returns the full record length, or `None` if no record is queued. Only
    /// `min(len, buf.len())` bytes are copied; the rest of an oversized record
    /// is discarded.
    pub fn read_record(&self, buf: &mut [u8]) -> Option<usize> {
        let mut state = self.state.lock();
        let len = state.peek_record_len()?;
        state.consume(RECORD_PREFIX_SIZE);
        let take = len.min(buf.len());
        state.copy_out(0, &mut buf[..take]);
        // Raw writes mixed into a record ring can leave a short tail.
        let queued = state.count;
        state.consume(len.min(queued));
        Some(len)
    }

    /// Length of the oldest queued record (0 when none).
    pub fn next_record_len(&self) -> usize {
        self.state.lock().peek_record_len().unwrap_or(0)
    }

    /// Bytes currently queued.
    pub fn len(&self) -> usize {
        self.state.lock().count
    }

    /// Whether no bytes are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes that can be written before the ring is full.
    pub fn free(&self) -> usize {
        self.state.lock().free()
    }

    /// Fixed capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cursor and fill level, read under the lock.
    pub fn snapshot(&self) -> RingSnapshot {
        let state = self.state.lock();
        RingSnapshot {
            capacity: self.capacity,
            write_cursor: state.write_cursor,
            read_cursor: state.read_cursor,
            count: state.count,
        }
    }
}

impl std::fmt::Debug for RingChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("RingChannel")
            .field("capacity", &snapshot.capacity)
            .field("write_cursor", &snapshot.write_cursor)
            .field("read_cursor", &snapshot.read_cursor)
            .field("count", &snapshot.count)
            .finish()
    }
}

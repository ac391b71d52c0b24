/// Errors that can occur while encoding, splitting or reassembling packets.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame is shorter than a packet header.
    #[error("truncated packet ({len} bytes, header needs {min})")]
    Truncated { len: usize, min: usize },

    /// The header carries a version this codec does not speak.
    #[error("unsupported header version {0}")]
    UnsupportedVersion(u8),

    /// A header field is out of its encodable range.
    #[error("{field} value {value} out of range (max {max})")]
    FieldOutOfRange {
        field: &'static str,
        value: u8,
        max: u8,
    },

    /// The frame size limit leaves no room for payload.
    #[error("frame size {size} too small (min {min})")]
    FrameTooSmall { size: usize, min: usize },

    /// A message exceeds the configured maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// A packet arrived out of sequence for its reassembly context.
    #[error("out-of-sequence packet from {src} tag {tag}: expected seq {expected}, got {got}")]
    OutOfSequence {
        src: u8,
        tag: u8,
        expected: u8,
        got: u8,
    },

    /// A middle or end packet arrived with no message in progress.
    #[error("orphan packet from {src} tag {tag} (no start of message)")]
    Orphan { src: u8, tag: u8 },

    /// Every reassembly slot is in use.
    #[error("reassembly contexts exhausted (max {max})")]
    ContextsExhausted { max: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;

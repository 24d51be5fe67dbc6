use thiserror::Error;

pub type Result<T, E = WireError> = std::result::Result<T, E>;

/// Errors raised by the wire codec
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// A read needed more bytes than remain in the input
    #[error("short buffer: needed {needed} bytes, {remaining} remaining")]
    ShortBuffer { needed: usize, remaining: usize },

    /// A write needed more room than remains in the output
    #[error("insufficient capacity: needed {needed} bytes, {remaining} available")]
    InsufficientCapacity { needed: usize, remaining: usize },

    /// `seek` targeted an offset outside the buffer
    #[error("seek to offset {offset} past end of {len} byte buffer")]
    SeekOutOfRange { offset: usize, len: usize },

    /// The bytes do not form a valid value of the requested type
    #[error("malformed value: {0}")]
    Malformed(&'static str),
}

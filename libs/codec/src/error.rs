//! Codec Error Types

use thiserror::Error;

/// Errors produced while encoding or decoding a byte stream.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The stream ended before a field could be read completely
    #[error("Short read: wanted {wanted} bytes, got {got}")]
    ShortRead { wanted: usize, got: usize },

    /// A length-prefixed field announces more bytes than the decoder allows
    #[error("Field of {size} bytes exceeds limit {limit}")]
    Oversize { size: usize, limit: usize },

    /// A decoded string field is not valid UTF-8
    #[error("Invalid UTF-8 in string field")]
    InvalidUtf8,

    /// A decoded boolean field holds something other than 0 or 1
    #[error("Invalid boolean byte {0:#04x}")]
    InvalidBool(u8),
}

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

impl CodecError {
    /// Get error category for diagnostics
    pub fn category(&self) -> &'static str {
        match self {
            CodecError::ShortRead { .. } => "short_read",
            CodecError::Oversize { .. } => "oversize",
            CodecError::InvalidUtf8 => "invalid_utf8",
            CodecError::InvalidBool(_) => "invalid_bool",
        }
    }
}

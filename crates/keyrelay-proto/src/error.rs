//! Protocol error types.

use thiserror::Error;

/// Errors from frame encoding and decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame body exceeds the size cap
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Claimed or actual body size
        size: usize,
        /// The configured cap
        max: usize,
    },

    /// CBOR serialization failed
    #[error("encode error: {0}")]
    Encode(String),

    /// CBOR deserialization failed (truncated, trailing bytes, wrong shape)
    #[error("decode error: {0}")]
    Decode(String),
}

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

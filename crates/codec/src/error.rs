//! Codec error types.

use std::io;
use thiserror::Error;

/// Errors raised while encoding or decoding packets.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Invalid frame received.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Frame too large.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge {
        /// Size of the frame.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Serialization failed.
    #[error("Failed to serialize packet: {0}")]
    Serialization(String),

    /// Deserialization failed.
    #[error("Failed to deserialize packet: {0}")]
    Deserialization(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

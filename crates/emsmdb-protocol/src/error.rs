//! Protocol error types.

use std::io;

use emsmdb_core::{MapiStatus, PropertyError};
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding Rop buffers.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The buffer ended before a complete value was read.
    #[error("truncated buffer while reading {what}")]
    Truncated { what: &'static str },

    /// Bytes were left over after the last expected field.
    #[error("{remaining} trailing bytes after {what}")]
    TrailingBytes {
        what: &'static str,
        remaining: usize,
    },

    /// The Rop identifier is not handled by this provider.
    #[error("unsupported rop 0x{0:02X}")]
    UnsupportedRop(u8),

    /// A property type or value could not be handled.
    #[error(transparent)]
    Property(#[from] PropertyError),

    /// A string or binary value does not fit its 16-bit length prefix.
    #[error("value too large: {size} bytes (max: {max})")]
    ValueTooLarge { size: usize, max: usize },

    /// The encoded property blob exceeds the reply limit.
    #[error("property blob too large: {size} bytes (max: {max})")]
    BlobTooLarge { size: usize, max: usize },

    /// A string value is not valid UTF-8 / UTF-16 or lacks its terminator.
    #[error("invalid string: {0}")]
    InvalidString(String),

    /// A flagged property row carries an unknown flag byte.
    #[error("invalid property flag 0x{0:02X}")]
    InvalidFlag(u8),

    /// The request body does not match its Rop identifier.
    #[error("request body does not match rop {0:?}")]
    BodyMismatch(crate::RopId),

    /// IO error while reading or writing a buffer.
    #[error("IO error: {0}")]
    Io(io::Error),
}

impl ProtocolError {
    /// Returns the protocol status code for this error.
    pub fn status(&self) -> MapiStatus {
        match self {
            Self::Property(e) => e.status(),
            Self::UnsupportedRop(_) => MapiStatus::NoSupport,
            Self::ValueTooLarge { .. } | Self::BlobTooLarge { .. } => {
                MapiStatus::NotEnoughResources
            }
            Self::Io(_) => MapiStatus::CallFailed,
            Self::Truncated { .. }
            | Self::TrailingBytes { .. }
            | Self::InvalidString(_)
            | Self::InvalidFlag(_)
            | Self::BodyMismatch(_) => MapiStatus::InvalidParameter,
        }
    }

    /// Maps a read error, turning an early end of buffer into `Truncated`.
    pub(crate) fn reading(what: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Self::Truncated { what }
            } else {
                Self::Io(e)
            }
        }
    }
}

impl From<io::Error> for ProtocolError {
    fn from(e: io::Error) -> Self {
        Self::reading("buffer")(e)
    }
}

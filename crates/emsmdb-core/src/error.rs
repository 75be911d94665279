//! Property model error types.

use thiserror::Error;

use crate::status::MapiStatus;

/// Result type for property model operations.
pub type PropertyResult<T> = Result<T, PropertyError>;

/// Errors raised while building or converting property values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PropertyError {
    /// The wire type code is not part of the supported catalogue.
    #[error("unsupported property type 0x{raw:04X}")]
    UnsupportedPropertyType { raw: u16 },

    /// A sequence element does not fit in a byte.
    #[error("binary array has bad value {value} at position {position}")]
    InvalidPropertyValue { position: usize, value: i64 },

    /// An integer does not fit the 32-bit property range.
    #[error("integer {value} is out of range for a 32-bit property")]
    IntegerOutOfRange { value: i64 },

    /// Text could not be parsed as a timestamp.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// The native value cannot be stored under the given property type.
    #[error("value of kind {kind} cannot be stored as property type 0x{raw:04X}")]
    Incompatible { kind: &'static str, raw: u16 },
}

impl PropertyError {
    /// Returns the protocol status code for this error.
    pub fn status(&self) -> MapiStatus {
        match self {
            Self::UnsupportedPropertyType { .. } => MapiStatus::UnsupportedPropertyType,
            Self::InvalidPropertyValue { .. }
            | Self::IntegerOutOfRange { .. }
            | Self::InvalidTimestamp(_) => MapiStatus::InvalidPropertyValue,
            Self::Incompatible { .. } => MapiStatus::InvalidType,
        }
    }
}

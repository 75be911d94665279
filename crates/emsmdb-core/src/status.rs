//! Protocol status codes.
//!
//! Every Rop reply carries a 32-bit status, and individual properties that
//! cannot be produced are replaced by one of these codes inside the property
//! blob.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A 32-bit protocol status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum MapiStatus {
    /// The operation succeeded.
    Success,
    /// The property or object does not exist.
    NotFound,
    /// The caller is not allowed to read or write the property.
    NoAccess,
    /// Malformed input.
    InvalidParameter,
    /// The provider context is missing.
    NotInitialized,
    /// The handle is not present in the session's handle table (ecNullObject).
    UnknownHandle,
    /// A value could not be converted (MAPI_E_BAD_VALUE).
    InvalidPropertyValue,
    /// The stored value does not fit the requested property type.
    InvalidType,
    /// The property type is outside the supported catalogue.
    UnsupportedPropertyType,
    /// The operation is not supported.
    NoSupport,
    /// A resource limit was reached.
    NotEnoughResources,
    /// Unspecified failure.
    CallFailed,
    /// Any code not listed above.
    Other(u32),
}

impl MapiStatus {
    /// Returns the 32-bit wire code.
    pub fn code(self) -> u32 {
        match self {
            Self::Success => 0x0000_0000,
            Self::NotFound => 0x8004_010F,
            Self::NoAccess => 0x8007_0005,
            Self::InvalidParameter => 0x8007_0057,
            Self::NotInitialized => 0x8004_0605,
            Self::UnknownHandle => 0x0000_04B9,
            Self::InvalidPropertyValue => 0x8004_0301,
            Self::InvalidType => 0x8004_0302,
            Self::UnsupportedPropertyType => 0x8004_0303,
            Self::NoSupport => 0x8004_0102,
            Self::NotEnoughResources => 0x8004_010E,
            Self::CallFailed => 0x8000_4005,
            Self::Other(code) => code,
        }
    }

    /// Maps a wire code back to a status.
    pub fn from_code(code: u32) -> Self {
        match code {
            0x0000_0000 => Self::Success,
            0x8004_010F => Self::NotFound,
            0x8007_0005 => Self::NoAccess,
            0x8007_0057 => Self::InvalidParameter,
            0x8004_0605 => Self::NotInitialized,
            0x0000_04B9 => Self::UnknownHandle,
            0x8004_0301 => Self::InvalidPropertyValue,
            0x8004_0302 => Self::InvalidType,
            0x8004_0303 => Self::UnsupportedPropertyType,
            0x8004_0102 => Self::NoSupport,
            0x8004_010E => Self::NotEnoughResources,
            0x8000_4005 => Self::CallFailed,
            other => Self::Other(other),
        }
    }

    /// Returns true for [`MapiStatus::Success`].
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Returns the symbolic name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "MAPI_E_SUCCESS",
            Self::NotFound => "MAPI_E_NOT_FOUND",
            Self::NoAccess => "MAPI_E_NO_ACCESS",
            Self::InvalidParameter => "MAPI_E_INVALID_PARAMETER",
            Self::NotInitialized => "MAPI_E_NOT_INITIALIZED",
            Self::UnknownHandle => "ecNullObject",
            Self::InvalidPropertyValue => "MAPI_E_BAD_VALUE",
            Self::InvalidType => "MAPI_E_INVALID_TYPE",
            Self::UnsupportedPropertyType => "MAPI_E_TYPE_NO_SUPPORT",
            Self::NoSupport => "MAPI_E_NO_SUPPORT",
            Self::NotEnoughResources => "MAPI_E_NOT_ENOUGH_RESOURCES",
            Self::CallFailed => "MAPI_E_CALL_FAILED",
            Self::Other(_) => "MAPI_E_UNKNOWN",
        }
    }
}

impl From<u32> for MapiStatus {
    fn from(code: u32) -> Self {
        Self::from_code(code)
    }
}

impl From<MapiStatus> for u32 {
    fn from(status: MapiStatus) -> Self {
        status.code()
    }
}

impl fmt::Display for MapiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.as_str(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for status in [
            MapiStatus::Success,
            MapiStatus::NotFound,
            MapiStatus::NoAccess,
            MapiStatus::InvalidParameter,
            MapiStatus::NotInitialized,
            MapiStatus::UnknownHandle,
            MapiStatus::InvalidPropertyValue,
            MapiStatus::InvalidType,
            MapiStatus::UnsupportedPropertyType,
            MapiStatus::NoSupport,
            MapiStatus::NotEnoughResources,
            MapiStatus::CallFailed,
        ] {
            assert_eq!(MapiStatus::from_code(status.code()), status);
        }
    }

    #[test]
    fn unknown_code_is_preserved() {
        let status = MapiStatus::from_code(0x1234);
        assert_eq!(status, MapiStatus::Other(0x1234));
        assert_eq!(status.code(), 0x1234);
    }

    #[test]
    fn display_includes_hex_code() {
        assert_eq!(
            MapiStatus::NotFound.to_string(),
            "MAPI_E_NOT_FOUND (0x8004010F)"
        );
    }

    #[test]
    fn serializes_as_number() {
        let json = serde_json::to_string(&MapiStatus::NoAccess).unwrap();
        assert_eq!(json, "2147942405");
        let parsed: MapiStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, MapiStatus::NoAccess);
    }
}

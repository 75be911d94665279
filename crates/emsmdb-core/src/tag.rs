//! Property tags and the wire type catalogue.
//!
//! A property tag is a 32-bit value: the high 16 bits carry the semantic
//! property ID and the low 16 bits the wire type.
//!
//! ```text
//! +------------------+------------------+
//! |  property id (16) |  wire type (16)  |
//! +------------------+------------------+
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PropertyError, PropertyResult};

/// The wire type of a property value.
///
/// The catalogue is closed: any other code is rejected with
/// [`PropertyError::UnsupportedPropertyType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Unspecified,
    Null,
    Integer,
    Double,
    ErrorPlaceholder,
    Boolean,
    Identifier64,
    NarrowString,
    WideString,
    Timestamp,
    Binary,
}

impl PropertyType {
    /// Returns the 16-bit wire code.
    pub fn code(self) -> u16 {
        match self {
            Self::Unspecified => 0x0000,
            Self::Null => 0x0001,
            Self::Integer => 0x0003,
            Self::Double => 0x0005,
            Self::ErrorPlaceholder => 0x000A,
            Self::Boolean => 0x000B,
            Self::Identifier64 => 0x0014,
            Self::NarrowString => 0x001E,
            Self::WideString => 0x001F,
            Self::Timestamp => 0x0040,
            Self::Binary => 0x0102,
        }
    }

    /// Looks up a wire code in the catalogue.
    pub fn from_code(raw: u16) -> PropertyResult<Self> {
        Ok(match raw {
            0x0000 => Self::Unspecified,
            0x0001 => Self::Null,
            0x0003 => Self::Integer,
            0x0005 => Self::Double,
            0x000A => Self::ErrorPlaceholder,
            0x000B => Self::Boolean,
            0x0014 => Self::Identifier64,
            0x001E => Self::NarrowString,
            0x001F => Self::WideString,
            0x0040 => Self::Timestamp,
            0x0102 => Self::Binary,
            _ => return Err(PropertyError::UnsupportedPropertyType { raw }),
        })
    }

    /// Returns true for the two text types.
    pub fn is_string(self) -> bool {
        matches!(self, Self::NarrowString | Self::WideString)
    }

    /// Returns the conventional MAPI name (`PT_LONG`, `PT_UNICODE`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "PT_UNSPECIFIED",
            Self::Null => "PT_NULL",
            Self::Integer => "PT_LONG",
            Self::Double => "PT_DOUBLE",
            Self::ErrorPlaceholder => "PT_ERROR",
            Self::Boolean => "PT_BOOLEAN",
            Self::Identifier64 => "PT_I8",
            Self::NarrowString => "PT_STRING8",
            Self::WideString => "PT_UNICODE",
            Self::Timestamp => "PT_SYSTIME",
            Self::Binary => "PT_BINARY",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A 32-bit property tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyTag(pub u32);

impl PropertyTag {
    /// Builds a tag from a property ID and a wire type.
    pub const fn new(id: u16, ty: u16) -> Self {
        Self(((id as u32) << 16) | ty as u32)
    }

    /// Builds a tag from a property ID and a catalogued type.
    pub fn from_parts(id: u16, ty: PropertyType) -> Self {
        Self::new(id, ty.code())
    }

    /// Returns the raw 32-bit value.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns the semantic property ID (high 16 bits).
    pub const fn id(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Returns the raw wire type (low 16 bits).
    pub const fn raw_type(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Returns the catalogued wire type.
    pub fn prop_type(self) -> PropertyResult<PropertyType> {
        PropertyType::from_code(self.raw_type())
    }

    /// Returns the same property ID with a different wire type.
    pub fn with_type(self, ty: PropertyType) -> Self {
        Self((self.0 & 0xFFFF_0000) | ty.code() as u32)
    }

    /// Returns the tag rewritten to the error placeholder type.
    pub fn to_error(self) -> Self {
        self.with_type(PropertyType::ErrorPlaceholder)
    }
}

impl From<u32> for PropertyTag {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<PropertyTag> for u32 {
    fn from(tag: PropertyTag) -> Self {
        tag.0
    }
}

impl fmt::Display for PropertyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Well-known property tags.
pub mod tags {
    use super::PropertyTag;

    pub const PR_MAPPING_SIGNATURE: PropertyTag = PropertyTag(0x0FF8_0102);
    pub const PR_IPM_PUBLIC_FOLDERS_ENTRYID: PropertyTag = PropertyTag(0x6631_0102);
    pub const PR_USER_ENTRYID: PropertyTag = PropertyTag(0x6619_0102);
    pub const PR_MAILBOX_OWNER_ENTRYID: PropertyTag = PropertyTag(0x661B_0102);
    pub const PR_MAILBOX_OWNER_NAME: PropertyTag = PropertyTag(0x661C_001E);
    pub const PR_MAILBOX_OWNER_NAME_UNICODE: PropertyTag = PropertyTag(0x661C_001F);

    pub const PR_FID: PropertyTag = PropertyTag(0x6748_0014);
    pub const PR_PARENT_FID: PropertyTag = PropertyTag(0x6749_0014);
    pub const PR_MID: PropertyTag = PropertyTag(0x674A_0014);

    pub const PR_DISPLAY_NAME: PropertyTag = PropertyTag(0x3001_001E);
    pub const PR_DISPLAY_NAME_UNICODE: PropertyTag = PropertyTag(0x3001_001F);
    pub const PR_SUBJECT: PropertyTag = PropertyTag(0x0037_001E);
    pub const PR_SUBJECT_UNICODE: PropertyTag = PropertyTag(0x0037_001F);

    pub const PR_FOLDER_TYPE: PropertyTag = PropertyTag(0x3601_0003);
    pub const PR_CONTENT_COUNT: PropertyTag = PropertyTag(0x3602_0003);
    pub const PR_ACCESS_LEVEL: PropertyTag = PropertyTag(0x0FF7_0003);

    pub const PR_MESSAGE_FLAGS: PropertyTag = PropertyTag(0x0E07_0003);
    pub const PR_MESSAGE_DELIVERY_TIME: PropertyTag = PropertyTag(0x0E06_0040);
    pub const PR_HASATTACH: PropertyTag = PropertyTag(0x0E1B_000B);

    pub const PR_BODY_UNICODE: PropertyTag = PropertyTag(0x1000_001F);
    pub const PR_RTF_COMPRESSED: PropertyTag = PropertyTag(0x1009_0102);
    pub const PR_HTML: PropertyTag = PropertyTag(0x1013_0102);
    pub const PR_MSG_EDITOR_FORMAT: PropertyTag = PropertyTag(0x5909_0003);

    /// Tags whose presence in a request forces the flagged reply layout.
    pub const LAYOUT_SENSITIVE: [PropertyTag; 2] =
        [PR_MAPPING_SIGNATURE, PR_IPM_PUBLIC_FOLDERS_ENTRYID];

    /// Returns true if `tag` forces the flagged reply layout.
    pub fn is_layout_sensitive(tag: PropertyTag) -> bool {
        LAYOUT_SENSITIVE.contains(&tag)
    }
}

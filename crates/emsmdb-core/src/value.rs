//! Typed property values.
//!
//! This module provides:
//! - [`PropertyValue`]: the tagged union stored in property bags and encoded
//!   on the wire
//! - [`NativeValue`]: the loosely typed values application code hands in
//!   (integers, text, byte sequences, ...)
//! - [`check_compatible`]: the rule deciding which native values may be
//!   written under which wire type

use serde::{Deserialize, Serialize};

use crate::error::{PropertyError, PropertyResult};
use crate::ids::id_to_string;
use crate::status::MapiStatus;
use crate::tag::{PropertyTag, PropertyType};
use crate::time::FileTime;

/// A typed property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Integer(i32),
    Double(f64),
    Boolean(bool),
    NarrowString(String),
    WideString(String),
    Identifier64(u64),
    Binary(Vec<u8>),
    Timestamp(FileTime),
    /// An error code standing in for a value.
    Error(MapiStatus),
    /// The property was requested but has no value.
    Absent,
}

impl PropertyValue {
    /// Returns the wire type of this value.
    ///
    /// `Absent` has no wire representation of its own and reports
    /// [`PropertyType::Null`].
    pub fn prop_type(&self) -> PropertyType {
        match self {
            Self::Integer(_) => PropertyType::Integer,
            Self::Double(_) => PropertyType::Double,
            Self::Boolean(_) => PropertyType::Boolean,
            Self::NarrowString(_) => PropertyType::NarrowString,
            Self::WideString(_) => PropertyType::WideString,
            Self::Identifier64(_) => PropertyType::Identifier64,
            Self::Binary(_) => PropertyType::Binary,
            Self::Timestamp(_) => PropertyType::Timestamp,
            Self::Error(_) => PropertyType::ErrorPlaceholder,
            Self::Absent => PropertyType::Null,
        }
    }

    /// Checks the discriminant against the tag's wire type.
    ///
    /// `Error` and `Absent` may stand in for any tag.
    pub fn fits(&self, tag: PropertyTag) -> bool {
        match self {
            Self::Error(_) | Self::Absent => true,
            other => other.prop_type().code() == tag.raw_type(),
        }
    }

    /// Returns true for [`PropertyValue::Absent`].
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Returns the text of a narrow or wide string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::NarrowString(s) | Self::WideString(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer payload.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the 64-bit identifier payload.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Identifier64(v) => Some(*v),
            _ => None,
        }
    }

    /// Re-tags text as narrow or wide. Non-text values are returned unchanged.
    pub fn with_string_width(self, ty: PropertyType) -> Self {
        match (self, ty) {
            (Self::NarrowString(s) | Self::WideString(s), PropertyType::NarrowString) => {
                Self::NarrowString(s)
            }
            (Self::NarrowString(s) | Self::WideString(s), PropertyType::WideString) => {
                Self::WideString(s)
            }
            (other, _) => other,
        }
    }

    /// Renders the value for application code.
    pub fn to_native(&self) -> NativeValue {
        match self {
            Self::Integer(v) => NativeValue::Integer(*v as i64),
            Self::Double(v) => NativeValue::Double(*v),
            Self::Boolean(v) => NativeValue::Boolean(*v),
            Self::NarrowString(s) | Self::WideString(s) => NativeValue::Text(s.clone()),
            Self::Identifier64(id) => NativeValue::Text(id_to_string(*id)),
            Self::Binary(bytes) => {
                NativeValue::Sequence(bytes.iter().map(|b| i64::from(*b)).collect())
            }
            Self::Timestamp(ft) => match ft.to_date_string() {
                Some(date) => NativeValue::Text(date),
                None => NativeValue::Null,
            },
            Self::Error(_) | Self::Absent => NativeValue::Null,
        }
    }
}

/// A value as supplied by application code.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Integer(i64),
    Double(f64),
    Boolean(bool),
    Text(String),
    Sequence(Vec<i64>),
    /// Anything else (objects, resources); never compatible.
    Object,
}

impl NativeValue {
    /// Returns a short name of the value's kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Double(_) => "double",
            Self::Boolean(_) => "boolean",
            Self::Text(_) => "text",
            Self::Sequence(_) => "sequence",
            Self::Object => "object",
        }
    }

    /// Converts into a property value for `tag`.
    ///
    /// The value must pass [`check_compatible`] against the tag's type.
    /// `Null` converts to [`PropertyValue::Absent`].
    pub fn into_property_value(self, tag: PropertyTag) -> PropertyResult<PropertyValue> {
        let ty = tag.prop_type()?;
        if !check_compatible(&self, ty)? {
            return Err(PropertyError::Incompatible {
                kind: self.kind(),
                raw: ty.code(),
            });
        }

        Ok(match (self, ty) {
            (Self::Null, _) => PropertyValue::Absent,
            (Self::Integer(v), _) => PropertyValue::Integer(
                i32::try_from(v).map_err(|_| PropertyError::IntegerOutOfRange { value: v })?,
            ),
            (Self::Double(v), _) => PropertyValue::Double(v),
            (Self::Boolean(v), _) => PropertyValue::Boolean(v),
            (Self::Text(s), PropertyType::Timestamp) => {
                PropertyValue::Timestamp(FileTime::parse(&s)?)
            }
            (Self::Text(s), PropertyType::NarrowString) => PropertyValue::NarrowString(s),
            (Self::Text(s), _) => PropertyValue::WideString(s),
            // Range already checked by check_compatible.
            (Self::Sequence(items), _) => {
                PropertyValue::Binary(items.into_iter().map(|b| b as u8).collect())
            }
            (Self::Object, _) => {
                return Err(PropertyError::Incompatible {
                    kind: "object",
                    raw: ty.code(),
                });
            }
        })
    }
}

impl From<i64> for NativeValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for NativeValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for NativeValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for NativeValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for NativeValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<i64>> for NativeValue {
    fn from(v: Vec<i64>) -> Self {
        Self::Sequence(v)
    }
}

/// Decides whether `value` may be written under wire type `ty`.
///
/// | native   | compatible wire types                   |
/// |----------|-----------------------------------------|
/// | null     | any                                     |
/// | integer  | Integer                                 |
/// | double   | Double                                  |
/// | boolean  | Boolean                                 |
/// | text     | NarrowString, WideString, Timestamp     |
/// | sequence | Binary, every element in `0..=255`      |
///
/// A sequence checked against Binary fails on its first out-of-range element
/// with [`PropertyError::InvalidPropertyValue`].
pub fn check_compatible(value: &NativeValue, ty: PropertyType) -> PropertyResult<bool> {
    Ok(match value {
        NativeValue::Null => true,
        NativeValue::Integer(_) => ty == PropertyType::Integer,
        NativeValue::Double(_) => ty == PropertyType::Double,
        NativeValue::Boolean(_) => ty == PropertyType::Boolean,
        NativeValue::Text(_) => matches!(
            ty,
            PropertyType::NarrowString | PropertyType::WideString | PropertyType::Timestamp
        ),
        NativeValue::Sequence(items) => {
            if ty != PropertyType::Binary {
                return Ok(false);
            }
            if let Some((position, &value)) = items
                .iter()
                .enumerate()
                .find(|(_, v)| !(0..=255).contains(*v))
            {
                return Err(PropertyError::InvalidPropertyValue { position, value });
            }
            true
        }
        NativeValue::Object => false,
    })
}

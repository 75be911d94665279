//! Property value wire codec.
//!
//! Property values are written back to back into a blob, in the order the
//! caller requested them. All integers are little-endian:
//!
//! ```text
//! Integer       i32                         (4)
//! Double        f64                         (8)
//! Boolean       u8                          (1)
//! Identifier64  u64                         (8)
//! Timestamp     low u32 | high u32          (8)
//! Error         u32 status                  (4)
//! NarrowString  len u16 | UTF-8 bytes | 00  (2 + len)
//! WideString    len u16 | UTF-16LE | 00 00  (2 + len)
//! Binary        cb u16  | bytes             (2 + cb)
//! ```
//!
//! When the blob uses the flagged layout, each value is preceded by one flag
//! byte: `0x00` for a value, `0x0A` for an error. A decoder also accepts
//! `0x01`, a property that is not present, which carries no payload.
//!
//! A property that cannot be produced never fails the whole blob: its tag is
//! rewritten to the error type and a status code is written in its place.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use emsmdb_core::{FileTime, MapiStatus, PropertyTag, PropertyType, PropertyValue, tags};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{ProtocolError, ProtocolResult};

/// Flag byte preceding a value in the flagged layout.
pub const FLAG_VALUE: u8 = 0x00;

/// Flag byte marking a property that is not present.
pub const FLAG_NOT_PRESENT: u8 = 0x01;

/// Flag byte preceding an error code in the flagged layout.
pub const FLAG_ERROR: u8 = 0x0A;

/// Largest string or binary payload a 16-bit length prefix can describe.
pub const MAX_VALUE_SIZE: usize = u16::MAX as usize;

/// One property as it ended up in a reply.
///
/// `tag` is the tag actually written: for errors its type has been rewritten
/// to the error placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyEntry {
    /// Tag as written into the reply.
    pub tag: PropertyTag,
    /// The value, or the status substituted for it.
    pub outcome: Result<PropertyValue, MapiStatus>,
}

impl PropertyEntry {
    /// Returns the substituted status, if any.
    pub fn error(&self) -> Option<MapiStatus> {
        self.outcome.as_ref().err().copied()
    }

    /// Returns the value, if one was produced.
    pub fn value(&self) -> Option<&PropertyValue> {
        self.outcome.as_ref().ok()
    }
}

/// An encoded property blob for one reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyBlob {
    layout: bool,
    data: Vec<u8>,
    error_count: usize,
}

impl PropertyBlob {
    /// Creates an empty blob. The layout flag is fixed for its lifetime.
    pub fn new(layout: bool) -> Self {
        Self {
            layout,
            data: Vec::new(),
            error_count: 0,
        }
    }

    /// Returns true if values are preceded by flag bytes.
    pub fn layout(&self) -> bool {
        self.layout
    }

    /// Returns the encoded bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the encoded length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if nothing has been encoded.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the number of error placeholders written.
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Returns true if any property was replaced by an error.
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    /// Consumes the blob, returning the encoded bytes.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    fn push_value(&mut self, bytes: &[u8]) {
        if self.layout {
            self.data.push(FLAG_VALUE);
        }
        self.data.extend_from_slice(bytes);
    }

    fn push_error(&mut self, status: MapiStatus) {
        if self.layout {
            self.data.push(FLAG_ERROR);
        }
        self.data.extend_from_slice(&status.code().to_le_bytes());
        self.error_count += 1;
    }
}

/// Returns true if any requested tag forces the flagged layout.
pub fn requires_layout(requested: &[PropertyTag]) -> bool {
    requested.iter().any(|tag| tags::is_layout_sensitive(*tag))
}

/// Appends `value` for `tag` to `blob`.
///
/// Absent values become `NotFound`, explicit errors keep their code, and a
/// value whose kind does not match the tag's declared type becomes
/// `InvalidType`. Strings and binaries too long for their length prefix
/// become `NotEnoughResources`. Returns the entry actually written.
pub fn encode_property(
    tag: PropertyTag,
    value: &PropertyValue,
    blob: &mut PropertyBlob,
) -> PropertyEntry {
    let substitute = match value {
        PropertyValue::Absent => Some(MapiStatus::NotFound),
        PropertyValue::Error(status) => Some(*status),
        v if !v.fits(tag) => Some(MapiStatus::InvalidType),
        _ => None,
    };

    if let Some(status) = substitute {
        return encode_error(tag, status, blob);
    }

    let mut bytes = Vec::new();
    match write_value(value, &mut bytes) {
        Ok(()) => {
            blob.push_value(&bytes);
            PropertyEntry {
                tag,
                outcome: Ok(value.clone()),
            }
        }
        Err(e) => {
            trace!(tag = %tag, error = %e, "Value could not be encoded");
            encode_error(tag, e.status(), blob)
        }
    }
}

/// Appends an error placeholder for `tag` to `blob`.
pub fn encode_error(
    tag: PropertyTag,
    status: MapiStatus,
    blob: &mut PropertyBlob,
) -> PropertyEntry {
    blob.push_error(status);
    PropertyEntry {
        tag: tag.to_error(),
        outcome: Err(status),
    }
}

/// Writes the bare wire form of `value`.
pub fn write_value(value: &PropertyValue, out: &mut Vec<u8>) -> ProtocolResult<()> {
    match value {
        PropertyValue::Integer(v) => out.write_i32::<LittleEndian>(*v)?,
        PropertyValue::Double(v) => out.write_f64::<LittleEndian>(*v)?,
        PropertyValue::Boolean(v) => out.write_u8(u8::from(*v))?,
        PropertyValue::Identifier64(v) => out.write_u64::<LittleEndian>(*v)?,
        PropertyValue::Timestamp(ft) => {
            out.write_u32::<LittleEndian>(ft.low)?;
            out.write_u32::<LittleEndian>(ft.high)?;
        }
        PropertyValue::Error(status) => out.write_u32::<LittleEndian>(status.code())?,
        PropertyValue::NarrowString(s) => {
            out.write_u16::<LittleEndian>(length_prefix(s.len() + 1)?)?;
            out.extend_from_slice(s.as_bytes());
            out.push(0);
        }
        PropertyValue::WideString(s) => {
            let units: Vec<u16> = s.encode_utf16().collect();
            out.write_u16::<LittleEndian>(length_prefix((units.len() + 1) * 2)?)?;
            for unit in units {
                out.write_u16::<LittleEndian>(unit)?;
            }
            out.write_u16::<LittleEndian>(0)?;
        }
        PropertyValue::Binary(bytes) => {
            out.write_u16::<LittleEndian>(length_prefix(bytes.len())?)?;
            out.extend_from_slice(bytes);
        }
        PropertyValue::Absent => {}
    }
    Ok(())
}

fn length_prefix(size: usize) -> ProtocolResult<u16> {
    u16::try_from(size).map_err(|_| ProtocolError::ValueTooLarge {
        size,
        max: MAX_VALUE_SIZE,
    })
}

/// Reads one bare value of `tag`'s type.
pub fn decode_property(
    tag: PropertyTag,
    reader: &mut Cursor<&[u8]>,
) -> ProtocolResult<PropertyValue> {
    let eof = ProtocolError::reading;
    Ok(match tag.prop_type()? {
        PropertyType::Unspecified | PropertyType::Null => PropertyValue::Absent,
        PropertyType::Integer => {
            PropertyValue::Integer(reader.read_i32::<LittleEndian>().map_err(eof("integer"))?)
        }
        PropertyType::Double => {
            PropertyValue::Double(reader.read_f64::<LittleEndian>().map_err(eof("double"))?)
        }
        PropertyType::Boolean => {
            PropertyValue::Boolean(reader.read_u8().map_err(eof("boolean"))? != 0)
        }
        PropertyType::Identifier64 => {
            let id = reader
                .read_u64::<LittleEndian>()
                .map_err(eof("identifier"))?;
            PropertyValue::Identifier64(id)
        }
        PropertyType::Timestamp => {
            let low = reader.read_u32::<LittleEndian>().map_err(eof("timestamp"))?;
            let high = reader.read_u32::<LittleEndian>().map_err(eof("timestamp"))?;
            PropertyValue::Timestamp(FileTime::new(low, high))
        }
        PropertyType::ErrorPlaceholder => {
            let code = reader
                .read_u32::<LittleEndian>()
                .map_err(eof("error code"))?;
            PropertyValue::Error(MapiStatus::from_code(code))
        }
        PropertyType::NarrowString => {
            let bytes = read_prefixed(reader, "narrow string")?;
            let (terminator, text) = bytes
                .split_last()
                .ok_or_else(|| ProtocolError::InvalidString("missing terminator".into()))?;
            if *terminator != 0 {
                return Err(ProtocolError::InvalidString("missing terminator".into()));
            }
            PropertyValue::NarrowString(
                String::from_utf8(text.to_vec())
                    .map_err(|e| ProtocolError::InvalidString(e.to_string()))?,
            )
        }
        PropertyType::WideString => {
            let bytes = read_prefixed(reader, "wide string")?;
            if bytes.len() < 2 || bytes.len() % 2 != 0 {
                return Err(ProtocolError::InvalidString(format!(
                    "odd UTF-16 length {}",
                    bytes.len()
                )));
            }
            let mut units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            if units.pop() != Some(0) {
                return Err(ProtocolError::InvalidString("missing terminator".into()));
            }
            PropertyValue::WideString(
                String::from_utf16(&units)
                    .map_err(|e| ProtocolError::InvalidString(e.to_string()))?,
            )
        }
        PropertyType::Binary => PropertyValue::Binary(read_prefixed(reader, "binary")?),
    })
}

fn read_prefixed(reader: &mut Cursor<&[u8]>, what: &'static str) -> ProtocolResult<Vec<u8>> {
    let len = reader
        .read_u16::<LittleEndian>()
        .map_err(ProtocolError::reading(what))? as usize;
    let mut bytes = vec![0u8; len];
    reader
        .read_exact(&mut bytes)
        .map_err(ProtocolError::reading(what))?;
    Ok(bytes)
}

/// Decodes a whole blob given the tags written into the reply.
///
/// Tags of the error type, and values flagged `0x0A` in the flagged layout,
/// are read as status codes.
pub fn decode_property_blob(
    reply_tags: &[PropertyTag],
    layout: bool,
    data: &[u8],
) -> ProtocolResult<Vec<PropertyEntry>> {
    let mut reader = Cursor::new(data);
    let mut entries = Vec::with_capacity(reply_tags.len());

    for &tag in reply_tags {
        let flag = if layout {
            reader.read_u8().map_err(ProtocolError::reading("flag"))?
        } else {
            FLAG_VALUE
        };

        let entry = match flag {
            FLAG_NOT_PRESENT => PropertyEntry {
                tag: tag.to_error(),
                outcome: Err(MapiStatus::NotFound),
            },
            FLAG_ERROR => read_error(tag, &mut reader)?,
            FLAG_VALUE if tag.raw_type() == PropertyType::ErrorPlaceholder.code() => {
                read_error(tag, &mut reader)?
            }
            FLAG_VALUE => PropertyEntry {
                tag,
                outcome: Ok(decode_property(tag, &mut reader)?),
            },
            other => return Err(ProtocolError::InvalidFlag(other)),
        };
        entries.push(entry);
    }

    let remaining = data.len() - reader.position() as usize;
    if remaining > 0 {
        return Err(ProtocolError::TrailingBytes {
            what: "property blob",
            remaining,
        });
    }
    Ok(entries)
}

fn read_error(tag: PropertyTag, reader: &mut Cursor<&[u8]>) -> ProtocolResult<PropertyEntry> {
    let code = reader
        .read_u32::<LittleEndian>()
        .map_err(ProtocolError::reading("error code"))?;
    Ok(PropertyEntry {
        tag: tag.to_error(),
        outcome: Err(MapiStatus::from_code(code)),
    })
}

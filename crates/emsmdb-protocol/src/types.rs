//! Request and reply types for the Rop buffers handled by the provider.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use emsmdb_core::{MapiStatus, PropertyTag};
use serde::{Deserialize, Serialize};

use crate::codec::{PropertyBlob, PropertyEntry, decode_property_blob};
use crate::error::{ProtocolError, ProtocolResult};

/// Largest property blob a GetPropertiesSpecific reply can carry.
pub const MAX_PROPERTY_BLOB: usize = u16::MAX as usize;

/// Size of an error-only reply: rop id, handle index and status.
pub const ERROR_REPLY_SIZE: usize = 6;

/// Rop identifiers handled by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RopId {
    /// Release a handle.
    Release,
    /// Read a list of properties from an object.
    GetPropertiesSpecific,
}

impl RopId {
    /// Returns the wire identifier.
    pub fn code(self) -> u8 {
        match self {
            Self::Release => 0x01,
            Self::GetPropertiesSpecific => 0x07,
        }
    }

    /// Looks up a wire identifier.
    pub fn from_code(code: u8) -> ProtocolResult<Self> {
        match code {
            0x01 => Ok(Self::Release),
            0x07 => Ok(Self::GetPropertiesSpecific),
            other => Err(ProtocolError::UnsupportedRop(other)),
        }
    }
}

/// Body of a GetPropertiesSpecific request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetPropertiesRequest {
    /// Client-side size limit for individual values.
    pub property_size_limit: u16,
    /// Non-zero if the client prefers wide strings.
    pub want_unicode: u16,
    /// Requested tags, in order.
    pub tags: Vec<PropertyTag>,
}

impl GetPropertiesRequest {
    /// Creates a request for `tags` with no size limit preference.
    pub fn new(tags: Vec<PropertyTag>) -> Self {
        Self {
            property_size_limit: 0,
            want_unicode: 0,
            tags,
        }
    }

    /// Sets the wide-string preference.
    pub fn want_unicode(mut self, want: bool) -> Self {
        self.want_unicode = u16::from(want);
        self
    }

    /// Sets the per-value size limit.
    pub fn property_size_limit(mut self, limit: u16) -> Self {
        self.property_size_limit = limit;
        self
    }

    /// Returns true if the client prefers wide strings.
    pub fn wants_unicode(&self) -> bool {
        self.want_unicode != 0
    }

    fn read_from(reader: &mut Cursor<&[u8]>) -> ProtocolResult<Self> {
        let property_size_limit = reader
            .read_u16::<LittleEndian>()
            .map_err(ProtocolError::reading("property size limit"))?;
        let want_unicode = reader
            .read_u16::<LittleEndian>()
            .map_err(ProtocolError::reading("want unicode"))?;
        let tags = read_tags(reader)?;
        Ok(Self {
            property_size_limit,
            want_unicode,
            tags,
        })
    }

    fn write_to(&self, out: &mut Vec<u8>) -> ProtocolResult<()> {
        out.write_u16::<LittleEndian>(self.property_size_limit)?;
        out.write_u16::<LittleEndian>(self.want_unicode)?;
        let count = u16::try_from(self.tags.len()).map_err(|_| ProtocolError::ValueTooLarge {
            size: self.tags.len(),
            max: u16::MAX as usize,
        })?;
        out.write_u16::<LittleEndian>(count)?;
        for tag in &self.tags {
            out.write_u32::<LittleEndian>(tag.raw())?;
        }
        Ok(())
    }
}

fn read_tags(reader: &mut Cursor<&[u8]>) -> ProtocolResult<Vec<PropertyTag>> {
    let count = reader
        .read_u16::<LittleEndian>()
        .map_err(ProtocolError::reading("property count"))?;
    (0..count)
        .map(|_| {
            reader
                .read_u32::<LittleEndian>()
                .map(PropertyTag)
                .map_err(ProtocolError::reading("property tag"))
        })
        .collect()
}

/// Decodes a counted tag list (`u16` count, then `u32` tags).
///
/// Order is preserved and the buffer must be consumed exactly.
pub fn decode_requested_tags(bytes: &[u8]) -> ProtocolResult<Vec<PropertyTag>> {
    let mut reader = Cursor::new(bytes);
    let tags = read_tags(&mut reader)?;
    ensure_consumed(&reader, "tag list")?;
    Ok(tags)
}

fn ensure_consumed(reader: &Cursor<&[u8]>, what: &'static str) -> ProtocolResult<()> {
    let remaining = reader.get_ref().len() - reader.position() as usize;
    if remaining > 0 {
        return Err(ProtocolError::TrailingBytes { what, remaining });
    }
    Ok(())
}

/// Rop-specific request data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RopRequestBody {
    /// Release carries nothing beyond the handle index.
    Release,
    /// GetPropertiesSpecific request data.
    GetPropertiesSpecific(GetPropertiesRequest),
}

/// One Rop request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RopRequest {
    /// Rop identifier.
    pub rop_id: RopId,
    /// Logon the request belongs to.
    pub logon_id: u8,
    /// Index into the handle array passed alongside the request.
    pub handle_idx: u8,
    /// Rop-specific data.
    pub body: RopRequestBody,
}

impl RopRequest {
    /// Creates a GetPropertiesSpecific request.
    pub fn get_properties(logon_id: u8, handle_idx: u8, request: GetPropertiesRequest) -> Self {
        Self {
            rop_id: RopId::GetPropertiesSpecific,
            logon_id,
            handle_idx,
            body: RopRequestBody::GetPropertiesSpecific(request),
        }
    }

    /// Creates a Release request.
    pub fn release(logon_id: u8, handle_idx: u8) -> Self {
        Self {
            rop_id: RopId::Release,
            logon_id,
            handle_idx,
            body: RopRequestBody::Release,
        }
    }

    /// Checks that the body belongs to the rop id.
    pub fn check_body(&self) -> ProtocolResult<()> {
        let matches = matches!(
            (self.rop_id, &self.body),
            (RopId::Release, RopRequestBody::Release)
                | (
                    RopId::GetPropertiesSpecific,
                    RopRequestBody::GetPropertiesSpecific(_)
                )
        );
        if matches {
            Ok(())
        } else {
            Err(ProtocolError::BodyMismatch(self.rop_id))
        }
    }

    /// Decodes exactly one request.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let mut reader = Cursor::new(bytes);
        let request = Self::read_from(&mut reader)?;
        ensure_consumed(&reader, "rop request")?;
        Ok(request)
    }

    /// Decodes a buffer of back-to-back requests.
    pub fn decode_batch(bytes: &[u8]) -> ProtocolResult<Vec<Self>> {
        let mut reader = Cursor::new(bytes);
        let mut requests = Vec::new();
        while (reader.position() as usize) < bytes.len() {
            requests.push(Self::read_from(&mut reader)?);
        }
        Ok(requests)
    }

    fn read_from(reader: &mut Cursor<&[u8]>) -> ProtocolResult<Self> {
        let rop_id = RopId::from_code(reader.read_u8().map_err(ProtocolError::reading("rop id"))?)?;
        let logon_id = reader
            .read_u8()
            .map_err(ProtocolError::reading("logon id"))?;
        let handle_idx = reader
            .read_u8()
            .map_err(ProtocolError::reading("handle index"))?;
        let body = match rop_id {
            RopId::Release => RopRequestBody::Release,
            RopId::GetPropertiesSpecific => {
                RopRequestBody::GetPropertiesSpecific(GetPropertiesRequest::read_from(reader)?)
            }
        };
        Ok(Self {
            rop_id,
            logon_id,
            handle_idx,
            body,
        })
    }

    /// Encodes the request.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        self.check_body()?;
        let mut out = vec![self.rop_id.code(), self.logon_id, self.handle_idx];
        if let RopRequestBody::GetPropertiesSpecific(request) = &self.body {
            request.write_to(&mut out)?;
        }
        Ok(out)
    }
}

/// Body of a successful GetPropertiesSpecific reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetPropertiesReply {
    /// True if each value is preceded by a flag byte.
    pub layout: bool,
    /// Entries as written, in request order. Empty after a wire decode.
    pub entries: Vec<PropertyEntry>,
    /// Encoded property blob.
    pub prop_data: Vec<u8>,
}

impl GetPropertiesReply {
    /// Builds a reply body from an encoded blob.
    pub fn from_blob(blob: PropertyBlob, entries: Vec<PropertyEntry>) -> Self {
        Self {
            layout: blob.layout(),
            entries,
            prop_data: blob.into_data(),
        }
    }

    /// Returns the tags written into the reply.
    pub fn reply_tags(&self) -> Vec<PropertyTag> {
        self.entries.iter().map(|e| e.tag).collect()
    }

    /// Decodes `prop_data` given the tags the client asked for.
    pub fn decode_entries(&self, tags: &[PropertyTag]) -> ProtocolResult<Vec<PropertyEntry>> {
        decode_property_blob(tags, self.layout, &self.prop_data)
    }
}

/// Rop-specific reply data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RopReplyBody {
    /// No data beyond the status.
    Empty,
    /// GetPropertiesSpecific reply data.
    GetPropertiesSpecific(GetPropertiesReply),
}

/// One Rop reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RopReply {
    /// Rop identifier, copied from the request.
    pub rop_id: RopId,
    /// Handle index, copied from the request.
    pub handle_idx: u8,
    /// Status of the call.
    pub error_code: MapiStatus,
    /// Rop-specific data, only present on success.
    pub body: RopReplyBody,
}

impl RopReply {
    /// Creates a successful reply.
    pub fn success(rop_id: RopId, handle_idx: u8, body: RopReplyBody) -> Self {
        Self {
            rop_id,
            handle_idx,
            error_code: MapiStatus::Success,
            body,
        }
    }

    /// Creates an error-only reply.
    pub fn error(rop_id: RopId, handle_idx: u8, status: MapiStatus) -> Self {
        Self {
            rop_id,
            handle_idx,
            error_code: status,
            body: RopReplyBody::Empty,
        }
    }

    /// Returns true if the call succeeded.
    pub fn is_success(&self) -> bool {
        self.error_code.is_success()
    }

    /// Returns the GetPropertiesSpecific body, if any.
    pub fn properties(&self) -> Option<&GetPropertiesReply> {
        match &self.body {
            RopReplyBody::GetPropertiesSpecific(reply) => Some(reply),
            RopReplyBody::Empty => None,
        }
    }

    /// Returns the encoded size of the reply.
    pub fn wire_size(&self) -> usize {
        match (&self.body, self.is_success()) {
            (RopReplyBody::GetPropertiesSpecific(reply), true) => {
                ERROR_REPLY_SIZE + 1 + 2 + reply.prop_data.len()
            }
            _ => ERROR_REPLY_SIZE,
        }
    }

    /// Encodes the reply.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.wire_size());
        out.write_u8(self.rop_id.code())?;
        out.write_u8(self.handle_idx)?;
        out.write_u32::<LittleEndian>(self.error_code.code())?;
        if let (RopReplyBody::GetPropertiesSpecific(reply), true) = (&self.body, self.is_success()) {
            let len = u16::try_from(reply.prop_data.len()).map_err(|_| {
                ProtocolError::BlobTooLarge {
                    size: reply.prop_data.len(),
                    max: MAX_PROPERTY_BLOB,
                }
            })?;
            out.write_u8(u8::from(reply.layout))?;
            out.write_u16::<LittleEndian>(len)?;
            out.extend_from_slice(&reply.prop_data);
        }
        Ok(out)
    }

    /// Decodes one reply. Property entries are left empty; see
    /// [`GetPropertiesReply::decode_entries`].
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let mut reader = Cursor::new(bytes);
        let rop_id = RopId::from_code(reader.read_u8().map_err(ProtocolError::reading("rop id"))?)?;
        let handle_idx = reader
            .read_u8()
            .map_err(ProtocolError::reading("handle index"))?;
        let error_code = MapiStatus::from_code(
            reader
                .read_u32::<LittleEndian>()
                .map_err(ProtocolError::reading("error code"))?,
        );

        let body = if error_code.is_success() && rop_id == RopId::GetPropertiesSpecific {
            let layout = reader.read_u8().map_err(ProtocolError::reading("layout"))? != 0;
            let len = reader
                .read_u16::<LittleEndian>()
                .map_err(ProtocolError::reading("blob length"))? as usize;
            let mut prop_data = vec![0u8; len];
            reader
                .read_exact(&mut prop_data)
                .map_err(ProtocolError::reading("property blob"))?;
            RopReplyBody::GetPropertiesSpecific(GetPropertiesReply {
                layout,
                entries: Vec::new(),
                prop_data,
            })
        } else {
            RopReplyBody::Empty
        };
        ensure_consumed(&reader, "rop reply")?;

        Ok(Self {
            rop_id,
            handle_idx,
            error_code,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emsmdb_core::tags;

    #[test]
    fn rop_id_codes() {
        assert_eq!(
            RopId::from_code(0x07).unwrap(),
            RopId::GetPropertiesSpecific
        );
        assert_eq!(RopId::Release.code(), 0x01);
        assert!(matches!(
            RopId::from_code(0x42),
            Err(ProtocolError::UnsupportedRop(0x42))
        ));
    }

    #[test]
    fn request_wire_layout() {
        let request = RopRequest::get_properties(
            0,
            2,
            GetPropertiesRequest::new(vec![tags::PR_MID, tags::PR_SUBJECT])
                .want_unicode(true)
                .property_size_limit(0x1000),
        );
        let bytes = request.encode().unwrap();
        assert_eq!(
            bytes,
            vec![
                0x07, 0x00, 0x02, // rop, logon, handle index
                0x00, 0x10, 0x01, 0x00, 0x02, 0x00, // limit, unicode, count
                0x14, 0x00, 0x4A, 0x67, 0x1E, 0x00, 0x37, 0x00,
            ]
        );
        assert_eq!(RopRequest::decode(&bytes).unwrap(), request);
    }

    #[test]
    fn requested_tags_keep_order() {
        let bytes = [3, 0, 0x1E, 0, 0x37, 0, 0x14, 0, 0x4A, 0x67, 0x1E, 0, 0x37, 0];
        let decoded = decode_requested_tags(&bytes).unwrap();
        assert_eq!(
            decoded,
            vec![tags::PR_SUBJECT, tags::PR_MID, tags::PR_SUBJECT]
        );
    }

    #[test]
    fn requested_tags_must_match_count() {
        assert!(matches!(
            decode_requested_tags(&[2, 0, 0x1E, 0, 0x37, 0]),
            Err(ProtocolError::Truncated { .. })
        ));
        assert!(matches!(
            decode_requested_tags(&[0, 0, 0xFF]),
            Err(ProtocolError::TrailingBytes { remaining: 1, .. })
        ));
        assert_eq!(decode_requested_tags(&[0, 0]).unwrap(), Vec::new());
    }

    #[test]
    fn batch_decoding() {
        let mut bytes = RopRequest::release(0, 1).encode().unwrap();
        bytes.extend(
            RopRequest::get_properties(0, 0, GetPropertiesRequest::new(vec![tags::PR_FID]))
                .encode()
                .unwrap(),
        );
        let requests = RopRequest::decode_batch(&bytes).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].rop_id, RopId::Release);
        assert_eq!(requests[1].rop_id, RopId::GetPropertiesSpecific);
    }

    #[test]
    fn mismatched_body_is_rejected() {
        let request = RopRequest {
            rop_id: RopId::Release,
            logon_id: 0,
            handle_idx: 0,
            body: RopRequestBody::GetPropertiesSpecific(GetPropertiesRequest::new(vec![])),
        };
        assert!(matches!(
            request.encode(),
            Err(ProtocolError::BodyMismatch(RopId::Release))
        ));
    }

    #[test]
    fn error_reply_is_six_bytes() {
        let reply = RopReply::error(RopId::GetPropertiesSpecific, 3, MapiStatus::UnknownHandle);
        assert_eq!(reply.wire_size(), 6);
        let bytes = reply.encode().unwrap();
        assert_eq!(bytes, vec![0x07, 0x03, 0xB9, 0x04, 0x00, 0x00]);
        assert_eq!(RopReply::decode(&bytes).unwrap(), reply);
    }

    #[test]
    fn success_reply_carries_blob() {
        let reply = RopReply::success(
            RopId::GetPropertiesSpecific,
            0,
            RopReplyBody::GetPropertiesSpecific(GetPropertiesReply {
                layout: true,
                entries: Vec::new(),
                prop_data: vec![0x00, 0x01],
            }),
        );
        assert_eq!(reply.wire_size(), 11);
        let bytes = reply.encode().unwrap();
        assert_eq!(
            bytes,
            vec![0x07, 0x00, 0, 0, 0, 0, 0x01, 0x02, 0x00, 0x00, 0x01]
        );
        assert_eq!(RopReply::decode(&bytes).unwrap(), reply);
    }

    #[test]
    fn oversize_blob_fails_encoding() {
        let reply = RopReply::success(
            RopId::GetPropertiesSpecific,
            0,
            RopReplyBody::GetPropertiesSpecific(GetPropertiesReply {
                layout: false,
                entries: Vec::new(),
                prop_data: vec![0; MAX_PROPERTY_BLOB + 1],
            }),
        );
        assert!(matches!(reply.encode(), Err(ProtocolError::BlobTooLarge { .. })));
    }

    #[test]
    fn request_serde() {
        let request = RopRequest::release(0, 4);
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(
            json,
            r#"{"rop_id":"release","logon_id":0,"handle_idx":4,"body":{"type":"release"}}"#
        );
        let parsed: RopRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn reply_serde() {
        let reply = RopReply::error(RopId::GetPropertiesSpecific, 1, MapiStatus::NotInitialized);
        let json = serde_json::to_string(&reply).unwrap();
        assert!(json.contains("2147747333"));
        let parsed: RopReply = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, reply);
    }
}

//! Rop buffer types and the property value codec for the emsmdb provider.
//!
//! # Requests
//!
//! ```text
//! rop_id u8 | logon_id u8 | handle_idx u8 | body
//! ```
//!
//! A GetPropertiesSpecific body is
//! `property_size_limit u16 | want_unicode u16 | count u16 | tag u32 * count`.
//! Release has no body.
//!
//! # Replies
//!
//! ```text
//! rop_id u8 | handle_idx u8 | error_code u32 [ | layout u8 | len u16 | blob ]
//! ```
//!
//! The trailing part is only present for a successful GetPropertiesSpecific.
//! The blob format is described in [`codec`].
//!
//! # Example
//!
//! ```rust
//! use emsmdb_core::tags;
//! use emsmdb_protocol::{GetPropertiesRequest, RopRequest};
//!
//! let request = RopRequest::get_properties(0, 0, GetPropertiesRequest::new(vec![tags::PR_MID]));
//! let bytes = request.encode().unwrap();
//! assert_eq!(RopRequest::decode(&bytes).unwrap(), request);
//! ```

pub mod codec;
mod error;
mod types;

pub use codec::{
    PropertyBlob, PropertyEntry, decode_property, decode_property_blob, encode_error,
    encode_property, requires_layout,
};
pub use error::{ProtocolError, ProtocolResult};
pub use types::{
    ERROR_REPLY_SIZE, GetPropertiesReply, GetPropertiesRequest, MAX_PROPERTY_BLOB, RopId,
    RopReply, RopReplyBody, RopRequest, RopRequestBody, decode_requested_tags,
};

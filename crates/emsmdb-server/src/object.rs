//! Server-side objects addressed through handles.

use std::collections::HashMap;
use std::fmt;

use emsmdb_core::{PropertyValue, id_to_string, tags};
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};
use crate::handles::Handle;
use crate::store::{ObjectRef, PropertyStore};

/// Kind of object behind a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// A mailbox (system folder index 0).
    Mailbox,
    /// A well-known folder, by system index.
    SystemFolder(u32),
    /// Any other folder.
    GenericFolder,
    /// A message.
    Message,
    /// An object only the backing store knows how to read.
    Unresolved,
}

impl ObjectKind {
    /// Maps a system folder index: -1 is unresolved, 0 the mailbox, anything
    /// else a system folder.
    pub fn from_system_index(index: i32) -> Self {
        match index {
            -1 => Self::Unresolved,
            0 => Self::Mailbox,
            n if n > 0 => Self::SystemFolder(n as u32),
            _ => Self::Unresolved,
        }
    }

    /// Returns the system folder index, if any.
    pub fn system_index(self) -> Option<i32> {
        match self {
            Self::Unresolved => Some(-1),
            Self::Mailbox => Some(0),
            Self::SystemFolder(n) => Some(n as i32),
            Self::GenericFolder | Self::Message => None,
        }
    }

    /// Returns true for system and generic folders.
    pub fn is_folder(self) -> bool {
        matches!(self, Self::SystemFolder(_) | Self::GenericFolder)
    }

    /// Returns a short name for logs and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mailbox => "mailbox",
            Self::SystemFolder(_) => "system folder",
            Self::GenericFolder => "folder",
            Self::Message => "message",
            Self::Unresolved => "unresolved object",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SystemFolder(n) => write!(f, "system folder {}", n),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Mode a message was opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
    Create,
}

impl OpenMode {
    /// Returns the wire code.
    pub fn code(self) -> u8 {
        match self {
            Self::ReadOnly => 0,
            Self::ReadWrite => 1,
            Self::Create => 3,
        }
    }

    /// Looks up a wire code.
    pub fn from_code(code: u8) -> ServerResult<Self> {
        match code {
            0 => Ok(Self::ReadOnly),
            1 => Ok(Self::ReadWrite),
            3 => Ok(Self::Create),
            other => Err(ServerError::invalid_parameter(format!(
                "unknown open mode {}",
                other
            ))),
        }
    }

    /// Returns true if the object may be saved.
    pub fn is_writable(self) -> bool {
        matches!(self, Self::ReadWrite | Self::Create)
    }
}

/// Format of a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyFormat {
    Text,
    Html,
    Rtf,
}

impl BodyFormat {
    /// Returns the short name (`txt`, `html`, `rtf`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Html => "html",
            Self::Rtf => "rtf",
        }
    }
}

impl fmt::Display for BodyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Buffers synthesized for one object, released with its handle.
#[derive(Debug, Default)]
pub struct ObjectArena {
    buffers: HashMap<String, Vec<u8>>,
}

impl ObjectArena {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the buffer stored under `key`, building it on first use.
    pub fn get_or_insert_with(&mut self, key: &str, build: impl FnOnce() -> Vec<u8>) -> &[u8] {
        self.buffers.entry(key.to_string()).or_insert_with(build)
    }

    /// Returns the number of buffers held.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Returns true if nothing has been allocated.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Returns the total size of all buffers.
    pub fn allocated_bytes(&self) -> usize {
        self.buffers.values().map(Vec::len).sum()
    }
}

/// An opened mailbox.
#[derive(Debug)]
pub struct MailboxObject {
    /// Display name of the mailbox owner.
    pub owner_name: String,
    /// Directory name of the mailbox owner.
    pub owner_essdn: String,
    /// Directory name of the logged-on user.
    pub user_dn: String,
    /// Stored mailbox properties.
    pub properties: PropertyStore,
}

/// An opened folder.
#[derive(Debug)]
pub struct FolderObject {
    /// Folder identifier.
    pub folder_id: u64,
    /// System index, 0 for generic folders.
    pub system_index: u32,
    /// Stored folder properties.
    pub properties: PropertyStore,
    /// Message handles opened from this folder.
    pub children: Vec<Handle>,
}

impl FolderObject {
    /// Returns the folder type: 0 for the root folder, 1 otherwise.
    pub fn folder_type(&self) -> i32 {
        if self.system_index == 1 { 0 } else { 1 }
    }
}

/// An opened message.
#[derive(Debug)]
pub struct MessageObject {
    /// Message identifier.
    pub message_id: u64,
    /// Identifier of the parent folder.
    pub folder_id: u64,
    /// Mode the message was opened with.
    pub open_mode: OpenMode,
    /// Stored message properties.
    pub properties: PropertyStore,
}

impl MessageObject {
    /// Returns the message ID as a hexadecimal string.
    pub fn id_string(&self) -> String {
        id_to_string(self.message_id)
    }

    /// Returns the access level: 1 if writable, 0 otherwise.
    pub fn access_level(&self) -> i32 {
        i32::from(self.open_mode.is_writable())
    }

    /// Works out the body format.
    ///
    /// The editor format property wins; without it the first body property
    /// present decides (HTML, then RTF, then plain text).
    pub fn body_content_format(&self) -> ServerResult<BodyFormat> {
        if let PropertyValue::Integer(format) = self.properties.get(tags::PR_MSG_EDITOR_FORMAT) {
            match format {
                1 => return Ok(BodyFormat::Text),
                2 => return Ok(BodyFormat::Html),
                3 => return Ok(BodyFormat::Rtf),
                _ => {}
            }
        }

        let present = |tag| !self.properties.get(tag).is_absent();
        if present(tags::PR_HTML) {
            Ok(BodyFormat::Html)
        } else if present(tags::PR_RTF_COMPRESSED) {
            Ok(BodyFormat::Rtf)
        } else if present(tags::PR_BODY_UNICODE) {
            Ok(BodyFormat::Text)
        } else {
            Err(ServerError::NotFound {
                what: "body format",
            })
        }
    }
}

/// The object behind a handle.
#[derive(Debug)]
pub enum ServerObject {
    Mailbox(MailboxObject),
    Folder(FolderObject),
    Message(MessageObject),
    /// Only the backing store can read this object.
    Unresolved(ObjectRef),
}

impl ServerObject {
    /// Returns the kind this object is registered as.
    ///
    /// A folder with system index 0 is a generic folder.
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Mailbox(_) => ObjectKind::Mailbox,
            Self::Folder(f) => match f.system_index {
                0 => ObjectKind::GenericFolder,
                n => ObjectKind::SystemFolder(n),
            },
            Self::Message(_) => ObjectKind::Message,
            Self::Unresolved(_) => ObjectKind::Unresolved,
        }
    }

    /// Returns the object's property store, if it has one.
    pub fn properties(&self) -> Option<&PropertyStore> {
        match self {
            Self::Mailbox(m) => Some(&m.properties),
            Self::Folder(f) => Some(&f.properties),
            Self::Message(m) => Some(&m.properties),
            Self::Unresolved(_) => None,
        }
    }

    /// Returns the object's property store mutably, if it has one.
    pub fn properties_mut(&mut self) -> Option<&mut PropertyStore> {
        match self {
            Self::Mailbox(m) => Some(&mut m.properties),
            Self::Folder(f) => Some(&mut f.properties),
            Self::Message(m) => Some(&mut m.properties),
            Self::Unresolved(_) => None,
        }
    }

    /// Returns the backing store reference.
    pub fn object_ref(&self) -> &ObjectRef {
        match self {
            Self::Mailbox(m) => m.properties.object(),
            Self::Folder(f) => f.properties.object(),
            Self::Message(m) => m.properties.object(),
            Self::Unresolved(object) => object,
        }
    }
}

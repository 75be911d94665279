//! Per-client provider context.
//!
//! A [`Session`] owns the handle table and every object opened through it.
//! It is passed explicitly to each operation; nothing here is global.

use std::sync::Arc;

use emsmdb_core::{EntryIdBuilder, NativeValue, PropertyTag, PropertyValue};
use parking_lot::RwLock;
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult, StoreError, StoreResult};
use crate::handles::{Handle, HandleEntry, HandleTable};
use crate::object::{
    BodyFormat, FolderObject, MailboxObject, MessageObject, ObjectKind, OpenMode, ServerObject,
};
use crate::store::{MessageStore, ObjectRef, PropertyStore, SetOutcome, pairs_from_args};

/// Identity of the mailbox being opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxIdentity {
    /// Store identity of the mailbox root.
    pub mailbox_id: u64,
    /// Display name of the owner.
    pub owner_name: String,
    /// Directory name of the owner.
    pub owner_essdn: String,
    /// Directory name of the logged-on user.
    pub user_dn: String,
}

impl MailboxIdentity {
    /// Creates an identity where the logged-on user owns the mailbox.
    pub fn owned_by(
        mailbox_id: u64,
        owner_name: impl Into<String>,
        essdn: impl Into<String>,
    ) -> Self {
        let essdn = essdn.into();
        Self {
            mailbox_id,
            owner_name: owner_name.into(),
            user_dn: essdn.clone(),
            owner_essdn: essdn,
        }
    }

    /// Builder: set the logged-on user's directory name.
    pub fn with_user_dn(mut self, user_dn: impl Into<String>) -> Self {
        self.user_dn = user_dn.into();
        self
    }
}

/// One client's provider context.
pub struct Session {
    handles: HandleTable,
    store: Arc<dyn MessageStore>,
    entry_ids: Arc<dyn EntryIdBuilder>,
    config: ServerConfig,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("handles", &self.handles.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session over a backing store.
    ///
    /// Fails if `config` does not pass [`ServerConfig::validate`].
    pub fn new(
        store: Arc<dyn MessageStore>,
        entry_ids: Arc<dyn EntryIdBuilder>,
        config: ServerConfig,
    ) -> ServerResult<Self> {
        config.validate()?;
        Ok(Self {
            handles: HandleTable::new(config.max_handles),
            store,
            entry_ids,
            config,
        })
    }

    /// Returns the handle table.
    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    /// Returns the handle table mutably.
    pub fn handles_mut(&mut self) -> &mut HandleTable {
        &mut self.handles
    }

    /// Returns the backing store.
    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    /// Returns the entry ID builder.
    pub fn entry_ids(&self) -> &Arc<dyn EntryIdBuilder> {
        &self.entry_ids
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Opens a mailbox and returns its handle.
    pub fn open_mailbox(&mut self, identity: MailboxIdentity) -> ServerResult<Handle> {
        let object = self
            .store
            .open_object(ObjectKind::Mailbox, identity.mailbox_id)?;
        let properties = PropertyStore::populate(self.store.as_ref(), object)?;
        let mailbox = MailboxObject {
            owner_name: identity.owner_name,
            owner_essdn: identity.owner_essdn,
            user_dn: identity.user_dn,
            properties,
        };
        self.handles.register(ServerObject::Mailbox(mailbox), None)
    }

    /// Opens a folder under a mailbox or another folder.
    ///
    /// A `system_index` of 0 opens a generic folder.
    pub fn open_folder(
        &mut self,
        parent: Handle,
        folder_id: u64,
        system_index: u32,
    ) -> ServerResult<Handle> {
        let parent_kind = self.handles.resolve(parent)?.kind;
        if !(parent_kind == ObjectKind::Mailbox || parent_kind.is_folder()) {
            return Err(ServerError::wrong_kind(parent, "mailbox or folder", parent_kind.as_str()));
        }

        let kind = match system_index {
            0 => ObjectKind::GenericFolder,
            n => ObjectKind::SystemFolder(n),
        };
        let object = self.store.open_object(kind, folder_id)?;
        let properties = PropertyStore::populate(self.store.as_ref(), object)?;
        let folder = FolderObject {
            folder_id,
            system_index,
            properties,
            children: Vec::new(),
        };
        self.handles
            .register(ServerObject::Folder(folder), Some(parent))
    }

    /// Opens a message under a folder.
    pub fn open_message(
        &mut self,
        folder: Handle,
        message_id: u64,
        open_mode: OpenMode,
    ) -> ServerResult<Handle> {
        let folder_id = match &self.handles.resolve(folder)?.object {
            ServerObject::Folder(f) => f.folder_id,
            other => {
                return Err(ServerError::wrong_kind(folder, "folder", object_name(other)));
            }
        };

        let object = self.store.open_object(ObjectKind::Message, message_id)?;
        let properties = PropertyStore::populate(self.store.as_ref(), object)?;
        let message = MessageObject {
            message_id,
            folder_id,
            open_mode,
            properties,
        };
        self.handles
            .register(ServerObject::Message(message), Some(folder))
    }

    /// Registers an object that only the backing store can read.
    pub fn register_unresolved(
        &mut self,
        object: ObjectRef,
        parent: Option<Handle>,
    ) -> ServerResult<Handle> {
        self.handles
            .register(ServerObject::Unresolved(object), parent)
    }

    /// Releases a handle and its children.
    pub fn release(&mut self, handle: Handle) -> ServerResult<Vec<Handle>> {
        self.handles.release(handle)
    }

    /// Reads properties positionally from the object's store.
    pub fn get_properties(
        &self,
        handle: Handle,
        tags: &[PropertyTag],
    ) -> ServerResult<Vec<PropertyValue>> {
        let entry = self.handles.resolve(handle)?;
        match entry.object.properties() {
            Some(properties) => Ok(properties.get_many(tags)),
            None => Ok(self.store.get_properties(entry.object.object_ref(), tags)?),
        }
    }

    /// Applies a flattened `tag, value, ...` list to the object.
    ///
    /// Each pair is applied independently; incompatible pairs are skipped.
    pub fn set_properties(
        &mut self,
        handle: Handle,
        args: Vec<NativeValue>,
    ) -> ServerResult<Vec<StoreResult<SetOutcome>>> {
        let pairs = pairs_from_args(args)?;
        let store = Arc::clone(&self.store);
        let entry = self.handles.resolve_mut(handle)?;
        let kind = entry.kind;
        let properties = entry.object.properties_mut().ok_or_else(|| {
            ServerError::wrong_kind(handle, "mailbox, folder or message", kind.as_str())
        })?;
        let results = properties.set_many(store.as_ref(), pairs);
        debug!(handle, count = results.len(), "Applied property writes");
        Ok(results)
    }

    /// Commits a message.
    ///
    /// The message must have been opened for writing (unless `strict_save` is
    /// off) and its parent folder and mailbox must still be open.
    pub fn save_message(&mut self, handle: Handle) -> ServerResult<()> {
        let entry = self.handles.resolve(handle)?;
        let message = as_message(handle, entry)?;
        let mode = message.open_mode;
        if self.config.strict_save && !mode.is_writable() {
            return Err(StoreError::ReadOnly {
                id: message.message_id,
            }
            .into());
        }

        let folder = entry.parent.ok_or(ServerError::NotFound {
            what: "parent folder",
        })?;
        let folder_entry = self.handles.resolve(folder)?;
        if !folder_entry.kind.is_folder() {
            return Err(ServerError::wrong_kind(folder, "folder", folder_entry.kind.as_str()));
        }
        self.resolve_mailbox(folder)?;

        // Without the strict check the store is handed a writable mode.
        let mode = if self.config.strict_save {
            mode
        } else {
            OpenMode::ReadWrite
        };
        self.store.save(entry.object.object_ref(), mode)?;
        debug!(handle, message_id = message.message_id, "Saved message");
        Ok(())
    }

    fn resolve_mailbox(&self, mut handle: Handle) -> ServerResult<Handle> {
        loop {
            let entry = self.handles.resolve(handle)?;
            match (entry.kind, entry.parent) {
                (ObjectKind::Mailbox, _) => return Ok(handle),
                (_, Some(parent)) => handle = parent,
                (_, None) => {
                    return Err(ServerError::NotFound {
                        what: "parent mailbox",
                    });
                }
            }
        }
    }

    /// Returns a message's ID as a hexadecimal string.
    pub fn message_id_string(&self, handle: Handle) -> ServerResult<String> {
        let entry = self.handles.resolve(handle)?;
        Ok(as_message(handle, entry)?.id_string())
    }

    /// Returns a message's body format.
    pub fn body_content_format(&self, handle: Handle) -> ServerResult<BodyFormat> {
        let entry = self.handles.resolve(handle)?;
        as_message(handle, entry)?.body_content_format()
    }
}

fn as_message(handle: Handle, entry: &HandleEntry) -> ServerResult<&MessageObject> {
    match &entry.object {
        ServerObject::Message(message) => Ok(message),
        other => Err(ServerError::wrong_kind(handle, "message", object_name(other))),
    }
}

fn object_name(object: &ServerObject) -> &'static str {
    match object {
        ServerObject::Mailbox(_) => "mailbox",
        ServerObject::Folder(_) => "folder",
        ServerObject::Message(_) => "message",
        ServerObject::Unresolved(_) => "unresolved object",
    }
}

/// Session shared between transport threads.
pub type SharedSession = Arc<RwLock<Session>>;

/// Wraps a session for sharing.
pub fn new_shared_session(session: Session) -> SharedSession {
    Arc::new(RwLock::new(session))
}

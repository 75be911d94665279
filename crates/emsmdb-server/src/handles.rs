//! Session handle table.
//!
//! Handles are allocated from 1 upwards. `0xFFFFFFFF` is reserved by the
//! protocol for "no handle" and is never issued.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::error::{ServerError, ServerResult};
use crate::object::{ObjectArena, ObjectKind, ServerObject};

/// An opaque session-scoped handle.
pub type Handle = u32;

/// Handle value meaning "no object".
pub const INVALID_HANDLE: Handle = 0xFFFF_FFFF;

/// One live object in the handle table.
#[derive(Debug)]
pub struct HandleEntry {
    /// Kind of the object.
    pub kind: ObjectKind,
    /// The object itself.
    pub object: ServerObject,
    /// Handle of the parent object, if any.
    pub parent: Option<Handle>,
    /// Buffers synthesized for this object.
    pub arena: ObjectArena,
}

/// Maps handles to live objects.
#[derive(Debug)]
pub struct HandleTable {
    entries: HashMap<Handle, HandleEntry>,
    next: Handle,
    max_handles: usize,
}

impl HandleTable {
    /// Creates an empty table holding at most `max_handles` entries.
    pub fn new(max_handles: usize) -> Self {
        Self {
            entries: HashMap::new(),
            next: 1,
            max_handles,
        }
    }

    /// Returns the number of live handles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no handles are live.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the configured limit.
    pub fn max_handles(&self) -> usize {
        self.max_handles
    }

    /// Returns true if `handle` is live.
    pub fn contains(&self, handle: Handle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Registers an object and returns its new handle.
    ///
    /// The entry's kind is taken from the object. A message registered under
    /// a folder is added to that folder's child list.
    pub fn register(
        &mut self,
        object: ServerObject,
        parent: Option<Handle>,
    ) -> ServerResult<Handle> {
        let kind = object.kind();
        if self.entries.len() >= self.max_handles {
            return Err(ServerError::HandleLimit {
                max: self.max_handles,
            });
        }
        if let Some(parent) = parent
            && !self.entries.contains_key(&parent)
        {
            return Err(ServerError::UnknownHandle(parent));
        }

        let handle = self.allocate();
        if let (ObjectKind::Message, Some(parent)) = (kind, parent)
            && let Some(HandleEntry {
                object: ServerObject::Folder(folder),
                ..
            }) = self.entries.get_mut(&parent)
        {
            folder.children.push(handle);
        }

        self.entries.insert(
            handle,
            HandleEntry {
                kind,
                object,
                parent,
                arena: ObjectArena::new(),
            },
        );
        debug!(handle, kind = %kind, ?parent, "Registered handle");
        Ok(handle)
    }

    fn allocate(&mut self) -> Handle {
        loop {
            let candidate = self.next;
            self.next = match self.next.wrapping_add(1) {
                0 | INVALID_HANDLE => 1,
                n => n,
            };
            if candidate != 0
                && candidate != INVALID_HANDLE
                && !self.entries.contains_key(&candidate)
            {
                return candidate;
            }
        }
    }

    /// Looks up a handle.
    pub fn resolve(&self, handle: Handle) -> ServerResult<&HandleEntry> {
        self.entries
            .get(&handle)
            .ok_or(ServerError::UnknownHandle(handle))
    }

    /// Looks up a handle for modification.
    pub fn resolve_mut(&mut self, handle: Handle) -> ServerResult<&mut HandleEntry> {
        self.entries
            .get_mut(&handle)
            .ok_or(ServerError::UnknownHandle(handle))
    }

    /// Releases a handle and everything registered under it.
    ///
    /// Children are released first. A released message is dropped from its
    /// parent folder's child list. Returns the released handles, children
    /// before parents.
    pub fn release(&mut self, handle: Handle) -> ServerResult<Vec<Handle>> {
        if !self.entries.contains_key(&handle) {
            return Err(ServerError::UnknownHandle(handle));
        }
        let mut released = Vec::new();
        self.release_tree(handle, &mut released);
        debug!(handle, count = released.len(), "Released handle");
        Ok(released)
    }

    fn release_tree(&mut self, handle: Handle, released: &mut Vec<Handle>) {
        let mut children: Vec<Handle> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.parent == Some(handle))
            .map(|(child, _)| *child)
            .collect();
        children.sort_unstable();
        for child in children {
            self.release_tree(child, released);
        }

        let Some(entry) = self.entries.remove(&handle) else {
            return;
        };
        if entry.kind == ObjectKind::Message
            && let Some(parent) = entry.parent
            && let Some(HandleEntry {
                object: ServerObject::Folder(folder),
                ..
            }) = self.entries.get_mut(&parent)
            && let Some(pos) = folder.children.iter().position(|h| *h == handle)
        {
            folder.children.remove(pos);
            trace!(handle, parent, "Dropped message from folder children");
        }
        trace!(
            handle,
            arena_bytes = entry.arena.allocated_bytes(),
            "Dropped handle entry"
        );
        released.push(handle);
    }

    /// Iterates over live handles.
    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.entries.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{FolderObject, MailboxObject, MessageObject, OpenMode};
    use crate::store::{ObjectRef, PropertyStore};

    fn mailbox() -> ServerObject {
        ServerObject::Mailbox(MailboxObject {
            owner_name: "Jane Doe".into(),
            owner_essdn: "/o=Org/cn=jane".into(),
            user_dn: "/o=Org/cn=jane".into(),
            properties: PropertyStore::new(ObjectRef::new(ObjectKind::Mailbox, 1)),
        })
    }

    fn folder(id: u64) -> ServerObject {
        ServerObject::Folder(FolderObject {
            folder_id: id,
            system_index: 0,
            properties: PropertyStore::new(ObjectRef::new(ObjectKind::GenericFolder, id)),
            children: Vec::new(),
        })
    }

    fn system_folder(index: u32) -> ServerObject {
        ServerObject::Folder(FolderObject {
            folder_id: u64::from(index),
            system_index: index,
            properties: PropertyStore::new(ObjectRef::new(ObjectKind::SystemFolder(index), 1)),
            children: Vec::new(),
        })
    }

    fn message(id: u64) -> ServerObject {
        ServerObject::Message(MessageObject {
            message_id: id,
            folder_id: 1,
            open_mode: OpenMode::ReadOnly,
            properties: PropertyStore::new(ObjectRef::new(ObjectKind::Message, id)),
        })
    }

    fn children(table: &HandleTable, handle: Handle) -> Vec<Handle> {
        match &table.resolve(handle).unwrap().object {
            ServerObject::Folder(f) => f.children.clone(),
            _ => panic!("not a folder"),
        }
    }

    #[test]
    fn handles_start_at_one() {
        let mut table = HandleTable::new(8);
        let a = table.register(folder(1), None).unwrap();
        let b = table.register(folder(2), None).unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn released_handle_is_unknown() {
        let mut table = HandleTable::new(8);
        let h = table.register(folder(1), None).unwrap();
        table.release(h).unwrap();
        assert!(matches!(table.resolve(h), Err(ServerError::UnknownHandle(x)) if x == h));
        assert!(matches!(
            table.release(h),
            Err(ServerError::UnknownHandle(_))
        ));
    }

    #[test]
    fn message_release_updates_parent_once() {
        let mut table = HandleTable::new(8);
        let f = table.register(folder(1), None).unwrap();
        let m1 = table.register(message(10), Some(f)).unwrap();
        let m2 = table.register(message(11), Some(f)).unwrap();
        assert_eq!(children(&table, f), vec![m1, m2]);

        assert_eq!(table.release(m1).unwrap(), vec![m1]);
        assert_eq!(children(&table, f), vec![m2]);
        assert!(table.contains(f));
    }

    #[test]
    fn folder_release_cascades() {
        let mut table = HandleTable::new(8);
        let f = table.register(folder(1), None).unwrap();
        let m1 = table.register(message(10), Some(f)).unwrap();
        let m2 = table.register(message(11), Some(f)).unwrap();

        assert_eq!(table.release(f).unwrap(), vec![m1, m2, f]);
        assert!(table.is_empty());
    }

    #[test]
    fn mailbox_release_cascades_through_folders() {
        let mut table = HandleTable::new(8);
        let mb = table.register(mailbox(), None).unwrap();
        let f = table.register(folder(5), Some(mb)).unwrap();
        let m = table.register(message(10), Some(f)).unwrap();
        assert_eq!(children(&table, f), vec![m]);

        assert_eq!(table.release(mb).unwrap(), vec![m, f, mb]);
        assert!(table.is_empty());
        for handle in [m, f, mb] {
            assert!(!table.contains(handle));
        }
    }

    #[test]
    fn kind_comes_from_object() {
        let mut table = HandleTable::new(8);
        let generic = table.register(folder(0), None).unwrap();
        let system = table.register(system_folder(5), None).unwrap();
        let m = table.register(message(10), Some(generic)).unwrap();
        let kind = |handle| table.resolve(handle).unwrap().kind;
        assert_eq!(kind(generic), ObjectKind::GenericFolder);
        assert_eq!(kind(system), ObjectKind::SystemFolder(5));
        assert_eq!(kind(m), ObjectKind::Message);
        assert_eq!(children(&table, generic), vec![m]);
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut table = HandleTable::new(8);
        assert!(matches!(
            table.register(message(1), Some(42)),
            Err(ServerError::UnknownHandle(42))
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn limit_is_enforced() {
        let mut table = HandleTable::new(1);
        table.register(folder(1), None).unwrap();
        assert!(matches!(
            table.register(folder(2), None),
            Err(ServerError::HandleLimit { max: 1 })
        ));
    }

    #[test]
    fn allocation_skips_reserved_value() {
        let mut table = HandleTable::new(8);
        table.next = INVALID_HANDLE - 1;
        let a = table.register(folder(1), None).unwrap();
        let b = table.register(folder(2), None).unwrap();
        assert_eq!(a, INVALID_HANDLE - 1);
        assert_eq!(b, 1);
    }
}

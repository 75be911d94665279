//! In-process message store.
//!
//! Keeps objects in a map guarded by a single mutex. Used by tests and by
//! callers that embed the provider without a persistent backend.

use std::collections::HashMap;

use emsmdb_core::{PropertyTag, PropertyValue};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectKind, OpenMode};
use crate::store::{MessageStore, ObjectRef};

#[derive(Debug)]
struct StoredObject {
    properties: Vec<(PropertyTag, PropertyValue)>,
    saves: usize,
}

#[derive(Debug, Default)]
struct Inner {
    objects: HashMap<u64, StoredObject>,
    writes: usize,
}

/// A [`MessageStore`] held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an object.
    pub fn insert_object(&self, object: ObjectRef, properties: Vec<(PropertyTag, PropertyValue)>) {
        let mut inner = self.inner.lock();
        inner.objects.insert(
            object.id,
            StoredObject {
                properties,
                saves: 0,
            },
        );
        debug!(id = object.id, kind = %object.kind, "Inserted object");
    }

    /// Builder form of [`MemoryStore::insert_object`].
    pub fn with_object(
        self,
        object: ObjectRef,
        properties: Vec<(PropertyTag, PropertyValue)>,
    ) -> Self {
        self.insert_object(object, properties);
        self
    }

    /// Returns the stored value of one property.
    pub fn property(&self, object: &ObjectRef, tag: PropertyTag) -> Option<PropertyValue> {
        let inner = self.inner.lock();
        inner.objects.get(&object.id).and_then(|stored| {
            stored
                .properties
                .iter()
                .find(|(t, _)| *t == tag)
                .map(|(_, v)| v.clone())
        })
    }

    /// Returns how many times the object has been saved.
    pub fn save_count(&self, object: &ObjectRef) -> usize {
        let inner = self.inner.lock();
        inner
            .objects
            .get(&object.id)
            .map_or(0, |stored| stored.saves)
    }

    /// Returns the total number of property writes.
    pub fn write_count(&self) -> usize {
        self.inner.lock().writes
    }

    /// Returns the number of stored objects.
    pub fn len(&self) -> usize {
        self.inner.lock().objects.len()
    }

    /// Returns true if the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().objects.is_empty()
    }
}

impl MessageStore for MemoryStore {
    fn open_object(&self, kind: ObjectKind, id: u64) -> StoreResult<ObjectRef> {
        let inner = self.inner.lock();
        match inner.objects.get(&id) {
            Some(_) => Ok(ObjectRef::new(kind, id)),
            None => Err(StoreError::ObjectNotFound { id }),
        }
    }

    fn read_all_properties(
        &self,
        object: &ObjectRef,
    ) -> StoreResult<Vec<(PropertyTag, PropertyValue)>> {
        let inner = self.inner.lock();
        inner
            .objects
            .get(&object.id)
            .map(|stored| stored.properties.clone())
            .ok_or(StoreError::ObjectNotFound { id: object.id })
    }

    fn write_property(
        &self,
        object: &ObjectRef,
        tag: PropertyTag,
        value: &PropertyValue,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let stored = inner
            .objects
            .get_mut(&object.id)
            .ok_or(StoreError::ObjectNotFound { id: object.id })?;

        let existing = stored.properties.iter().position(|(t, _)| *t == tag);
        match (existing, value.is_absent()) {
            (Some(i), true) => {
                stored.properties.remove(i);
            }
            (Some(i), false) => stored.properties[i].1 = value.clone(),
            (None, false) => stored.properties.push((tag, value.clone())),
            (None, true) => {}
        }
        inner.writes += 1;
        trace!(id = object.id, tag = %tag, "Wrote property");
        Ok(())
    }

    fn save(&self, object: &ObjectRef, mode: OpenMode) -> StoreResult<()> {
        if !mode.is_writable() {
            return Err(StoreError::ReadOnly { id: object.id });
        }
        let mut inner = self.inner.lock();
        let stored = inner
            .objects
            .get_mut(&object.id)
            .ok_or(StoreError::ObjectNotFound { id: object.id })?;
        stored.saves += 1;
        debug!(id = object.id, saves = stored.saves, "Saved object");
        Ok(())
    }

    fn get_properties(
        &self,
        object: &ObjectRef,
        tags: &[PropertyTag],
    ) -> StoreResult<Vec<PropertyValue>> {
        let inner = self.inner.lock();
        let stored = inner
            .objects
            .get(&object.id)
            .ok_or(StoreError::ObjectNotFound { id: object.id })?;
        Ok(tags
            .iter()
            .map(|tag| {
                stored
                    .properties
                    .iter()
                    .find(|(t, _)| t == tag)
                    .map_or(PropertyValue::Absent, |(_, v)| v.clone())
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emsmdb_core::tags;

    fn folder() -> ObjectRef {
        ObjectRef::new(ObjectKind::GenericFolder, 0x10)
    }

    #[test]
    fn open_requires_existing_object() {
        let store = MemoryStore::new().with_object(folder(), vec![]);
        assert!(store.open_object(ObjectKind::GenericFolder, 0x10).is_ok());
        assert_eq!(
            store.open_object(ObjectKind::GenericFolder, 0x11),
            Err(StoreError::ObjectNotFound { id: 0x11 })
        );
    }

    #[test]
    fn writes_replace_and_remove() {
        let store = MemoryStore::new().with_object(
            folder(),
            vec![(tags::PR_CONTENT_COUNT, PropertyValue::Integer(1))],
        );
        let two = PropertyValue::Integer(2);
        store
            .write_property(&folder(), tags::PR_CONTENT_COUNT, &two)
            .unwrap();
        assert_eq!(
            store.property(&folder(), tags::PR_CONTENT_COUNT),
            Some(PropertyValue::Integer(2))
        );

        store
            .write_property(&folder(), tags::PR_CONTENT_COUNT, &PropertyValue::Absent)
            .unwrap();
        assert_eq!(store.property(&folder(), tags::PR_CONTENT_COUNT), None);
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn save_checks_mode() {
        let store = MemoryStore::new().with_object(folder(), vec![]);
        assert_eq!(
            store.save(&folder(), OpenMode::ReadOnly),
            Err(StoreError::ReadOnly { id: 0x10 })
        );
        store.save(&folder(), OpenMode::Create).unwrap();
        assert_eq!(store.save_count(&folder()), 1);
    }

    #[test]
    fn positional_reads() {
        let store = MemoryStore::new().with_object(
            folder(),
            vec![(tags::PR_DISPLAY_NAME, PropertyValue::NarrowString("Inbox".into()))],
        );
        let values = store
            .get_properties(&folder(), &[tags::PR_FID, tags::PR_DISPLAY_NAME])
            .unwrap();
        assert_eq!(
            values,
            vec![
                PropertyValue::Absent,
                PropertyValue::NarrowString("Inbox".into())
            ]
        );
    }
}

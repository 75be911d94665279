//! Per-object property bags and the backing store interface.

use std::collections::HashMap;

use emsmdb_core::{NativeValue, PropertyTag, PropertyValue, check_compatible};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ServerError, ServerResult, StoreResult};
use crate::object::{ObjectKind, OpenMode};

/// Reference to an object held by the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Kind the object was opened as.
    pub kind: ObjectKind,
    /// Store identity (folder or message ID).
    pub id: u64,
}

impl ObjectRef {
    /// Creates a reference.
    pub fn new(kind: ObjectKind, id: u64) -> Self {
        Self { kind, id }
    }
}

/// The persistence layer behind the provider.
///
/// Implementations decide their own locking; the provider only assumes
/// writes to one object are serialized.
pub trait MessageStore: Send + Sync {
    /// Opens an object by identity.
    fn open_object(&self, kind: ObjectKind, id: u64) -> StoreResult<ObjectRef>;

    /// Returns every stored property of the object, in store order.
    fn read_all_properties(
        &self,
        object: &ObjectRef,
    ) -> StoreResult<Vec<(PropertyTag, PropertyValue)>>;

    /// Writes one property.
    fn write_property(
        &self,
        object: &ObjectRef,
        tag: PropertyTag,
        value: &PropertyValue,
    ) -> StoreResult<()>;

    /// Commits pending writes. Fails if `mode` is not writable.
    fn save(&self, object: &ObjectRef, mode: OpenMode) -> StoreResult<()>;

    /// Produces values for `tags`, positionally. Used for objects the
    /// provider cannot read itself.
    fn get_properties(
        &self,
        object: &ObjectRef,
        tags: &[PropertyTag],
    ) -> StoreResult<Vec<PropertyValue>>;
}

/// Result of a single property write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetOutcome {
    /// The value was written through and cached.
    Written,
    /// The value did not fit the tag's type and was dropped.
    Skipped,
}

/// Typed property bag for one object.
///
/// Keys are unique and iteration follows population order.
#[derive(Debug, Clone)]
pub struct PropertyStore {
    object: ObjectRef,
    entries: Vec<(PropertyTag, PropertyValue)>,
    index: HashMap<PropertyTag, usize>,
}

impl PropertyStore {
    /// Creates an empty store for `object`.
    pub fn new(object: ObjectRef) -> Self {
        Self {
            object,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Creates a store from known pairs. Later duplicates replace earlier ones.
    pub fn from_pairs(
        object: ObjectRef,
        pairs: impl IntoIterator<Item = (PropertyTag, PropertyValue)>,
    ) -> Self {
        let mut store = Self::new(object);
        for (tag, value) in pairs {
            store.insert(tag, value);
        }
        store
    }

    /// Loads the object's properties from the backing store.
    pub fn populate(backend: &dyn MessageStore, object: ObjectRef) -> StoreResult<Self> {
        let pairs = backend.read_all_properties(&object)?;
        debug!(
            object = object.id,
            count = pairs.len(),
            "Populated property store"
        );
        Ok(Self::from_pairs(object, pairs))
    }

    /// Returns the backing object reference.
    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    /// Returns the number of stored properties.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates in population order.
    pub fn iter(&self) -> impl Iterator<Item = (PropertyTag, &PropertyValue)> {
        self.entries.iter().map(|(tag, value)| (*tag, value))
    }

    /// Returns a reference to the stored value, if any.
    pub fn get_ref(&self, tag: PropertyTag) -> Option<&PropertyValue> {
        self.index.get(&tag).map(|&i| &self.entries[i].1)
    }

    /// Looks up an exact tag. Unset tags are `Absent`.
    pub fn get(&self, tag: PropertyTag) -> PropertyValue {
        self.get_ref(tag).cloned().unwrap_or(PropertyValue::Absent)
    }

    /// Looks up several tags, positionally.
    pub fn get_many(&self, tags: &[PropertyTag]) -> Vec<PropertyValue> {
        tags.iter().map(|tag| self.get(*tag)).collect()
    }

    /// Returns the value rendered for application code.
    pub fn get_native(&self, tag: PropertyTag) -> NativeValue {
        self.get(tag).to_native()
    }

    /// Returns native values for the tags that are set, skipping the rest.
    pub fn get_native_present(&self, tags: &[PropertyTag]) -> Vec<(PropertyTag, NativeValue)> {
        tags.iter()
            .filter_map(|tag| self.get_ref(*tag).map(|value| (*tag, value.to_native())))
            .collect()
    }

    /// Stores a value in the cache only.
    pub(crate) fn insert(&mut self, tag: PropertyTag, value: PropertyValue) {
        if value.is_absent() {
            self.remove(tag);
            return;
        }
        match self.index.get(&tag) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(tag, self.entries.len());
                self.entries.push((tag, value));
            }
        }
    }

    fn remove(&mut self, tag: PropertyTag) {
        if let Some(i) = self.index.remove(&tag) {
            self.entries.remove(i);
            for slot in self.index.values_mut() {
                if *slot > i {
                    *slot -= 1;
                }
            }
        }
    }

    /// Writes one value through to the backing store, then caches it.
    ///
    /// A value whose kind does not fit the tag's type is logged and skipped.
    /// Out-of-range binary elements and unconvertible text fail this write
    /// only.
    pub fn set(
        &mut self,
        backend: &dyn MessageStore,
        tag: PropertyTag,
        value: NativeValue,
    ) -> StoreResult<SetOutcome> {
        let ty = tag.prop_type()?;
        if !check_compatible(&value, ty)? {
            warn!(
                tag = %tag,
                kind = value.kind(),
                expected = %ty,
                "Skipping incompatible property write"
            );
            return Ok(SetOutcome::Skipped);
        }

        let value = value.into_property_value(tag)?;
        backend.write_property(&self.object, tag, &value)?;
        self.insert(tag, value);
        Ok(SetOutcome::Written)
    }

    /// Applies [`PropertyStore::set`] to each pair independently.
    pub fn set_many(
        &mut self,
        backend: &dyn MessageStore,
        pairs: Vec<(PropertyTag, NativeValue)>,
    ) -> Vec<StoreResult<SetOutcome>> {
        pairs
            .into_iter()
            .map(|(tag, value)| self.set(backend, tag, value))
            .collect()
    }
}

/// Splits a flattened `tag, value, tag, value, ...` argument list.
pub fn pairs_from_args(args: Vec<NativeValue>) -> ServerResult<Vec<(PropertyTag, NativeValue)>> {
    if args.is_empty() || args.len() % 2 != 0 {
        return Err(ServerError::invalid_parameter(format!(
            "expected tag/value pairs, got {} arguments",
            args.len()
        )));
    }

    let mut pairs = Vec::with_capacity(args.len() / 2);
    let mut args = args.into_iter();
    while let (Some(tag), Some(value)) = (args.next(), args.next()) {
        let tag = match tag {
            NativeValue::Integer(raw) => {
                let raw = u32::try_from(raw).map_err(|_| {
                    ServerError::invalid_parameter(format!("tag {} is out of range", raw))
                })?;
                PropertyTag(raw)
            }
            other => {
                return Err(ServerError::invalid_parameter(format!(
                    "expected an integer tag, got {}",
                    other.kind()
                )));
            }
        };
        pairs.push((tag, value));
    }
    Ok(pairs)
}

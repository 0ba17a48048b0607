//! Hash maps keyed and valued by objects.
//!
//! A [`Map`] hashes and compares keys through their class operations, so a
//! dynamic string and its pooled twin address the same slot. The map owns
//! both halves of every entry: inserting retains, removing releases, and
//! deallocating the map releases everything it still holds.
//!
//! Keys must hash stably for as long as they sit in a map. Mutating a keyed
//! object's observable content mid-residence loses the entry, the same
//! contract every hash table imposes.
//!
//! Maps are not internally synchronized; confine each to one thread or
//! guard it externally.
//!
//! # Example
//!
//! ```rust
//! use cobalt::runtime::map::Map;
//! use cobalt::runtime::number::Number;
//! use cobalt::runtime::string::Str;
//!
//! let map = Map::new().unwrap();
//! let key = Str::pooled("answer").unwrap();
//! let value = Number::i32(42).unwrap();
//!
//! map.insert(key.object(), value.object());
//! value.release();
//!
//! // A content-equal key finds the entry.
//! let probe = Str::new("answer").unwrap();
//! assert!(map.get(probe.object()).is_some());
//! probe.release();
//!
//! map.release();
//! ```

use crate::error::Result;
use crate::runtime::class::{self, ClassDescriptor, ClassId, ClassOps};
use crate::runtime::object::ObjectRef;
use crate::runtime::string::Str;
use hashbrown::HashMap;
use hashbrown::hash_map::Entry;
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

/// Key wrapper routing `Hash`/`Eq` through the object's class operations.
#[derive(Clone, Copy)]
pub(crate) struct ObjKey(pub(crate) ObjectRef);

impl Hash for ObjKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash());
    }
}

impl PartialEq for ObjKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.equal(other.0)
    }
}

impl Eq for ObjKey {}

struct MapPayload {
    entries: HashMap<ObjKey, ObjectRef>,
}

static MAP_CLASS: ClassDescriptor = ClassDescriptor::new(
    "Map",
    size_of::<MapPayload>(),
    ClassOps {
        dealloc: Some(map_dealloc_op),
        hash: Some(map_hash_op),
        equal: Some(map_equal_op),
        to_string: Some(map_to_string_op),
        copy: Some(map_copy_op),
    },
);

/// The map class id, registering on first use.
pub fn map_class() -> ClassId {
    static ID: OnceLock<ClassId> = OnceLock::new();
    *ID.get_or_init(|| class::register(&MAP_CLASS))
}

/// An unordered object-to-object hash map.
///
/// `Copy` handle with the same manual ownership rules as [`ObjectRef`].
#[derive(Clone, Copy)]
pub struct Map(ObjectRef);

impl Map {
    /// Creates an empty map.
    ///
    /// # Errors
    ///
    /// [`crate::Error::OutOfMemory`] when allocation fails.
    pub fn new() -> Result<Map> {
        let obj = ObjectRef::alloc(map_class())?;
        // SAFETY: the payload slot is alloc_size bytes of fresh memory.
        unsafe {
            obj.payload_ptr().cast::<MapPayload>().write(MapPayload {
                entries: HashMap::new(),
            });
        }
        Ok(Map(obj))
    }

    /// Views an object as a map, `None` if it is not one.
    #[must_use]
    pub fn from_object(obj: ObjectRef) -> Option<Map> {
        obj.is_class(map_class()).then_some(Map(obj))
    }

    /// The underlying object reference.
    #[must_use]
    pub fn object(self) -> ObjectRef {
        self.0
    }

    fn payload(&self) -> &MapPayload {
        // SAFETY: initialized in new, alive per the handle contract.
        unsafe { &*self.0.payload_ptr().cast::<MapPayload>() }
    }

    #[allow(clippy::mut_from_ref)]
    fn payload_mut(&self) -> &mut MapPayload {
        // SAFETY: mutable containers require external confinement to one
        // thread, so no other reference is live during a mutation.
        unsafe { &mut *self.0.payload_ptr().cast::<MapPayload>() }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload().entries.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload().entries.is_empty()
    }

    /// Inserts or replaces an entry, returning `true` when the key was new.
    ///
    /// The key is retained only when the slot was vacant; replacing a value
    /// keeps the resident key. The new value is always retained and a
    /// replaced value is released.
    pub fn insert(&self, key: ObjectRef, value: ObjectRef) -> bool {
        match self.payload_mut().entries.entry(ObjKey(key)) {
            Entry::Vacant(slot) => {
                slot.insert(value.retain());
                key.retain();
                true
            }
            Entry::Occupied(mut slot) => {
                let old = std::mem::replace(slot.get_mut(), value.retain());
                old.release();
                false
            }
        }
    }

    /// Borrows the value for a key `equal` to `key`, `None` when absent.
    #[must_use]
    pub fn get(&self, key: ObjectRef) -> Option<ObjectRef> {
        self.payload().entries.get(&ObjKey(key)).copied()
    }

    /// Whether any resident key is `equal` to `key`.
    #[must_use]
    pub fn contains_key(&self, key: ObjectRef) -> bool {
        self.payload().entries.contains_key(&ObjKey(key))
    }

    /// Removes the entry for `key`, releasing both the resident key and the
    /// value. Returns `true` when an entry was removed.
    pub fn remove(&self, key: ObjectRef) -> bool {
        match self.payload_mut().entries.remove_entry(&ObjKey(key)) {
            Some((resident_key, value)) => {
                resident_key.0.release();
                value.release();
                true
            }
            None => false,
        }
    }

    /// Releases and removes every entry.
    pub fn clear(&self) {
        for (key, value) in self.payload_mut().entries.drain() {
            key.0.release();
            value.release();
        }
    }

    /// Calls `visit` for each entry in arbitrary order.
    pub fn for_each(&self, mut visit: impl FnMut(ObjectRef, ObjectRef)) {
        for (key, value) in &self.payload().entries {
            visit(key.0, *value);
        }
    }

    /// Retains the underlying object.
    pub fn retain(self) -> Map {
        self.0.retain();
        self
    }

    /// Releases the underlying object.
    pub fn release(self) {
        self.0.release();
    }

    /// Defers release to the current autorelease pool scope.
    pub fn autorelease(self) -> Map {
        self.0.autorelease();
        self
    }
}

fn map_dealloc_op(obj: ObjectRef) {
    let map = Map(obj);
    for (key, value) in map.payload_mut().entries.drain() {
        key.0.release();
        value.release();
    }
    // SAFETY: runs exactly once, just before the allocation is freed.
    unsafe {
        std::ptr::drop_in_place(obj.payload_ptr().cast::<MapPayload>());
    }
}

fn map_hash_op(obj: ObjectRef) -> u64 {
    // Entry hashes combine by XOR so iteration order does not matter,
    // matching the order-insensitive equality below.
    let map = Map(obj);
    let mut hash: u64 = 0;
    for (key, &value) in &map.payload().entries {
        hash ^= key.0.hash().wrapping_mul(0x9e37_79b9_7f4a_7c15) ^ value.hash();
    }
    hash
}

fn map_equal_op(a: ObjectRef, b: ObjectRef) -> bool {
    let (a, b) = (Map(a), Map(b));
    a.len() == b.len()
        && a.payload().entries.iter().all(|(key, &value)| {
            b.payload()
                .entries
                .get(key)
                .is_some_and(|&other| value.equal(other))
        })
}

fn map_to_string_op(obj: ObjectRef) -> Result<Str> {
    let map = Map(obj);
    let mut out = String::from("{");
    let mut first = true;
    for (key, &value) in &map.payload().entries {
        if !first {
            out.push_str(", ");
        }
        first = false;

        let rendered_key = key.0.to_string()?;
        let rendered_value = value.to_string()?;
        let _ = write!(out, "{}: {}", rendered_key.as_str(), rendered_value.as_str());
        rendered_key.release();
        rendered_value.release();
    }
    out.push('}');
    Str::new(&out)
}

fn map_copy_op(obj: ObjectRef) -> Result<ObjectRef> {
    let source = Map(obj);
    let copy = Map::new()?;
    for (key, &value) in &source.payload().entries {
        copy.insert(key.0, value);
    }
    Ok(copy.object())
}

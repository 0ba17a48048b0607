//! Hash sets of objects.
//!
//! A [`Set`] deduplicates by the members' class `hash`/`equal` operations.
//! Inserting an already-present member is a no-op that does not retain the
//! probe; the resident member stays. Everything else follows the ownership
//! rules of [`Map`](crate::runtime::map::Map): insert retains, remove
//! releases, dealloc releases the remainder.
//!
//! Sets are not internally synchronized; confine each to one thread or
//! guard it externally.

use crate::error::Result;
use crate::runtime::class::{self, ClassDescriptor, ClassId, ClassOps};
use crate::runtime::map::ObjKey;
use crate::runtime::object::ObjectRef;
use crate::runtime::string::Str;
use hashbrown::HashSet;
use std::fmt::Write as _;
use std::sync::OnceLock;

struct SetPayload {
    members: HashSet<ObjKey>,
}

static SET_CLASS: ClassDescriptor = ClassDescriptor::new(
    "Set",
    size_of::<SetPayload>(),
    ClassOps {
        dealloc: Some(set_dealloc_op),
        hash: Some(set_hash_op),
        equal: Some(set_equal_op),
        to_string: Some(set_to_string_op),
        copy: Some(set_copy_op),
    },
);

/// The set class id, registering on first use.
pub fn set_class() -> ClassId {
    static ID: OnceLock<ClassId> = OnceLock::new();
    *ID.get_or_init(|| class::register(&SET_CLASS))
}

/// An unordered set of objects deduplicated by content.
///
/// `Copy` handle with the same manual ownership rules as [`ObjectRef`].
#[derive(Clone, Copy)]
pub struct Set(ObjectRef);

impl Set {
    /// Creates an empty set.
    ///
    /// # Errors
    ///
    /// [`crate::Error::OutOfMemory`] when allocation fails.
    pub fn new() -> Result<Set> {
        let obj = ObjectRef::alloc(set_class())?;
        // SAFETY: the payload slot is alloc_size bytes of fresh memory.
        unsafe {
            obj.payload_ptr().cast::<SetPayload>().write(SetPayload {
                members: HashSet::new(),
            });
        }
        Ok(Set(obj))
    }

    /// Views an object as a set, `None` if it is not one.
    #[must_use]
    pub fn from_object(obj: ObjectRef) -> Option<Set> {
        obj.is_class(set_class()).then_some(Set(obj))
    }

    /// The underlying object reference.
    #[must_use]
    pub fn object(self) -> ObjectRef {
        self.0
    }

    fn payload(&self) -> &SetPayload {
        // SAFETY: initialized in new, alive per the handle contract.
        unsafe { &*self.0.payload_ptr().cast::<SetPayload>() }
    }

    #[allow(clippy::mut_from_ref)]
    fn payload_mut(&self) -> &mut SetPayload {
        // SAFETY: mutable containers require external confinement to one
        // thread, so no other reference is live during a mutation.
        unsafe { &mut *self.0.payload_ptr().cast::<SetPayload>() }
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload().members.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload().members.is_empty()
    }

    /// Inserts a member, retaining it, and returns `true` when it was new.
    /// A duplicate probe is not retained and the resident member stays.
    pub fn insert(&self, obj: ObjectRef) -> bool {
        let members = &mut self.payload_mut().members;
        if members.contains(&ObjKey(obj)) {
            return false;
        }
        members.insert(ObjKey(obj.retain()));
        true
    }

    /// Whether any member is `equal` to `obj`.
    #[must_use]
    pub fn contains(&self, obj: ObjectRef) -> bool {
        self.payload().members.contains(&ObjKey(obj))
    }

    /// Removes the member `equal` to `obj`, releasing the set's reference.
    /// Returns `true` when a member was removed.
    pub fn remove(&self, obj: ObjectRef) -> bool {
        match self.payload_mut().members.take(&ObjKey(obj)) {
            Some(resident) => {
                resident.0.release();
                true
            }
            None => false,
        }
    }

    /// Releases and removes every member.
    pub fn clear(&self) {
        for member in self.payload_mut().members.drain() {
            member.0.release();
        }
    }

    /// Calls `visit` for each member in arbitrary order.
    pub fn for_each(&self, mut visit: impl FnMut(ObjectRef)) {
        for member in &self.payload().members {
            visit(member.0);
        }
    }

    /// Retains the underlying object.
    pub fn retain(self) -> Set {
        self.0.retain();
        self
    }

    /// Releases the underlying object.
    pub fn release(self) {
        self.0.release();
    }

    /// Defers release to the current autorelease pool scope.
    pub fn autorelease(self) -> Set {
        self.0.autorelease();
        self
    }
}

fn set_dealloc_op(obj: ObjectRef) {
    let set = Set(obj);
    for member in set.payload_mut().members.drain() {
        member.0.release();
    }
    // SAFETY: runs exactly once, just before the allocation is freed.
    unsafe {
        std::ptr::drop_in_place(obj.payload_ptr().cast::<SetPayload>());
    }
}

fn set_hash_op(obj: ObjectRef) -> u64 {
    // Member hashes combine by XOR so iteration order does not matter,
    // matching the membership equality below.
    let set = Set(obj);
    let mut hash: u64 = 0;
    for member in &set.payload().members {
        hash ^= member.0.hash().wrapping_mul(0x9e37_79b9_7f4a_7c15);
    }
    hash
}

fn set_equal_op(a: ObjectRef, b: ObjectRef) -> bool {
    let (a, b) = (Set(a), Set(b));
    a.len() == b.len()
        && a.payload()
            .members
            .iter()
            .all(|member| b.payload().members.contains(member))
}

fn set_to_string_op(obj: ObjectRef) -> Result<Str> {
    let set = Set(obj);
    let mut out = String::from("{");
    let mut first = true;
    for member in &set.payload().members {
        if !first {
            out.push_str(", ");
        }
        first = false;

        let rendered = member.0.to_string()?;
        let _ = write!(out, "{}", rendered.as_str());
        rendered.release();
    }
    out.push('}');
    Str::new(&out)
}

fn set_copy_op(obj: ObjectRef) -> Result<ObjectRef> {
    let source = Set(obj);
    let copy = Set::new()?;
    for member in &source.payload().members {
        copy.insert(member.0);
    }
    Ok(copy.object())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::number::Number;

    #[test]
    fn test_insert_deduplicates_by_content() {
        let set = Set::new().unwrap();
        let a = Number::i32(4).unwrap();
        let twin = Number::i32(4).unwrap();

        assert!(set.insert(a.object()));
        assert!(!set.insert(twin.object()));
        assert_eq!(set.len(), 1);
        // The duplicate probe was not retained.
        assert_eq!(twin.object().refcount(), 1);
        assert_eq!(a.object().refcount(), 2);

        a.release();
        twin.release();
        set.release();
    }

    #[test]
    fn test_contains_and_remove_by_content() {
        let set = Set::new().unwrap();
        let member = Str::new("tag").unwrap();
        set.insert(member.object());

        let probe = Str::new("tag").unwrap();
        assert!(set.contains(probe.object()));
        assert!(set.remove(probe.object()));
        assert!(!set.contains(probe.object()));
        assert_eq!(member.object().refcount(), 1);

        probe.release();
        member.release();
        set.release();
    }

    #[test]
    fn test_equality_is_membership() {
        let a = Set::new().unwrap();
        let b = Set::new().unwrap();
        let one = Number::i32(1).unwrap();
        let two = Number::i32(2).unwrap();

        a.insert(one.object());
        a.insert(two.object());
        b.insert(two.object());
        b.insert(one.object());
        assert!(a.object().equal(b.object()));

        b.remove(one.object());
        assert!(!a.object().equal(b.object()));

        one.release();
        two.release();
        a.release();
        b.release();
    }

    #[test]
    fn test_copy_is_shallow() {
        let set = Set::new().unwrap();
        let n = Number::i32(6).unwrap();
        set.insert(n.object());

        let copy = Set::from_object(set.object().copy().unwrap()).unwrap();
        assert_eq!(copy.len(), 1);
        assert!(copy.contains(n.object()));
        assert_eq!(n.object().refcount(), 3);

        copy.release();
        n.release();
        set.release();
    }

    #[test]
    fn test_equal_container_members_deduplicate() {
        use crate::runtime::list::List;

        let set = Set::new().unwrap();
        let n = Number::i32(1).unwrap();
        let member = List::new().unwrap();
        member.push(n.object());
        let twin = List::new().unwrap();
        twin.push(n.object());

        assert!(set.insert(member.object()));
        // A structurally equal list is a duplicate, not a second member.
        assert!(!set.insert(twin.object()));
        assert_eq!(set.len(), 1);
        assert!(set.contains(twin.object()));
        assert_eq!(twin.object().refcount(), 1);

        n.release();
        twin.release();
        member.release();
        set.release();
    }

    #[test]
    fn test_clear_releases_members() {
        let set = Set::new().unwrap();
        let n = Number::i32(8).unwrap();
        set.insert(n.object());

        set.clear();
        assert!(set.is_empty());
        assert_eq!(n.object().refcount(), 1);

        n.release();
        set.release();
    }
}

//! Ordered object lists.
//!
//! A [`List`] owns its elements: pushing retains, removing releases, and
//! deallocating the list releases everything it still holds. `get` hands out
//! a borrowed reference valid while the list keeps its own; callers retain
//! if they need the element past the next mutation.
//!
//! Lists are not internally synchronized. Like every mutable container in
//! this runtime, a list must be confined to one thread or guarded externally.
//!
//! # Example
//!
//! ```rust
//! use cobalt::runtime::list::List;
//! use cobalt::runtime::number::Number;
//!
//! let list = List::new().unwrap();
//! let n = Number::i32(5).unwrap();
//! list.push(n.object());
//! n.release();
//!
//! assert_eq!(list.len(), 1);
//! list.release();
//! ```

use crate::error::Result;
use crate::runtime::class::{self, ClassDescriptor, ClassId, ClassOps};
use crate::runtime::object::ObjectRef;
use crate::runtime::string::Str;
use std::fmt::Write as _;
use std::sync::OnceLock;

struct ListPayload {
    items: Vec<ObjectRef>,
}

static LIST_CLASS: ClassDescriptor = ClassDescriptor::new(
    "List",
    size_of::<ListPayload>(),
    ClassOps {
        dealloc: Some(list_dealloc_op),
        hash: Some(list_hash_op),
        equal: Some(list_equal_op),
        to_string: Some(list_to_string_op),
        copy: Some(list_copy_op),
    },
);

/// The list class id, registering on first use.
pub fn list_class() -> ClassId {
    static ID: OnceLock<ClassId> = OnceLock::new();
    *ID.get_or_init(|| class::register(&LIST_CLASS))
}

/// An ordered, growable sequence of objects.
///
/// `Copy` handle with the same manual ownership rules as [`ObjectRef`].
#[derive(Clone, Copy)]
pub struct List(ObjectRef);

impl List {
    /// Creates an empty list.
    ///
    /// # Errors
    ///
    /// [`crate::Error::OutOfMemory`] when allocation fails.
    pub fn new() -> Result<List> {
        let obj = ObjectRef::alloc(list_class())?;
        // SAFETY: the payload slot is alloc_size bytes of fresh memory.
        unsafe {
            obj.payload_ptr()
                .cast::<ListPayload>()
                .write(ListPayload { items: Vec::new() });
        }
        Ok(List(obj))
    }

    /// Views an object as a list, `None` if it is not one.
    #[must_use]
    pub fn from_object(obj: ObjectRef) -> Option<List> {
        obj.is_class(list_class()).then_some(List(obj))
    }

    /// The underlying object reference.
    #[must_use]
    pub fn object(self) -> ObjectRef {
        self.0
    }

    fn payload(&self) -> &ListPayload {
        // SAFETY: initialized in new, alive per the handle contract.
        unsafe { &*self.0.payload_ptr().cast::<ListPayload>() }
    }

    #[allow(clippy::mut_from_ref)]
    fn payload_mut(&self) -> &mut ListPayload {
        // SAFETY: mutable containers require external confinement to one
        // thread, so no other reference is live during a mutation.
        unsafe { &mut *self.0.payload_ptr().cast::<ListPayload>() }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload().items.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload().items.is_empty()
    }

    /// Appends an element, retaining it on behalf of the list.
    pub fn push(&self, obj: ObjectRef) {
        self.payload_mut().items.push(obj.retain());
    }

    /// Removes and returns the last element, transferring its reference to
    /// the caller.
    pub fn pop(&self) -> Option<ObjectRef> {
        self.payload_mut().items.pop()
    }

    /// Borrows the element at `index`. The reference stays valid while the
    /// list holds its own.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<ObjectRef> {
        self.payload().items.get(index).copied()
    }

    /// Replaces the element at `index`, retaining the new element and
    /// releasing the old one.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn set(&self, index: usize, obj: ObjectRef) {
        let items = &mut self.payload_mut().items;
        let old = std::mem::replace(&mut items[index], obj.retain());
        old.release();
    }

    /// Inserts an element at `index`, retaining it and shifting the tail.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&self, index: usize, obj: ObjectRef) {
        self.payload_mut().items.insert(index, obj.retain());
    }

    /// Removes the element at `index`, releasing the list's reference.
    pub fn remove(&self, index: usize) -> bool {
        let items = &mut self.payload_mut().items;
        if index >= items.len() {
            return false;
        }
        items.remove(index).release();
        true
    }

    /// Releases and removes every element.
    pub fn clear(&self) {
        for item in self.payload_mut().items.drain(..) {
            item.release();
        }
    }

    /// Index of the first element `equal` to `needle`.
    #[must_use]
    pub fn index_of(&self, needle: ObjectRef) -> Option<usize> {
        self.payload().items.iter().position(|&item| item.equal(needle))
    }

    /// Retains the underlying object.
    pub fn retain(self) -> List {
        self.0.retain();
        self
    }

    /// Releases the underlying object.
    pub fn release(self) {
        self.0.release();
    }

    /// Defers release to the current autorelease pool scope.
    pub fn autorelease(self) -> List {
        self.0.autorelease();
        self
    }
}

fn list_dealloc_op(obj: ObjectRef) {
    let list = List(obj);
    for item in list.payload_mut().items.drain(..) {
        item.release();
    }
    // SAFETY: runs exactly once, just before the allocation is freed.
    unsafe {
        std::ptr::drop_in_place(obj.payload_ptr().cast::<ListPayload>());
    }
}

fn list_hash_op(obj: ObjectRef) -> u64 {
    // FNV-1a fold over element hashes, so content-equal lists hash alike
    // and order matters as it does for equality.
    let list = List(obj);
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &item in &list.payload().items {
        hash = (hash ^ item.hash()).wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn list_equal_op(a: ObjectRef, b: ObjectRef) -> bool {
    let (a, b) = (List(a), List(b));
    a.len() == b.len()
        && a.payload()
            .items
            .iter()
            .zip(&b.payload().items)
            .all(|(&x, &y)| x.equal(y))
}

fn list_to_string_op(obj: ObjectRef) -> Result<Str> {
    let list = List(obj);
    let mut out = String::from("[");
    for (i, &item) in list.payload().items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let rendered = item.to_string()?;
        let _ = write!(out, "{}", rendered.as_str());
        rendered.release();
    }
    out.push(']');
    Str::new(&out)
}

fn list_copy_op(obj: ObjectRef) -> Result<ObjectRef> {
    let source = List(obj);
    let copy = List::new()?;
    for &item in &source.payload().items {
        copy.push(item);
    }
    Ok(copy.object())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::number::Number;

    #[test]
    fn test_push_retains_and_pop_transfers() {
        let list = List::new().unwrap();
        let n = Number::i32(1).unwrap();
        assert_eq!(n.object().refcount(), 1);

        list.push(n.object());
        assert_eq!(n.object().refcount(), 2);

        let popped = list.pop().unwrap();
        assert_eq!(popped.refcount(), 2);
        popped.release();
        assert_eq!(n.object().refcount(), 1);

        n.release();
        list.release();
    }

    #[test]
    fn test_get_borrows() {
        let list = List::new().unwrap();
        let n = Number::i32(7).unwrap();
        list.push(n.object());
        n.release();

        let borrowed = list.get(0).unwrap();
        assert_eq!(Number::from_object(borrowed).unwrap().to_i32(), 7);
        assert_eq!(borrowed.refcount(), 1);
        assert!(list.get(1).is_none());

        list.release();
    }

    #[test]
    fn test_set_swaps_ownership() {
        let list = List::new().unwrap();
        let old = Number::i32(1).unwrap();
        let new = Number::i32(2).unwrap();

        list.push(old.object());
        list.set(0, new.object());
        assert_eq!(old.object().refcount(), 1);
        assert_eq!(new.object().refcount(), 2);

        old.release();
        new.release();
        list.release();
    }

    #[test]
    fn test_remove_and_clear_release() {
        let list = List::new().unwrap();
        let a = Number::i32(1).unwrap();
        let b = Number::i32(2).unwrap();
        list.push(a.object());
        list.push(b.object());

        assert!(list.remove(0));
        assert!(!list.remove(5));
        assert_eq!(a.object().refcount(), 1);

        list.clear();
        assert_eq!(b.object().refcount(), 1);
        assert!(list.is_empty());

        a.release();
        b.release();
        list.release();
    }

    #[test]
    fn test_equality_is_elementwise() {
        let a = List::new().unwrap();
        let b = List::new().unwrap();
        let one = Number::i32(1).unwrap();
        let one_again = Number::i32(1).unwrap();

        a.push(one.object());
        b.push(one_again.object());
        assert!(a.object().equal(b.object()));

        let two = Number::i32(2).unwrap();
        b.push(two.object());
        assert!(!a.object().equal(b.object()));

        one.release();
        one_again.release();
        two.release();
        a.release();
        b.release();
    }

    #[test]
    fn test_copy_is_shallow() {
        let list = List::new().unwrap();
        let n = Number::i32(3).unwrap();
        list.push(n.object());

        let copy = List::from_object(list.object().copy().unwrap()).unwrap();
        assert_eq!(copy.len(), 1);
        // Both lists hold the same element.
        assert_eq!(copy.get(0).unwrap(), list.get(0).unwrap());
        assert_eq!(n.object().refcount(), 3);

        copy.release();
        assert_eq!(n.object().refcount(), 2);

        n.release();
        list.release();
    }

    #[test]
    fn test_index_of_uses_content_equality() {
        let list = List::new().unwrap();
        let n = Number::i32(9).unwrap();
        list.push(n.object());

        let twin = Number::i32(9).unwrap();
        assert_eq!(list.index_of(twin.object()), Some(0));

        let other = Number::i32(10).unwrap();
        assert_eq!(list.index_of(other.object()), None);

        n.release();
        twin.release();
        other.release();
        list.release();
    }

    #[test]
    fn test_equal_lists_hash_alike() {
        let a = List::new().unwrap();
        let b = List::new().unwrap();
        let one = Number::i32(1).unwrap();
        let two = Number::i32(2).unwrap();

        a.push(one.object());
        b.push(one.object());
        assert_eq!(a.object().hash(), b.object().hash());

        a.push(two.object());
        b.push(two.object());
        assert_eq!(a.object().hash(), b.object().hash());

        // Element order feeds the hash the same way it feeds equality.
        let reversed = List::new().unwrap();
        reversed.push(two.object());
        reversed.push(one.object());
        assert_ne!(a.object().hash(), reversed.object().hash());

        one.release();
        two.release();
        a.release();
        b.release();
        reversed.release();
    }

    #[test]
    fn test_to_string_renders_elements() {
        let list = List::new().unwrap();
        let a = Number::i32(1).unwrap();
        let b = Number::i32(2).unwrap();
        list.push(a.object());
        list.push(b.object());

        let s = list.object().to_string().unwrap();
        assert_eq!(s.as_str(), "[1, 2]");

        s.release();
        a.release();
        b.release();
        list.release();
    }
}

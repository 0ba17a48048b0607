//! Mutable byte buffers.
//!
//! A [`Bytes`] object wraps a growable byte vector. Unlike the object
//! containers it holds plain data, so `copy` is a deep copy: the clone owns
//! an independent buffer and later writes to either side are invisible to
//! the other. Equality and ordering are content-wise, byte by byte.
//!
//! Buffers are not internally synchronized; confine each to one thread or
//! guard it externally.

use crate::error::Result;
use crate::runtime::class::{self, ClassDescriptor, ClassId, ClassOps};
use crate::runtime::object::ObjectRef;
use crate::runtime::string::Str;
use std::cmp::Ordering;
use std::fmt::Write as _;
use std::ops::Range;
use std::sync::OnceLock;

struct BytesPayload {
    data: Vec<u8>,
}

static BYTES_CLASS: ClassDescriptor = ClassDescriptor::new(
    "Bytes",
    size_of::<BytesPayload>(),
    ClassOps {
        dealloc: Some(bytes_dealloc_op),
        hash: Some(bytes_hash_op),
        equal: Some(bytes_equal_op),
        to_string: Some(bytes_to_string_op),
        copy: Some(bytes_copy_op),
    },
);

/// The bytes class id, registering on first use.
pub fn bytes_class() -> ClassId {
    static ID: OnceLock<ClassId> = OnceLock::new();
    *ID.get_or_init(|| class::register(&BYTES_CLASS))
}

/// A refcounted mutable byte buffer.
///
/// `Copy` handle with the same manual ownership rules as [`ObjectRef`].
#[derive(Clone, Copy)]
pub struct Bytes(ObjectRef);

impl Bytes {
    /// Creates a zero-filled buffer of `len` bytes.
    ///
    /// # Errors
    ///
    /// [`crate::Error::OutOfMemory`] when allocation fails.
    pub fn with_len(len: usize) -> Result<Bytes> {
        Self::alloc_with(vec![0; len])
    }

    /// Creates a buffer holding a copy of `data`.
    ///
    /// # Errors
    ///
    /// [`crate::Error::OutOfMemory`] when allocation fails.
    pub fn from_slice(data: &[u8]) -> Result<Bytes> {
        Self::alloc_with(data.to_vec())
    }

    fn alloc_with(data: Vec<u8>) -> Result<Bytes> {
        let obj = ObjectRef::alloc(bytes_class())?;
        // SAFETY: the payload slot is alloc_size bytes of fresh memory.
        unsafe {
            obj.payload_ptr()
                .cast::<BytesPayload>()
                .write(BytesPayload { data });
        }
        Ok(Bytes(obj))
    }

    /// Views an object as a byte buffer, `None` if it is not one.
    #[must_use]
    pub fn from_object(obj: ObjectRef) -> Option<Bytes> {
        obj.is_class(bytes_class()).then_some(Bytes(obj))
    }

    /// The underlying object reference.
    #[must_use]
    pub fn object(self) -> ObjectRef {
        self.0
    }

    fn payload(&self) -> &BytesPayload {
        // SAFETY: initialized in alloc_with, alive per the handle contract.
        unsafe { &*self.0.payload_ptr().cast::<BytesPayload>() }
    }

    #[allow(clippy::mut_from_ref)]
    fn payload_mut(&self) -> &mut BytesPayload {
        // SAFETY: mutable containers require external confinement to one
        // thread, so no other reference is live during a mutation.
        unsafe { &mut *self.0.payload_ptr().cast::<BytesPayload>() }
    }

    /// Buffer length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload().data.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload().data.is_empty()
    }

    /// The content as a slice, valid until the next mutation.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.payload().data
    }

    /// The byte at `index`, `None` when out of bounds.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<u8> {
        self.payload().data.get(index).copied()
    }

    /// Writes the byte at `index`; `false` when out of bounds.
    pub fn set(&self, index: usize, byte: u8) -> bool {
        match self.payload_mut().data.get_mut(index) {
            Some(slot) => {
                *slot = byte;
                true
            }
            None => false,
        }
    }

    /// Appends a byte.
    pub fn push(&self, byte: u8) {
        self.payload_mut().data.push(byte);
    }

    /// Fills the whole buffer with `byte`.
    pub fn fill(&self, byte: u8) {
        self.payload_mut().data.fill(byte);
    }

    /// Fills `range` with `byte`; `false` when the range exceeds the buffer.
    pub fn fill_range(&self, range: Range<usize>, byte: u8) -> bool {
        match self.payload_mut().data.get_mut(range) {
            Some(slice) => {
                slice.fill(byte);
                true
            }
            None => false,
        }
    }

    /// Lexicographic comparison against another buffer, `memcmp` semantics
    /// with the shorter buffer ordering first on a shared prefix.
    #[must_use]
    pub fn compare(&self, other: Bytes) -> Ordering {
        self.payload().data.cmp(&other.payload().data)
    }

    /// Retains the underlying object.
    pub fn retain(self) -> Bytes {
        self.0.retain();
        self
    }

    /// Releases the underlying object.
    pub fn release(self) {
        self.0.release();
    }

    /// Defers release to the current autorelease pool scope.
    pub fn autorelease(self) -> Bytes {
        self.0.autorelease();
        self
    }
}

fn bytes_dealloc_op(obj: ObjectRef) {
    // SAFETY: runs exactly once, just before the allocation is freed.
    unsafe {
        std::ptr::drop_in_place(obj.payload_ptr().cast::<BytesPayload>());
    }
}

fn bytes_hash_op(obj: ObjectRef) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for &byte in &Bytes(obj).payload().data {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn bytes_equal_op(a: ObjectRef, b: ObjectRef) -> bool {
    Bytes(a).payload().data == Bytes(b).payload().data
}

fn bytes_to_string_op(obj: ObjectRef) -> Result<Str> {
    let bytes = Bytes(obj);
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in &bytes.payload().data {
        let _ = write!(out, "{byte:02x}");
    }
    Str::new(&out)
}

fn bytes_copy_op(obj: ObjectRef) -> Result<ObjectRef> {
    Ok(Bytes::from_slice(Bytes(obj).as_slice())?.object())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_len_zero_fills() {
        let b = Bytes::with_len(4).unwrap();
        assert_eq!(b.as_slice(), &[0, 0, 0, 0]);
        b.release();
    }

    #[test]
    fn test_get_set_bounds() {
        let b = Bytes::with_len(2).unwrap();
        assert!(b.set(1, 0xab));
        assert!(!b.set(2, 0xff));
        assert_eq!(b.get(1), Some(0xab));
        assert_eq!(b.get(2), None);
        b.release();
    }

    #[test]
    fn test_fill_and_fill_range() {
        let b = Bytes::with_len(4).unwrap();
        b.fill(0x11);
        assert_eq!(b.as_slice(), &[0x11; 4]);

        assert!(b.fill_range(1..3, 0x22));
        assert_eq!(b.as_slice(), &[0x11, 0x22, 0x22, 0x11]);

        assert!(!b.fill_range(2..5, 0x33));
        assert_eq!(b.as_slice(), &[0x11, 0x22, 0x22, 0x11]);
        b.release();
    }

    #[test]
    fn test_compare_is_memcmp_like() {
        let a = Bytes::from_slice(b"abc").unwrap();
        let b = Bytes::from_slice(b"abd").unwrap();
        let prefix = Bytes::from_slice(b"ab").unwrap();

        assert_eq!(a.compare(b), Ordering::Less);
        assert_eq!(b.compare(a), Ordering::Greater);
        assert_eq!(prefix.compare(a), Ordering::Less);
        assert_eq!(a.compare(a), Ordering::Equal);

        a.release();
        b.release();
        prefix.release();
    }

    #[test]
    fn test_structural_equality() {
        let a = Bytes::from_slice(&[1, 2, 3]).unwrap();
        let b = Bytes::from_slice(&[1, 2, 3]).unwrap();
        let c = Bytes::from_slice(&[1, 2]).unwrap();

        assert!(a.object().equal(b.object()));
        assert!(!a.object().equal(c.object()));
        assert_eq!(a.object().hash(), b.object().hash());

        a.release();
        b.release();
        c.release();
    }

    #[test]
    fn test_copy_is_deep() {
        let original = Bytes::from_slice(&[9, 9]).unwrap();
        let copy = Bytes::from_object(original.object().copy().unwrap()).unwrap();

        copy.set(0, 0);
        assert_eq!(original.get(0), Some(9));
        assert_eq!(copy.get(0), Some(0));
        assert!(!original.object().equal(copy.object()));

        copy.release();
        original.release();
    }

    #[test]
    fn test_to_string_is_hex() {
        let b = Bytes::from_slice(&[0x00, 0xff, 0x10]).unwrap();
        let s = b.object().to_string().unwrap();
        assert_eq!(s.as_str(), "00ff10");
        s.release();
        b.release();
    }
}

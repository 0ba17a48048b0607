//! Runtime strings: pooled (interned) and dynamic instances.
//!
//! A [`Str`] is an object whose text is stored as inline trailing bytes in
//! the same allocation block as the header. Two forms exist:
//!
//! - **Pooled**: deduplicated by content hash in a fixed-bucket global table.
//!   Pooled instances are [`CONSTANT`](crate::runtime::object::ObjectFlags)
//!   objects: shared, exempt from refcounting, never freed. The same text
//!   always yields the identical instance.
//! - **Dynamic**: always freshly allocated, even when the content duplicates
//!   a pooled entry. A dynamic string is still `equal` to its pooled twin,
//!   since equality is by content.
//!
//! The content hash is computed once, lazily, on first query and cached
//! behind a sentinel "unset" value; subsequent queries are O(1).
//!
//! # Thread Safety
//!
//! The pool table is guarded by an `RwLock` (written rarely, read often).
//! Individual strings are immutable after construction.
//!
//! # Example
//!
//! ```rust
//! use cobalt::runtime::string::Str;
//!
//! let a = Str::pooled("init").unwrap();
//! let b = Str::pooled("init").unwrap();
//! assert_eq!(a.object(), b.object()); // identical instance
//!
//! let c = Str::new("init").unwrap();
//! assert_ne!(a.object(), c.object()); // distinct allocation
//! assert!(a.object().equal(c.object())); // same content
//! c.release();
//! ```

use crate::error::Result;
use crate::runtime::class::{self, ClassDescriptor, ClassId, ClassOps};
use crate::runtime::object::{ObjectFlags, ObjectRef};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{OnceLock, RwLock};

/// Number of hash buckets in the string pool (power of two for fast modulo).
const POOL_BUCKETS: usize = 256;

/// Sentinel for a hash that has not been computed yet.
const HASH_UNSET: u64 = 0;

/// String payload: byte length plus the lazily cached content hash.
/// The text bytes follow inline as the object's extra bytes.
#[repr(C)]
struct StrPayload {
    /// Byte length of the text. Fixed at construction; Rust string slices
    /// carry their length, so only the hash is worth lazy treatment.
    len: u32,
    /// Cached content hash; [`HASH_UNSET`] until first query.
    hash: AtomicU64,
}

/// String class descriptor: content hash/equality, trivial dealloc (the text
/// is inline), default copy (immutable, so retain the same instance).
static STRING_CLASS: ClassDescriptor = ClassDescriptor::new(
    "String",
    size_of::<StrPayload>(),
    ClassOps {
        dealloc: None,
        hash: Some(str_hash_op),
        equal: Some(str_equal_op),
        to_string: Some(str_to_string_op),
        copy: None,
    },
);

/// The string class id, registering on first use.
pub fn string_class() -> ClassId {
    static ID: OnceLock<ClassId> = OnceLock::new();
    *ID.get_or_init(|| class::register(&STRING_CLASS))
}

/// A runtime string object.
///
/// `Copy` handle with the same manual ownership rules as [`ObjectRef`].
/// Pooled instances are constant; retain/release on them are no-ops.
#[derive(Clone, Copy)]
pub struct Str(ObjectRef);

impl Str {
    /// Creates a dynamic string with the given content.
    ///
    /// Always allocates, even when an identical pooled instance exists.
    /// The caller owns the returned reference.
    ///
    /// # Errors
    ///
    /// [`crate::Error::OutOfMemory`] when allocation fails.
    pub fn new(text: &str) -> Result<Str> {
        Self::alloc_with(text, ObjectFlags::empty(), HASH_UNSET)
    }

    /// Creates a dynamic string from format arguments.
    ///
    /// # Example
    ///
    /// ```rust
    /// use cobalt::runtime::string::Str;
    ///
    /// let s = Str::format(format_args!("{}-{}", "frame", 7)).unwrap();
    /// assert_eq!(s.as_str(), "frame-7");
    /// s.release();
    /// ```
    pub fn format(args: fmt::Arguments<'_>) -> Result<Str> {
        let rendered = fmt::format(args);
        Self::new(&rendered)
    }

    /// Returns the shared pooled instance for `text`, interning on miss.
    ///
    /// Idempotent: the same text always returns the identical object. The
    /// returned instance is constant; releasing it is a no-op.
    ///
    /// # Errors
    ///
    /// [`crate::Error::OutOfMemory`] when a first-time interning cannot
    /// allocate.
    pub fn pooled(text: &str) -> Result<Str> {
        let hash = content_hash(text.as_bytes());
        let bucket = (hash as usize) & (POOL_BUCKETS - 1);
        let pool = pool();

        {
            let buckets = pool.buckets.read().unwrap();
            if let Some(existing) = find_in_bucket(&buckets[bucket], text) {
                return Ok(existing);
            }
        }

        let mut buckets = pool.buckets.write().unwrap();
        // Re-check: another thread may have interned between the locks.
        if let Some(existing) = find_in_bucket(&buckets[bucket], text) {
            return Ok(existing);
        }

        let interned = Self::alloc_with(text, ObjectFlags::CONSTANT, hash)?;
        buckets[bucket].push(interned);
        cobalt_log::trace!("interned {:?} ({} bytes)", text, text.len());
        Ok(interned)
    }

    /// The process-wide constant empty string.
    ///
    /// # Panics
    ///
    /// Panics if the singleton cannot be allocated on first use.
    #[must_use]
    pub fn empty() -> Str {
        static EMPTY: OnceLock<Str> = OnceLock::new();
        *EMPTY.get_or_init(|| {
            Str::pooled("").expect("failed to allocate the empty string singleton")
        })
    }

    fn alloc_with(text: &str, flags: ObjectFlags, hash: u64) -> Result<Str> {
        let obj = ObjectRef::alloc_extra(string_class(), text.len(), flags)?;

        let payload = obj.payload_ptr().cast::<StrPayload>();
        // SAFETY: the payload slot is alloc_size bytes of fresh memory and
        // the extra region is text.len() bytes directly after it.
        unsafe {
            payload.write(StrPayload {
                len: text.len() as u32,
                hash: AtomicU64::new(hash),
            });
            std::ptr::copy_nonoverlapping(text.as_ptr(), obj.payload_extra_ptr(), text.len());
        }
        Ok(Str(obj))
    }

    /// Views an object as a string, `None` if it is not one.
    #[must_use]
    pub fn from_object(obj: ObjectRef) -> Option<Str> {
        obj.is_class(string_class()).then_some(Str(obj))
    }

    /// The underlying object reference.
    #[must_use]
    pub fn object(self) -> ObjectRef {
        self.0
    }

    fn payload(&self) -> &StrPayload {
        // SAFETY: constructed by alloc_with, payload is initialized and the
        // object is alive per the handle contract.
        unsafe { &*self.0.payload_ptr().cast::<StrPayload>() }
    }

    /// The text content.
    #[must_use]
    pub fn as_str(&self) -> &str {
        let len = self.payload().len as usize;
        // SAFETY: the inline bytes were copied from a &str and are immutable.
        unsafe {
            let bytes = std::slice::from_raw_parts(self.0.payload_extra_ptr(), len);
            std::str::from_utf8_unchecked(bytes)
        }
    }

    /// Byte length of the text.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload().len as usize
    }

    /// Whether the text is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload().len == 0
    }

    /// Content hash, computed on first query and cached.
    #[must_use]
    pub fn hash(&self) -> u64 {
        let payload = self.payload();
        let cached = payload.hash.load(Ordering::Acquire);
        if cached != HASH_UNSET {
            return cached;
        }

        let computed = content_hash(self.as_str().as_bytes());
        payload.hash.store(computed, Ordering::Release);
        computed
    }

    /// Retains the underlying object (no-op for pooled instances).
    pub fn retain(self) -> Str {
        self.0.retain();
        self
    }

    /// Releases the underlying object (no-op for pooled instances).
    pub fn release(self) {
        self.0.release();
    }

    /// Defers release to the current autorelease pool scope.
    pub fn autorelease(self) -> Str {
        self.0.autorelease();
        self
    }
}

impl fmt::Debug for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Str({:?})", self.as_str())
    }
}

impl fmt::Display for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Global string pool.
struct StringPool {
    /// Fixed bucket table; each bucket chains interned instances.
    buckets: RwLock<Vec<Vec<Str>>>,
}

static POOL: OnceLock<StringPool> = OnceLock::new();

fn pool() -> &'static StringPool {
    POOL.get_or_init(|| StringPool {
        buckets: RwLock::new((0..POOL_BUCKETS).map(|_| Vec::new()).collect()),
    })
}

fn find_in_bucket(bucket: &[Str], text: &str) -> Option<Str> {
    bucket.iter().copied().find(|s| s.as_str() == text)
}

/// FNV-1a over the content bytes, remapped off the unset sentinel.
fn content_hash(bytes: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    if hash == HASH_UNSET {
        hash = FNV_OFFSET;
    }
    hash
}

fn str_hash_op(obj: ObjectRef) -> u64 {
    Str(obj).hash()
}

fn str_equal_op(a: ObjectRef, b: ObjectRef) -> bool {
    Str(a).as_str() == Str(b).as_str()
}

fn str_to_string_op(obj: ObjectRef) -> Result<Str> {
    Ok(Str(obj.retain()))
}

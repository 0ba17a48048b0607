//! Object allocation and lifecycle for the Cobalt runtime.
//!
//! Every heap object begins with an `ObjectHeader`: the class id, a flag
//! word, an atomic reference count, and the allocator bookkeeping needed to
//! free the block. The class payload follows the header in the same
//! allocation, optionally trailed by inline extra bytes.
//!
//! # Ownership model
//!
//! [`ObjectRef`] is a `Copy` handle; lifetime is managed manually with
//! [`retain`](ObjectRef::retain) and [`release`](ObjectRef::release), or
//! deferred through an [autorelease pool](crate::runtime::autorelease).
//! An object whose refcount reaches zero is deallocated exactly once;
//! touching it afterwards is a contract violation, not a checked error;
//! the hot path carries no use-after-free guards. The
//! [tracker](crate::runtime::track) can be enabled to diagnose leaks and
//! double releases during development.
//!
//! # Thread Safety
//!
//! Reference counts are atomic, so handles to the same object may be
//! retained and released from multiple threads. Payload mutation (the
//! containers) is not synchronized.

use crate::error::{Error, Result};
use crate::runtime::autorelease;
use crate::runtime::class::{self, ClassDescriptor, ClassId};
use crate::runtime::string::Str;
use crate::runtime::track;
use bitflags::bitflags;
use cobalt_mem::{Allocator, default_allocator};
use std::alloc::Layout;
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

/// Alignment of every object allocation (16 bytes).
///
/// Covers the header's atomics and any payload type the runtime ships.
pub const OBJECT_ALIGNMENT: usize = 16;

bitflags! {
    /// Object header flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ObjectFlags: u16 {
        /// Refcount operations are no-ops; the object is a process-wide
        /// singleton and is never freed.
        const CONSTANT = 1 << 0;
        /// The object was allocated through a non-default allocator and must
        /// be released through the allocator recorded in its header.
        const FOREIGN_ALLOCATOR = 1 << 1;
        /// Extra bytes trail the payload inside the same allocation block
        /// and must not be freed separately.
        const INLINE_PAYLOAD = 1 << 2;
    }
}

/// Header prefixed before every heap object.
///
/// The payload (the class's `alloc_size` bytes) follows immediately, then any
/// inline extra bytes.
#[repr(C)]
pub(crate) struct ObjectHeader {
    /// Dense class id (resolved through the registry for dispatch).
    class_id: u32,
    /// [`ObjectFlags`] bits.
    flags: u16,
    reserved: u16,
    /// Reference count. Starts at 1; the object is freed when it reaches 0.
    refcount: AtomicU32,
    /// Total allocation size in bytes, needed to rebuild the layout on free.
    total_size: u32,
    /// Recorded allocator when `FOREIGN_ALLOCATOR` is set; `None` means the
    /// process default. The final release may run on any thread, so the
    /// allocator must be shareable.
    allocator: Option<&'static (dyn Allocator + Send + Sync)>,
}

impl ObjectHeader {
    fn flags(&self) -> ObjectFlags {
        ObjectFlags::from_bits_truncate(self.flags)
    }

    fn is_constant(&self) -> bool {
        self.flags().contains(ObjectFlags::CONSTANT)
    }
}

/// A reference to a heap object in the runtime's object model.
///
/// `ObjectRef` is `Copy`: copying the handle does **not** retain. Callers
/// own exactly the references they created, retained, or were documented to
/// receive retained, and must balance each with a release (directly or via a
/// pool).
///
/// # Example
///
/// ```rust
/// use cobalt::runtime::class::{self, ClassDescriptor, ClassOps};
/// use cobalt::runtime::object::ObjectRef;
///
/// static BLOB_CLASS: ClassDescriptor = ClassDescriptor::new("Blob", 32, ClassOps::NONE);
///
/// let id = class::register(&BLOB_CLASS);
/// let obj = ObjectRef::alloc(id).unwrap();
///
/// assert!(obj.is_class(id));
/// assert_eq!(obj.refcount(), 1);
/// obj.release();
/// ```
#[derive(Clone, Copy)]
pub struct ObjectRef {
    /// Never null; valid while the refcount is above zero.
    ptr: NonNull<ObjectHeader>,
}

// SAFETY: the header is reached only through atomic refcount operations and
// immutable fields; payload access is the caller's concern (documented
// unsynchronized, like the containers built on top).
unsafe impl Send for ObjectRef {}
unsafe impl Sync for ObjectRef {}

impl ObjectRef {
    /// Allocates an object of `class_id` through the default allocator.
    ///
    /// The returned reference is owned by the caller (refcount 1).
    ///
    /// # Errors
    ///
    /// [`Error::InvalidClassId`] for an unregistered id;
    /// [`Error::OutOfMemory`] when the allocator fails.
    pub fn alloc(class_id: ClassId) -> Result<ObjectRef> {
        Self::alloc_extra(class_id, 0, ObjectFlags::empty())
    }

    /// Allocates an object with `extra` inline bytes after the payload.
    ///
    /// `INLINE_PAYLOAD` is implied when `extra > 0`.
    pub fn alloc_extra(class_id: ClassId, extra: usize, flags: ObjectFlags) -> Result<ObjectRef> {
        Self::alloc_impl(None, class_id, extra, flags)
    }

    /// Allocates through an explicit allocator.
    ///
    /// The allocator is recorded in the header and the final release frees
    /// through it. Handles cross threads, so the allocator must be
    /// `Send + Sync` and outlive the object, hence `'static`.
    pub fn alloc_in(
        allocator: &'static (dyn Allocator + Send + Sync),
        class_id: ClassId,
        extra: usize,
        flags: ObjectFlags,
    ) -> Result<ObjectRef> {
        Self::alloc_impl(Some(allocator), class_id, extra, flags)
    }

    fn alloc_impl(
        allocator: Option<&'static (dyn Allocator + Send + Sync)>,
        class_id: ClassId,
        extra: usize,
        flags: ObjectFlags,
    ) -> Result<ObjectRef> {
        let descriptor = class::id_to_ref(class_id).ok_or(Error::InvalidClassId {
            id: class_id.as_u32(),
        })?;

        let total = size_of::<ObjectHeader>() + descriptor.alloc_size() + extra;
        if total > u32::MAX as usize {
            return Err(Error::ObjectTooLarge { size: total });
        }
        let layout = Layout::from_size_align(total, OBJECT_ALIGNMENT)
            .map_err(|_| Error::ObjectTooLarge { size: total })?;

        let mut flags = flags;
        if extra > 0 {
            flags |= ObjectFlags::INLINE_PAYLOAD;
        }
        if allocator.is_some() {
            flags |= ObjectFlags::FOREIGN_ALLOCATOR;
        }

        let raw = allocator
            .unwrap_or_else(|| default_allocator())
            .allocate(layout)
            .ok_or(Error::OutOfMemory { size: total })?;

        let header = raw.cast::<ObjectHeader>();
        // SAFETY: raw is a fresh block of at least `total` bytes with
        // OBJECT_ALIGNMENT, so the header write is in bounds and aligned.
        unsafe {
            header.as_ptr().write(ObjectHeader {
                class_id: class_id.as_u32(),
                flags: flags.bits(),
                reserved: 0,
                refcount: AtomicU32::new(1),
                total_size: total as u32,
                allocator,
            });
        }

        let obj = ObjectRef { ptr: header };
        track::note_alloc(obj, flags);
        Ok(obj)
    }

    fn header(&self) -> &ObjectHeader {
        // SAFETY: the handle is valid while the refcount is above zero,
        // which is the caller's contract.
        unsafe { self.ptr.as_ref() }
    }

    /// Increments the reference count and returns the same handle.
    ///
    /// No-op for constant objects: singletons never produce atomic traffic.
    ///
    /// # Panics
    ///
    /// Panics on refcount overflow (`u32::MAX` outstanding references).
    pub fn retain(self) -> ObjectRef {
        let header = self.header();
        if header.is_constant() {
            return self;
        }

        let old = header.refcount.fetch_add(1, Ordering::AcqRel);
        if old == u32::MAX {
            panic!("reference count overflow in ObjectRef::retain");
        }
        self
    }

    /// Decrements the reference count, deallocating at zero.
    ///
    /// No-op for constant objects. When the count reaches zero the class's
    /// `dealloc` operation runs (if any), then the single backing block is
    /// freed through the allocator recorded at allocation time. The handle
    /// and all copies of it are dead afterwards.
    pub fn release(self) {
        let header = self.header();
        if header.is_constant() {
            return;
        }

        let old = header.refcount.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(old != 0, "release of an already-dead object");
        if old == 1 {
            self.dealloc();
        }
    }

    /// Registers this reference with the current autorelease pool scope.
    ///
    /// Ownership of one reference moves to the pool; it is released when the
    /// scope pops. See [`autorelease`](crate::runtime::autorelease).
    pub fn autorelease(self) -> ObjectRef {
        autorelease::autorelease(self)
    }

    #[cold]
    fn dealloc(self) {
        track::note_dealloc(self);

        let descriptor = self.class();
        // Capture the free parameters before the dealloc op can disturb
        // anything.
        let header = self.header();
        let total = header.total_size as usize;
        let allocator = header.allocator;

        if let Some(op) = descriptor.ops().dealloc {
            op(self);
        }

        let layout = Layout::from_size_align(total, OBJECT_ALIGNMENT)
            .expect("object layout was validated at allocation");
        // SAFETY: the block came from this allocator with this exact layout;
        // refcount reached zero so no live reference remains.
        unsafe {
            allocator
                .unwrap_or_else(|| default_allocator())
                .deallocate(self.ptr.cast::<u8>(), layout);
        }
    }

    /// The object's dense class id.
    #[must_use]
    pub fn class_id(self) -> ClassId {
        ClassId::from_raw(self.header().class_id)
    }

    /// The object's class descriptor.
    ///
    /// # Panics
    ///
    /// Panics if the header carries an id the registry never issued, which
    /// indicates memory corruption.
    #[must_use]
    pub fn class(self) -> &'static ClassDescriptor {
        let raw = self.header().class_id;
        class::id_to_ref(ClassId::from_raw(raw))
            .expect("object header carries an unregistered class id")
    }

    /// Whether the object is an instance of `id`.
    #[must_use]
    pub fn is_class(self, id: ClassId) -> bool {
        self.header().class_id == id.as_u32()
    }

    /// The object's flags.
    #[must_use]
    pub fn flags(self) -> ObjectFlags {
        self.header().flags()
    }

    /// Address of the object header, for diagnostics and tracking keys.
    #[must_use]
    pub fn addr(self) -> usize {
        self.ptr.as_ptr().addr()
    }

    /// Current reference count, for diagnostics and tests.
    ///
    /// Constant objects report their frozen count; for shared objects the
    /// value may be stale by the time it is read.
    #[must_use]
    pub fn refcount(self) -> u32 {
        self.header().refcount.load(Ordering::Acquire)
    }

    /// Polymorphic hash. Falls back to an identity-derived hash when the
    /// class supplies no `hash` operation.
    #[must_use]
    pub fn hash(self) -> u64 {
        match self.class().ops().hash {
            Some(op) => op(self),
            None => identity_hash(self),
        }
    }

    /// Polymorphic equality.
    ///
    /// Identical handles are always equal. Otherwise the class's `equal`
    /// operation decides when both objects share a class; the fallback is
    /// pointer identity (already failed), so distinct classes or op-less
    /// classes compare unequal.
    #[must_use]
    pub fn equal(self, other: ObjectRef) -> bool {
        if self.ptr == other.ptr {
            return true;
        }
        if self.header().class_id != other.header().class_id {
            return false;
        }
        match self.class().ops().equal {
            Some(op) => op(self, other),
            None => false,
        }
    }

    /// Polymorphic string conversion, returning a retained string.
    ///
    /// The default rendering combines the class name and the object's
    /// identity, e.g. `<Blob@0x7f3a2c001200>`.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`] when the rendering cannot be allocated.
    pub fn to_string(self) -> Result<Str> {
        match self.class().ops().to_string {
            Some(op) => op(self),
            None => Str::format(format_args!(
                "<{}@{:#x}>",
                self.class().name(),
                self.ptr.as_ptr().addr()
            )),
        }
    }

    /// Polymorphic copy, returning a retained reference.
    ///
    /// Classes without a `copy` operation are treated as immutable: the
    /// default retains and returns the same object. Value containers supply
    /// their own structural copy.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`] when a structural copy cannot be allocated.
    pub fn copy(self) -> Result<ObjectRef> {
        match self.class().ops().copy {
            Some(op) => op(self),
            None => Ok(self.retain()),
        }
    }

    /// Raw pointer to the class payload (header end).
    ///
    /// Custom classes initialize and read their payload through this
    /// pointer. It stays valid for the object's lifetime; the pointee type
    /// and synchronization are the class's contract.
    #[must_use]
    pub fn payload_ptr(self) -> *mut u8 {
        // SAFETY: the payload begins directly after the header inside the
        // same allocation.
        unsafe { self.ptr.as_ptr().cast::<u8>().add(size_of::<ObjectHeader>()) }
    }

    /// Raw pointer to the inline extra bytes (payload end).
    #[must_use]
    pub fn payload_extra_ptr(self) -> *mut u8 {
        // SAFETY: extra bytes start after alloc_size payload bytes, still
        // inside the allocation (sized at alloc time).
        unsafe { self.payload_ptr().add(self.class().alloc_size()) }
    }

    /// Total allocation size in bytes, for diagnostics.
    #[must_use]
    pub fn total_size(self) -> usize {
        self.header().total_size as usize
    }
}

/// Identity hash: derived from the header address, stable for the object's
/// lifetime.
fn identity_hash(obj: ObjectRef) -> u64 {
    // Low bits are dead under 16-byte alignment; mix with splitmix64.
    let mut x = (obj.ptr.as_ptr().addr() as u64) >> 4;
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

impl PartialEq for ObjectRef {
    /// Pointer identity. Use [`ObjectRef::equal`] for structural equality.
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl Eq for ObjectRef {}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("class", &self.class().name())
            .field("refcount", &self.refcount())
            .field("flags", &self.flags())
            .finish()
    }
}

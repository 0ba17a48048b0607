//! Class registry for the Cobalt runtime.
//!
//! Every object type participating in the object model is described by a
//! [`ClassDescriptor`]: a static record of the type's name, payload footprint,
//! and up to five polymorphic operations. Registering a descriptor assigns it
//! a dense 32-bit [`ClassId`] that object headers store in place of a
//! descriptor pointer.
//!
//! # Architecture
//!
//! Descriptors are `&'static` and registered at most once, typically at
//! process start; there is no unregistration. Storage is an append-only
//! sequence of fixed-size segments: a segment, once published, is never moved
//! or reallocated, so `id_to_ref` stays valid for every issued id for the
//! lifetime of the process.
//!
//! # Thread Safety
//!
//! Registration (rare, start-up-time) is guarded by a mutex. Lookups are
//! lock-free reads of already-published segments: the registered count is
//! published with Release ordering after the slot and segment stores, so a
//! reader that observes `id < count` also observes the slot.

use crate::error::Result;
use crate::runtime::object::ObjectRef;
use crate::runtime::string::Str;
use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};
use std::sync::{Mutex, OnceLock};

/// Number of descriptor slots per registry segment.
const SEGMENT_CAPACITY: usize = 64;

/// Maximum number of segments (bounds the registry at 65 536 classes).
const MAX_SEGMENTS: usize = 1024;

/// Releases an object's owned resources before its memory is freed.
pub type DeallocFn = fn(ObjectRef);

/// Produces a content hash for an object.
pub type HashFn = fn(ObjectRef) -> u64;

/// Structural equality between two objects of the same class.
pub type EqualFn = fn(ObjectRef, ObjectRef) -> bool;

/// Renders an object as a runtime string.
pub type ToStringFn = fn(ObjectRef) -> Result<Str>;

/// Produces a copy of an object.
pub type CopyFn = fn(ObjectRef) -> Result<ObjectRef>;

/// The polymorphic operations of a class.
///
/// Every operation is optional; [`ObjectRef`] documents the default behavior
/// when a class supplies none. Missing operations are never an error.
#[derive(Clone, Copy)]
pub struct ClassOps {
    /// Runs before the object's backing memory is freed. Classes owning
    /// nested references or external resources release them here.
    pub dealloc: Option<DeallocFn>,
    /// Content hash; default is identity-derived.
    pub hash: Option<HashFn>,
    /// Structural equality; default is pointer identity.
    pub equal: Option<EqualFn>,
    /// String rendering; default combines class name and identity.
    pub to_string: Option<ToStringFn>,
    /// Copying; default returns a retained reference to the same object.
    pub copy: Option<CopyFn>,
}

impl ClassOps {
    /// A class with only default behavior.
    pub const NONE: ClassOps = ClassOps {
        dealloc: None,
        hash: None,
        equal: None,
        to_string: None,
        copy: None,
    };
}

/// Dense 32-bit stand-in for a class descriptor pointer.
///
/// Assigned on first registration, monotonically increasing, never reused.
/// An id is invalid if it is `>= count()` or equals [`ClassId::INVALID`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(u32);

impl ClassId {
    /// Sentinel for "not registered".
    pub const INVALID: ClassId = ClassId(u32::MAX);

    /// Raw id value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Whether this id was issued by the registry.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }

    /// Rebuilds an id from its raw value (object headers store the raw form).
    pub(crate) const fn from_raw(raw: u32) -> ClassId {
        ClassId(raw)
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "ClassId({})", self.0)
        } else {
            write!(f, "ClassId(INVALID)")
        }
    }
}

/// Static record of a type's identity and polymorphic operations.
///
/// Descriptors are immutable apart from the cached id slot, which the
/// registry fills in on registration.
///
/// # Example
///
/// ```rust
/// use cobalt::runtime::class::{self, ClassDescriptor, ClassOps};
///
/// static POINT_CLASS: ClassDescriptor =
///     ClassDescriptor::new("Point", 16, ClassOps::NONE);
///
/// let id = class::register(&POINT_CLASS);
/// assert_eq!(POINT_CLASS.id(), id);
/// assert_eq!(class::id_to_ref(id).unwrap().name(), "Point");
/// ```
pub struct ClassDescriptor {
    /// Type name, for diagnostics and default `to_string`.
    name: &'static str,
    /// Payload footprint in bytes, excluding the object header and any
    /// inline extra bytes.
    alloc_size: usize,
    /// Polymorphic operations.
    ops: ClassOps,
    /// Dense id, filled in by the registry. `u32::MAX` until registered.
    id: AtomicU32,
}

impl ClassDescriptor {
    /// Creates a descriptor. Usable in `static` position.
    #[must_use]
    pub const fn new(name: &'static str, alloc_size: usize, ops: ClassOps) -> Self {
        ClassDescriptor {
            name,
            alloc_size,
            ops,
            id: AtomicU32::new(u32::MAX),
        }
    }

    /// The class name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Payload footprint in bytes.
    #[must_use]
    pub fn alloc_size(&self) -> usize {
        self.alloc_size
    }

    /// The class's polymorphic operations.
    #[must_use]
    pub fn ops(&self) -> &ClassOps {
        &self.ops
    }

    /// The cached dense id, O(1). [`ClassId::INVALID`] before registration.
    #[must_use]
    pub fn id(&self) -> ClassId {
        ClassId(self.id.load(Ordering::Acquire))
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("alloc_size", &self.alloc_size)
            .field("id", &self.id())
            .finish()
    }
}

/// One fixed block of descriptor slots. Never moved once published.
struct Segment {
    slots: [AtomicPtr<ClassDescriptor>; SEGMENT_CAPACITY],
}

impl Segment {
    fn new() -> Self {
        Segment {
            slots: std::array::from_fn(|_| AtomicPtr::new(ptr::null_mut())),
        }
    }
}

/// Global class registry.
struct ClassRegistry {
    /// Segment directory. A null entry means the segment is not yet
    /// allocated; entries are published with Release stores and never
    /// replaced.
    segments: Box<[AtomicPtr<Segment>; MAX_SEGMENTS]>,
    /// Number of registered classes. Published last on the write path.
    count: AtomicU32,
    /// Serializes registration.
    write_lock: Mutex<()>,
}

// SAFETY: segment pointers are Box::leak'd and never freed; slot and count
// publication is ordered by Release/Acquire pairs.
unsafe impl Send for ClassRegistry {}
unsafe impl Sync for ClassRegistry {}

/// Global class registry instance.
static REGISTRY: OnceLock<ClassRegistry> = OnceLock::new();

fn registry() -> &'static ClassRegistry {
    REGISTRY.get_or_init(|| ClassRegistry {
        segments: Box::new(std::array::from_fn(|_| AtomicPtr::new(ptr::null_mut()))),
        count: AtomicU32::new(0),
        write_lock: Mutex::new(()),
    })
}

/// Registers a class descriptor and returns its dense id.
///
/// Idempotent: registering an already-registered descriptor returns the
/// existing id without taking a new one.
///
/// # Panics
///
/// Panics if the dense id space or the segment directory is exhausted.
/// Class counts that large indicate a runaway registration loop, not a
/// real program.
pub fn register(descriptor: &'static ClassDescriptor) -> ClassId {
    let reg = registry();
    let _guard = reg.write_lock.lock().unwrap();

    let cached = descriptor.id.load(Ordering::Acquire);
    if cached != u32::MAX {
        return ClassId(cached);
    }

    let id = reg.count.load(Ordering::Relaxed);
    assert!(id != u32::MAX, "class id space exhausted");

    let segment_index = id as usize / SEGMENT_CAPACITY;
    let slot_index = id as usize % SEGMENT_CAPACITY;
    assert!(segment_index < MAX_SEGMENTS, "class registry segment directory exhausted");

    let mut segment = reg.segments[segment_index].load(Ordering::Acquire);
    if segment.is_null() {
        // Leak the segment so issued descriptor references stay valid for
        // the process lifetime.
        segment = Box::leak(Box::new(Segment::new()));
        reg.segments[segment_index].store(segment, Ordering::Release);
    }

    // SAFETY: segment was just loaded or created non-null and is never freed.
    let segment = unsafe { &*segment };
    segment.slots[slot_index].store(
        ptr::from_ref(descriptor).cast_mut(),
        Ordering::Release,
    );

    descriptor.id.store(id, Ordering::Release);
    // Publish last: readers that see the new count also see the slot.
    reg.count.store(id + 1, Ordering::Release);

    cobalt_log::debug!("registered class {:?} as id {}", descriptor.name, id);

    ClassId(id)
}

/// Resolves a dense id to its descriptor, O(1) and lock-free.
///
/// Returns `None` for ids the registry has not issued.
#[must_use]
pub fn id_to_ref(id: ClassId) -> Option<&'static ClassDescriptor> {
    let reg = registry();
    if id.0 >= reg.count.load(Ordering::Acquire) {
        return None;
    }

    let segment_index = id.0 as usize / SEGMENT_CAPACITY;
    let slot_index = id.0 as usize % SEGMENT_CAPACITY;

    let segment = reg.segments[segment_index].load(Ordering::Acquire);
    // SAFETY: count covers this id, so the segment and slot were published
    // before the count store we observed.
    let slot = unsafe { (*segment).slots[slot_index].load(Ordering::Acquire) };
    unsafe { slot.cast_const().as_ref() }
}

/// Reverse lookup: descriptor to id by scanning the registry.
///
/// Linear in the number of registered classes; this exists for debugging and
/// assertions. The hot path is [`ClassDescriptor::id`], which is O(1).
#[must_use]
pub fn ref_to_id(descriptor: &'static ClassDescriptor) -> ClassId {
    let total = count();
    for raw in 0..total {
        let id = ClassId(raw);
        if let Some(found) = id_to_ref(id)
            && ptr::eq(found, descriptor)
        {
            return id;
        }
    }
    ClassId::INVALID
}

/// Total number of registered classes.
#[must_use]
pub fn count() -> u32 {
    registry().count.load(Ordering::Acquire)
}

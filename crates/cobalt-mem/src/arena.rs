//! Fixed-capacity bump arena for the Cobalt runtime.
//!
//! The arena hands out aligned slices of a single buffer by advancing a
//! cursor; individual allocations are never freed. [`Arena::reset`] rewinds
//! the cursor in one step, which is the intended way to reclaim memory: for
//! example once per frame in an immediate-mode UI that uses the arena for
//! per-frame scratch allocation.
//!
//! The buffer is either **owned** (allocated through an [`Allocator`] at
//! construction, freed on drop) or **borrowed** (caller memory, never freed
//! here). The arena never grows: a request that exceeds the remaining
//! capacity fails with `None` and leaves prior allocations intact.
//!
//! # Thread safety
//!
//! Arenas are single-threaded by construction (interior `Cell` cursor, not
//! `Sync`). Use one arena per thread or synchronize externally.
//!
//! # Example
//!
//! ```
//! use std::alloc::Layout;
//! use cobalt_mem::{Arena, SystemAllocator};
//!
//! static SYS: SystemAllocator = SystemAllocator;
//!
//! let mut arena = Arena::new(&SYS, 4096).unwrap();
//! let ptr = arena.alloc(Layout::new::<u64>()).unwrap();
//! unsafe { ptr.as_ptr().cast::<u64>().write(42) };
//!
//! assert!(arena.used() <= arena.capacity());
//! arena.reset();
//! assert_eq!(arena.used(), 0);
//! ```

use crate::alloc::Allocator;
use std::alloc::Layout;
use std::cell::Cell;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// Alignment of the arena's own buffer (16 bytes).
///
/// Individual allocations align by their requested layout relative to the
/// absolute address, so this only bounds the buffer start.
const BUFFER_ALIGNMENT: usize = 16;

/// Errors that can occur when constructing an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaError {
    /// The backing allocator could not provide the buffer.
    OutOfMemory {
        /// The requested buffer size.
        capacity: usize,
    },
    /// A zero-capacity owned arena was requested.
    ZeroCapacity,
}

impl std::fmt::Display for ArenaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArenaError::OutOfMemory { capacity } => {
                write!(f, "failed to allocate arena buffer of {capacity} bytes")
            }
            ArenaError::ZeroCapacity => write!(f, "arena capacity must be non-zero"),
        }
    }
}

impl std::error::Error for ArenaError {}

/// Where the arena's buffer came from, and therefore who frees it.
enum Backing<'a> {
    /// Buffer allocated through `allocator`; freed with `layout` on drop.
    Owned {
        allocator: &'a dyn Allocator,
        layout: Layout,
    },
    /// Caller-supplied buffer. The arena only borrows it.
    Borrowed(PhantomData<&'a mut [u8]>),
}

/// A bump allocator over a fixed buffer.
///
/// See the [module docs](self) for the ownership and threading model.
pub struct Arena<'a> {
    /// Start of the buffer.
    base: NonNull<u8>,
    /// Total buffer size in bytes.
    capacity: usize,
    /// Bytes consumed so far (cursor). Interior mutability so allocation
    /// works through `&self`, which [`ArenaAllocator`] requires.
    used: Cell<usize>,
    backing: Backing<'a>,
}

impl std::fmt::Debug for Arena<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("base", &self.base)
            .field("capacity", &self.capacity)
            .field("used", &self.used)
            .finish_non_exhaustive()
    }
}

impl<'a> Arena<'a> {
    /// Creates an arena that owns a freshly allocated buffer.
    ///
    /// # Errors
    ///
    /// [`ArenaError::ZeroCapacity`] for `capacity == 0`;
    /// [`ArenaError::OutOfMemory`] when `allocator` cannot provide the
    /// buffer.
    pub fn new(allocator: &'a dyn Allocator, capacity: usize) -> Result<Self, ArenaError> {
        if capacity == 0 {
            return Err(ArenaError::ZeroCapacity);
        }

        let layout = Layout::from_size_align(capacity, BUFFER_ALIGNMENT)
            .map_err(|_| ArenaError::OutOfMemory { capacity })?;
        let base = allocator
            .allocate(layout)
            .ok_or(ArenaError::OutOfMemory { capacity })?;

        Ok(Arena {
            base,
            capacity,
            used: Cell::new(0),
            backing: Backing::Owned { allocator, layout },
        })
    }

    /// Creates an arena over a caller-supplied buffer.
    ///
    /// The buffer is borrowed for the arena's lifetime and is never freed by
    /// the arena.
    pub fn with_buffer(buffer: &'a mut [u8]) -> Self {
        let capacity = buffer.len();
        // SAFETY: a slice pointer is non-null even for empty slices.
        let base = unsafe { NonNull::new_unchecked(buffer.as_mut_ptr()) };

        Arena {
            base,
            capacity,
            used: Cell::new(0),
            backing: Backing::Borrowed(PhantomData),
        }
    }

    /// Allocates `layout` by bumping the cursor.
    ///
    /// Returns `None` when the aligned request does not fit in the remaining
    /// capacity. Prior allocations are unaffected by a failed request.
    pub fn alloc(&self, layout: Layout) -> Option<NonNull<u8>> {
        let base_addr = self.base.as_ptr().addr();
        let cursor = base_addr.checked_add(self.used.get())?;

        // Round the cursor up to the requested alignment.
        let align = layout.align();
        let aligned = cursor.checked_add(align - 1)? & !(align - 1);
        let end = aligned.checked_add(layout.size())?;

        if end - base_addr > self.capacity {
            return None;
        }

        self.used.set(end - base_addr);

        // with_addr keeps the provenance of the buffer pointer while moving
        // its address to the aligned cursor (within bounds, checked above).
        let ptr = self.base.as_ptr().with_addr(aligned);
        // SAFETY: aligned >= base_addr > 0.
        Some(unsafe { NonNull::new_unchecked(ptr) })
    }

    /// Allocates and initializes a value in the arena.
    ///
    /// Returns a raw pointer valid until [`reset`](Arena::reset) or drop.
    /// The value's destructor is never run; arenas are for plain-data
    /// scratch allocation.
    pub fn alloc_value<T>(&self, value: T) -> Option<NonNull<T>> {
        let ptr = self.alloc(Layout::new::<T>())?.cast::<T>();
        // SAFETY: ptr is properly aligned and sized for T (layout above).
        unsafe { ptr.as_ptr().write(value) };
        Some(ptr)
    }

    /// Rewinds the cursor to zero.
    ///
    /// All previously returned pointers become dangling; the buffer itself
    /// is untouched and its full capacity is reusable.
    pub fn reset(&mut self) {
        self.used.set(0);
    }

    /// Bytes consumed so far, including alignment padding.
    #[must_use]
    pub fn used(&self) -> usize {
        self.used.get()
    }

    /// Total buffer size in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Exposes the arena through the [`Allocator`] abstraction.
    ///
    /// The adapter can be substituted anywhere an allocator is accepted;
    /// its `deallocate` is a no-op because arena memory is reclaimed only by
    /// [`reset`](Arena::reset) or drop.
    #[must_use]
    pub fn allocator(&self) -> ArenaAllocator<'_> {
        ArenaAllocator { arena: self }
    }
}

impl Drop for Arena<'_> {
    fn drop(&mut self) {
        if let Backing::Owned { allocator, layout } = &self.backing {
            // SAFETY: base came from this allocator with this layout.
            unsafe { allocator.deallocate(self.base, *layout) };
        }
    }
}

/// [`Allocator`] adapter over an [`Arena`].
///
/// Created by [`Arena::allocator`]. Freeing is a no-op; the arena reclaims
/// everything at once.
pub struct ArenaAllocator<'a> {
    arena: &'a Arena<'a>,
}

impl Allocator for ArenaAllocator<'_> {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        self.arena.alloc(layout)
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {
        // Arena memory is reclaimed in bulk by reset() or drop.
    }
}

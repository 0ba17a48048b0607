//! Allocator abstraction for the Cobalt runtime.
//!
//! Every component of the runtime that needs heap memory goes through the
//! [`Allocator`] trait rather than calling `std::alloc` directly. This lets an
//! embedding program substitute its own memory source (a tracking allocator,
//! a pool, an [`Arena`](crate::arena::Arena)) for all or part of the runtime.
//!
//! A process-wide default allocator exists for components that do not receive
//! an explicit one. It is lazily initialized to [`SystemAllocator`] on first
//! use and may be replaced exactly once, before first use, via
//! [`set_default_allocator`].
//!
//! # Failure semantics
//!
//! [`Allocator::allocate`] returning `None` propagates to the caller as an
//! allocation failure. This layer never retries, falls back, or aborts.

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::OnceLock;

/// A pluggable source of raw memory.
///
/// Implementations hand out uninitialized memory blocks described by a
/// [`Layout`] and take them back via [`deallocate`](Allocator::deallocate).
/// A generic [`reallocate`](Allocator::reallocate) is provided in terms of
/// allocate + copy + deallocate for implementations without a native resize
/// path.
pub trait Allocator {
    /// Allocates a block of memory for `layout`.
    ///
    /// Returns `None` when the request cannot be satisfied. The returned
    /// memory is uninitialized.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Releases a block previously returned by [`allocate`](Allocator::allocate).
    ///
    /// # Safety
    ///
    /// `ptr` must have been allocated by this allocator with the same
    /// `layout`, and must not be used after this call.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// Resizes a block, moving its contents if necessary.
    ///
    /// The default implementation allocates a fresh block, copies
    /// `min(old, new)` bytes, and releases the old block. Returns `None` if
    /// the new block cannot be allocated; the old block is left untouched in
    /// that case.
    ///
    /// # Safety
    ///
    /// `ptr` must have been allocated by this allocator with `old_layout`.
    /// On success the old pointer must not be used again.
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Option<NonNull<u8>> {
        let new_ptr = self.allocate(new_layout)?;

        let copy_len = old_layout.size().min(new_layout.size());
        // SAFETY: both regions are valid for copy_len bytes and cannot
        // overlap (new_ptr is a fresh allocation).
        unsafe {
            std::ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), copy_len);
            self.deallocate(ptr, old_layout);
        }

        Some(new_ptr)
    }
}

/// The process heap, via `std::alloc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() == 0 {
            // std::alloc::alloc is undefined for zero-size layouts.
            return Some(NonNull::dangling());
        }

        // SAFETY: layout has non-zero size (checked above).
        let ptr = unsafe { alloc::alloc(layout) };
        NonNull::new(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }

        // SAFETY: caller guarantees ptr came from allocate() with this layout.
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
    }
}

/// Error returned when the default allocator was already initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultAlreadySet;

impl std::fmt::Display for DefaultAlreadySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "default allocator was already initialized")
    }
}

impl std::error::Error for DefaultAlreadySet {}

static SYSTEM: SystemAllocator = SystemAllocator;

/// Process-wide default allocator.
static DEFAULT: OnceLock<&'static (dyn Allocator + Send + Sync)> = OnceLock::new();

/// Returns the process-wide default allocator.
///
/// Initialized to [`SystemAllocator`] on first use unless
/// [`set_default_allocator`] ran earlier.
#[must_use]
pub fn default_allocator() -> &'static (dyn Allocator + Send + Sync) {
    *DEFAULT.get_or_init(|| &SYSTEM)
}

/// Replaces the process-wide default allocator.
///
/// Must be called before any component reads the default (i.e. at program
/// start, before runtime objects are created).
///
/// # Errors
///
/// Returns [`DefaultAlreadySet`] if the default was already read or set.
///
/// # Example
///
/// ```
/// use cobalt_mem::{SystemAllocator, set_default_allocator};
///
/// static MINE: SystemAllocator = SystemAllocator;
/// // Succeeds at most once per process.
/// let _ = set_default_allocator(&MINE);
/// ```
pub fn set_default_allocator(
    allocator: &'static (dyn Allocator + Send + Sync),
) -> Result<(), DefaultAlreadySet> {
    DEFAULT.set(allocator).map_err(|_| DefaultAlreadySet)
}

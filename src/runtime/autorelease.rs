//! Autorelease pool stack for scoped deferred release.
//!
//! A pool scope collects object references whose release should happen when
//! the scope ends, mirroring call-stack unwinding: temporaries created inside
//! a scope die when it pops, in reverse order of registration.
//!
//! # State machine
//!
//! [`push`] opens a scope on top of the current thread's stack. [`autorelease`]
//! appends a reference to the top scope **without retaining it**; ownership
//! of one reference moves to the pool. [`pop`] releases everything recorded in
//! the top scope, newest first, and removes the scope. Scopes nest strictly
//! (LIFO); popping with no open scope is a contract violation and panics.
//!
//! Entries are stored in fixed-capacity segments. A full segment is never
//! reallocated or copied; a fresh segment is linked instead, so recorded
//! entries never move on the hot path.
//!
//! # Thread Safety
//!
//! Pools are strictly thread-local: each thread owns its own stack, and a
//! reference must be autoreleased on the thread that will pop the scope.
//! Cross-thread autorelease cannot be expressed; the state is in
//! `thread_local!` storage.
//!
//! # Example
//!
//! ```rust
//! use cobalt::runtime::autorelease::AutoreleasePool;
//! use cobalt::runtime::number::Number;
//!
//! let pool = AutoreleasePool::new();
//! let n = Number::i32(7).unwrap().autorelease();
//! assert_eq!(n.to_i32(), 7);
//! drop(pool); // releases n
//! ```

use crate::runtime::object::ObjectRef;
use std::cell::RefCell;
use std::marker::PhantomData;

/// Entries per pool segment.
///
/// When a scope outgrows one segment a new one is linked; entries are never
/// copied between segments.
pub const SEGMENT_CAPACITY: usize = 128;

/// One scope's worth of deferred releases.
struct PoolScope {
    /// Chain of fixed-capacity segments. Only the last segment accepts new
    /// entries; each inner vector is pre-sized and never reallocates.
    segments: Vec<Vec<ObjectRef>>,
}

impl PoolScope {
    fn new() -> Self {
        PoolScope {
            segments: vec![Vec::with_capacity(SEGMENT_CAPACITY)],
        }
    }

    fn record(&mut self, obj: ObjectRef) {
        let needs_segment = self
            .segments
            .last()
            .is_none_or(|segment| segment.len() == SEGMENT_CAPACITY);
        if needs_segment {
            self.segments.push(Vec::with_capacity(SEGMENT_CAPACITY));
        }
        // Capacity was just ensured; this push never reallocates.
        self.segments.last_mut().unwrap().push(obj);
    }

    fn len(&self) -> usize {
        self.segments.iter().map(Vec::len).sum()
    }

    /// Releases every recorded reference, newest first.
    fn drain(self) {
        for segment in self.segments.iter().rev() {
            for obj in segment.iter().rev() {
                obj.release();
            }
        }
    }
}

thread_local! {
    /// This thread's pool stack.
    static POOL_STACK: RefCell<Vec<PoolScope>> = const { RefCell::new(Vec::new()) };
}

/// Opens a new pool scope on this thread's stack.
pub fn push() {
    POOL_STACK.with_borrow_mut(|stack| stack.push(PoolScope::new()));
}

/// Closes the top scope, releasing its objects in reverse registration order.
///
/// # Panics
///
/// Panics when no scope is open (pop without matching push).
pub fn pop() {
    let scope = POOL_STACK
        .with_borrow_mut(Vec::pop)
        .expect("autorelease pool pop without a matching push");

    if scope.len() > 0 {
        cobalt_log::trace!("popping pool scope with {} deferred releases", scope.len());
    }

    // Drain outside the thread-local borrow: a dealloc operation may itself
    // autorelease into an enclosing scope.
    scope.drain();
}

/// Registers `obj` with the top scope and returns it unchanged.
///
/// The pool takes over one reference without retaining; the caller must not
/// release that reference itself.
///
/// # Panics
///
/// Panics when no scope is open on this thread.
pub fn autorelease(obj: ObjectRef) -> ObjectRef {
    POOL_STACK.with_borrow_mut(|stack| {
        let top = stack
            .last_mut()
            .expect("autorelease with no open pool scope on this thread");
        top.record(obj);
    });
    obj
}

/// Number of open scopes on this thread, for diagnostics.
#[must_use]
pub fn depth() -> usize {
    POOL_STACK.with_borrow(Vec::len)
}

/// RAII pool scope: [`push`] on construction, [`pop`] on drop.
///
/// Not `Send`: the scope must pop on the thread that pushed it.
pub struct AutoreleasePool {
    _not_send: PhantomData<*const ()>,
}

impl AutoreleasePool {
    /// Opens a scope.
    #[must_use]
    pub fn new() -> Self {
        push();
        AutoreleasePool {
            _not_send: PhantomData,
        }
    }
}

impl Default for AutoreleasePool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AutoreleasePool {
    fn drop(&mut self) {
        pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::class::{self, ClassDescriptor, ClassId, ClassOps};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Builds a per-test counted class so parallel tests never share counters.
    macro_rules! counted_class {
        ($name:literal) => {{
            static RELEASES: AtomicUsize = AtomicUsize::new(0);
            fn count_dealloc(_obj: ObjectRef) {
                RELEASES.fetch_add(1, Ordering::SeqCst);
            }
            static CLASS: ClassDescriptor = ClassDescriptor::new(
                $name,
                0,
                ClassOps { dealloc: Some(count_dealloc), ..ClassOps::NONE },
            );
            (class::register(&CLASS), &RELEASES)
        }};
    }

    fn spawn(id: ClassId) -> ObjectRef {
        ObjectRef::alloc(id).unwrap()
    }

    #[test]
    fn test_pool_releases_on_pop() {
        let (id, releases) = counted_class!("PoolBasic");

        push();
        for _ in 0..3 {
            spawn(id).autorelease();
        }
        assert_eq!(releases.load(Ordering::SeqCst), 0);
        pop();

        assert_eq!(releases.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_overflow_releases_every_entry() {
        let (id, releases) = counted_class!("PoolOverflow");
        let count = SEGMENT_CAPACITY + 72; // spills into a second segment

        push();
        for _ in 0..count {
            spawn(id).autorelease();
        }
        pop();

        assert_eq!(releases.load(Ordering::SeqCst), count);
    }

    #[test]
    fn test_nested_scopes_release_independently() {
        let (id, releases) = counted_class!("PoolNested");

        push();
        spawn(id).autorelease();

        push();
        spawn(id).autorelease();
        spawn(id).autorelease();
        pop();
        // Inner scope released only its own two objects.
        assert_eq!(releases.load(Ordering::SeqCst), 2);

        pop();
        assert_eq!(releases.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retained_object_survives_pop() {
        let (id, releases) = counted_class!("PoolSurvivor");

        push();
        let obj = spawn(id);
        obj.autorelease();
        obj.retain(); // caller keeps one reference
        pop();

        assert_eq!(releases.load(Ordering::SeqCst), 0);
        assert_eq!(obj.refcount(), 1);
        obj.release();
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_raii_guard() {
        let depth_before = depth();
        {
            let _pool = AutoreleasePool::new();
            assert_eq!(depth(), depth_before + 1);
        }
        assert_eq!(depth(), depth_before);
    }

    #[test]
    #[should_panic(expected = "without a matching push")]
    fn test_unbalanced_pop_panics() {
        // This test's thread has no open scope.
        pop();
    }

    #[test]
    #[should_panic(expected = "no open pool scope")]
    fn test_autorelease_without_scope_panics() {
        let (id, _releases) = counted_class!("PoolNoScope");
        autorelease(spawn(id));
    }

    #[test]
    fn test_pools_are_per_thread() {
        push();
        let handle = std::thread::spawn(|| depth());
        // The spawned thread sees its own, empty stack.
        assert_eq!(handle.join().unwrap(), 0);
        pop();
    }
}

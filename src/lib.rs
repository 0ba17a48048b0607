//! `Cobalt`: a reference-counted dynamic object runtime
//!
//! `Cobalt` provides a small object model for embedding dynamic, refcounted
//! values in systems code. It offers:
//!
//! - **Uniform Objects** with a compact header, dense class ids, and atomic
//!   reference counting
//! - **Per-Class Behavior** through five pluggable operations (dealloc,
//!   hash, equal, to_string, copy) with identity-based defaults
//! - **Autorelease Pools** for scope-based deferred release on each thread
//! - **Built-in Classes**: interned strings, boxed numbers, lists, maps,
//!   sets, and byte buffers
//! - **Pluggable Allocation** through the `cobalt-mem` allocator trait and
//!   bump arenas
//!
//! # Architecture
//!
//! `Cobalt` is built in three layers:
//!
//! - **Memory Layer** (`cobalt-mem`): the allocator abstraction and arena
//! - **Runtime Layer**: object headers, the class registry, and ownership,
//!   with unsafe internals behind documented invariants
//! - **Built-in Classes**: safe typed handles over the runtime layer
//!
//! # Example
//!
//! ```rust
//! use cobalt::runtime::{AutoreleasePool, Number, Str};
//!
//! let _pool = AutoreleasePool::new();
//!
//! let greeting = Str::pooled("hello").unwrap();
//! let count = Number::i32(3).unwrap().autorelease();
//!
//! assert_eq!(greeting.as_str(), "hello");
//! assert_eq!(count.to_i32(), 3);
//! // `count` is released when `_pool` drops; `greeting` is pooled and
//! // lives for the process.
//! ```

pub mod error;
pub mod runtime;

// Re-export commonly used types
pub use cobalt_mem as mem;
pub use error::{Error, Result};
pub use runtime::{
    AutoreleasePool, Bytes, ClassDescriptor, ClassId, ClassOps, List, Map, Number, NumberKind,
    ObjectFlags, ObjectRef, Set, Str,
};

//! Core object runtime.
//!
//! Everything here builds on one layout rule: each object is a single
//! allocation beginning with an object header, followed by the
//! class's fixed payload, optionally followed by inline extra bytes. An
//! [`object::ObjectRef`] is a copyable handle to that allocation; ownership
//! is manual, through retain/release or an [`autorelease::AutoreleasePool`].
//!
//! Behavior is attached per class: a [`class::ClassDescriptor`] carries the
//! payload size and up to five operations (dealloc, hash, equal, to_string,
//! copy), each with a sensible identity-based default when omitted. The
//! registry hands out dense ids and resolves them without locking on the
//! read path.
//!
//! The remaining modules are the built-in classes: interned and dynamic
//! strings, boxed numbers, lists, maps, sets, and byte buffers, plus an
//! opt-in allocation tracker for leak hunts.

pub mod autorelease;
pub mod bytes;
pub mod class;
pub mod list;
pub mod map;
pub mod number;
pub mod object;
pub mod set;
pub mod string;
pub mod track;

pub use autorelease::AutoreleasePool;
pub use bytes::Bytes;
pub use class::{ClassDescriptor, ClassId, ClassOps};
pub use list::List;
pub use map::Map;
pub use number::{Number, NumberKind};
pub use object::{ObjectFlags, ObjectRef};
pub use set::Set;
pub use string::Str;

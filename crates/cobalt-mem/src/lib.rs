//! Cobalt memory management infrastructure.
//!
//! This crate provides the memory primitives the Cobalt object runtime is
//! built on:
//!
//! - **Allocator abstraction**: a pluggable [`Allocator`] trait with a
//!   process-wide default, so every allocation in the runtime can be routed
//!   through embedder-supplied memory.
//! - **Arena allocator**: a fixed-capacity bump allocator over an owned or
//!   borrowed buffer, reset in bulk instead of freed per-allocation.

pub mod alloc;
pub mod arena;

pub use alloc::{Allocator, SystemAllocator, default_allocator, set_default_allocator};
pub use arena::{Arena, ArenaAllocator, ArenaError};

//! Boxed numeric objects.
//!
//! A [`Number`] wraps one scalar value (signed/unsigned integers of every
//! width, `f32`, `f64`, or `bool`) in a refcounted object. The payload is a
//! kind tag plus the value's raw bit pattern widened into a `u64`, so every
//! kind shares one class and one payload layout.
//!
//! Booleans are special: [`Number::boolean`] returns one of two process-wide
//! constant singletons, so `true` is always the identical object.
//!
//! Equality is strict: same kind and same stored bits. `Number::i32(1)` is
//! not `equal` to `Number::i64(1)`; use [`Number::convert`] to compare across
//! kinds. `f32` NaN boxes with differing payload bits compare unequal, and
//! `-0.0` is not `equal` to `0.0`.
//!
//! # Example
//!
//! ```rust
//! use cobalt::runtime::number::{Number, NumberKind};
//!
//! let n = Number::i32(42).unwrap();
//! assert_eq!(n.to_i32(), 42);
//! assert_eq!(n.to_f64(), 42.0);
//!
//! let widened = n.convert(NumberKind::I64).unwrap();
//! assert_eq!(widened.to_i64(), 42);
//! assert!(!n.object().equal(widened.object()));
//!
//! widened.release();
//! n.release();
//! ```

use crate::error::Result;
use crate::runtime::class::{self, ClassDescriptor, ClassId, ClassOps};
use crate::runtime::object::{ObjectFlags, ObjectRef};
use crate::runtime::string::Str;
use std::fmt;
use std::sync::OnceLock;

/// The scalar kind stored in a [`Number`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NumberKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
}

impl NumberKind {
    /// Class-agnostic display name, used by `to_string`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            NumberKind::I8 => "i8",
            NumberKind::I16 => "i16",
            NumberKind::I32 => "i32",
            NumberKind::I64 => "i64",
            NumberKind::U8 => "u8",
            NumberKind::U16 => "u16",
            NumberKind::U32 => "u32",
            NumberKind::U64 => "u64",
            NumberKind::F32 => "f32",
            NumberKind::F64 => "f64",
            NumberKind::Bool => "bool",
        }
    }
}

/// Number payload: kind tag plus raw bits widened to 64.
///
/// Integers are stored sign- or zero-extended per their kind; floats store
/// their IEEE 754 bit pattern (`f32` in the low 32 bits); bool stores 0 or 1.
#[repr(C)]
struct NumberPayload {
    kind: NumberKind,
    bits: u64,
}

static NUMBER_CLASS: ClassDescriptor = ClassDescriptor::new(
    "Number",
    size_of::<NumberPayload>(),
    ClassOps {
        dealloc: None,
        hash: Some(number_hash_op),
        equal: Some(number_equal_op),
        to_string: Some(number_to_string_op),
        copy: None,
    },
);

/// The number class id, registering on first use.
pub fn number_class() -> ClassId {
    static ID: OnceLock<ClassId> = OnceLock::new();
    *ID.get_or_init(|| class::register(&NUMBER_CLASS))
}

/// A boxed scalar value.
///
/// `Copy` handle with the same manual ownership rules as [`ObjectRef`].
#[derive(Clone, Copy)]
pub struct Number(ObjectRef);

macro_rules! int_constructor {
    ($(#[$doc:meta])* $name:ident, $ty:ty, $kind:expr) => {
        $(#[$doc])*
        ///
        /// # Errors
        ///
        /// [`crate::Error::OutOfMemory`] when allocation fails.
        pub fn $name(value: $ty) -> Result<Number> {
            Self::alloc_with($kind, value as u64)
        }
    };
}

impl Number {
    int_constructor!(
        /// Boxes an `i8`.
        i8, i8, NumberKind::I8
    );
    int_constructor!(
        /// Boxes an `i16`.
        i16, i16, NumberKind::I16
    );
    int_constructor!(
        /// Boxes an `i32`.
        i32, i32, NumberKind::I32
    );
    int_constructor!(
        /// Boxes an `i64`.
        i64, i64, NumberKind::I64
    );
    int_constructor!(
        /// Boxes a `u8`.
        u8, u8, NumberKind::U8
    );
    int_constructor!(
        /// Boxes a `u16`.
        u16, u16, NumberKind::U16
    );
    int_constructor!(
        /// Boxes a `u32`.
        u32, u32, NumberKind::U32
    );
    int_constructor!(
        /// Boxes a `u64`.
        u64, u64, NumberKind::U64
    );

    /// Boxes an `f32` by bit pattern.
    ///
    /// # Errors
    ///
    /// [`crate::Error::OutOfMemory`] when allocation fails.
    pub fn f32(value: f32) -> Result<Number> {
        Self::alloc_with(NumberKind::F32, u64::from(value.to_bits()))
    }

    /// Boxes an `f64` by bit pattern.
    ///
    /// # Errors
    ///
    /// [`crate::Error::OutOfMemory`] when allocation fails.
    pub fn f64(value: f64) -> Result<Number> {
        Self::alloc_with(NumberKind::F64, value.to_bits())
    }

    /// Returns the shared constant singleton for `true` or `false`.
    ///
    /// # Panics
    ///
    /// Panics if the singletons cannot be allocated on first use.
    #[must_use]
    pub fn boolean(value: bool) -> Number {
        static TRUE: OnceLock<Number> = OnceLock::new();
        static FALSE: OnceLock<Number> = OnceLock::new();

        let cell = if value { &TRUE } else { &FALSE };
        *cell.get_or_init(|| {
            Self::alloc_flagged(NumberKind::Bool, u64::from(value), ObjectFlags::CONSTANT)
                .expect("failed to allocate boolean singleton")
        })
    }

    fn alloc_with(kind: NumberKind, bits: u64) -> Result<Number> {
        Self::alloc_flagged(kind, bits, ObjectFlags::empty())
    }

    fn alloc_flagged(kind: NumberKind, bits: u64, flags: ObjectFlags) -> Result<Number> {
        let obj = ObjectRef::alloc_extra(number_class(), 0, flags)?;
        // SAFETY: the payload slot is alloc_size bytes of fresh memory.
        unsafe {
            obj.payload_ptr()
                .cast::<NumberPayload>()
                .write(NumberPayload { kind, bits });
        }
        Ok(Number(obj))
    }

    /// Views an object as a number, `None` if it is not one.
    #[must_use]
    pub fn from_object(obj: ObjectRef) -> Option<Number> {
        obj.is_class(number_class()).then_some(Number(obj))
    }

    /// The underlying object reference.
    #[must_use]
    pub fn object(self) -> ObjectRef {
        self.0
    }

    fn payload(&self) -> &NumberPayload {
        // SAFETY: constructed by alloc_flagged, payload is initialized.
        unsafe { &*self.0.payload_ptr().cast::<NumberPayload>() }
    }

    /// The stored kind.
    #[must_use]
    pub fn kind(&self) -> NumberKind {
        self.payload().kind
    }

    /// The value widened to `i64` (truncating floats toward zero).
    #[must_use]
    pub fn to_i64(&self) -> i64 {
        let payload = self.payload();
        match payload.kind {
            NumberKind::I8 | NumberKind::I16 | NumberKind::I32 | NumberKind::I64 => {
                payload.bits as i64
            }
            NumberKind::U8 | NumberKind::U16 | NumberKind::U32 | NumberKind::U64
            | NumberKind::Bool => payload.bits as i64,
            NumberKind::F32 => f32::from_bits(payload.bits as u32) as i64,
            NumberKind::F64 => f64::from_bits(payload.bits) as i64,
        }
    }

    /// The value widened to `u64` (truncating floats toward zero, wrapping
    /// negative integers).
    #[must_use]
    pub fn to_u64(&self) -> u64 {
        let payload = self.payload();
        match payload.kind {
            NumberKind::F32 => f32::from_bits(payload.bits as u32) as u64,
            NumberKind::F64 => f64::from_bits(payload.bits) as u64,
            _ => payload.bits,
        }
    }

    /// The value as `f64`.
    #[must_use]
    pub fn to_f64(&self) -> f64 {
        let payload = self.payload();
        match payload.kind {
            NumberKind::I8 | NumberKind::I16 | NumberKind::I32 | NumberKind::I64 => {
                payload.bits as i64 as f64
            }
            NumberKind::U8 | NumberKind::U16 | NumberKind::U32 | NumberKind::U64
            | NumberKind::Bool => payload.bits as f64,
            NumberKind::F32 => f64::from(f32::from_bits(payload.bits as u32)),
            NumberKind::F64 => f64::from_bits(payload.bits),
        }
    }

    /// The value as `f32` (lossy for wide integers and `f64`).
    #[must_use]
    pub fn to_f32(&self) -> f32 {
        self.to_f64() as f32
    }

    /// The value as `i8` (truncating).
    #[must_use]
    pub fn to_i8(&self) -> i8 {
        self.to_i64() as i8
    }

    /// The value as `i16` (truncating).
    #[must_use]
    pub fn to_i16(&self) -> i16 {
        self.to_i64() as i16
    }

    /// The value as `i32` (truncating).
    #[must_use]
    pub fn to_i32(&self) -> i32 {
        self.to_i64() as i32
    }

    /// The value as `u8` (truncating).
    #[must_use]
    pub fn to_u8(&self) -> u8 {
        self.to_u64() as u8
    }

    /// The value as `u16` (truncating).
    #[must_use]
    pub fn to_u16(&self) -> u16 {
        self.to_u64() as u16
    }

    /// The value as `u32` (truncating).
    #[must_use]
    pub fn to_u32(&self) -> u32 {
        self.to_u64() as u32
    }

    /// The value as `bool` (`true` for anything nonzero).
    #[must_use]
    pub fn to_bool(&self) -> bool {
        let payload = self.payload();
        match payload.kind {
            NumberKind::F32 => f32::from_bits(payload.bits as u32) != 0.0,
            NumberKind::F64 => f64::from_bits(payload.bits) != 0.0,
            _ => payload.bits != 0,
        }
    }

    /// Boxes this value under a different kind, applying the same
    /// truncation rules as the scalar accessors.
    ///
    /// Converting to [`NumberKind::Bool`] returns a singleton; every other
    /// target kind allocates a fresh instance the caller owns.
    ///
    /// # Errors
    ///
    /// [`crate::Error::OutOfMemory`] when allocation fails.
    pub fn convert(&self, target: NumberKind) -> Result<Number> {
        match target {
            NumberKind::I8 => Number::i8(self.to_i8()),
            NumberKind::I16 => Number::i16(self.to_i16()),
            NumberKind::I32 => Number::i32(self.to_i32()),
            NumberKind::I64 => Number::i64(self.to_i64()),
            NumberKind::U8 => Number::u8(self.to_u8()),
            NumberKind::U16 => Number::u16(self.to_u16()),
            NumberKind::U32 => Number::u32(self.to_u32()),
            NumberKind::U64 => Number::u64(self.to_u64()),
            NumberKind::F32 => Number::f32(self.to_f32()),
            NumberKind::F64 => Number::f64(self.to_f64()),
            NumberKind::Bool => Ok(Number::boolean(self.to_bool())),
        }
    }

    /// Retains the underlying object (no-op for boolean singletons).
    pub fn retain(self) -> Number {
        self.0.retain();
        self
    }

    /// Releases the underlying object (no-op for boolean singletons).
    pub fn release(self) {
        self.0.release();
    }

    /// Defers release to the current autorelease pool scope.
    pub fn autorelease(self) -> Number {
        self.0.autorelease();
        self
    }
}

impl fmt::Debug for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload = self.payload();
        match payload.kind {
            NumberKind::F32 | NumberKind::F64 => {
                write!(f, "Number({}: {})", payload.kind.name(), self.to_f64())
            }
            NumberKind::Bool => write!(f, "Number(bool: {})", self.to_bool()),
            NumberKind::U8 | NumberKind::U16 | NumberKind::U32 | NumberKind::U64 => {
                write!(f, "Number({}: {})", payload.kind.name(), self.to_u64())
            }
            _ => write!(f, "Number({}: {})", payload.kind.name(), self.to_i64()),
        }
    }
}

fn number_hash_op(obj: ObjectRef) -> u64 {
    let number = Number(obj);
    let payload = number.payload();
    // Mix the kind in so same-bits values of different kinds hash apart.
    (payload.kind as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15) ^ payload.bits
}

fn number_equal_op(a: ObjectRef, b: ObjectRef) -> bool {
    let (a, b) = (Number(a), Number(b));
    a.payload().kind == b.payload().kind && a.payload().bits == b.payload().bits
}

fn number_to_string_op(obj: ObjectRef) -> Result<Str> {
    let n = Number(obj);
    match n.kind() {
        NumberKind::F32 | NumberKind::F64 => Str::format(format_args!("{}", n.to_f64())),
        NumberKind::Bool => Str::format(format_args!("{}", n.to_bool())),
        NumberKind::U8 | NumberKind::U16 | NumberKind::U32 | NumberKind::U64 => {
            Str::format(format_args!("{}", n.to_u64()))
        }
        _ => Str::format(format_args!("{}", n.to_i64())),
    }
}

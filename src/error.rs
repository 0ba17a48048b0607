//! Error types for the Cobalt runtime.
//!
//! Allocation failures and invalid class identities are the only recoverable
//! errors in the runtime; everything else (use-after-free, unbalanced pool
//! pops, out-of-range container mutation) is a contract violation and panics.

use std::fmt;

/// Errors that can occur in the Cobalt runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The allocator could not provide memory for an object.
    OutOfMemory {
        /// The requested allocation size in bytes.
        size: usize,
    },

    /// A class id that no registered class carries.
    InvalidClassId {
        /// The offending id value.
        id: u32,
    },

    /// The requested object would exceed the runtime's size bookkeeping.
    ObjectTooLarge {
        /// The requested total size in bytes.
        size: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfMemory { size } => {
                write!(f, "out of memory allocating {size} bytes")
            }
            Error::InvalidClassId { id } => write!(f, "invalid class id {id}"),
            Error::ObjectTooLarge { size } => {
                write!(f, "object of {size} bytes exceeds the maximum object size")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Result type for Cobalt runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            format!("{}", Error::OutOfMemory { size: 128 }),
            "out of memory allocating 128 bytes"
        );
        assert_eq!(format!("{}", Error::InvalidClassId { id: 9 }), "invalid class id 9");
    }

    #[test]
    fn test_error_equality() {
        assert_eq!(Error::InvalidClassId { id: 1 }, Error::InvalidClassId { id: 1 });
        assert_ne!(Error::OutOfMemory { size: 1 }, Error::OutOfMemory { size: 2 });
    }
}

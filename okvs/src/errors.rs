//! Errors produced by the solver and decoder.

use std::fmt;

/// Errors produced by `Paxos` and `Baxos`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The hash weight is unsupported (must be at least two).
    InvalidWeight(usize),
    /// The regression formulas do not yield usable parameters for this
    /// item count and weight combination.
    InvalidParameters {
        /// Number of items requested.
        num_items: usize,
        /// Hash weight requested.
        weight: usize,
    },
    /// The chosen index type cannot address the sparse vector.
    IndexTypeTooSmall {
        /// Required sparse size.
        sparse_size: u64,
        /// Width of the index type in bits.
        index_bits: u32,
    },
    /// An input slice length does not match the structure's item count.
    InvalidInputLength {
        /// Expected length.
        expected: usize,
        /// Length found.
        found: usize,
    },
    /// An output slice length does not match the structure's total size.
    InvalidOutputLength {
        /// Expected length.
        expected: usize,
        /// Length found.
        found: usize,
    },
    /// Two input items hashed identically; inputs must be distinct.
    DuplicateItems,
    /// A capacity bound was exceeded (gap rows beyond the dense width, or a
    /// bin receiving more items than it was provisioned for). Statistically
    /// bounded by the failure probability parameter.
    CapacityExceeded {
        /// Observed count.
        size: usize,
        /// Provisioned bound.
        limit: usize,
    },
    /// The dense linear system for the gap rows was singular.
    SingularMatrix,
    /// Triangulation popped a column with no unvisited rows; the column
    /// weight bookkeeping is inconsistent with the sparse system.
    TriangulationFailed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidWeight(w) => write!(f, "invalid hash weight {} (need >= 2)", w),
            Error::InvalidParameters { num_items, weight } => write!(
                f,
                "no usable parameters for {} items at weight {}",
                num_items, weight
            ),
            Error::IndexTypeTooSmall {
                sparse_size,
                index_bits,
            } => write!(
                f,
                "sparse size {} does not fit in a {}-bit index",
                sparse_size, index_bits
            ),
            Error::InvalidInputLength { expected, found } => {
                write!(f, "input length {} != expected {}", found, expected)
            }
            Error::InvalidOutputLength { expected, found } => {
                write!(f, "output length {} != expected {}", found, expected)
            }
            Error::DuplicateItems => write!(f, "duplicate input items detected"),
            Error::CapacityExceeded { size, limit } => {
                write!(f, "capacity exceeded: {} > {}", size, limit)
            }
            Error::SingularMatrix => write!(f, "dense gap system is singular"),
            Error::TriangulationFailed => {
                write!(f, "triangulation popped a column with no unvisited rows")
            }
        }
    }
}

impl std::error::Error for Error {}

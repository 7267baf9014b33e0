//! Error types for the Dendron temporal memory core.
//!
//! This module provides a unified error type for all fallible operations in
//! the crate, using the `thiserror` crate for ergonomic error handling.

use thiserror::Error;

/// Which capacity limit a `CapacityExceeded` error refers to.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityKind {
    /// A cell already owns `max_segments_per_cell` segments.
    #[error("segments per cell")]
    SegmentsPerCell,
    /// A segment already holds `max_synapses_per_segment` synapses.
    #[error("synapses per segment")]
    SynapsesPerSegment,
}

/// The main error type for Dendron operations.
///
/// This enum represents all possible error conditions that can occur while
/// constructing or driving a `TemporalMemory`.
#[derive(Error, Debug)]
pub enum TemporalMemoryError {
    /// Constructor arguments are not internally consistent.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Column index out of range.
    #[error("invalid column: index {index}, num_columns {num_columns}")]
    InvalidColumn {
        /// The offending index.
        index: usize,
        /// The valid column count.
        num_columns: usize,
    },

    /// Cell index out of range.
    #[error("invalid cell: index {index}, num_cells {num_cells}")]
    InvalidCell {
        /// The offending index.
        index: usize,
        /// The valid cell count.
        num_cells: usize,
    },

    /// A hard capacity limit (`max_segments_per_cell` /
    /// `max_synapses_per_segment`) was reached.
    #[error("capacity exceeded: {kind} (limit {limit})")]
    CapacityExceeded {
        /// Which capacity was exceeded.
        kind: CapacityKind,
        /// The limit that was hit.
        limit: usize,
    },

    /// I/O error occurred while reading or writing serialized state.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error occurred while encoding or decoding state.
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

/// A specialized `Result` type for Dendron operations.
pub type Result<T> = std::result::Result<T, TemporalMemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TemporalMemoryError::InvalidColumn {
            index: 10,
            num_columns: 4,
        };
        assert_eq!(err.to_string(), "invalid column: index 10, num_columns 4");

        let err = TemporalMemoryError::CapacityExceeded {
            kind: CapacityKind::SegmentsPerCell,
            limit: 255,
        };
        assert_eq!(
            err.to_string(),
            "capacity exceeded: segments per cell (limit 255)"
        );
    }

    #[test]
    fn test_result_type() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }

        assert_eq!(returns_result().unwrap(), 42);
    }
}

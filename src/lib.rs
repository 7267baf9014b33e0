//! Dendron — sparse synaptic substrate and sequence-learning temporal
//! memory core.
//!
//! Dendron implements the learning layer of Hierarchical Temporal Memory
//! (HTM): given a sparse set of active columns, it tracks which cells are
//! active in context, which cells win the right to learn, and which
//! dendritic segments predict the columns that will activate next. The
//! algorithm is driven entirely by two pieces:
//!
//! - [`connections`]: the sparse synapse substrate (cells own segments,
//!   segments own synapses), addressed through opaque arena handles.
//! - [`temporal_memory`]: the per-step compute/learn state machine built
//!   on top of it.
//!
//! # Example
//!
//! ```
//! use dendron::{TemporalMemory, TemporalMemoryConfig};
//!
//! let config = TemporalMemoryConfig {
//!     column_dimensions: vec![128],
//!     cells_per_column: 4,
//!     ..Default::default()
//! };
//! let mut tm = TemporalMemory::new(config).unwrap();
//!
//! tm.compute(&[1, 4, 9], true).unwrap();
//! assert!(!tm.get_active_cells().is_empty());
//! ```
//!
//! # Scope
//!
//! This crate is the learning core only: it does not perform spatial
//! pooling (encoding raw input into sparse columns), does not provide a
//! region/network composition layer, and does not define a persistence
//! wire format beyond `serde`/`bincode` derives on its own types.
//!
//! # Safety
//!
//! Dendron uses `debug_assert!` for internal bounds checking in hot
//! paths, providing full validation during development and testing with
//! zero cost in release builds. Caller-facing invalid input (bad
//! configuration, out-of-range column/cell indices) is reported through
//! [`error::TemporalMemoryError`], never a panic.

pub mod connections;
pub mod error;
pub mod temporal_memory;
pub mod utils;

pub use connections::{Connections, Segment, Synapse, SynapseData};
pub use error::{CapacityKind, Result, TemporalMemoryError};
pub use temporal_memory::{TemporalMemory, TemporalMemoryConfig};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = "Dendron";

/// Human-readable version string.
pub fn version() -> String {
    format!("{} v{}", NAME, VERSION)
}

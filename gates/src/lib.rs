//! # flowset-gates
//!
//! Gate primitives for multi-sample flow cytometry datasets.
//!
//! This library provides the pieces a dataset needs to turn gate definitions
//! into per-cell boolean masks:
//!
//! - **Polygon gates**: named polygons drawn on two scatter channels
//! - **Gate chains**: ordered stages, each evaluated within the previous stage's survivors
//! - **Mask algebra**: element-wise AND/OR across gate masks ("crossing" gates)
//! - **Statistics**: event counts and percentages for gated populations
//!
//! ## Quick Start
//!
//! ```rust
//! use flowset_gates::*;
//! use std::collections::HashMap;
//!
//! # fn example() -> Result<(), GateError> {
//! let gate = PolygonGate::new(
//!     "cells",
//!     "FSC-A",
//!     "SSC-A",
//!     vec![(100.0, 200.0), (300.0, 200.0), (300.0, 400.0), (100.0, 400.0)],
//! )?;
//!
//! let mut events: HashMap<String, Vec<f32>> = HashMap::new();
//! events.insert("FSC-A".to_string(), vec![150.0, 500.0]);
//! events.insert("SSC-A".to_string(), vec![250.0, 250.0]);
//!
//! let mask = gate.mask(&events)?;
//! assert_eq!(mask, vec![true, false]);
//!
//! let crossed = combine_masks(BooleanOperation::And, &[mask.as_slice(), &[true, true][..]])?;
//! assert_eq!(crossed, vec![true, false]);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! ## Error Handling
//!
//! The library uses [`GateError`] for all error conditions. Most operations return
//! [`Result<T, GateError>`](GateResult).

pub mod batch_filtering;
pub mod error;
pub mod hierarchy;
pub mod polygon;
pub mod statistics;
pub mod traits;

/// Error types for gate operations
pub use error::{GateError, Result as GateResult};

/// Mask algebra
pub use batch_filtering::{BooleanOperation, combine_masks, mask_to_indices, non_negative_mask};

/// Ordered gate stages
pub use hierarchy::GateChain;

/// Polygon geometry
pub use polygon::PolygonGate;

/// Statistics for gated populations
pub use statistics::MaskStatistics;

/// Gate geometry and data access traits
pub use traits::{EventSource, GateBounds};

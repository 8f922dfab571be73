//! # flowset
//!
//! In-memory model of a multi-sample flow cytometry experiment and the
//! pipeline that runs over it:
//!
//! - **Gating**: scatter gates derived from pooled events, gate crossing with AND/OR
//! - **Controls**: single-color controls (one per channel) plus a reference control
//! - **Calibration**: bead-based conversion to MEF units
//! - **Compensation**: piecewise or matrix spillover correction
//! - **Binning**: N-dimensional grids of cell indices per sample
//! - **Queries**: gated value slices and combinatorial sample lookup
//!
//! Per-cell data lives in Polars `DataFrame`s (one `Float32` column per
//! channel, one table per data type). Fitting and derivation routines are
//! supplied by the caller through the traits in [`collaborators`].
//!
//! ## Quick Start
//!
//! ```rust
//! use flowset::*;
//! use polars::prelude::{Column, DataFrame, PolarsResult};
//!
//! # fn example() -> Result<()> {
//! let scatter = |n: usize| -> PolarsResult<DataFrame> {
//!     DataFrame::new(vec![
//!         Column::new("FSC-A".into(), vec![1.0f32; n]),
//!         Column::new("FSC-H".into(), vec![1.0f32; n]),
//!         Column::new("SSC-A".into(), vec![1.0f32; n]),
//!     ])
//! };
//! let samples = vec![
//!     SampleData::new(scatter(3)?).with_data(
//!         "raw",
//!         DataFrame::new(vec![Column::new("GFP".into(), vec![0.5f32, 1.5, 2.5])])?,
//!     ),
//!     SampleData::new(scatter(2)?).with_data(
//!         "raw",
//!         DataFrame::new(vec![Column::new("GFP".into(), vec![1.2f32, -1.0])])?,
//!     ),
//! ];
//! let sample_map = DataFrame::new(vec![Column::new("strain".into(), &["wt", "mutA"])])?;
//!
//! let config = DatasetConfig {
//!     bin_transform: TransformType::Linear,
//!     ..Default::default()
//! };
//! let mut dataset = FlowDataset::new(vec!["GFP".to_string()], sample_map, samples, config)?;
//!
//! dataset.bin(&[("GFP", vec![0.0, 1.0, 2.0])], "raw", "all")?;
//! let counts = dataset.bin_counts().unwrap();
//! assert_eq!(counts[0].as_slice().unwrap(), &[1, 1]);
//!
//! let ids = dataset.get_sample_ids(&[("strain", vec![MetadataValue::from("mutA")])])?;
//! assert_eq!(ids.as_list(), Some(&[2][..]));
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! ## Error Handling
//!
//! Every operation returns [`Result<T, DatasetError>`](Result) and validates
//! its inputs before changing anything, so a failed call leaves the dataset
//! as it was.

pub mod binning;
pub mod calibration;
pub mod collaborators;
pub mod compensation;
pub mod config;
pub mod controls;
pub mod dataset;
pub mod error;
pub mod events;
pub mod frame;
pub mod gating;
pub mod query;
pub mod registry;
pub mod sample_map;
pub mod store;
pub mod transform;

pub use binning::{BinAxis, BinCollection, BinConfig};
pub use collaborators::{
    BeadFitter, BeadSpec, CalibrationApplicator, CalibrationFit, ChainGateApplier, ChannelFit,
    CompensationRequest, CompensationStages, Compensator, DataImporter, FitParameters,
    GateApplier, GateDeriver, GatedFrame, ImportedExperiment, LinearUnitsApplicator,
    MatrixCompensation,
};
pub use compensation::CompensationMethod;
pub use config::{DataTypeLabels, DatasetConfig};
pub use dataset::FlowDataset;
pub use error::{DatasetError, ErrorKind, Result};
pub use events::{DatasetEvent, EventKind, Observer, ObserverId};
pub use frame::EventFrame;
pub use query::{SampleIds, SliceOptions, SliceOptionsBuilder};
pub use registry::{DataTypeRegistry, GateDefinition, GateRegistry, NameRegistry};
pub use sample_map::{MetadataValue, SampleMap};
pub use store::{Controls, EventStore, Sample, SampleData, SampleGroup};
pub use transform::{ScaleTransform, TransformType};

/// Gate primitives re-exported for collaborator implementations
pub use flowset_gates::{BooleanOperation, MaskStatistics, PolygonGate};

//! Contracts for the routines the dataset delegates to.
//!
//! File parsing, polygon derivation, bead fitting and compensation fitting all
//! live outside this crate. Each is consumed through one of the traits below;
//! implementations report failures as `anyhow::Error`, which the dataset wraps
//! into [`DatasetError::Collaborator`](crate::DatasetError::Collaborator).
//!
//! Default implementations are provided where the contract is simple enough
//! to ship: [`ChainGateApplier`] and [`LinearUnitsApplicator`].

use crate::frame::{channel_slice, frame_from_columns};
use crate::store::SampleData;
use anyhow::{Context, anyhow};
use flowset_gates::{EventSource, GateChain, PolygonGate};
use polars::prelude::DataFrame;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Everything an importer hands to [`FlowDataset::import`](crate::FlowDataset::import)
#[derive(Debug, Clone)]
pub struct ImportedExperiment {
    /// Fluorescence channels, in the order controls will be supplied
    pub channels: Vec<String>,
    /// One row per sample, same order as `samples`
    pub sample_map: DataFrame,
    pub samples: Vec<SampleData>,
}

/// Reads an experiment from wherever it lives
pub trait DataImporter {
    fn import(&self) -> anyhow::Result<ImportedExperiment>;
}

/// Derives scatter gates from a pooled scatter table.
///
/// The returned polygons form a chain: each stage is meant to be evaluated
/// within the survivors of the previous one.
pub trait GateDeriver {
    fn derive(&self, pooled_scatter: &DataFrame) -> anyhow::Result<Vec<PolygonGate>>;
}

/// Evaluates derived gates on one sample's scatter events.
///
/// Must return one mask per gate, keyed by gate name, each of length
/// `scatter.event_count()`.
pub trait GateApplier {
    fn apply(
        &self,
        scatter: &dyn EventSource,
        gates: &[PolygonGate],
    ) -> anyhow::Result<Vec<(Arc<str>, Vec<bool>)>>;
}

/// Applies the gates as a [`GateChain`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainGateApplier;

impl GateApplier for ChainGateApplier {
    fn apply(
        &self,
        scatter: &dyn EventSource,
        gates: &[PolygonGate],
    ) -> anyhow::Result<Vec<(Arc<str>, Vec<bool>)>> {
        let chain = GateChain::new(gates.to_vec())?;
        Ok(chain.apply(scatter)?)
    }
}

/// A bead calibration file and the bead lot it was acquired with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeadSpec {
    pub filename: PathBuf,
    pub bead_type: String,
    pub lot: String,
}

impl BeadSpec {
    pub fn new(
        filename: impl Into<PathBuf>,
        bead_type: impl Into<String>,
        lot: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            bead_type: bead_type.into(),
            lot: lot.into(),
        }
    }
}

/// Linear map from arbitrary units to MEF for one channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelFit {
    pub slope: f64,
    pub intercept: f64,
}

/// Per-channel calibration produced by a [`BeadFitter`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFit {
    pub channels: FxHashMap<Arc<str>, ChannelFit>,
}

impl CalibrationFit {
    pub fn channel(&self, channel: &str) -> Option<&ChannelFit> {
        self.channels.get(channel)
    }
}

/// Fits bead peaks to their reference MEF values
pub trait BeadFitter {
    fn fit(
        &self,
        beads: &BeadSpec,
        channels: &[Arc<str>],
        show_plots: bool,
    ) -> anyhow::Result<CalibrationFit>;
}

/// Turns a collection of raw tables into calibrated ones.
///
/// Output tables must keep the row count and channel set of the input.
pub trait CalibrationApplicator {
    fn apply(
        &self,
        frames: &[&DataFrame],
        fit: &CalibrationFit,
        channels: &[Arc<str>],
    ) -> anyhow::Result<Vec<DataFrame>>;
}

/// Applies `slope * value + intercept` per channel
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearUnitsApplicator;

impl CalibrationApplicator for LinearUnitsApplicator {
    fn apply(
        &self,
        frames: &[&DataFrame],
        fit: &CalibrationFit,
        channels: &[Arc<str>],
    ) -> anyhow::Result<Vec<DataFrame>> {
        let fits = channels
            .iter()
            .map(|channel| {
                fit.channel(channel)
                    .copied()
                    .ok_or_else(|| anyhow!("No calibration fit for channel {channel}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        frames
            .iter()
            .enumerate()
            .map(|(i, frame)| {
                let columns = channels
                    .iter()
                    .zip(&fits)
                    .map(|(channel, fit)| -> anyhow::Result<Vec<f32>> {
                        let values = channel_slice(frame, channel)?;
                        Ok(values
                            .par_iter()
                            .map(|&v| (fit.slope * v as f64 + fit.intercept) as f32)
                            .collect())
                    })
                    .collect::<anyhow::Result<Vec<Vec<f32>>>>()?;
                frame_from_columns(channels, columns)
                    .with_context(|| format!("Failed to build calibrated table {}", i + 1))
            })
            .collect()
    }
}

/// One table with the gate mask that selects the cells to use from it
#[derive(Debug, Clone, Copy)]
pub struct GatedFrame<'a> {
    pub frame: &'a DataFrame,
    pub mask: &'a [bool],
}

/// Inputs to a compensation routine
#[derive(Debug, Clone)]
pub struct CompensationRequest<'a> {
    pub samples: Vec<GatedFrame<'a>>,
    /// Single-color controls, in channel order
    pub single_color: Vec<GatedFrame<'a>>,
    pub reference: GatedFrame<'a>,
    pub channels: &'a [Arc<str>],
    /// Data type the tables were read from
    pub data_type: &'a str,
    /// Gate the masks were read from
    pub gate: &'a str,
}

/// Opaque per-channel fit results, kept for downstream analysis
pub type FitParameters = FxHashMap<Arc<str>, serde_json::Value>;

/// The two outputs matrix compensation produces for every table
#[derive(Debug, Clone)]
pub struct CompensationStages {
    pub autofluorescence_subtracted: DataFrame,
    pub compensated: DataFrame,
}

#[derive(Debug, Clone)]
pub struct MatrixCompensation {
    pub samples: Vec<CompensationStages>,
    pub single_color: Vec<CompensationStages>,
    pub reference: CompensationStages,
    pub fit_parameters: FitParameters,
}

/// Spectral overlap correction
pub trait Compensator {
    /// Compensate the samples from single-color controls, one table per sample
    fn piecewise(
        &self,
        request: &CompensationRequest<'_>,
        show_plots: bool,
    ) -> anyhow::Result<Vec<DataFrame>>;

    /// Fit and apply a compensation matrix to samples and controls
    fn matrix(
        &self,
        request: &CompensationRequest<'_>,
        show_plots: bool,
    ) -> anyhow::Result<MatrixCompensation>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ScatterView;
    use approx::assert_relative_eq;

    #[test]
    fn test_chain_applier_nests_stages() {
        let scatter = frame_from_columns(
            &["FSC-A", "SSC-A"],
            vec![vec![1.0, 5.0, 5.0, 20.0], vec![1.0, 5.0, 9.0, 20.0]],
        )
        .unwrap();
        let cells = PolygonGate::new(
            "cells",
            "FSC-A",
            "SSC-A",
            vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)],
        )
        .unwrap();
        let singlets = PolygonGate::new(
            "singlets",
            "FSC-A",
            "SSC-A",
            vec![(4.0, 4.0), (30.0, 4.0), (30.0, 6.0), (4.0, 6.0)],
        )
        .unwrap();

        let masks = ChainGateApplier
            .apply(&ScatterView(&scatter), &[cells, singlets])
            .unwrap();
        assert_eq!(masks[0].1, vec![true, true, true, false]);
        assert_eq!(masks[1].1, vec![false, true, false, false]);
    }

    #[test]
    fn test_linear_units() {
        let raw = frame_from_columns(&["GFP"], vec![vec![0.0, 10.0]]).unwrap();
        let mut fit = CalibrationFit::default();
        fit.channels.insert(
            Arc::from("GFP"),
            ChannelFit {
                slope: 2.0,
                intercept: 1.0,
            },
        );
        let channels = [Arc::<str>::from("GFP")];

        let out = LinearUnitsApplicator.apply(&[&raw], &fit, &channels).unwrap();
        let gfp = channel_slice(&out[0], "GFP").unwrap();
        assert_relative_eq!(gfp[0], 1.0);
        assert_relative_eq!(gfp[1], 21.0);

        let missing = [Arc::<str>::from("RFP")];
        assert!(LinearUnitsApplicator.apply(&[&raw], &fit, &missing).is_err());
    }
}

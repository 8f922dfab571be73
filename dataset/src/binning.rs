//! N-dimensional binning of gated cell populations.
//!
//! Each sample's selected cells are sliced, passed through the dataset's
//! scale transform and dropped into a grid of half-open bins
//! (`edges[i] <= v < edges[i + 1]`). Values outside the outer edges, and
//! NaNs, fall in no bin. Every bin holds the 0-based indices of its cells in
//! the sample's full (ungated) arrays.

use crate::dataset::FlowDataset;
use crate::error::{DatasetError, Result};
use crate::events::{DatasetEvent, ObserverId};
use crate::query::SliceOptions;
use ndarray::{ArrayD, Axis, IxDyn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Edges along one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinAxis {
    pub channel: String,
    pub edges: Vec<f64>,
}

impl BinAxis {
    pub fn new(channel: impl Into<String>, edges: Vec<f64>) -> Self {
        Self {
            channel: channel.into(),
            edges,
        }
    }

    pub fn bin_count(&self) -> usize {
        self.edges.len().saturating_sub(1)
    }

    /// Bin holding `value`, if any
    pub fn locate(&self, value: f64) -> Option<usize> {
        let (first, last) = (*self.edges.first()?, *self.edges.last()?);
        if value >= first && value < last {
            Some(self.edges.partition_point(|&edge| edge <= value) - 1)
        } else {
            None
        }
    }

    fn validate(&self) -> Result<()> {
        if self.edges.len() < 2 {
            return Err(DatasetError::invalid_bin_edges(
                &self.channel,
                format!("need at least 2 edges, got {}", self.edges.len()),
            ));
        }
        if self.edges.iter().any(|edge| !edge.is_finite()) {
            return Err(DatasetError::invalid_bin_edges(&self.channel, "edges must be finite"));
        }
        if self.edges.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(DatasetError::invalid_bin_edges(
                &self.channel,
                "edges must be strictly increasing",
            ));
        }
        Ok(())
    }
}

/// Which cells are binned and how
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinConfig {
    pub axes: Vec<BinAxis>,
    pub data_type: String,
    pub gate: String,
}

impl BinConfig {
    pub fn new<C: AsRef<str>>(
        spec: &[(C, Vec<f64>)],
        data_type: impl Into<String>,
        gate: impl Into<String>,
    ) -> Self {
        Self {
            axes: spec
                .iter()
                .map(|(channel, edges)| BinAxis::new(channel.as_ref(), edges.clone()))
                .collect(),
            data_type: data_type.into(),
            gate: gate.into(),
        }
    }

    /// Grid shape (bins per axis)
    pub fn shape(&self) -> Vec<usize> {
        self.axes.iter().map(BinAxis::bin_count).collect()
    }

    pub fn channels(&self) -> Vec<String> {
        self.axes.iter().map(|axis| axis.channel.clone()).collect()
    }
}

/// Per-sample bin grids computed for one [`BinConfig`]
#[derive(Debug, Clone, PartialEq)]
pub struct BinCollection {
    config: BinConfig,
    bins: Vec<ArrayD<Vec<usize>>>,
}

impl BinCollection {
    pub fn config(&self) -> &BinConfig {
        &self.config
    }

    /// Grids in sample order (index 0 is sample 1)
    pub fn grids(&self) -> &[ArrayD<Vec<usize>>] {
        &self.bins
    }

    /// Grid of a 1-based sample index
    pub fn sample(&self, index: usize) -> Option<&ArrayD<Vec<usize>>> {
        index.checked_sub(1).and_then(|i| self.bins.get(i))
    }

    /// Number of cells per bin, per sample
    pub fn counts(&self) -> Vec<ArrayD<usize>> {
        self.bins.iter().map(|grid| grid.map(Vec::len)).collect()
    }
}

impl FlowDataset {
    /// Bin every sample's cells of `gate`, read from `data_type`, on the given
    /// channel edges. Replaces the current bins and binning configuration.
    pub fn bin<C: AsRef<str>>(
        &mut self,
        spec: &[(C, Vec<f64>)],
        data_type: &str,
        gate: &str,
    ) -> Result<()> {
        let config = BinConfig::new(spec, data_type, gate);
        self.validate_bin_config(&config)?;
        let bins = self.compute_bins(&config)?;
        self.bin_config = Some(config.clone());
        self.bins = Some(BinCollection { config, bins });
        self.emit(DatasetEvent::BinsUpdated)
    }

    pub fn bin_config(&self) -> Option<&BinConfig> {
        self.bin_config.as_ref()
    }

    pub fn bins(&self) -> Option<&BinCollection> {
        self.bins.as_ref()
    }

    pub fn bin_counts(&self) -> Option<Vec<ArrayD<usize>>> {
        self.bins.as_ref().map(BinCollection::counts)
    }

    /// Change the binning configuration without binning.
    ///
    /// Current bins are discarded. With auto-binning enabled the observer
    /// recomputes them before this returns.
    pub fn set_bin_config(&mut self, config: BinConfig) -> Result<()> {
        self.validate_bin_config(&config)?;
        if self.bin_config.as_ref() == Some(&config) {
            debug!("Binning configuration unchanged");
            return Ok(());
        }
        self.bin_config = Some(config);
        self.bins = None;
        self.emit(DatasetEvent::BinConfigChanged)
    }

    /// Recompute bins from the current configuration
    pub fn recompute_bins(&mut self) -> Result<()> {
        let config = self
            .bin_config
            .clone()
            .ok_or_else(|| DatasetError::precondition("No binning configuration set"))?;
        self.validate_bin_config(&config)?;
        let bins = self.compute_bins(&config)?;
        self.bins = Some(BinCollection { config, bins });
        self.emit(DatasetEvent::BinsUpdated)
    }

    /// Recompute bins whenever the binning configuration changes
    pub fn enable_auto_binning(&mut self) -> ObserverId {
        if let Some(id) = self.auto_binning {
            return id;
        }
        let id = self.subscribe(|dataset, event| match event {
            DatasetEvent::BinConfigChanged => dataset.recompute_bins(),
            _ => Ok(()),
        });
        self.auto_binning = Some(id);
        id
    }

    pub fn disable_auto_binning(&mut self) {
        if let Some(id) = self.auto_binning.take() {
            self.unsubscribe(id);
        }
    }

    fn validate_bin_config(&self, config: &BinConfig) -> Result<()> {
        if config.axes.is_empty() {
            return Err(DatasetError::validation("Binning needs at least one channel"));
        }
        for (i, axis) in config.axes.iter().enumerate() {
            if !self.channels.iter().any(|c| c.as_ref() == axis.channel) {
                return Err(DatasetError::UnknownChannel(axis.channel.clone()));
            }
            if config.axes[..i].iter().any(|other| other.channel == axis.channel) {
                return Err(DatasetError::validation(format!(
                    "Channel '{}' binned twice",
                    axis.channel
                )));
            }
            axis.validate()?;
        }
        self.data_types.require(&config.data_type)?;
        self.gates.require(&config.gate)?;
        Ok(())
    }

    fn compute_bins(&self, config: &BinConfig) -> Result<Vec<ArrayD<Vec<usize>>>> {
        let options = SliceOptions {
            channels: Some(config.channels()),
            data_type: Some(config.data_type.clone()),
            gate: Some(config.gate.clone()),
        };
        let shape = config.shape();

        let grids = (1..=self.sample_count())
            .map(|index| {
                let (values, cells) = self.slice_with_indices(index, &options)?;
                let values = self.scale.transform_matrix(values);
                if values.nrows() != cells.len() {
                    return Err(DatasetError::shape_mismatch(
                        format!("scale transform output rows for sample {index}"),
                        cells.len(),
                        values.nrows(),
                    ));
                }
                if values.ncols() != config.axes.len() {
                    return Err(DatasetError::shape_mismatch(
                        format!("scale transform output columns for sample {index}"),
                        config.axes.len(),
                        values.ncols(),
                    ));
                }

                let located: Vec<Option<Vec<usize>>> = values
                    .axis_iter(Axis(0))
                    .into_par_iter()
                    .map(|row| {
                        config
                            .axes
                            .iter()
                            .zip(row.iter())
                            .map(|(axis, &value)| axis.locate(value as f64))
                            .collect()
                    })
                    .collect();

                let mut grid = ArrayD::from_elem(IxDyn(&shape), Vec::new());
                for (cell, position) in cells.into_iter().zip(located) {
                    if let Some(position) = position {
                        grid[IxDyn(&position)].push(cell);
                    }
                }
                Ok(grid)
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Binned {} samples on {:?} ({} data, gate '{}')",
            grids.len(),
            config.channels(),
            config.data_type,
            config.gate
        );
        Ok(grids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_half_open() {
        let axis = BinAxis::new("GFP", vec![0.0, 1.0, 2.0]);
        assert_eq!(axis.locate(0.0), Some(0));
        assert_eq!(axis.locate(0.999), Some(0));
        assert_eq!(axis.locate(1.0), Some(1));
        assert_eq!(axis.locate(1.5), Some(1));
        assert_eq!(axis.locate(2.0), None);
        assert_eq!(axis.locate(-0.1), None);
        assert_eq!(axis.locate(f64::NAN), None);
    }

    #[test]
    fn test_edge_validation() {
        assert!(BinAxis::new("GFP", vec![1.0]).validate().is_err());
        assert!(BinAxis::new("GFP", vec![0.0, 0.0]).validate().is_err());
        assert!(BinAxis::new("GFP", vec![0.0, f64::INFINITY]).validate().is_err());
        assert!(BinAxis::new("GFP", vec![2.0, 1.0]).validate().is_err());
        assert!(BinAxis::new("GFP", vec![-1.0, 0.0, 5.0]).validate().is_ok());
    }

    #[test]
    fn test_config_shape() {
        let config = BinConfig::new(&[("GFP", vec![0.0, 1.0, 2.0]), ("RFP", vec![0.0, 5.0])], "raw", "all");
        assert_eq!(config.shape(), vec![2, 1]);
        assert_eq!(config.channels(), vec!["GFP".to_string(), "RFP".to_string()]);
    }
}

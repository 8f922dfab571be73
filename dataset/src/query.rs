//! Read-only queries: value slicing and combinatorial sample lookup.

use crate::dataset::FlowDataset;
use crate::error::{DatasetError, Result};
use crate::frame::channel_slice;
use crate::sample_map::MetadataValue;
use derive_builder::Builder;
use flowset_gates::mask_to_indices;
use itertools::Itertools;
use ndarray::{Array2, ArrayD, IxDyn};
use std::sync::Arc;

/// Selection for [`FlowDataset::slice`]
///
/// Unset fields fall back to all channels, the raw data type and no gate.
///
/// ```rust
/// use flowset::SliceOptions;
///
/// let options = SliceOptions::new()
///     .channels(vec!["GFP".to_string()])
///     .gate("singlets")
///     .build()
///     .unwrap();
/// assert_eq!(options.data_type, None);
/// ```
#[derive(Builder, Clone, Debug, Default, PartialEq)]
#[builder(setter(into, strip_option), default)]
pub struct SliceOptions {
    pub channels: Option<Vec<String>>,
    pub data_type: Option<String>,
    pub gate: Option<String>,
}

impl SliceOptions {
    pub fn new() -> SliceOptionsBuilder {
        SliceOptionsBuilder::default()
    }
}

/// Result of [`FlowDataset::get_sample_ids`]
#[derive(Debug, Clone, PartialEq)]
pub enum SampleIds {
    /// Matching 1-based sample indices, ascending (single constraint)
    List(Vec<usize>),
    /// One 1-based sample index per value combination; axis `k` follows the
    /// values of constraint `k`
    Grid(ArrayD<usize>),
}

impl SampleIds {
    pub fn as_list(&self) -> Option<&[usize]> {
        match self {
            SampleIds::List(ids) => Some(ids),
            SampleIds::Grid(_) => None,
        }
    }

    pub fn as_grid(&self) -> Option<&ArrayD<usize>> {
        match self {
            SampleIds::Grid(grid) => Some(grid),
            SampleIds::List(_) => None,
        }
    }
}

impl FlowDataset {
    /// Cells × channels matrix for one sample (1-based index)
    pub fn slice(&self, sample_index: usize, options: &SliceOptions) -> Result<Array2<f32>> {
        Ok(self.slice_with_indices(sample_index, options)?.0)
    }

    /// Like [`slice`](Self::slice), also returning the 0-based cell index of
    /// every row
    pub fn slice_with_indices(
        &self,
        sample_index: usize,
        options: &SliceOptions,
    ) -> Result<(Array2<f32>, Vec<usize>)> {
        let sample = self.sample(sample_index)?;

        let channels: Vec<Arc<str>> = match &options.channels {
            None => self.channels.clone(),
            Some(requested) if requested.is_empty() => {
                return Err(DatasetError::validation("Slice needs at least one channel"));
            }
            Some(requested) => requested
                .iter()
                .map(|name| {
                    self.channels
                        .iter()
                        .find(|c| c.as_ref() == name.as_str())
                        .cloned()
                        .ok_or_else(|| DatasetError::UnknownChannel(name.clone()))
                })
                .collect::<Result<_>>()?,
        };

        let data_type = options
            .data_type
            .as_deref()
            .unwrap_or(self.config.labels.raw.as_str());
        self.data_types.require(data_type)?;
        let context = format!("sample {sample_index}");
        let frame = sample.data(data_type).ok_or_else(|| {
            DatasetError::precondition(format!("{context} has no '{data_type}' data"))
        })?;

        let cells = match &options.gate {
            Some(gate) => {
                self.gates.require(gate)?;
                mask_to_indices(self.mask_of(sample, gate, &context)?)
            }
            None => (0..sample.cell_count()).collect(),
        };

        let columns = channels
            .iter()
            .map(|channel| channel_slice(frame, channel))
            .collect::<Result<Vec<_>>>()?;
        let matrix = Array2::from_shape_fn((cells.len(), columns.len()), |(row, col)| {
            columns[col][cells[row]]
        });
        Ok((matrix, cells))
    }

    /// Resolve sample indices from metadata constraints.
    ///
    /// Each constraint is a sample-map column and the accepted values for it.
    /// A single constraint yields every matching index. Several constraints
    /// yield a grid with one axis per constraint, in the order given, holding
    /// the single sample that matches each combination of values. A
    /// combination matching no sample, or more than one, is an error.
    pub fn get_sample_ids<S: AsRef<str>>(
        &self,
        constraints: &[(S, Vec<MetadataValue>)],
    ) -> Result<SampleIds> {
        if constraints.is_empty() {
            return Err(DatasetError::validation("At least one constraint is required"));
        }
        let columns = constraints
            .iter()
            .map(|(column, _)| self.sample_map.values(column.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        if let [(_, accepted)] = constraints {
            let ids = columns[0]
                .iter()
                .enumerate()
                .filter(|(_, value)| accepted.contains(*value))
                .map(|(row, _)| row + 1)
                .collect();
            return Ok(SampleIds::List(ids));
        }

        // membership[k][v][row]: sample `row` has value `v` of constraint `k`
        let membership: Vec<Vec<Vec<bool>>> = constraints
            .iter()
            .zip(&columns)
            .map(|((_, accepted), column)| {
                accepted
                    .iter()
                    .map(|wanted| column.iter().map(|value| value == wanted).collect())
                    .collect()
            })
            .collect();

        let shape: Vec<usize> = constraints.iter().map(|(_, accepted)| accepted.len()).collect();
        let ids = shape
            .iter()
            .map(|&len| 0..len)
            .multi_cartesian_product()
            .map(|position| {
                let matches = (0..self.sample_map.height())
                    .filter(|&row| {
                        position
                            .iter()
                            .enumerate()
                            .all(|(k, &v)| membership[k][v][row])
                    })
                    .collect::<Vec<_>>();
                match matches.as_slice() {
                    [row] => Ok(row + 1),
                    _ => Err(DatasetError::SampleLookup {
                        combination: describe_combination(constraints, &position),
                        matches: matches.len(),
                    }),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let grid = ArrayD::from_shape_vec(IxDyn(&shape), ids)
            .map_err(|e| DatasetError::validation(format!("Sample lookup grid: {e}")))?;
        Ok(SampleIds::Grid(grid))
    }
}

fn describe_combination<S: AsRef<str>>(
    constraints: &[(S, Vec<MetadataValue>)],
    position: &[usize],
) -> String {
    constraints
        .iter()
        .zip(position)
        .map(|((column, accepted), &v)| format!("{}={}", column.as_ref(), accepted[v]))
        .join(", ")
}

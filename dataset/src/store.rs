//! Per-cell data store.
//!
//! A [`Sample`] owns one event table per data type (channels as columns), the
//! scatter table used for gating, and one boolean mask per gate. Every table
//! and mask of a sample has exactly `cell_count` rows.
//!
//! Mutations go through [`EventStore`] and always cover a whole sample group
//! (all samples, or all controls) at once: the new values are checked first and
//! only then swapped in, so samples never disagree on which data types or
//! gates they carry.

use crate::error::{DatasetError, Result};
use crate::frame::{EventFrame, channel_slice, normalize_frame};
use polars::prelude::DataFrame;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Unvalidated per-sample input, as produced by an importer
#[derive(Debug, Clone)]
pub struct SampleData {
    /// Event tables keyed by data-type label, in the order they should be registered
    pub data: Vec<(String, DataFrame)>,
    /// Scatter channels for gating
    pub scatter: DataFrame,
    /// Pre-computed gate masks
    pub masks: Vec<(String, Vec<bool>)>,
}

impl SampleData {
    pub fn new(scatter: DataFrame) -> Self {
        Self {
            data: Vec::new(),
            scatter,
            masks: Vec::new(),
        }
    }

    pub fn with_data(mut self, label: impl Into<String>, frame: DataFrame) -> Self {
        self.data.push((label.into(), frame));
        self
    }

    pub fn with_mask(mut self, gate: impl Into<String>, mask: Vec<bool>) -> Self {
        self.masks.push((gate.into(), mask));
        self
    }
}

#[derive(Debug, Clone)]
pub struct Sample {
    cell_count: usize,
    data: FxHashMap<Arc<str>, EventFrame>,
    scatter: EventFrame,
    masks: FxHashMap<Arc<str>, Vec<bool>>,
}

impl Sample {
    /// Validate `input` against the channel layout and build a sample.
    ///
    /// The cell count is taken from the scatter table; every data table and
    /// mask must match it.
    pub fn from_data<C: AsRef<str>, S: AsRef<str>>(
        input: SampleData,
        channels: &[C],
        scatter_channels: &[S],
        context: &str,
    ) -> Result<Self> {
        let scatter = normalize_frame(&input.scatter, scatter_channels, context)?;
        let cell_count = scatter.height();

        if input.data.is_empty() {
            return Err(DatasetError::validation(format!(
                "{context} has no data types"
            )));
        }

        let mut data = FxHashMap::default();
        for (label, frame) in input.data {
            let frame = normalize_frame(&frame, channels, context)?;
            if frame.height() != cell_count {
                return Err(DatasetError::shape_mismatch(
                    format!("{context}, data type '{label}'"),
                    cell_count,
                    frame.height(),
                ));
            }
            if data.insert(Arc::from(label.as_str()), Arc::new(frame)).is_some() {
                return Err(DatasetError::validation(format!(
                    "{context} lists data type '{label}' twice"
                )));
            }
        }

        let mut masks = FxHashMap::default();
        for (gate, mask) in input.masks {
            if mask.len() != cell_count {
                return Err(DatasetError::shape_mismatch(
                    format!("{context}, gate '{gate}'"),
                    cell_count,
                    mask.len(),
                ));
            }
            masks.insert(Arc::from(gate.as_str()), mask);
        }

        Ok(Self {
            cell_count,
            data,
            scatter: Arc::new(scatter),
            masks,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.cell_count
    }

    pub fn data(&self, data_type: &str) -> Option<&EventFrame> {
        self.data.get(data_type)
    }

    pub fn has_data_type(&self, data_type: &str) -> bool {
        self.data.contains_key(data_type)
    }

    pub fn data_types(&self) -> impl Iterator<Item = &Arc<str>> {
        self.data.keys()
    }

    /// One channel of one data type
    pub fn channel(&self, data_type: &str, channel: &str) -> Result<&[f32]> {
        let frame = self
            .data
            .get(data_type)
            .ok_or_else(|| DatasetError::UnknownDataType(data_type.to_string()))?;
        channel_slice(frame, channel)
    }

    pub fn scatter(&self) -> &EventFrame {
        &self.scatter
    }

    pub fn mask(&self, gate: &str) -> Option<&[bool]> {
        self.masks.get(gate).map(Vec::as_slice)
    }

    pub fn has_mask(&self, gate: &str) -> bool {
        self.masks.contains_key(gate)
    }

    pub fn gate_names(&self) -> impl Iterator<Item = &Arc<str>> {
        self.masks.keys()
    }

    pub(crate) fn insert_mask(&mut self, gate: Arc<str>, mask: Vec<bool>) {
        debug_assert_eq!(mask.len(), self.cell_count);
        self.masks.insert(gate, mask);
    }

    pub(crate) fn insert_data(&mut self, data_type: Arc<str>, frame: EventFrame) {
        debug_assert_eq!(frame.height(), self.cell_count);
        self.data.insert(data_type, frame);
    }
}

/// Registered controls: single-color controls in channel order, then the reference
#[derive(Debug, Clone)]
pub struct Controls {
    members: Vec<Sample>,
}

impl Controls {
    pub(crate) fn new(mut single_color: Vec<Sample>, reference: Sample) -> Self {
        single_color.push(reference);
        Self {
            members: single_color,
        }
    }

    pub fn single_color(&self) -> &[Sample] {
        &self.members[..self.members.len() - 1]
    }

    /// The unstained / wild-type control
    pub fn reference(&self) -> &Sample {
        &self.members[self.members.len() - 1]
    }

    /// Every control, reference last
    pub fn all(&self) -> &[Sample] {
        &self.members
    }

    /// Number of controls including the reference
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Which collection a mutation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleGroup {
    Samples,
    Controls,
}

impl std::fmt::Display for SampleGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleGroup::Samples => write!(f, "sample"),
            SampleGroup::Controls => write!(f, "control"),
        }
    }
}

/// Data-type tables checked against a group and ready to commit
#[derive(Debug)]
pub(crate) struct StagedData {
    group: SampleGroup,
    frames: Vec<EventFrame>,
}

impl StagedData {
    pub(crate) fn frames(&self) -> &[EventFrame] {
        &self.frames
    }
}

/// Gate masks checked against a group and ready to commit
#[derive(Debug)]
pub(crate) struct StagedMasks {
    group: SampleGroup,
    masks: Vec<Vec<bool>>,
}

#[derive(Debug, Clone)]
pub struct EventStore {
    samples: Vec<Sample>,
    controls: Option<Controls>,
}

impl EventStore {
    pub(crate) fn new(samples: Vec<Sample>) -> Self {
        Self {
            samples,
            controls: None,
        }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn controls(&self) -> Option<&Controls> {
        self.controls.as_ref()
    }

    pub(crate) fn set_controls(&mut self, controls: Controls) {
        self.controls = Some(controls);
    }

    /// Members of a group (empty for controls before registration)
    pub fn group(&self, group: SampleGroup) -> &[Sample] {
        match group {
            SampleGroup::Samples => &self.samples,
            SampleGroup::Controls => match &self.controls {
                Some(controls) => controls.all(),
                None => &[],
            },
        }
    }

    fn group_mut(&mut self, group: SampleGroup) -> &mut [Sample] {
        match group {
            SampleGroup::Samples => &mut self.samples,
            SampleGroup::Controls => match &mut self.controls {
                Some(controls) => controls.members.as_mut_slice(),
                None => &mut [],
            },
        }
    }

    /// Check one table per member of `group` without changing anything
    pub(crate) fn stage_data<S: AsRef<str>>(
        &self,
        group: SampleGroup,
        label: &str,
        frames: Vec<DataFrame>,
        channels: &[S],
    ) -> Result<StagedData> {
        let members = self.group(group);
        if frames.len() != members.len() {
            return Err(DatasetError::count_mismatch(
                format!("{group} tables for data type '{label}'"),
                members.len(),
                frames.len(),
            ));
        }

        let frames = members
            .iter()
            .zip(frames)
            .enumerate()
            .map(|(i, (member, frame))| {
                let context = format!("{group} {}, data type '{label}'", i + 1);
                let frame = normalize_frame(&frame, channels, &context)?;
                if frame.height() != member.cell_count() {
                    return Err(DatasetError::shape_mismatch(
                        context,
                        member.cell_count(),
                        frame.height(),
                    ));
                }
                Ok(Arc::new(frame))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(StagedData { group, frames })
    }

    /// Check one mask per member of `group` without changing anything
    pub(crate) fn stage_masks(
        &self,
        group: SampleGroup,
        gate: &str,
        masks: Vec<Vec<bool>>,
    ) -> Result<StagedMasks> {
        let members = self.group(group);
        if masks.len() != members.len() {
            return Err(DatasetError::count_mismatch(
                format!("{group} masks for gate '{gate}'"),
                members.len(),
                masks.len(),
            ));
        }
        for (i, (member, mask)) in members.iter().zip(&masks).enumerate() {
            if mask.len() != member.cell_count() {
                return Err(DatasetError::shape_mismatch(
                    format!("{group} {}, gate '{gate}'", i + 1),
                    member.cell_count(),
                    mask.len(),
                ));
            }
        }
        Ok(StagedMasks { group, masks })
    }

    pub(crate) fn commit_data(&mut self, label: &Arc<str>, staged: StagedData) {
        for (member, frame) in self.group_mut(staged.group).iter_mut().zip(staged.frames) {
            member.insert_data(label.clone(), frame);
        }
    }

    pub(crate) fn commit_masks(&mut self, gate: &Arc<str>, staged: StagedMasks) {
        for (member, mask) in self.group_mut(staged.group).iter_mut().zip(staged.masks) {
            member.insert_mask(gate.clone(), mask);
        }
    }

    /// Replace (or add) a data type on every member of a group
    pub fn replace_data_type<S: AsRef<str>>(
        &mut self,
        group: SampleGroup,
        label: &Arc<str>,
        frames: Vec<DataFrame>,
        channels: &[S],
    ) -> Result<()> {
        let staged = self.stage_data(group, label, frames, channels)?;
        self.commit_data(label, staged);
        Ok(())
    }

    /// Replace (or add) a gate mask on every member of a group
    pub fn replace_gate_masks(
        &mut self,
        group: SampleGroup,
        gate: &Arc<str>,
        masks: Vec<Vec<bool>>,
    ) -> Result<()> {
        let staged = self.stage_masks(group, gate, masks)?;
        self.commit_masks(gate, staged);
        Ok(())
    }
}

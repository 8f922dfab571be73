use crate::binning::{BinCollection, BinConfig};
use crate::collaborators::{DataImporter, FitParameters};
use crate::config::DatasetConfig;
use crate::error::{DatasetError, Result};
use crate::events::{DatasetEvent, EventBus, ObserverId};
use crate::registry::{DataTypeRegistry, GateDefinition, GateRegistry};
use crate::sample_map::SampleMap;
use crate::store::{Controls, EventStore, Sample, SampleData, SampleGroup};
use crate::transform::ScaleTransform;
use flowset_gates::MaskStatistics;
use polars::prelude::DataFrame;
use std::sync::Arc;
use tracing::{debug, info};

/// A multi-sample flow cytometry experiment.
///
/// Holds every sample's per-cell data (one table per data type), the gate
/// masks computed on them, registered controls, and the current binning.
/// Samples are addressed by 1-based index, in import order.
#[derive(Debug)]
pub struct FlowDataset {
    pub(crate) channels: Vec<Arc<str>>,
    pub(crate) scatter_channels: Vec<Arc<str>>,
    pub(crate) config: DatasetConfig,
    pub(crate) sample_map: SampleMap,
    pub(crate) store: EventStore,
    pub(crate) gates: GateRegistry,
    pub(crate) data_types: DataTypeRegistry,
    pub(crate) terminal_gate: Arc<str>,
    pub(crate) bin_config: Option<BinConfig>,
    pub(crate) bins: Option<BinCollection>,
    pub(crate) fit_parameters: Option<FitParameters>,
    pub(crate) scale: Arc<dyn ScaleTransform>,
    pub(crate) events: EventBus,
    pub(crate) auto_binning: Option<ObserverId>,
}

impl FlowDataset {
    /// Build a dataset from imported samples.
    ///
    /// Every sample must carry the raw data type, all `channels` and all
    /// configured scatter channels, and the same set of data types as the
    /// first sample. `sample_map` needs one row per sample.
    pub fn new(
        channels: Vec<String>,
        sample_map: DataFrame,
        samples: Vec<SampleData>,
        config: DatasetConfig,
    ) -> Result<Self> {
        config.validate()?;

        if channels.is_empty() {
            return Err(DatasetError::validation("At least one channel is required"));
        }
        for (i, channel) in channels.iter().enumerate() {
            if channels[..i].contains(channel) {
                return Err(DatasetError::validation(format!(
                    "Channel '{}' listed twice",
                    channel
                )));
            }
        }
        if samples.is_empty() {
            return Err(DatasetError::validation("At least one sample is required"));
        }

        let sample_map = SampleMap::new(sample_map)?;
        if sample_map.height() != samples.len() {
            return Err(DatasetError::count_mismatch(
                "sample map rows",
                samples.len(),
                sample_map.height(),
            ));
        }

        // data types and gates in first-seen order
        let layout: Vec<String> = samples[0].data.iter().map(|(label, _)| label.clone()).collect();
        if !layout.contains(&config.labels.raw) {
            return Err(DatasetError::validation(format!(
                "Samples must include the '{}' data type",
                config.labels.raw
            )));
        }
        let mut declared_gates: Vec<String> = Vec::new();
        for (i, sample) in samples.iter().enumerate() {
            let mut labels: Vec<&String> = sample.data.iter().map(|(label, _)| label).collect();
            labels.sort();
            let mut expected: Vec<&String> = layout.iter().collect();
            expected.sort();
            if labels != expected {
                return Err(DatasetError::validation(format!(
                    "Sample {} has data types {:?}, expected {:?}",
                    i + 1,
                    labels,
                    expected
                )));
            }
            for (gate, _) in &sample.masks {
                if !declared_gates.contains(gate) && *gate != config.default_gate {
                    declared_gates.push(gate.clone());
                }
            }
        }

        let channel_names: Vec<Arc<str>> = channels.iter().map(|c| Arc::from(c.as_str())).collect();
        let scatter_channels: Vec<Arc<str>> = config
            .scatter_channels
            .iter()
            .map(|c| Arc::from(c.as_str()))
            .collect();

        let samples = samples
            .into_iter()
            .enumerate()
            .map(|(i, data)| {
                Sample::from_data(
                    data,
                    &channel_names,
                    &scatter_channels,
                    &format!("sample {}", i + 1),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let mut data_types = DataTypeRegistry::new();
        data_types.add_data_types(&layout);

        let mut gates = GateRegistry::new();
        let (default_gate, _) = gates.define(&config.default_gate, GateDefinition::AllCells);
        gates.add_gates(&declared_gates);

        let mut store = EventStore::new(samples);
        let all_cells = store
            .samples()
            .iter()
            .map(|sample| vec![true; sample.cell_count()])
            .collect();
        store.replace_gate_masks(SampleGroup::Samples, &default_gate, all_cells)?;

        info!(
            "Built dataset with {} samples, {} channels and data types {:?}",
            store.sample_count(),
            channel_names.len(),
            layout
        );

        let scale: Arc<dyn ScaleTransform> = Arc::new(config.bin_transform.clone());
        Ok(Self {
            channels: channel_names,
            scatter_channels,
            config,
            sample_map,
            store,
            gates,
            data_types,
            terminal_gate: default_gate,
            bin_config: None,
            bins: None,
            fit_parameters: None,
            scale,
            events: EventBus::default(),
            auto_binning: None,
        })
    }

    /// Build a dataset from whatever `importer` reads
    pub fn import(importer: &dyn DataImporter, config: DatasetConfig) -> Result<Self> {
        let experiment = importer
            .import()
            .map_err(|e| DatasetError::collaborator("import", e))?;
        Self::new(
            experiment.channels,
            experiment.sample_map,
            experiment.samples,
            config,
        )
    }

    pub fn channels(&self) -> &[Arc<str>] {
        &self.channels
    }

    pub fn scatter_channels(&self) -> &[Arc<str>] {
        &self.scatter_channels
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn sample_map(&self) -> &SampleMap {
        &self.sample_map
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn samples(&self) -> &[Sample] {
        self.store.samples()
    }

    pub fn sample_count(&self) -> usize {
        self.store.sample_count()
    }

    /// Sample by 1-based index
    pub fn sample(&self, index: usize) -> Result<&Sample> {
        index
            .checked_sub(1)
            .and_then(|i| self.store.samples().get(i))
            .ok_or(DatasetError::IndexOutOfRange {
                index,
                len: self.store.sample_count(),
            })
    }

    pub fn controls(&self) -> Option<&Controls> {
        self.store.controls()
    }

    pub fn gates(&self) -> &GateRegistry {
        &self.gates
    }

    pub fn gate_names(&self) -> &[Arc<str>] {
        self.gates.names()
    }

    pub fn data_types(&self) -> &DataTypeRegistry {
        &self.data_types
    }

    /// Gate downstream steps select cells with
    pub fn terminal_gate(&self) -> &Arc<str> {
        &self.terminal_gate
    }

    pub fn fit_parameters(&self) -> Option<&FitParameters> {
        self.fit_parameters.as_ref()
    }

    pub fn scale_transform(&self) -> &Arc<dyn ScaleTransform> {
        &self.scale
    }

    /// Replace the linear-to-log transform used by binning.
    ///
    /// Counts as a binning configuration change when bins are configured.
    pub fn set_scale_transform(&mut self, transform: Arc<dyn ScaleTransform>) -> Result<()> {
        debug!("Scale transform set to {:?}", transform);
        self.scale = transform;
        if self.bin_config.is_some() {
            self.bins = None;
            self.emit(DatasetEvent::BinConfigChanged)?;
        }
        Ok(())
    }

    /// Register gate names whose masks are managed outside the dataset.
    ///
    /// Returns the names that were not registered before.
    pub fn add_gates<I, S>(&mut self, names: I) -> Result<Vec<Arc<str>>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let added = self.gates.add_gates(names);
        if !added.is_empty() {
            self.emit(DatasetEvent::GatesAdded(added.clone()))?;
        }
        Ok(added)
    }

    /// Register data-type labels. Returns the labels that were not registered before.
    pub fn add_data_types<I, S>(&mut self, labels: I) -> Result<Vec<Arc<str>>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let added = self.data_types.add_data_types(labels);
        if !added.is_empty() {
            self.emit(DatasetEvent::DataTypesAdded(added.clone()))?;
        }
        Ok(added)
    }

    /// Store a data type for every sample at once, registering the label.
    ///
    /// `frames` holds one table per sample, each with every channel and the
    /// sample's cell count as height.
    pub fn set_data_type(&mut self, label: &str, frames: Vec<DataFrame>) -> Result<()> {
        if label.is_empty() {
            return Err(DatasetError::validation("Data type label must not be empty"));
        }
        let staged = self
            .store
            .stage_data(SampleGroup::Samples, label, frames, &self.channels)?;
        let added = self.data_types.add_data_types([label]);
        let label = self.data_types.require(label)?;
        self.store.commit_data(&label, staged);
        debug!("Stored data type '{}' for {} samples", label, self.sample_count());
        if !added.is_empty() {
            self.emit(DatasetEvent::DataTypesAdded(added))?;
        }
        Ok(())
    }

    /// Store masks for an externally-managed gate, one per sample.
    ///
    /// Unregistered names are registered. Gates the dataset computes itself
    /// (all-cells, scatter, crossed, non-negativity) cannot be overwritten.
    pub fn set_gate_masks(&mut self, gate: &str, masks: Vec<Vec<bool>>) -> Result<()> {
        self.store_declared_masks(SampleGroup::Samples, gate, masks)
    }

    /// Store masks for an externally-managed gate on the registered controls,
    /// one per control (single-color controls in channel order, then the
    /// reference).
    ///
    /// Needed before crossing a gate that was declared after
    /// [`add_controls`](Self::add_controls).
    pub fn set_control_gate_masks(&mut self, gate: &str, masks: Vec<Vec<bool>>) -> Result<()> {
        if self.store.controls().is_none() {
            return Err(DatasetError::precondition(
                "Controls must be registered before setting control masks",
            ));
        }
        self.store_declared_masks(SampleGroup::Controls, gate, masks)
    }

    fn store_declared_masks(&mut self, group: SampleGroup, gate: &str, masks: Vec<Vec<bool>>) -> Result<()> {
        if gate.is_empty() {
            return Err(DatasetError::validation("Gate name must not be empty"));
        }
        if let Some(definition) = self.gates.definition(gate) {
            if *definition != GateDefinition::Declared {
                return Err(DatasetError::validation(format!(
                    "Gate '{}' is a {} gate computed by the dataset",
                    gate,
                    definition.kind_name()
                )));
            }
        }
        let staged = self.store.stage_masks(group, gate, masks)?;
        let added = self.gates.add_gates([gate]);
        let gate = self.gates.require(gate)?;
        self.store.commit_masks(&gate, staged);
        if !added.is_empty() {
            self.emit(DatasetEvent::GatesAdded(added))?;
        }
        Ok(())
    }

    /// Mask of `gate` on `sample`, failing if it was never computed
    pub(crate) fn mask_of<'a>(&self, sample: &'a Sample, gate: &str, context: &str) -> Result<&'a [bool]> {
        sample.mask(gate).ok_or_else(|| {
            DatasetError::precondition(format!("Gate '{gate}' has no mask on {context}"))
        })
    }

    /// Per-sample population statistics for a registered gate.
    ///
    /// A polygon stage with a parent is counted relative to the parent's
    /// survivors; every other gate is counted relative to all cells.
    pub fn gate_statistics(&self, gate: &str) -> Result<Vec<MaskStatistics>> {
        self.gates.require(gate)?;
        let parent = match self.gates.definition(gate) {
            Some(GateDefinition::Polygon { parent, .. }) => parent.clone(),
            _ => None,
        };
        self.samples()
            .iter()
            .enumerate()
            .map(|(i, sample)| {
                let context = format!("sample {}", i + 1);
                let mask = self.mask_of(sample, gate, &context)?;
                match &parent {
                    Some(parent) => {
                        let within = self.mask_of(sample, parent, &context)?;
                        Ok(MaskStatistics::relative_to(mask, within)?)
                    }
                    None => Ok(MaskStatistics::from_mask(mask)),
                }
            })
            .collect()
    }
}

//! Gate crossing, standard scatter gating and gate evaluation from definitions.

use crate::collaborators::{GateApplier, GateDeriver};
use crate::dataset::FlowDataset;
use crate::error::{DatasetError, Result};
use crate::events::DatasetEvent;
use crate::frame::{ScatterView, channel_slice, frame_from_columns};
use crate::registry::GateDefinition;
use crate::store::{Sample, SampleGroup};
use flowset_gates::{BooleanOperation, GateChain, PolygonGate, combine_masks, non_negative_mask};
use polars::prelude::DataFrame;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

impl FlowDataset {
    /// Cross two or more registered gates with `mode` (`"and"` or `"or"`).
    ///
    /// See [`cross_gates_with`](Self::cross_gates_with).
    pub fn cross_gates<S: AsRef<str>>(&mut self, mode: &str, names: &[S]) -> Result<Arc<str>> {
        let operation = BooleanOperation::from_str(mode).map_err(|_| {
            DatasetError::validation(format!("Gate crossing mode must be 'and' or 'or', got '{mode}'"))
        })?;
        self.cross_gates_with(operation, names)
    }

    /// Combine registered gates element-wise into a new gate named by joining
    /// the input names with `_`, in the given order.
    ///
    /// The new mask is stored on every sample and every registered control.
    /// Re-crossing the same names replaces the earlier crossed gate.
    pub fn cross_gates_with<S: AsRef<str>>(
        &mut self,
        operation: BooleanOperation,
        names: &[S],
    ) -> Result<Arc<str>> {
        if names.len() < 2 {
            return Err(DatasetError::validation(format!(
                "Crossing needs at least two gates, got {}",
                names.len()
            )));
        }
        let inputs = names
            .iter()
            .map(|name| self.gates.require(name.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let name = inputs.iter().map(|n| n.as_ref()).collect::<Vec<_>>().join("_");

        if let Some(existing) = self.gates.definition(&name) {
            if !matches!(existing, GateDefinition::Crossed { .. }) {
                return Err(DatasetError::validation(format!(
                    "Crossed gate name '{}' collides with a {} gate",
                    name,
                    existing.kind_name()
                )));
            }
        }

        let sample_masks = self.crossed_masks(SampleGroup::Samples, operation, &inputs)?;
        let control_masks = self.crossed_masks(SampleGroup::Controls, operation, &inputs)?;
        let staged_samples = self
            .store
            .stage_masks(SampleGroup::Samples, &name, sample_masks)?;
        let staged_controls = self
            .store
            .stage_masks(SampleGroup::Controls, &name, control_masks)?;

        let (name, added) = self
            .gates
            .define(&name, GateDefinition::Crossed { operation, inputs });
        self.store.commit_masks(&name, staged_samples);
        self.store.commit_masks(&name, staged_controls);
        info!("Crossed gates into '{}' ({})", name, operation);

        if added {
            self.emit(DatasetEvent::GatesAdded(vec![name.clone()]))?;
        }
        Ok(name)
    }

    fn crossed_masks(
        &self,
        group: SampleGroup,
        operation: BooleanOperation,
        inputs: &[Arc<str>],
    ) -> Result<Vec<Vec<bool>>> {
        self.store
            .group(group)
            .iter()
            .enumerate()
            .map(|(i, member)| {
                let context = format!("{group} {}", i + 1);
                let masks = inputs
                    .iter()
                    .map(|gate| self.mask_of(member, gate, &context))
                    .collect::<Result<Vec<_>>>()?;
                Ok(combine_masks(operation, &masks)?)
            })
            .collect()
    }

    /// Subsample scatter events across all samples.
    ///
    /// Takes every `stride`-th cell of each sample starting from the first,
    /// where `stride` is the configured pool stride or the sample count.
    pub fn pool_scatter(&self) -> Result<DataFrame> {
        let stride = self.config.pool_stride.unwrap_or(self.sample_count()).max(1);
        let mut columns: Vec<Vec<f32>> = vec![Vec::new(); self.scatter_channels.len()];

        for sample in self.samples() {
            let scatter = sample.scatter();
            for (column, channel) in columns.iter_mut().zip(&self.scatter_channels) {
                let values = channel_slice(scatter, channel)?;
                column.extend(values.iter().step_by(stride).copied());
            }
        }

        debug!(
            "Pooled {} scatter events with stride {}",
            columns.first().map_or(0, Vec::len),
            stride
        );
        frame_from_columns(&self.scatter_channels, columns)
    }

    /// Derive scatter gates from pooled events and apply them to every sample
    /// and registered control.
    ///
    /// The derived gates form a chain; the last one becomes the terminal gate.
    /// Returns the gate names in chain order.
    pub fn apply_standard_gating(
        &mut self,
        deriver: &dyn GateDeriver,
        applier: &dyn GateApplier,
    ) -> Result<Vec<Arc<str>>> {
        let pooled = self.pool_scatter()?;
        let derived = deriver
            .derive(&pooled)
            .map_err(|e| DatasetError::collaborator("gate derivation", e))?;
        self.validate_scatter_gates(&derived)?;

        let sample_masks = self.applied_masks(SampleGroup::Samples, applier, &derived)?;
        let control_masks = self.applied_masks(SampleGroup::Controls, applier, &derived)?;

        let mut staged = Vec::with_capacity(derived.len());
        for (k, gate) in derived.iter().enumerate() {
            let samples = sample_masks.iter().map(|masks| masks[k].clone()).collect();
            let controls = control_masks.iter().map(|masks| masks[k].clone()).collect();
            staged.push((
                self.store.stage_masks(SampleGroup::Samples, &gate.name, samples)?,
                self.store.stage_masks(SampleGroup::Controls, &gate.name, controls)?,
            ));
        }

        let chain = GateChain::new(derived)?;
        let mut names = Vec::with_capacity(chain.len());
        let mut added = Vec::new();
        for (gate, (samples, controls)) in chain.stages().iter().zip(staged) {
            let (name, is_new) = self.gates.define(
                &gate.name,
                GateDefinition::Polygon {
                    gate: gate.clone(),
                    parent: chain.parent_of(&gate.name).cloned(),
                },
            );
            self.store.commit_masks(&name, samples);
            self.store.commit_masks(&name, controls);
            if is_new {
                added.push(name.clone());
            }
            names.push(name);
        }
        self.terminal_gate = chain.terminal().name.clone();

        info!(
            "Applied {} scatter gates to {} samples; terminal gate is '{}'",
            names.len(),
            self.sample_count(),
            self.terminal_gate
        );
        if !added.is_empty() {
            self.emit(DatasetEvent::GatesAdded(added))?;
        }
        Ok(names)
    }

    fn validate_scatter_gates(&self, gates: &[PolygonGate]) -> Result<()> {
        if gates.is_empty() {
            return Err(DatasetError::validation("Gate derivation returned no gates"));
        }
        for (i, gate) in gates.iter().enumerate() {
            if gates[..i].iter().any(|g| g.name == gate.name) {
                return Err(DatasetError::validation(format!(
                    "Gate derivation returned '{}' twice",
                    gate.name
                )));
            }
            for channel in [&gate.x_channel, &gate.y_channel] {
                if !self.scatter_channels.contains(channel) {
                    return Err(DatasetError::UnknownChannel(channel.to_string()));
                }
            }
            match self.gates.definition(&gate.name) {
                None | Some(GateDefinition::Polygon { .. }) => {}
                Some(existing) => {
                    return Err(DatasetError::validation(format!(
                        "Derived gate '{}' collides with a {} gate",
                        gate.name,
                        existing.kind_name()
                    )));
                }
            }
        }
        Ok(())
    }

    /// One mask per derived gate (in derivation order) for every member of `group`
    fn applied_masks(
        &self,
        group: SampleGroup,
        applier: &dyn GateApplier,
        gates: &[PolygonGate],
    ) -> Result<Vec<Vec<Vec<bool>>>> {
        self.store
            .group(group)
            .iter()
            .enumerate()
            .map(|(i, member)| {
                let mut applied = applier
                    .apply(&ScatterView(member.scatter()), gates)
                    .map_err(|e| DatasetError::collaborator("gate application", e))?;
                gates
                    .iter()
                    .map(|gate| {
                        let position = applied
                            .iter()
                            .position(|(name, _)| *name == gate.name)
                            .ok_or_else(|| {
                                DatasetError::validation(format!(
                                    "Gate application returned no mask for '{}' on {group} {}",
                                    gate.name,
                                    i + 1
                                ))
                            })?;
                        Ok(applied.swap_remove(position).1)
                    })
                    .collect()
            })
            .collect()
    }

    /// Compute every registered gate `sample` has no mask for, in registration
    /// order, from the gate definitions.
    ///
    /// Externally-managed gates are skipped; their masks have to be supplied.
    /// Non-negativity gates on a data type the sample lacks are deferred, along
    /// with every gate built on them, until calibration runs again.
    pub(crate) fn fill_missing_masks(&self, sample: &mut Sample, context: &str) -> Result<()> {
        let mut deferred: Vec<&Arc<str>> = Vec::new();
        for (name, definition) in self.gates.iter() {
            if sample.has_mask(name) {
                continue;
            }
            let blocked = match definition {
                GateDefinition::NonNegative { data_type } => !sample.has_data_type(data_type),
                GateDefinition::Crossed { inputs, .. } => inputs.iter().any(|input| deferred.contains(&input)),
                GateDefinition::Polygon {
                    parent: Some(parent),
                    ..
                } => deferred.contains(&parent),
                _ => false,
            };
            if blocked {
                debug!("Deferred gate '{}' on {}", name, context);
                deferred.push(name);
                continue;
            }
            let mask = match definition {
                GateDefinition::Declared => continue,
                GateDefinition::AllCells => vec![true; sample.cell_count()],
                GateDefinition::Polygon { gate, parent } => {
                    let scatter = ScatterView(sample.scatter());
                    match parent {
                        Some(parent) => {
                            let parent = self.mask_of(sample, parent, context)?;
                            gate.mask_within(&scatter, parent)?
                        }
                        None => gate.mask(&scatter)?,
                    }
                }
                GateDefinition::Crossed { operation, inputs } => {
                    let masks = inputs
                        .iter()
                        .map(|gate| self.mask_of(sample, gate, context))
                        .collect::<Result<Vec<_>>>()?;
                    combine_masks(*operation, &masks)?
                }
                GateDefinition::NonNegative { data_type } => {
                    let columns = self
                        .channels
                        .iter()
                        .map(|channel| sample.channel(data_type, channel))
                        .collect::<Result<Vec<_>>>()?;
                    non_negative_mask(&columns)?
                }
            };
            debug!("Evaluated gate '{}' on {}", name, context);
            sample.insert_mask(name.clone(), mask);
        }
        Ok(())
    }
}

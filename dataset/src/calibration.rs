use crate::collaborators::{BeadFitter, BeadSpec, CalibrationApplicator, CalibrationFit};
use crate::dataset::FlowDataset;
use crate::error::{DatasetError, Result};
use crate::events::DatasetEvent;
use crate::frame::channel_slice;
use crate::registry::GateDefinition;
use crate::store::{SampleGroup, StagedData};
use flowset_gates::{BooleanOperation, combine_masks, non_negative_mask};
use polars::prelude::DataFrame;
use std::sync::Arc;
use tracing::{debug, info};

impl FlowDataset {
    /// Convert raw values of controls and samples to MEF units.
    ///
    /// Fits the control beads (and the sample beads, unless both specs are
    /// identical), stores the calibrated data type on every control and
    /// sample, and registers a gate for cells that are non-negative on every
    /// calibrated channel. That gate is crossed with the terminal gate, and the
    /// crossing becomes the new terminal gate.
    pub fn convert_to_mef(
        &mut self,
        control_beads: &BeadSpec,
        sample_beads: &BeadSpec,
        fitter: &dyn BeadFitter,
        applicator: &dyn CalibrationApplicator,
        show_plots: bool,
    ) -> Result<()> {
        let Some(controls) = self.store.controls() else {
            return Err(DatasetError::precondition(
                "Controls must be registered before MEF conversion",
            ));
        };
        for beads in [control_beads, sample_beads] {
            if !beads.filename.exists() {
                return Err(DatasetError::FileNotFound(beads.filename.clone()));
            }
        }

        let control_fit = fitter
            .fit(control_beads, &self.channels, show_plots)
            .map_err(|e| DatasetError::collaborator("control bead fit", e))?;
        let sample_fit = if control_beads == sample_beads {
            debug!("Sample beads match control beads; reusing the control fit");
            control_fit.clone()
        } else {
            fitter
                .fit(sample_beads, &self.channels, show_plots)
                .map_err(|e| DatasetError::collaborator("sample bead fit", e))?
        };

        let raw = self.config.labels.raw.as_str();
        let control_raw = controls
            .all()
            .iter()
            .map(|control| {
                control
                    .data(raw)
                    .map(|frame| frame.as_ref())
                    .ok_or_else(|| DatasetError::precondition(format!("A control has no '{raw}' data")))
            })
            .collect::<Result<Vec<&DataFrame>>>()?;
        let sample_raw = self
            .samples()
            .iter()
            .map(|sample| {
                sample
                    .data(raw)
                    .map(|frame| frame.as_ref())
                    .ok_or_else(|| DatasetError::precondition(format!("A sample has no '{raw}' data")))
            })
            .collect::<Result<Vec<&DataFrame>>>()?;

        let calibrated = self.config.labels.calibrated.clone();
        let staged_controls =
            self.calibrate(SampleGroup::Controls, &control_raw, &control_fit, applicator, &calibrated)?;
        let staged_samples =
            self.calibrate(SampleGroup::Samples, &sample_raw, &sample_fit, applicator, &calibrated)?;

        // gate on the uncrossed terminal so repeated conversions don't nest
        let nonneg = self.config.calibration_gate.clone();
        let base = self.uncalibrated_terminal(&nonneg);
        let crossed = format!("{base}_{nonneg}");
        for name in [&nonneg, &crossed] {
            match self.gates.definition(name) {
                None
                | Some(GateDefinition::NonNegative { .. })
                | Some(GateDefinition::Crossed { .. }) => {}
                Some(existing) => {
                    return Err(DatasetError::validation(format!(
                        "Calibration gate '{}' collides with a {} gate",
                        name,
                        existing.kind_name()
                    )));
                }
            }
        }

        let mut staged_masks = Vec::new();
        for (group, staged) in [(SampleGroup::Samples, &staged_samples), (SampleGroup::Controls, &staged_controls)] {
            let (nonneg_masks, crossed_masks) = self.calibration_masks(group, staged, &base)?;
            staged_masks.push((
                self.store.stage_masks(group, &nonneg, nonneg_masks)?,
                self.store.stage_masks(group, &crossed, crossed_masks)?,
            ));
        }

        // data type first, then the gates that depend on it
        let added_types = self.data_types.add_data_types([&calibrated]);
        let calibrated = self.data_types.require(&calibrated)?;
        self.store.commit_data(&calibrated, staged_samples);
        self.store.commit_data(&calibrated, staged_controls);

        let (nonneg, nonneg_added) = self.gates.define(
            &nonneg,
            GateDefinition::NonNegative {
                data_type: calibrated.clone(),
            },
        );
        let (crossed, crossed_added) = self.gates.define(
            &crossed,
            GateDefinition::Crossed {
                operation: BooleanOperation::And,
                inputs: vec![base.clone(), nonneg.clone()],
            },
        );
        for (nonneg_masks, crossed_masks) in staged_masks {
            self.store.commit_masks(&nonneg, nonneg_masks);
            self.store.commit_masks(&crossed, crossed_masks);
        }
        self.terminal_gate = crossed.clone();

        info!(
            "Converted {} samples and {} controls to '{}'; terminal gate is '{}'",
            self.sample_count(),
            self.controls().map_or(0, |c| c.len()),
            calibrated,
            crossed
        );

        if !added_types.is_empty() {
            self.emit(DatasetEvent::DataTypesAdded(added_types))?;
        }
        let added_gates: Vec<Arc<str>> = [(nonneg, nonneg_added), (crossed, crossed_added)]
            .into_iter()
            .filter_map(|(name, added)| added.then_some(name))
            .collect();
        if !added_gates.is_empty() {
            self.emit(DatasetEvent::GatesAdded(added_gates))?;
        }
        Ok(())
    }

    fn calibrate(
        &self,
        group: SampleGroup,
        raw: &[&DataFrame],
        fit: &CalibrationFit,
        applicator: &dyn CalibrationApplicator,
        label: &str,
    ) -> Result<StagedData> {
        let frames = applicator
            .apply(raw, fit, &self.channels)
            .map_err(|e| DatasetError::collaborator("calibration", e))?;
        self.store.stage_data(group, label, frames, &self.channels)
    }

    /// Terminal gate with any earlier calibration crossing stripped off
    pub(crate) fn uncalibrated_terminal(&self, nonneg: &str) -> Arc<str> {
        match self.gates.definition(&self.terminal_gate) {
            Some(GateDefinition::Crossed {
                operation: BooleanOperation::And,
                inputs,
            }) if inputs.len() == 2 && inputs[1].as_ref() == nonneg => inputs[0].clone(),
            _ => self.terminal_gate.clone(),
        }
    }

    /// Non-negativity masks from freshly calibrated tables, and their
    /// crossing with `base`
    fn calibration_masks(
        &self,
        group: SampleGroup,
        staged: &StagedData,
        base: &str,
    ) -> Result<(Vec<Vec<bool>>, Vec<Vec<bool>>)> {
        let mut nonneg_masks = Vec::new();
        let mut crossed_masks = Vec::new();
        for (i, (member, frame)) in self.store.group(group).iter().zip(staged.frames()).enumerate() {
            let columns = self
                .channels
                .iter()
                .map(|channel| channel_slice(frame, channel))
                .collect::<Result<Vec<_>>>()?;
            let nonneg = non_negative_mask(&columns)?;
            let terminal = self.mask_of(member, base, &format!("{group} {}", i + 1))?;
            crossed_masks.push(combine_masks(BooleanOperation::And, &[terminal, nonneg.as_slice()])?);
            nonneg_masks.push(nonneg);
        }
        Ok((nonneg_masks, crossed_masks))
    }
}

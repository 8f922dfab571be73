use crate::collaborators::{CompensationRequest, CompensationStages, Compensator, GatedFrame};
use crate::dataset::FlowDataset;
use crate::error::{DatasetError, Result};
use crate::events::DatasetEvent;
use crate::store::{Sample, SampleGroup};
use polars::prelude::DataFrame;
use std::str::FromStr;
use std::sync::Arc;
use strum_macros::{Display, EnumString};
use tracing::{info, warn};

/// Compensation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum CompensationMethod {
    /// Per-channel piecewise correction fitted on the single-color controls
    #[strum(to_string = "single-color-piecewise", serialize = "piecewise")]
    SingleColorPiecewise,
    /// Spillover matrix fit with autofluorescence subtraction
    #[strum(to_string = "matrix")]
    Matrix,
}

impl FlowDataset {
    /// Compensate the dataset with `method` (`"single-color-piecewise"` or `"matrix"`).
    ///
    /// Reads the calibrated data type when every control carries it and the
    /// cells of the terminal gate. Otherwise reads raw values within the
    /// terminal gate as it was before MEF conversion. Piecewise compensation adds one data type
    /// to the samples; matrix compensation adds the autofluorescence-subtracted
    /// and compensated data types to samples and controls and keeps the fit
    /// parameters.
    pub fn compensate(
        &mut self,
        method: &str,
        compensator: &dyn Compensator,
        show_plots: bool,
    ) -> Result<()> {
        let method = CompensationMethod::from_str(method)
            .map_err(|_| DatasetError::InvalidMethod(method.to_string()))?;
        self.compensate_with(method, compensator, show_plots)
    }

    pub fn compensate_with(
        &mut self,
        method: CompensationMethod,
        compensator: &dyn Compensator,
        show_plots: bool,
    ) -> Result<()> {
        if self.store.controls().is_none() {
            return Err(DatasetError::precondition(
                "Controls must be registered before compensation",
            ));
        }
        let source = self.compensation_source();
        // the non-negativity crossing only applies to calibrated values
        let gate = if source.as_ref() == self.config.labels.raw {
            self.uncalibrated_terminal(&self.config.calibration_gate)
        } else {
            self.terminal_gate.clone()
        };

        match method {
            CompensationMethod::SingleColorPiecewise => {
                let request = self.compensation_request(&source, &gate)?;
                let frames = compensator
                    .piecewise(&request, show_plots)
                    .map_err(|e| DatasetError::collaborator("piecewise compensation", e))?;
                let label = self.config.labels.piecewise_compensated.clone();
                let staged = self
                    .store
                    .stage_data(SampleGroup::Samples, &label, frames, &self.channels)?;

                let added = self.data_types.add_data_types([&label]);
                let label = self.data_types.require(&label)?;
                self.store.commit_data(&label, staged);
                info!("Piecewise-compensated {} samples into '{}'", self.sample_count(), label);
                if !added.is_empty() {
                    self.emit(DatasetEvent::DataTypesAdded(added))?;
                }
            }
            CompensationMethod::Matrix => {
                let request = self.compensation_request(&source, &gate)?;
                let result = compensator
                    .matrix(&request, show_plots)
                    .map_err(|e| DatasetError::collaborator("matrix compensation", e))?;

                let af_label = self.config.labels.autofluorescence_subtracted.clone();
                let comp_label = self.config.labels.compensated.clone();
                let (sample_af, sample_comp) = split_stages(result.samples);
                let (control_af, control_comp) = split_stages(
                    result
                        .single_color
                        .into_iter()
                        .chain(std::iter::once(result.reference))
                        .collect(),
                );

                let staged = [
                    (&af_label, self.store.stage_data(SampleGroup::Samples, &af_label, sample_af, &self.channels)?),
                    (&comp_label, self.store.stage_data(SampleGroup::Samples, &comp_label, sample_comp, &self.channels)?),
                    (&af_label, self.store.stage_data(SampleGroup::Controls, &af_label, control_af, &self.channels)?),
                    (&comp_label, self.store.stage_data(SampleGroup::Controls, &comp_label, control_comp, &self.channels)?),
                ];

                let added = self.data_types.add_data_types([&af_label, &comp_label]);
                for (label, data) in staged {
                    let label = self.data_types.require(label)?;
                    self.store.commit_data(&label, data);
                }
                self.fit_parameters = Some(result.fit_parameters);
                info!(
                    "Matrix-compensated {} samples and {} controls",
                    self.sample_count(),
                    self.controls().map_or(0, |c| c.len())
                );
                if !added.is_empty() {
                    self.emit(DatasetEvent::DataTypesAdded(added))?;
                }
            }
        }
        Ok(())
    }

    /// Calibrated label when every sample and control carries it, raw otherwise.
    ///
    /// Controls registered after MEF conversion hold only raw values until
    /// conversion runs again.
    fn compensation_source(&self) -> Arc<str> {
        let labels = &self.config.labels;
        let calibrated = self.data_types.get(&labels.calibrated).filter(|label| {
            self.store
                .group(SampleGroup::Controls)
                .iter()
                .all(|control| control.has_data_type(label))
        });
        match calibrated {
            Some(calibrated) => calibrated.clone(),
            None => {
                warn!(
                    "'{}' is not available on every control; compensating '{}' values",
                    labels.calibrated, labels.raw
                );
                Arc::from(labels.raw.as_str())
            }
        }
    }

    fn compensation_request<'a>(
        &'a self,
        data_type: &'a str,
        gate: &'a str,
    ) -> Result<CompensationRequest<'a>> {
        let gated = |group: SampleGroup| -> Result<Vec<GatedFrame<'a>>> {
            self.store
                .group(group)
                .iter()
                .enumerate()
                .map(|(i, member)| self.gated_frame(member, data_type, gate, &format!("{group} {}", i + 1)))
                .collect()
        };

        let mut controls = gated(SampleGroup::Controls)?;
        let reference = controls
            .pop()
            .ok_or_else(|| DatasetError::precondition("No reference control registered"))?;
        Ok(CompensationRequest {
            samples: gated(SampleGroup::Samples)?,
            single_color: controls,
            reference,
            channels: &self.channels,
            data_type,
            gate,
        })
    }

    fn gated_frame<'a>(
        &self,
        member: &'a Sample,
        data_type: &str,
        gate: &str,
        context: &str,
    ) -> Result<GatedFrame<'a>> {
        let frame = member.data(data_type).ok_or_else(|| {
            DatasetError::precondition(format!("{context} has no '{data_type}' data"))
        })?;
        Ok(GatedFrame {
            frame: frame.as_ref(),
            mask: self.mask_of(member, gate, context)?,
        })
    }
}

fn split_stages(stages: Vec<CompensationStages>) -> (Vec<DataFrame>, Vec<DataFrame>) {
    stages
        .into_iter()
        .map(|stage| (stage.autofluorescence_subtracted, stage.compensated))
        .unzip()
}

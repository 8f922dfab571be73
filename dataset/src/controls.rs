use crate::dataset::FlowDataset;
use crate::error::{DatasetError, Result};
use crate::events::DatasetEvent;
use crate::store::{Controls, Sample, SampleData};
use tracing::{info, warn};

impl FlowDataset {
    /// Register the single-color controls (one per channel, in channel order)
    /// and the reference control.
    ///
    /// Controls need the raw data type and may only carry data types already
    /// registered for the samples. Masks for registered gates that the
    /// controls do not supply are computed from the gate definitions; masks
    /// for unregistered gates are rejected.
    pub fn add_controls(&mut self, reference: SampleData, single_color: Vec<SampleData>) -> Result<()> {
        if single_color.len() != self.channels.len() {
            return Err(DatasetError::count_mismatch(
                "single-color controls",
                self.channels.len(),
                single_color.len(),
            ));
        }

        let inputs = single_color
            .into_iter()
            .enumerate()
            .map(|(i, data)| (format!("single-color control {} ({})", i + 1, self.channels[i]), data))
            .chain(std::iter::once(("reference control".to_string(), reference)));

        let mut members = Vec::with_capacity(self.channels.len() + 1);
        for (context, data) in inputs {
            for (gate, _) in &data.masks {
                self.gates.require(gate)?;
            }
            // data types are registered through the samples only
            for (label, _) in &data.data {
                self.data_types.require(label)?;
            }
            let mut control = Sample::from_data(data, &self.channels, &self.scatter_channels, &context)?;
            if !control.has_data_type(&self.config.labels.raw) {
                return Err(DatasetError::validation(format!(
                    "{context} has no '{}' data",
                    self.config.labels.raw
                )));
            }
            self.fill_missing_masks(&mut control, &context)?;
            members.push(control);
        }

        if self.store.controls().is_some() {
            warn!("Replacing previously registered controls");
        }
        let calibrated = &self.config.labels.calibrated;
        if self.data_types.contains(calibrated)
            && members.iter().any(|control| !control.has_data_type(calibrated))
        {
            warn!(
                "New controls have no '{}' data; compensation uses raw values until MEF conversion runs again",
                calibrated
            );
        }
        let reference = members.pop().ok_or_else(|| DatasetError::validation("No reference control"))?;
        self.store.set_controls(Controls::new(members, reference));

        info!(
            "Registered {} single-color controls and a reference control",
            self.channels.len()
        );
        self.emit(DatasetEvent::ControlsRegistered)
    }
}

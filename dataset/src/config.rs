use crate::error::{DatasetError, Result};
use crate::transform::TransformType;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Labels of the data types the pipeline creates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataTypeLabels {
    /// Imported, untransformed values
    pub raw: String,
    /// Bead-calibrated (MEF) values
    pub calibrated: String,
    /// Output of single-color piecewise compensation
    pub piecewise_compensated: String,
    /// Intermediate stage of matrix compensation
    pub autofluorescence_subtracted: String,
    /// Final stage of matrix compensation
    pub compensated: String,
}

impl Default for DataTypeLabels {
    fn default() -> Self {
        Self {
            raw: "raw".to_string(),
            calibrated: "mef".to_string(),
            piecewise_compensated: "comp_piecewise".to_string(),
            autofluorescence_subtracted: "af_subtracted".to_string(),
            compensated: "compensated".to_string(),
        }
    }
}

/// Dataset configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Scatter channels tracked alongside every sample for gating
    pub scatter_channels: Vec<String>,

    pub labels: DataTypeLabels,

    /// Gate holding every cell; registered at construction
    pub default_gate: String,

    /// Gate marking cells whose calibrated values are all non-negative
    pub calibration_gate: String,

    /// Stride used when pooling scatter events for gate derivation
    /// (sample count if None)
    pub pool_stride: Option<usize>,

    /// Linear-to-log transform applied to sliced values before binning
    pub bin_transform: TransformType,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            scatter_channels: vec!["FSC-A".to_string(), "FSC-H".to_string(), "SSC-A".to_string()],
            labels: DataTypeLabels::default(),
            default_gate: "all".to_string(),
            calibration_gate: "nonneg_mef".to_string(),
            pool_stride: None,
            bin_transform: TransformType::default(),
        }
    }
}

impl DatasetConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DatasetError::FileNotFound(path.to_path_buf()));
        }
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that labels and gate names are usable
    pub fn validate(&self) -> Result<()> {
        if self.scatter_channels.is_empty() {
            return Err(DatasetError::validation("At least one scatter channel is required"));
        }
        if self.pool_stride == Some(0) {
            return Err(DatasetError::validation("pool_stride must be at least 1"));
        }
        if self.default_gate.is_empty() || self.calibration_gate.is_empty() {
            return Err(DatasetError::validation("Gate names must not be empty"));
        }
        if self.default_gate == self.calibration_gate {
            return Err(DatasetError::validation(
                "default_gate and calibration_gate must differ",
            ));
        }

        let labels = [
            &self.labels.raw,
            &self.labels.calibrated,
            &self.labels.piecewise_compensated,
            &self.labels.autofluorescence_subtracted,
            &self.labels.compensated,
        ];
        for (i, label) in labels.iter().enumerate() {
            if label.is_empty() {
                return Err(DatasetError::validation("Data type labels must not be empty"));
            }
            if labels[..i].contains(label) {
                return Err(DatasetError::validation(format!(
                    "Data type label '{}' is used for more than one stage",
                    label
                )));
            }
        }

        for (i, channel) in self.scatter_channels.iter().enumerate() {
            if self.scatter_channels[..i].contains(channel) {
                return Err(DatasetError::validation(format!(
                    "Scatter channel '{}' listed twice",
                    channel
                )));
            }
        }
        Ok(())
    }
}

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Transformation type applied to channel values before binning
///
/// Transformations convert linear instrument (or calibrated) values into a
/// log-like display scale. Binning edges are expressed on the transformed
/// scale, so the same transform must be used whenever bins are compared.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformType {
    /// Linear transformation (no scaling, identity function)
    Linear,
    /// Arcsinh (inverse hyperbolic sine) transformation with configurable cofactor
    /// Formula: `arcsinh(x / cofactor)`
    /// Common cofactors: 150-200 for modern instruments
    Arcsinh { cofactor: f32 },
    /// Biexponential (logicle) transformation matching FlowJo's default behavior
    /// Formula: `asinh(x * sinh(M * ln(10)) / T) + A * ln(10)`
    /// where T = top of scale, M = positive decades, A = negative decades
    Biexponential {
        /// Top of scale value (typically 262144 for 18-bit or 1048576 for 20-bit data)
        top_of_scale: f32,
        /// Number of positive decades (typically 4.5)
        positive_decades: f32,
        /// Number of additional negative decades (typically 0)
        negative_decades: f32,
        /// Width basis parameter (typically 0.5)
        width: f32,
    },
}

impl TransformType {
    pub fn transform(&self, value: f32) -> f32 {
        match self {
            TransformType::Linear => value,
            TransformType::Arcsinh { cofactor } => (value / cofactor).asinh(),
            TransformType::Biexponential {
                top_of_scale,
                positive_decades,
                negative_decades,
                width: _,
            } => {
                if *top_of_scale == 0.0 {
                    return value;
                }
                let ln_10 = 10.0_f32.ln();
                let sinh_m_ln10 = (positive_decades * ln_10).sinh();
                let a_ln10 = negative_decades * ln_10;
                (value * sinh_m_ln10 / top_of_scale).asinh() + a_ln10
            }
        }
    }
}

impl Default for TransformType {
    fn default() -> Self {
        TransformType::Biexponential {
            top_of_scale: 262144.0,
            positive_decades: 4.5,
            negative_decades: 0.0,
            width: 0.5,
        }
    }
}

/// Linear-to-log transform applied to a sliced (cells x channels) matrix
/// before binning. Implementations must preserve the matrix shape.
pub trait ScaleTransform: Send + Sync + std::fmt::Debug {
    fn transform_matrix(&self, data: Array2<f32>) -> Array2<f32>;
}

impl ScaleTransform for TransformType {
    fn transform_matrix(&self, mut data: Array2<f32>) -> Array2<f32> {
        data.mapv_inplace(|v| self.transform(v));
        data
    }
}

//! Feature and target scalers

use crate::error::{ArtifactError, PredictError};
use serde::{Deserialize, Serialize};

/// Per-column affine scaler fitted at training time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Scaler {
    /// `(x - mean) / scale`
    StandardScaler { mean: Vec<f64>, scale: Vec<f64> },
    /// `(x - data_min) / (data_max - data_min)`
    MinMaxScaler { data_min: Vec<f64>, data_max: Vec<f64> },
}

impl Scaler {
    pub fn n_features(&self) -> usize {
        match self {
            Scaler::StandardScaler { mean, .. } => mean.len(),
            Scaler::MinMaxScaler { data_min, .. } => data_min.len(),
        }
    }

    pub fn validate(&self, n_features: usize) -> Result<(), ArtifactError> {
        let (a, b) = match self {
            Scaler::StandardScaler { mean, scale } => (mean, scale),
            Scaler::MinMaxScaler { data_min, data_max } => (data_min, data_max),
        };
        if a.len() != b.len() || a.len() != n_features {
            return Err(ArtifactError::Shape(format!(
                "scaler has {}/{} parameters, expected {}",
                a.len(),
                b.len(),
                n_features
            )));
        }
        Ok(())
    }

    /// Per-column (offset, width) so that `scaled = (x - offset) / width`
    fn params(&self, column: usize) -> (f64, f64) {
        let (offset, width) = match self {
            Scaler::StandardScaler { mean, scale } => (mean[column], scale[column]),
            Scaler::MinMaxScaler { data_min, data_max } => {
                (data_min[column], data_max[column] - data_min[column])
            }
        };
        // Constant columns are left unscaled
        if width == 0.0 {
            (offset, 1.0)
        } else {
            (offset, width)
        }
    }

    fn check_width(&self, x: &[f64]) -> Result<(), PredictError> {
        if x.len() != self.n_features() {
            return Err(PredictError::InferenceFailure(format!(
                "scaler expects {} columns, got {}",
                self.n_features(),
                x.len()
            )));
        }
        Ok(())
    }

    pub fn transform(&self, x: &[f64]) -> Result<Vec<f64>, PredictError> {
        self.check_width(x)?;
        Ok(x.iter()
            .enumerate()
            .map(|(i, v)| {
                let (offset, width) = self.params(i);
                (v - offset) / width
            })
            .collect())
    }

    pub fn inverse_transform(&self, x: &[f64]) -> Result<Vec<f64>, PredictError> {
        self.check_width(x)?;
        Ok(x.iter()
            .enumerate()
            .map(|(i, v)| {
                let (offset, width) = self.params(i);
                v * width + offset
            })
            .collect())
    }
}

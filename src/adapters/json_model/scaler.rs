//! Standard (z-score) scaler from the exchange format.

use serde::{Deserialize, Serialize};

use crate::ports::{InferenceError, ModelError, Scaler};

/// Scaler parameters as exported by the training pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// `(x - mean) / scale` per feature.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Validate exported parameters against the variant's feature count.
    ///
    /// Zero scale entries come from constant training columns and are
    /// treated as 1.
    ///
    /// # Errors
    /// Returns `ModelError::Invalid` on length mismatch or non-finite values.
    pub fn from_exported(exported: ExportedScaler, n_features: usize) -> Result<Self, ModelError> {
        if exported.mean.len() != n_features || exported.scale.len() != n_features {
            return Err(ModelError::Invalid(format!(
                "scaler has {} means and {} scales for {} features",
                exported.mean.len(),
                exported.scale.len(),
                n_features
            )));
        }
        if exported
            .mean
            .iter()
            .chain(exported.scale.iter())
            .any(|v| !v.is_finite())
        {
            return Err(ModelError::Invalid(
                "scaler parameters must be finite".into(),
            ));
        }

        let scale = exported
            .scale
            .into_iter()
            .map(|s| if s == 0.0 { 1.0 } else { s })
            .collect();

        Ok(Self {
            mean: exported.mean,
            scale,
        })
    }
}

impl Scaler for StandardScaler {
    fn normalize(&self, features: &[f64]) -> Result<Vec<f64>, InferenceError> {
        if features.len() != self.mean.len() {
            return Err(InferenceError::FeatureCount {
                expected: self.mean.len(),
                got: features.len(),
            });
        }
        Ok(features
            .iter()
            .zip(self.mean.iter().zip(self.scale.iter()))
            .map(|(x, (m, s))| (x - m) / s)
            .collect())
    }
}

//! Model port: Traits for the opaque classifier and scaler capabilities.
//!
//! These traits abstract the statistical models from the pipeline. The
//! pipeline only ever sees aligned feature slices in, label ids and
//! probability distributions out.

use std::collections::BTreeMap;

use crate::domain::{DeliveryMode, VariantKind};

/// Label identifier as assigned by the training label map.
pub type ClassId = i64;

/// Errors raised while running a loaded model on a request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InferenceError {
    #[error("Feature count mismatch: got {got}, expected {expected}")]
    FeatureCount { expected: usize, got: usize },

    #[error("Input contains non-finite value for feature `{0}`")]
    NonFinite(String),

    #[error("Classifier returned an empty probability distribution")]
    EmptyDistribution,

    #[error("Classifier output is malformed: {0}")]
    Malformed(String),
}

/// Errors raised while loading a model artifact.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid artifact format: {0}")]
    Format(String),

    #[error("Invalid model parameters: {0}")]
    Invalid(String),

    #[error("Artifact verification failed: {0}")]
    Verification(String),

    #[error("Model cache lock poisoned")]
    Poisoned,
}

/// Linear per-feature normalization fixed at training time.
pub trait Scaler: Send + Sync {
    /// Normalize an aligned feature slice.
    ///
    /// # Errors
    /// Returns `InferenceError::FeatureCount` if the slice has the wrong width.
    fn normalize(&self, features: &[f64]) -> Result<Vec<f64>, InferenceError>;
}

/// Opaque multi-class classifier.
///
/// Implementations must be safe to share across threads; a loaded model is
/// never mutated.
pub trait Classifier: Send + Sync {
    /// Label ids in distribution order.
    fn classes(&self) -> &[ClassId];

    /// Probability of each class in `classes()` order.
    ///
    /// # Errors
    /// Returns `InferenceError` if the input does not fit the model.
    fn predict_distribution(&self, features: &[f64]) -> Result<Vec<f64>, InferenceError>;

    /// Raw decision scores, for margin-based models. Binary models return a
    /// single score for the second class. Defaults to the distribution.
    ///
    /// # Errors
    /// Returns `InferenceError` if the input does not fit the model.
    fn decision_scores(&self, features: &[f64]) -> Result<Vec<f64>, InferenceError> {
        self.predict_distribution(features)
    }

    /// Label id of the most probable class. Ties go to the earliest class.
    ///
    /// # Errors
    /// Returns `InferenceError` if the input does not fit the model.
    fn predict_class(&self, features: &[f64]) -> Result<ClassId, InferenceError> {
        let distribution = self.predict_distribution(features)?;
        let index = argmax(&distribution).ok_or(InferenceError::EmptyDistribution)?;
        self.classes().get(index).copied().ok_or_else(|| {
            InferenceError::Malformed(format!(
                "distribution has {} entries but only {} classes",
                distribution.len(),
                self.classes().len()
            ))
        })
    }
}

/// Index of the first maximum.
#[must_use]
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// One trained model: its expected feature order, scaler and classifier.
pub struct ModelVariant {
    pub kind: VariantKind,
    pub features: Vec<String>,
    pub scaler: Box<dyn Scaler>,
    pub classifier: Box<dyn Classifier>,
}

impl std::fmt::Debug for ModelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelVariant")
            .field("kind", &self.kind)
            .field("features", &self.features.len())
            .field("classes", &self.classifier.classes())
            .finish()
    }
}

/// Reverse of the training label map: label id to delivery mode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelMap {
    by_id: BTreeMap<ClassId, (String, DeliveryMode)>,
}

impl LabelMap {
    /// Build from the training map of label name to label id.
    #[must_use]
    pub fn from_training(name_to_id: &BTreeMap<String, ClassId>) -> Self {
        let by_id = name_to_id
            .iter()
            .map(|(name, &id)| {
                let display = capitalize(name);
                let mode = DeliveryMode::from_label(&display);
                (id, (display, mode))
            })
            .collect();
        Self { by_id }
    }

    /// Delivery mode for a label id; unmapped ids are `Unknown`.
    #[must_use]
    pub fn resolve(&self, id: ClassId) -> DeliveryMode {
        self.by_id
            .get(&id)
            .map_or(DeliveryMode::Unknown, |(_, mode)| *mode)
    }

    /// Capitalized training name for a label id.
    #[must_use]
    pub fn name(&self, id: ClassId) -> Option<&str> {
        self.by_id.get(&id).map(|(name, _)| name.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Uppercase the first character and lowercase the rest.
fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Immutable bundle of both model variants and the label map.
#[derive(Debug)]
pub struct ModelArtifact {
    pub history: ModelVariant,
    pub first_time: ModelVariant,
    pub labels: LabelMap,
}

impl ModelArtifact {
    #[must_use]
    pub fn variant(&self, kind: VariantKind) -> &ModelVariant {
        match kind {
            VariantKind::FirstTime => &self.first_time,
            VariantKind::History => &self.history,
        }
    }
}

/// Source of the persisted model artifact.
pub trait ArtifactSource: Send + Sync {
    /// Load and validate the artifact.
    ///
    /// # Errors
    /// Returns `ModelError` if the artifact is missing, corrupt or untrusted.
    fn load(&self) -> Result<ModelArtifact, ModelError>;

    /// Where the artifact comes from, for logs.
    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_first_maximum_wins() {
        assert_eq!(argmax(&[0.2, 0.5, 0.3]), Some(1));
        assert_eq!(argmax(&[0.4, 0.4, 0.2]), Some(0));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("caesarean"), "Caesarean");
        assert_eq!(capitalize("C-SECTION"), "C-section");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_label_map_resolution() {
        let training: BTreeMap<String, ClassId> = [
            ("normal".to_string(), 0),
            ("caesarean".to_string(), 1),
            ("forceps".to_string(), 2),
        ]
        .into_iter()
        .collect();
        let labels = LabelMap::from_training(&training);

        assert_eq!(labels.len(), 3);
        assert_eq!(labels.resolve(0), DeliveryMode::Vaginal);
        assert_eq!(labels.resolve(1), DeliveryMode::CSection);
        assert_eq!(labels.resolve(2), DeliveryMode::Forceps);
        assert_eq!(labels.resolve(7), DeliveryMode::Unknown);
        assert_eq!(labels.name(1), Some("Caesarean"));
    }
}

//! JSON model exchange format adapter.
//!
//! Loads a single artifact file holding both model variants, their feature
//! orders and scalers, and the training label map. Integrity is checked
//! against an optional signed manifest before the file is parsed.

mod classifiers;
mod scaler;
pub mod signature;
mod trees;

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::features::PARITY_FEATURES;
use crate::domain::VariantKind;
use crate::ports::{ArtifactSource, ClassId, LabelMap, ModelArtifact, ModelError, ModelVariant};

pub use classifiers::{
    CalibrationInput, ExportedClassifier, ExportedIsotonic, IsotonicCalibrated, LinearModel,
    SoftVoting,
};
pub use scaler::{ExportedScaler, StandardScaler};
pub use signature::{SignaturePolicy, SignedManifest, Verification};
pub use trees::{DecisionTree, ExportedTree, GradientBoosting, RandomForest};

/// On-disk layout of a model artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedArtifact {
    pub label_map: BTreeMap<String, ClassId>,
    pub features: Vec<String>,
    pub scaler: ExportedScaler,
    pub model: ExportedClassifier,
    pub first_time_features: Vec<String>,
    pub first_time_scaler: ExportedScaler,
    pub first_time_model: ExportedClassifier,
}

impl ExportedArtifact {
    /// Validate and build the runtime artifact.
    ///
    /// # Errors
    /// Returns `ModelError::Invalid` if any part is inconsistent.
    pub fn into_artifact(self) -> Result<ModelArtifact, ModelError> {
        if self.label_map.is_empty() {
            return Err(ModelError::Invalid("label map is empty".into()));
        }

        let history = build_variant(VariantKind::History, self.features, self.scaler, self.model)?;
        let first_time = build_variant(
            VariantKind::FirstTime,
            self.first_time_features,
            self.first_time_scaler,
            self.first_time_model,
        )?;

        if let Some(name) = first_time
            .features
            .iter()
            .find(|f| PARITY_FEATURES.contains(&f.as_str()))
        {
            tracing::warn!(feature = %name, "First-time model consumes a parity feature");
        }

        Ok(ModelArtifact {
            history,
            first_time,
            labels: LabelMap::from_training(&self.label_map),
        })
    }
}

fn build_variant(
    kind: VariantKind,
    features: Vec<String>,
    scaler: ExportedScaler,
    model: ExportedClassifier,
) -> Result<ModelVariant, ModelError> {
    if features.is_empty() {
        return Err(ModelError::Invalid(format!("{kind} has no features")));
    }
    let mut seen = HashSet::with_capacity(features.len());
    if let Some(dup) = features.iter().find(|f| !seen.insert(f.as_str())) {
        return Err(ModelError::Invalid(format!(
            "{kind} lists feature `{dup}` twice"
        )));
    }

    let n = features.len();
    let scaler = StandardScaler::from_exported(scaler, n).map_err(|e| in_variant(kind, e))?;
    let classifier = model.build(n).map_err(|e| in_variant(kind, e))?;

    tracing::debug!(%kind, features = n, classes = classifier.classes().len(), "Model variant built");
    Ok(ModelVariant {
        kind,
        features,
        scaler: Box::new(scaler),
        classifier,
    })
}

fn in_variant(kind: VariantKind, err: ModelError) -> ModelError {
    match err {
        ModelError::Invalid(msg) => ModelError::Invalid(format!("{kind}: {msg}")),
        other => other,
    }
}

/// Artifact stored as a JSON file on local disk.
#[derive(Debug, Clone)]
pub struct JsonArtifactSource {
    path: PathBuf,
    policy: SignaturePolicy,
}

impl JsonArtifactSource {
    pub fn new(path: impl Into<PathBuf>, policy: SignaturePolicy) -> Self {
        Self {
            path: path.into(),
            policy,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ArtifactSource for JsonArtifactSource {
    fn load(&self) -> Result<ModelArtifact, ModelError> {
        signature::verify_artifact(&self.path, &self.policy)?;

        let bytes = fs::read(&self.path).map_err(|source| ModelError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        let exported: ExportedArtifact =
            serde_json::from_slice(&bytes).map_err(|e| ModelError::Format(e.to_string()))?;

        let artifact = exported.into_artifact()?;
        tracing::info!(
            path = %self.path.display(),
            labels = artifact.labels.len(),
            "Model artifact loaded"
        );
        Ok(artifact)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::features::names;
    use crate::domain::DeliveryMode;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    /// Small valid artifact: history is a linear/forest vote on two
    /// features, first-time is a single-stump forest on one feature.
    pub(crate) fn sample_artifact() -> ExportedArtifact {
        let json = serde_json::json!({
            "label_map": {"normal": 0, "caesarean": 1, "forceps": 2},
            "features": [names::BISHOP_SCORE, names::PREV_CESAREAN],
            "scaler": {"mean": [5.0, 0.0], "scale": [2.0, 1.0]},
            "model": {
                "kind": "voting",
                "weights": [0.65, 0.35],
                "estimators": [
                    {
                        "kind": "linear",
                        "classes": [0, 1, 2],
                        "coefficients": [[1.0, -1.0], [-1.0, 2.0], [0.0, 0.0]],
                        "intercepts": [0.0, 0.0, -1.0]
                    },
                    {
                        "kind": "forest",
                        "classes": [0, 1, 2],
                        "trees": [{
                            "children_left": [1, -1, -1],
                            "children_right": [2, -1, -1],
                            "feature": [1, -2, -2],
                            "threshold": [0.5, -2.0, -2.0],
                            "value": [[1.0, 1.0, 1.0], [8.0, 1.0, 1.0], [1.0, 8.0, 1.0]]
                        }]
                    }
                ]
            },
            "first_time_features": [names::BISHOP_SCORE],
            "first_time_scaler": {"mean": [5.0], "scale": [2.0]},
            "first_time_model": {
                "kind": "forest",
                "classes": [0, 1, 2],
                "trees": [{
                    "children_left": [1, -1, -1],
                    "children_right": [2, -1, -1],
                    "feature": [0, -2, -2],
                    "threshold": [0.0, -2.0, -2.0],
                    "value": [[1.0, 1.0, 1.0], [0.2, 0.7, 0.1], [0.9, 0.05, 0.05]]
                }]
            }
        });
        serde_json::from_value(json).expect("sample artifact")
    }

    fn write_artifact(dir: &Path) -> PathBuf {
        let path = dir.join("delivery_model.json");
        fs::write(&path, serde_json::to_vec(&sample_artifact()).expect("serialize"))
            .expect("write artifact");
        path
    }

    #[test]
    fn test_load_unsigned_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_artifact(dir.path());

        let source = JsonArtifactSource::new(&path, SignaturePolicy::default());
        let artifact = source.load().expect("Should load");

        assert_eq!(artifact.history.features.len(), 2);
        assert_eq!(artifact.first_time.features, vec![names::BISHOP_SCORE.to_string()]);
        assert_eq!(artifact.labels.resolve(1), DeliveryMode::CSection);
        assert_eq!(source.describe(), path.display().to_string());

        let x = artifact.first_time.scaler.normalize(&[9.0]).expect("normalize");
        assert_eq!(x, vec![2.0]);
        assert_eq!(artifact.first_time.classifier.predict_class(&x).expect("class"), 0);
    }

    #[test]
    fn test_load_signed_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_artifact(dir.path());
        let key = SigningKey::generate(&mut OsRng);
        signature::tests::sign_dir(
            dir.path(),
            &["delivery_model.json"],
            &key,
            chrono::Utc::now().timestamp(),
        );

        let policy = SignaturePolicy {
            require_signature: true,
            verifying_key: Some(key.verifying_key()),
        };
        assert!(JsonArtifactSource::new(&path, policy).load().is_ok());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source =
            JsonArtifactSource::new(dir.path().join("absent.json"), SignaturePolicy::default());
        assert!(matches!(source.load(), Err(ModelError::Io { .. })));
    }

    #[test]
    fn test_corrupt_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("delivery_model.json");
        fs::write(&path, b"{ not json").expect("write");

        let source = JsonArtifactSource::new(&path, SignaturePolicy::default());
        assert!(matches!(source.load(), Err(ModelError::Format(_))));
    }

    #[test]
    fn test_inconsistent_artifacts_are_rejected() {
        let mut bad_scaler = sample_artifact();
        bad_scaler.scaler.mean.pop();
        assert!(bad_scaler.into_artifact().is_err());

        let mut duplicate = sample_artifact();
        duplicate.features[1] = names::BISHOP_SCORE.to_string();
        duplicate.scaler.mean = vec![0.0, 0.0];
        assert!(duplicate.into_artifact().is_err());

        let mut no_labels = sample_artifact();
        no_labels.label_map.clear();
        assert!(no_labels.into_artifact().is_err());

        let mut no_features = sample_artifact();
        no_features.first_time_features.clear();
        no_features.first_time_scaler = ExportedScaler {
            mean: vec![],
            scale: vec![],
        };
        assert!(no_features.into_artifact().is_err());
    }
}

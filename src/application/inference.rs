//! Runs one model variant on an engineered feature vector.

use crate::domain::{DeliveryMode, FeatureVector};
use crate::ports::{ClassId, InferenceError, LabelMap, ModelVariant};

/// What the classifier said, before clinical adjustment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceOutcome {
    pub mode: DeliveryMode,
    pub class_id: ClassId,
    /// Highest class probability in percent, rounded to 2 decimals
    pub confidence: f64,
}

/// Align, normalize and classify.
///
/// # Errors
/// Returns `InferenceError` if an aligned feature is not finite or the
/// variant rejects the input.
pub fn infer(
    variant: &ModelVariant,
    labels: &LabelMap,
    features: &FeatureVector,
) -> Result<InferenceOutcome, InferenceError> {
    let aligned = features.align(&variant.features);
    if let Some((name, _)) = variant
        .features
        .iter()
        .zip(&aligned)
        .find(|(_, x)| !x.is_finite())
    {
        return Err(InferenceError::NonFinite(name.clone()));
    }

    let normalized = variant.scaler.normalize(&aligned)?;
    let distribution = variant.classifier.predict_distribution(&normalized)?;
    let class_id = variant.classifier.predict_class(&normalized)?;

    let top = distribution
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    if !top.is_finite() {
        return Err(InferenceError::EmptyDistribution);
    }

    let mode = labels.resolve(class_id);
    tracing::debug!(
        variant = %variant.kind,
        class_id,
        label = labels.name(class_id).unwrap_or("?"),
        "Classifier prediction"
    );

    Ok(InferenceOutcome {
        mode,
        class_id,
        confidence: round2(top * 100.0),
    })
}

/// Round to 2 decimals, correctly rounded from the exact binary value.
fn round2(value: f64) -> f64 {
    format!("{value:.2}").parse().unwrap_or(value)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::features::names;
    use crate::domain::{PatientInput, VariantKind};
    use crate::ports::{Classifier, Scaler};
    use std::collections::BTreeMap;

    pub(crate) struct Identity;

    impl Scaler for Identity {
        fn normalize(&self, features: &[f64]) -> Result<Vec<f64>, InferenceError> {
            Ok(features.to_vec())
        }
    }

    /// Always returns the same distribution over classes 0, 1, 2.
    pub(crate) struct Fixed(pub Vec<f64>);

    impl Classifier for Fixed {
        fn classes(&self) -> &[ClassId] {
            &[0, 1, 2]
        }

        fn predict_distribution(&self, _: &[f64]) -> Result<Vec<f64>, InferenceError> {
            Ok(self.0.clone())
        }
    }

    pub(crate) fn labels() -> LabelMap {
        let training: BTreeMap<String, ClassId> = [("normal", 0), ("caesarean", 1), ("forceps", 2)]
            .into_iter()
            .map(|(n, id)| (n.to_string(), id))
            .collect();
        LabelMap::from_training(&training)
    }

    pub(crate) fn variant(kind: VariantKind, features: &[&str], proba: Vec<f64>) -> ModelVariant {
        ModelVariant {
            kind,
            features: features.iter().map(|f| (*f).to_string()).collect(),
            scaler: Box::new(Identity),
            classifier: Box::new(Fixed(proba)),
        }
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(72.345), 72.34);
        assert_eq!(round2(87.5), 87.5);
        assert_eq!(round2(99.999), 100.0);
        assert_eq!(round2(61.6666), 61.67);
    }

    #[test]
    fn test_infer_maps_label_and_confidence() {
        let features = FeatureVector::derive(&PatientInput::example()).expect("derive");
        let v = variant(
            VariantKind::History,
            &[names::BISHOP_SCORE, names::BMI],
            vec![0.2, 0.73456, 0.06544],
        );

        let outcome = infer(&v, &labels(), &features).expect("Should infer");
        assert_eq!(outcome.mode, DeliveryMode::CSection);
        assert_eq!(outcome.class_id, 1);
        assert_eq!(outcome.confidence, 73.46);
    }

    #[test]
    fn test_unmapped_class_is_unknown() {
        let features = FeatureVector::derive(&PatientInput::example()).expect("derive");
        let v = variant(VariantKind::History, &[names::BMI], vec![0.1, 0.1, 0.8]);
        let sparse: BTreeMap<String, ClassId> =
            [("normal".to_string(), 0)].into_iter().collect();

        let outcome = infer(&v, &LabelMap::from_training(&sparse), &features).expect("infer");
        assert_eq!(outcome.mode, DeliveryMode::Unknown);
        assert_eq!(outcome.confidence, 80.0);
    }

    #[test]
    fn test_non_finite_feature_is_rejected() {
        let input = PatientInput::example().with("bp_diastolic", -1);
        let features = FeatureVector::derive(&input).expect("derive");
        let v = variant(VariantKind::History, &[names::BP_RATIO], vec![1.0, 0.0, 0.0]);

        let err = infer(&v, &labels(), &features).expect_err("Should fail");
        assert!(matches!(err, InferenceError::NonFinite(ref f) if f == names::BP_RATIO));
    }

    #[test]
    fn test_unused_non_finite_feature_is_ignored() {
        let input = PatientInput::example().with("bp_diastolic", -1);
        let features = FeatureVector::derive(&input).expect("derive");
        let v = variant(VariantKind::FirstTime, &[names::BISHOP_SCORE], vec![1.0, 0.0, 0.0]);

        assert!(infer(&v, &labels(), &features).is_ok());
    }
}

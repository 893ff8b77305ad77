//! Prediction service: the end-to-end delivery-mode pipeline.
//!
//! This service coordinates:
//! - Clinical override rules (may short-circuit)
//! - Lazy model loading through the shared cache
//! - Feature derivation and model-variant selection
//! - Classifier inference
//! - Risk scoring and confidence adjustment

use std::sync::Arc;

use crate::application::inference::infer;
use crate::application::ModelCache;
use crate::domain::{
    adjust, ClinicalOverride, FeatureVector, ParityHistory, PatientInput, PredictionResult,
    RiskCategory, VariantKind,
};
use crate::ports::ArtifactSource;
use crate::Result;

/// Separator between the model name and clinical adjustment notes.
const TRACE_SEPARATOR: &str = " + ";

pub struct PredictionService<S: ArtifactSource> {
    cache: Arc<ModelCache<S>>,
}

impl<S: ArtifactSource> PredictionService<S> {
    /// Create a service with its own artifact cache.
    pub fn new(source: S) -> Self {
        Self::with_cache(Arc::new(ModelCache::new(source)))
    }

    /// Create a service sharing an existing cache.
    pub fn with_cache(cache: Arc<ModelCache<S>>) -> Self {
        Self { cache }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<ModelCache<S>> {
        &self.cache
    }

    /// Run the full pipeline on a raw JSON request.
    ///
    /// # Errors
    /// Returns `PartusError::Input` if the request is not a JSON object, or
    /// any error from [`Self::predict`].
    pub fn predict_json(&self, raw: &str) -> Result<PredictionResult> {
        let input = PatientInput::from_json(raw)?;
        self.predict(&input)
    }

    /// Run the full pipeline on a parsed request.
    ///
    /// # Errors
    /// Returns `PartusError::ModelUnavailable` if the artifact cannot be
    /// loaded, or a prediction execution error for field type faults and
    /// non-finite model inputs. Override rules never fail.
    pub fn predict(&self, input: &PatientInput) -> Result<PredictionResult> {
        for warning in input.range_warnings() {
            tracing::warn!("Implausible input: {warning}");
        }

        if let Some(rule) = ClinicalOverride::evaluate(input) {
            let result = rule.into_result();
            tracing::info!(
                prediction = %result.prediction_result,
                trace = %result.model_used,
                "Clinical override applied"
            );
            return Ok(result);
        }

        let artifact = self.cache.get_or_load()?;

        let features = FeatureVector::derive(input)?;
        let parity = ParityHistory::from_input(input);
        let kind = VariantKind::select(&parity);
        tracing::debug!(variant = %kind, first_time = parity.is_first_time(), "Model variant selected");

        let outcome = infer(artifact.variant(kind), &artifact.labels, &features)?;

        let risk = RiskCategory::evaluate(input)?;
        let adjustment = adjust(outcome.mode, risk, outcome.confidence);
        tracing::debug!(
            %risk,
            raw_confidence = outcome.confidence,
            adjusted_confidence = adjustment.confidence,
            "Confidence adjusted"
        );

        let mut trace = kind.display_name().to_string();
        if let Some(note) = adjustment.note {
            trace.push_str(TRACE_SEPARATOR);
            trace.push_str(note);
        }

        let result = PredictionResult::new(outcome.mode, adjustment.confidence, trace);
        tracing::info!(
            prediction = %result.prediction_result,
            confidence = result.confidence_score,
            trace = %result.model_used,
            "Prediction complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::inference::tests::{labels, variant};
    use crate::domain::features::names;
    use crate::domain::patient::fields;
    use crate::domain::DeliveryMode;
    use crate::ports::{ModelArtifact, ModelError};
    use crate::{ErrorKind, PartusError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves fixed-distribution variants and counts loads.
    struct StubSource {
        history: Vec<f64>,
        first_time: Vec<f64>,
        fail: bool,
        loads: AtomicUsize,
    }

    impl StubSource {
        fn new(history: Vec<f64>, first_time: Vec<f64>) -> Self {
            Self {
                history,
                first_time,
                fail: false,
                loads: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(vec![], vec![])
            }
        }
    }

    impl ArtifactSource for StubSource {
        fn load(&self) -> std::result::Result<ModelArtifact, ModelError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ModelError::Format("unexpected end of file".into()));
            }
            Ok(ModelArtifact {
                history: variant(
                    VariantKind::History,
                    &[names::BISHOP_SCORE, names::PREV_CESAREAN, names::BP_RATIO],
                    self.history.clone(),
                ),
                first_time: variant(
                    VariantKind::FirstTime,
                    &[names::BISHOP_SCORE, names::BMI],
                    self.first_time.clone(),
                ),
                labels: labels(),
            })
        }

        fn describe(&self) -> String {
            "stub".into()
        }
    }

    fn service(history: Vec<f64>, first_time: Vec<f64>) -> PredictionService<StubSource> {
        PredictionService::new(StubSource::new(history, first_time))
    }

    fn loads(service: &PredictionService<StubSource>) -> usize {
        service.cache().source().loads.load(Ordering::SeqCst)
    }

    /// First-time, low clinical risk request.
    fn first_time_low_risk() -> PatientInput {
        PatientInput::example()
            .with(fields::PREVIOUS_CESAREAN, "No")
            .with(fields::BISHOP_SCORE, 8)
    }

    #[test]
    fn test_override_skips_model_loading() {
        let svc = PredictionService::new(StubSource::failing());
        let input = PatientInput::example().with(fields::PLACENTA_LOCATION, "Previa");

        let result = svc.predict(&input).expect("Override should not fail");
        assert_eq!(
            result,
            PredictionResult::new(
                DeliveryMode::CSection,
                100.0,
                "Clinical_Rule_Exclusion (Placenta Previa)"
            )
        );
        assert_eq!(loads(&svc), 0);
    }

    #[test]
    fn test_breech_override() {
        let svc = service(vec![1.0, 0.0, 0.0], vec![1.0, 0.0, 0.0]);
        let input = PatientInput::example().with(fields::FETAL_PRESENTATION, "breech");

        let result = svc.predict(&input).expect("Should predict");
        assert_eq!(result.model_used, "Clinical_Rule_Exclusion (Breech Lie)");
        assert_eq!(result.confidence_score, 100.0);
    }

    #[test]
    fn test_first_time_variant_selected() {
        let svc = service(vec![0.0, 1.0, 0.0], vec![0.9, 0.05, 0.05]);

        let result = svc.predict(&first_time_low_risk()).expect("Should predict");
        assert!(result.model_used.starts_with("Model_B_95_Percent_Accurate"));
        assert_eq!(result.prediction_result, DeliveryMode::Vaginal);
        assert_eq!(result.confidence_score, 90.0);
        assert_eq!(result.model_used, "Model_B_95_Percent_Accurate");
    }

    #[test]
    fn test_history_variant_with_low_risk_caution() {
        // Example payload: previous cesarean (+2) only, so Medium risk.
        let medium = service(vec![0.1, 0.7, 0.2], vec![1.0, 0.0, 0.0]);
        let result = medium.predict(&PatientInput::example()).expect("Should predict");
        assert_eq!(result.prediction_result, DeliveryMode::CSection);
        assert_eq!(result.confidence_score, 70.0);
        assert_eq!(result.model_used, "Model_A_History");

        // Prior vaginal birth only: history variant, no risk points.
        let low = service(vec![0.1, 0.55, 0.35], vec![1.0, 0.0, 0.0]);
        let input = first_time_low_risk().with(fields::PREVIOUS_VAGINAL_BIRTH, "yes");
        let result = low.predict(&input).expect("Should predict");
        assert_eq!(result.confidence_score, 50.1);
        assert_eq!(
            result.model_used,
            "Model_A_History + Clinical Caution (Low Risk)"
        );
    }

    #[test]
    fn test_high_risk_adjustments() {
        let high_risk = PatientInput::example()
            .with(fields::BISHOP_SCORE, 3)
            .with(fields::CERVICAL_DILATION, 1);

        let boost = service(vec![0.05, 0.9, 0.05], vec![1.0, 0.0, 0.0]);
        let result = boost.predict(&high_risk).expect("Should predict");
        assert_eq!(result.confidence_score, 99.9);
        assert_eq!(
            result.model_used,
            "Model_A_History + Clinical Boost (High Risk)"
        );

        let warn = service(vec![0.8, 0.1, 0.1], vec![1.0, 0.0, 0.0]);
        let result = warn.predict(&high_risk).expect("Should predict");
        assert_eq!(result.prediction_result, DeliveryMode::Vaginal);
        assert_eq!(result.confidence_score, 65.0);
        assert_eq!(
            result.model_used,
            "Model_A_History + Clinical Warning (High Risk)"
        );
    }

    #[test]
    fn test_forceps_is_not_adjusted() {
        let high_risk = PatientInput::example()
            .with(fields::BISHOP_SCORE, 3)
            .with(fields::CERVICAL_DILATION, 1);
        let svc = service(vec![0.1, 0.2, 0.7], vec![1.0, 0.0, 0.0]);

        let result = svc.predict(&high_risk).expect("Should predict");
        assert_eq!(result.prediction_result, DeliveryMode::Forceps);
        assert_eq!(result.confidence_score, 70.0);
        assert_eq!(result.model_used, "Model_A_History");
    }

    #[test]
    fn test_model_unavailable() {
        let svc = PredictionService::new(StubSource::failing());

        let err = svc.predict(&PatientInput::example()).expect_err("Should fail");
        assert_eq!(err.kind(), ErrorKind::ModelUnavailable);
        assert!(err
            .to_string()
            .starts_with("Prediction models failed to load: "));

        // No retry inside a request; the next request tries again.
        assert_eq!(loads(&svc), 1);
        assert!(svc.predict(&PatientInput::example()).is_err());
        assert_eq!(loads(&svc), 2);
    }

    #[test]
    fn test_artifact_loaded_once() {
        let svc = service(vec![0.1, 0.7, 0.2], vec![0.6, 0.2, 0.2]);
        for _ in 0..3 {
            svc.predict(&PatientInput::example()).expect("Should predict");
            svc.predict(&first_time_low_risk()).expect("Should predict");
        }
        assert_eq!(loads(&svc), 1);
    }

    #[test]
    fn test_non_finite_model_input() {
        let svc = service(vec![0.1, 0.7, 0.2], vec![1.0, 0.0, 0.0]);
        let input = PatientInput::example().with(fields::BP_DIASTOLIC, -1);

        let err = svc.predict(&input).expect_err("Should fail");
        assert_eq!(err.kind(), ErrorKind::PredictionExecution);
        assert!(err.to_string().starts_with("Prediction execution failed: "));
    }

    #[test]
    fn test_wrong_field_type() {
        let svc = service(vec![0.1, 0.7, 0.2], vec![1.0, 0.0, 0.0]);
        let input = PatientInput::example().with(fields::BMI, "heavy");

        let err = svc.predict(&input).expect_err("Should fail");
        assert!(matches!(err, PartusError::Field(_)));
        assert_eq!(err.kind(), ErrorKind::PredictionExecution);
    }

    #[test]
    fn test_predict_json() {
        let svc = service(vec![0.1, 0.7, 0.2], vec![1.0, 0.0, 0.0]);

        let err = svc.predict_json("{not json").expect_err("Should fail");
        assert_eq!(err.kind(), ErrorKind::InputParse);
        assert!(err.to_string().starts_with("Invalid JSON input: "));

        let err = svc.predict_json("[1, 2]").expect_err("Should fail");
        assert_eq!(err.kind(), ErrorKind::InputParse);

        let result = svc
            .predict_json(r#"{"fetal_heart_rate_category": "iii"}"#)
            .expect("Should predict");
        assert_eq!(
            result.model_used,
            "Clinical_Rule_Exclusion (Fetal Distress - Cat III)"
        );
        assert_eq!(loads(&svc), 0);
    }
}

//! Clinical override rules.
//!
//! Hard contraindications that settle the delivery mode before any model is
//! consulted. Rules are checked in a fixed priority order and the first match
//! wins. Evaluation never fails: absent or non-string fields simply do not
//! match.

use super::patient::{fields, PatientInput};
use super::prediction::{DeliveryMode, PredictionResult};

/// Prefix of every override decision trace.
pub const OVERRIDE_TRACE_PREFIX: &str = "Clinical_Rule_Exclusion";

/// Confidence reported for overridden predictions.
pub const OVERRIDE_CONFIDENCE: f64 = 100.0;

/// Abnormal fetal lie that precludes vaginal delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malpresentation {
    Breech,
    Transverse,
}

/// A clinical rule that forces the delivery mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClinicalOverride {
    /// Placenta covering the cervical os
    PlacentaPrevia,
    /// High recurrence risk after a previous shoulder dystocia
    PriorShoulderDystocia,
    /// Category III fetal heart rate tracing
    FetalDistress,
    /// Breech or transverse lie
    Malpresentation(Malpresentation),
}

impl ClinicalOverride {
    /// Evaluate the rules in priority order.
    #[must_use]
    pub fn evaluate(input: &PatientInput) -> Option<Self> {
        if input.text_lower(fields::PLACENTA_LOCATION).as_deref() == Some("previa") {
            return Some(Self::PlacentaPrevia);
        }

        if input.flag(fields::PRIOR_SHOULDER_DYSTOCIA) {
            return Some(Self::PriorShoulderDystocia);
        }

        let fhr_category = input
            .text(fields::FETAL_HEART_RATE_CATEGORY)
            .map(str::to_uppercase);
        if fhr_category.as_deref() == Some("III") {
            return Some(Self::FetalDistress);
        }

        match input.text_lower(fields::FETAL_PRESENTATION).as_deref() {
            Some("breech") => Some(Self::Malpresentation(Malpresentation::Breech)),
            Some("transverse") => Some(Self::Malpresentation(Malpresentation::Transverse)),
            _ => None,
        }
    }

    /// Human-readable rule name used in the decision trace.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::PlacentaPrevia => "Placenta Previa",
            Self::PriorShoulderDystocia => "Prior Shoulder Dystocia",
            Self::FetalDistress => "Fetal Distress - Cat III",
            Self::Malpresentation(Malpresentation::Breech) => "Breech Lie",
            Self::Malpresentation(Malpresentation::Transverse) => "Transverse Lie",
        }
    }

    #[must_use]
    pub fn trace(&self) -> String {
        format!("{OVERRIDE_TRACE_PREFIX} ({})", self.reason())
    }

    /// Every override mandates a cesarean delivery.
    #[must_use]
    pub fn mode(&self) -> DeliveryMode {
        DeliveryMode::CSection
    }

    #[must_use]
    pub fn into_result(self) -> PredictionResult {
        PredictionResult::new(self.mode(), OVERRIDE_CONFIDENCE, self.trace())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_override_for_routine_input() {
        assert_eq!(ClinicalOverride::evaluate(&PatientInput::example()), None);
        assert_eq!(ClinicalOverride::evaluate(&PatientInput::default()), None);
    }

    #[test]
    fn test_placenta_previa_wins_regardless_of_other_fields() {
        let input = PatientInput::example()
            .with(fields::PLACENTA_LOCATION, "Previa")
            .with(fields::PRIOR_SHOULDER_DYSTOCIA, "yes")
            .with(fields::FETAL_HEART_RATE_CATEGORY, "III")
            .with(fields::FETAL_PRESENTATION, "transverse");

        let rule = ClinicalOverride::evaluate(&input).expect("Should override");
        assert_eq!(rule, ClinicalOverride::PlacentaPrevia);

        let result = rule.into_result();
        assert_eq!(result.prediction_result, DeliveryMode::CSection);
        assert!((result.confidence_score - 100.0).abs() < f64::EPSILON);
        assert_eq!(result.model_used, "Clinical_Rule_Exclusion (Placenta Previa)");
    }

    #[test]
    fn test_priority_order() {
        let dystocia = PatientInput::default()
            .with(fields::PRIOR_SHOULDER_DYSTOCIA, "YES")
            .with(fields::FETAL_HEART_RATE_CATEGORY, "iii")
            .with(fields::FETAL_PRESENTATION, "Breech");
        assert_eq!(
            ClinicalOverride::evaluate(&dystocia),
            Some(ClinicalOverride::PriorShoulderDystocia)
        );

        let distress = PatientInput::default()
            .with(fields::FETAL_HEART_RATE_CATEGORY, "iii")
            .with(fields::FETAL_PRESENTATION, "Breech");
        let rule = ClinicalOverride::evaluate(&distress).expect("Should override");
        assert_eq!(rule, ClinicalOverride::FetalDistress);
        assert_eq!(rule.trace(), "Clinical_Rule_Exclusion (Fetal Distress - Cat III)");
    }

    #[test]
    fn test_malpresentation_traces() {
        let breech = PatientInput::default().with(fields::FETAL_PRESENTATION, "breech");
        assert_eq!(
            ClinicalOverride::evaluate(&breech).map(|r| r.trace()).as_deref(),
            Some("Clinical_Rule_Exclusion (Breech Lie)")
        );

        let transverse = PatientInput::default().with(fields::FETAL_PRESENTATION, "TRANSVERSE");
        assert_eq!(
            ClinicalOverride::evaluate(&transverse).map(|r| r.trace()).as_deref(),
            Some("Clinical_Rule_Exclusion (Transverse Lie)")
        );
    }

    #[test]
    fn test_near_misses_do_not_match() {
        let input = PatientInput::default()
            .with(fields::PLACENTA_LOCATION, " previa")
            .with(fields::PRIOR_SHOULDER_DYSTOCIA, true)
            .with(fields::FETAL_HEART_RATE_CATEGORY, 3)
            .with(fields::FETAL_PRESENTATION, "Cephalic");
        assert_eq!(ClinicalOverride::evaluate(&input), None);

        let category_two = PatientInput::default().with(fields::FETAL_HEART_RATE_CATEGORY, "II");
        assert_eq!(ClinicalOverride::evaluate(&category_two), None);
    }
}

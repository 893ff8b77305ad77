//! Clinical adjustment of model confidence.
//!
//! Applied only to model predictions, never to overrides. When the clinical
//! risk tier disagrees with or reinforces the model, the confidence is shifted
//! and the decision trace records why.

use super::prediction::DeliveryMode;
use super::risk::RiskCategory;

/// Upper bound after a confidence boost.
pub const CONFIDENCE_CEILING: f64 = 99.9;

/// Lower bound after a confidence reduction.
pub const CONFIDENCE_FLOOR: f64 = 50.1;

/// Confidence after clinical adjustment, plus the trace annotation if one
/// was applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjustment {
    pub confidence: f64,
    pub note: Option<&'static str>,
}

/// Reconcile model confidence with the clinical risk tier.
///
/// Forceps and unknown predictions have no rule and pass through unchanged.
#[must_use]
pub fn adjust(mode: DeliveryMode, risk: RiskCategory, confidence: f64) -> Adjustment {
    match (mode, risk) {
        (DeliveryMode::CSection, RiskCategory::High) => Adjustment {
            confidence: (confidence + 15.0).min(CONFIDENCE_CEILING),
            note: Some("Clinical Boost (High Risk)"),
        },
        (DeliveryMode::CSection, RiskCategory::Low) => Adjustment {
            confidence: (confidence - 10.0).max(CONFIDENCE_FLOOR),
            note: Some("Clinical Caution (Low Risk)"),
        },
        (DeliveryMode::Vaginal, RiskCategory::High) => Adjustment {
            confidence: (confidence - 15.0).max(CONFIDENCE_FLOOR),
            note: Some("Clinical Warning (High Risk)"),
        },
        _ => Adjustment {
            confidence,
            note: None,
        },
    }
}

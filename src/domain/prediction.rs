//! Prediction result types.
//!
//! Represents the structured outcome returned for every request, including
//! the audit trail of which rule or model produced it.

use serde::{Deserialize, Serialize};

/// Mode of delivery predicted for the patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryMode {
    Vaginal,
    #[serde(rename = "C-Section")]
    CSection,
    Forceps,
    Unknown,
}

impl DeliveryMode {
    /// Resolve a training label name to a delivery mode.
    ///
    /// Training cohorts label outcomes with several spellings; anything not
    /// recognized resolves to `Unknown`.
    #[must_use]
    pub fn from_label(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "vaginal" | "normal" => Self::Vaginal,
            "c-section" | "caesarean" | "cesarean" => Self::CSection,
            "forceps" | "assisted" => Self::Forceps,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vaginal => "Vaginal",
            Self::CSection => "C-Section",
            Self::Forceps => "Forceps",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final outcome of a prediction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Predicted delivery mode
    pub prediction_result: DeliveryMode,

    /// Confidence in percent, 0.0 to 100.0
    pub confidence_score: f64,

    /// Decision trace: the override rule, or the model variant plus any
    /// clinical adjustments applied to its confidence
    pub model_used: String,
}

impl PredictionResult {
    #[must_use]
    pub fn new(mode: DeliveryMode, confidence_score: f64, model_used: impl Into<String>) -> Self {
        Self {
            prediction_result: mode,
            confidence_score,
            model_used: model_used.into(),
        }
    }
}

/// Failure payload written in place of a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub error: String,
    pub confidence_score: f64,
}

impl ErrorReport {
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            confidence_score: 0.0,
        }
    }
}

//! # Partus
//!
//! Delivery-mode prediction core for obstetric clinical decision support.
//!
//! This crate provides:
//! - Hard clinical override rules that short-circuit model inference
//! - Deterministic feature engineering from loosely typed patient input
//! - Parity-based model-variant selection and classifier inference
//! - Rule-based clinical risk scoring and bounded confidence adjustment
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core clinical types and pure decision rules
//! - `ports`: Trait definitions for classifiers, scalers and artifact sources
//! - `adapters`: Concrete implementations (JSON model exchange format, signing)
//! - `application`: The prediction pipeline and the process-wide model cache
//! - `config`: Environment-driven runtime settings

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use application::{ModelCache, PredictionService};
pub use domain::{DeliveryMode, PatientInput, PredictionResult, RiskCategory};

/// Result type for Partus operations
pub type Result<T> = std::result::Result<T, PartusError>;

/// Coarse classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request payload could not be parsed.
    InputParse,
    /// The model artifact is missing, corrupt or untrusted.
    ModelUnavailable,
    /// Any failure after feature derivation.
    PredictionExecution,
}

/// Main error type for Partus
#[derive(Debug, thiserror::Error)]
pub enum PartusError {
    #[error(transparent)]
    Input(#[from] domain::InputError),

    #[error("Prediction models failed to load: {0}")]
    ModelUnavailable(#[from] ports::ModelError),

    #[error("Prediction execution failed: {0}")]
    Inference(#[from] ports::InferenceError),

    #[error("Prediction execution failed: {0}")]
    Field(#[from] domain::FieldTypeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PartusError {
    /// Which stage of the request failed.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Input(_) => ErrorKind::InputParse,
            Self::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
            Self::Inference(_) | Self::Field(_) | Self::Serialization(_) => {
                ErrorKind::PredictionExecution
            }
        }
    }
}

//! Application layer: Use cases and services.
//!
//! This module orchestrates domain rules with the model port to implement
//! the delivery-mode prediction use case.

pub mod inference;
mod model_cache;
mod prediction;

pub use inference::{infer, InferenceOutcome};
pub use model_cache::ModelCache;
pub use prediction::PredictionService;

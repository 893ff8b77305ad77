//! Domain layer: Core clinical types and decision rules.
//!
//! Everything here is pure and deterministic. No I/O, no model access.

pub mod confidence;
pub mod features;
mod overrides;
pub mod patient;
mod prediction;
mod risk;
mod variant;

pub use confidence::{adjust, Adjustment};
pub use features::{FeatureVector, ParityHistory};
pub use overrides::{ClinicalOverride, Malpresentation};
pub use patient::{FieldTypeError, InputError, PatientInput};
pub use prediction::{DeliveryMode, ErrorReport, PredictionResult};
pub use risk::{RiskCategory, RiskFactors};
pub use variant::VariantKind;

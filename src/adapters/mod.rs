//! Adapters layer: Concrete implementations of ports.
//!
//! - `json_model`: JSON model exchange format, classifiers and signed manifests
//! - `redact`: identifier and key-material filtering for logs

pub mod json_model;
pub mod redact;

pub use json_model::{JsonArtifactSource, SignaturePolicy};

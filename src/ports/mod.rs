//! Ports layer: Trait definitions for external capabilities.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the prediction pipeline and the statistical models it consults.

mod model;

pub use model::{
    argmax, ArtifactSource, ClassId, Classifier, InferenceError, LabelMap, ModelArtifact,
    ModelError, ModelVariant, Scaler,
};

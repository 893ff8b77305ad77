//! Process-wide, load-once model artifact cache.

use std::sync::{Arc, Mutex};

use crate::ports::{ArtifactSource, ModelArtifact, ModelError};

/// Loads the artifact on first use and shares it afterwards.
///
/// The first caller loads while holding the lock, so concurrent callers
/// wait and then receive the same `Arc`. A failed load leaves the slot
/// empty and the next request tries again.
pub struct ModelCache<S: ArtifactSource> {
    source: S,
    slot: Mutex<Option<Arc<ModelArtifact>>>,
}

impl<S: ArtifactSource> ModelCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            slot: Mutex::new(None),
        }
    }

    /// Return the loaded artifact, loading it if this is the first use.
    ///
    /// # Errors
    /// Returns `ModelError` if loading fails or the lock is poisoned.
    pub fn get_or_load(&self) -> Result<Arc<ModelArtifact>, ModelError> {
        let mut slot = self.slot.lock().map_err(|_| ModelError::Poisoned)?;
        if let Some(artifact) = slot.as_ref() {
            return Ok(Arc::clone(artifact));
        }

        tracing::debug!(source = %self.source.describe(), "Loading model artifact");
        match self.source.load() {
            Ok(artifact) => {
                let artifact = Arc::new(artifact);
                *slot = Some(Arc::clone(&artifact));
                Ok(artifact)
            }
            Err(e) => {
                tracing::error!(source = %self.source.describe(), error = %e, "Model artifact failed to load");
                Err(e)
            }
        }
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

//! Runtime settings from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `PARTUS_MODEL_PATH` | `models/delivery_model.json` |
//! | `PARTUS_REQUIRE_SIGNED_MODEL` | false |
//! | `PARTUS_MODEL_SIGNING_PUBKEY_B64_FILE` | unset |
//! | `PARTUS_LOG_MODE` | `stderr` (`file` to write to `PARTUS_LOG_FILE`) |
//! | `PARTUS_LOG_FILE` | `partus.log` |

use std::fs;
use std::path::PathBuf;

use crate::adapters::json_model::signature::verifying_key_from_b64;
use crate::adapters::SignaturePolicy;
use crate::ports::ModelError;

pub const MODEL_PATH_ENV: &str = "PARTUS_MODEL_PATH";
pub const REQUIRE_SIGNED_ENV: &str = "PARTUS_REQUIRE_SIGNED_MODEL";
pub const PUBKEY_FILE_ENV: &str = "PARTUS_MODEL_SIGNING_PUBKEY_B64_FILE";
pub const LOG_MODE_ENV: &str = "PARTUS_LOG_MODE";
pub const LOG_FILE_ENV: &str = "PARTUS_LOG_FILE";

pub const DEFAULT_MODEL_PATH: &str = "models/delivery_model.json";
pub const DEFAULT_LOG_FILE: &str = "partus.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogMode {
    #[default]
    Stderr,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub model_path: PathBuf,
    pub require_signed_model: bool,
    pub pubkey_file: Option<PathBuf>,
    pub log_mode: LogMode,
    pub log_file: PathBuf,
}

/// `1|true|TRUE|yes|YES` are true; anything else, or unset, is false.
#[must_use]
pub fn parse_bool(value: Option<&str>) -> bool {
    matches!(value, Some("1" | "true" | "TRUE" | "yes" | "YES"))
}

impl Settings {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from any variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let log_mode = match non_empty(LOG_MODE_ENV).as_deref() {
            Some("file") => LogMode::File,
            Some("stderr") | None => LogMode::Stderr,
            Some(other) => {
                tracing::warn!(mode = other, "Unknown {LOG_MODE_ENV}, using stderr");
                LogMode::Stderr
            }
        };

        Self {
            model_path: non_empty(MODEL_PATH_ENV)
                .map_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH), PathBuf::from),
            require_signed_model: parse_bool(lookup(REQUIRE_SIGNED_ENV).as_deref()),
            pubkey_file: non_empty(PUBKEY_FILE_ENV).map(PathBuf::from),
            log_mode,
            log_file: non_empty(LOG_FILE_ENV)
                .map_or_else(|| PathBuf::from(DEFAULT_LOG_FILE), PathBuf::from),
        }
    }

    /// Artifact verification policy, reading the verifying key if one is set.
    ///
    /// # Errors
    /// Returns `ModelError` if the key file cannot be read or decoded.
    pub fn signature_policy(&self) -> Result<SignaturePolicy, ModelError> {
        let verifying_key = match &self.pubkey_file {
            Some(path) => {
                let b64 = fs::read_to_string(path).map_err(|source| ModelError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                Some(verifying_key_from_b64(&b64)?)
            }
            None => None,
        };

        Ok(SignaturePolicy {
            require_signature: self.require_signed_model,
            verifying_key,
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

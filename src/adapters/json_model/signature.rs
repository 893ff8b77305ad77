//! Ed25519-signed manifests for model artifacts.
//!
//! A signed artifact directory holds the artifact JSON, a `manifest.json`
//! listing the SHA-256 of every bound file, and `model.sig`, the raw 64-byte
//! signature over the manifest bytes.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path};

use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ports::ModelError;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const SIGNATURE_FILE: &str = "model.sig";
pub const MANIFEST_VERSION: u32 = 1;

/// Allowed clock skew for `created_at`, in seconds.
const MAX_FUTURE_SKEW_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedManifest {
    pub version: u32,
    pub serial: u64,
    pub created_at: i64,
    pub nonce_b64: String,
    /// Relative file name to lowercase hex SHA-256.
    pub files: BTreeMap<String, String>,
}

/// How strictly artifacts are checked before loading.
#[derive(Debug, Clone, Default)]
pub struct SignaturePolicy {
    pub require_signature: bool,
    pub verifying_key: Option<VerifyingKey>,
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Unsigned,
    Signed { serial: u64 },
}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Decode a base64 Ed25519 public key.
///
/// # Errors
/// Returns `ModelError::Verification` if the key is not 32 valid bytes.
pub fn verifying_key_from_b64(b64: &str) -> Result<VerifyingKey, ModelError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|_| ModelError::Verification("Invalid public key base64".into()))?;
    let bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        ModelError::Verification("Invalid public key length (expected 32 bytes)".into())
    })?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|_| ModelError::Verification("Invalid verifying key".into()))
}

/// Check the manifest and signature next to `artifact`.
///
/// Without a manifest the artifact is accepted as unsigned unless the policy
/// requires a signature. A manifest that is present is always verified, and
/// verification fails if no key is configured.
///
/// # Errors
/// Returns `ModelError::Verification` on any integrity failure.
pub fn verify_artifact(
    artifact: &Path,
    policy: &SignaturePolicy,
) -> Result<Verification, ModelError> {
    let base_dir = artifact.parent().unwrap_or_else(|| Path::new("."));
    let manifest_path = base_dir.join(MANIFEST_FILE);
    let sig_path = base_dir.join(SIGNATURE_FILE);

    if !manifest_path.exists() || !sig_path.exists() {
        if policy.require_signature {
            tracing::error!(?manifest_path, "Signed artifact required but no manifest found");
            return Err(ModelError::Verification(format!(
                "{MANIFEST_FILE} and {SIGNATURE_FILE} are required next to the artifact"
            )));
        }
        tracing::warn!(?artifact, "Loading UNSIGNED model artifact");
        return Ok(Verification::Unsigned);
    }

    let key = policy.verifying_key.as_ref().ok_or_else(|| {
        ModelError::Verification("artifact is signed but no verifying key is configured".into())
    })?;

    let sig_bytes = read(&sig_path)?;
    let sig_bytes: [u8; 64] = sig_bytes.as_slice().try_into().map_err(|_| {
        ModelError::Verification("Invalid signature length (expected 64 bytes)".into())
    })?;
    let signature = Signature::from_bytes(&sig_bytes);

    let manifest_bytes = read(&manifest_path)?;
    key.verify(&manifest_bytes, &signature)
        .map_err(|_| ModelError::Verification("Invalid model signature".into()))?;

    let manifest: SignedManifest = serde_json::from_slice(&manifest_bytes)
        .map_err(|e| ModelError::Verification(format!("Invalid {MANIFEST_FILE} format: {e}")))?;
    check_manifest(&manifest, chrono::Utc::now().timestamp())?;

    let artifact_name = artifact
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ModelError::Verification("artifact path has no file name".into()))?;
    if !manifest.files.contains_key(artifact_name) {
        return Err(ModelError::Verification(format!(
            "{MANIFEST_FILE} does not bind {artifact_name}"
        )));
    }

    for (rel, expected_hex) in &manifest.files {
        let rel_path = Path::new(rel);
        if !rel_path
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(ModelError::Verification(format!(
                "{MANIFEST_FILE} lists a path outside the artifact directory: {rel}"
            )));
        }
        let actual_hex = sha256_hex(&read(&base_dir.join(rel_path))?);
        if !constant_time_eq_str(&actual_hex, &expected_hex.to_ascii_lowercase()) {
            return Err(ModelError::Verification(format!(
                "File hash mismatch for {rel}"
            )));
        }
    }

    tracing::info!(serial = manifest.serial, "Model artifact signature verified");
    Ok(Verification::Signed {
        serial: manifest.serial,
    })
}

fn check_manifest(manifest: &SignedManifest, now: i64) -> Result<(), ModelError> {
    if manifest.version != MANIFEST_VERSION {
        return Err(ModelError::Verification(format!(
            "Unsupported manifest version: {}",
            manifest.version
        )));
    }
    if manifest.created_at > now + MAX_FUTURE_SKEW_SECS {
        return Err(ModelError::Verification(
            "manifest created_at is in the future".into(),
        ));
    }
    let nonce = base64::engine::general_purpose::STANDARD
        .decode(manifest.nonce_b64.trim())
        .map_err(|e| ModelError::Verification(format!("Invalid nonce base64: {e}")))?;
    if nonce.len() != 16 {
        return Err(ModelError::Verification(
            "nonce must decode to exactly 16 bytes".into(),
        ));
    }
    if manifest.files.is_empty() {
        return Err(ModelError::Verification(format!(
            "{MANIFEST_FILE} contains no files"
        )));
    }
    Ok(())
}

fn read(path: &Path) -> Result<Vec<u8>, ModelError> {
    fs::read(path).map_err(|source| ModelError::Io {
        path: path.display().to_string(),
        source,
    })
}

// Constant-time compare for ASCII hex digests.
fn constant_time_eq_str(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}

//! Signing utility for Partus model artifacts.
//!
//! Writes `manifest.json` and the Ed25519 signature `model.sig` next to an
//! artifact so the predictor can verify it at load time.
//!
//! # Usage
//!
//! ```bash
//! sign_artifact <artifact.json> [--serial <n>]
//! sign_artifact --generate-seed <seed_path> [--out-pub <path>] [--force]
//! ```
//!
//! The signing seed is read from `PARTUS_MODEL_SIGNING_KEY_B64_FILE`, or in
//! debug builds from `PARTUS_MODEL_SIGNING_KEY_B64`. Seed material is zeroized
//! after use and never printed.

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use partus::adapters::json_model::signature::{
    sha256_hex, SignedManifest, MANIFEST_FILE, MANIFEST_VERSION, SIGNATURE_FILE,
};

const KEY_FILE_ENV: &str = "PARTUS_MODEL_SIGNING_KEY_B64_FILE";
const KEY_ENV: &str = "PARTUS_MODEL_SIGNING_KEY_B64";

const USAGE: &str = "Usage:\n  sign_artifact <artifact.json> [--serial <u64>]\n  sign_artifact --generate-seed <seed_path> [--out-pub <path>] [--force]";

#[derive(Zeroize, ZeroizeOnDrop)]
struct Seed([u8; 32]);

#[derive(Debug, PartialEq)]
enum Command {
    Sign {
        artifact: PathBuf,
        serial: Option<u64>,
    },
    GenerateSeed {
        seed_path: PathBuf,
        pub_path: Option<PathBuf>,
        force: bool,
    },
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Command> {
    let mut args = args.into_iter();
    let mut artifact: Option<PathBuf> = None;
    let mut serial: Option<u64> = None;
    let mut seed_path: Option<PathBuf> = None;
    let mut pub_path: Option<PathBuf> = None;
    let mut force = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--serial" => {
                let v = args.next().ok_or_else(|| anyhow!(USAGE))?;
                serial = Some(
                    v.trim()
                        .parse::<u64>()
                        .map_err(|_| anyhow!("--serial must be a u64"))?,
                );
            }
            "--generate-seed" => {
                seed_path = Some(args.next().ok_or_else(|| anyhow!(USAGE))?.into());
            }
            "--out-pub" => {
                pub_path = Some(args.next().ok_or_else(|| anyhow!(USAGE))?.into());
            }
            "--force" => force = true,
            "-h" | "--help" => bail!(USAGE),
            _ if artifact.is_none() && !arg.starts_with("--") => artifact = Some(arg.into()),
            _ => bail!("Unexpected argument `{arg}`\n{USAGE}"),
        }
    }

    match (seed_path, artifact) {
        (Some(seed_path), None) => Ok(Command::GenerateSeed {
            seed_path,
            pub_path,
            force,
        }),
        (None, Some(artifact)) if pub_path.is_none() && !force => {
            Ok(Command::Sign { artifact, serial })
        }
        _ => bail!(USAGE),
    }
}

fn read_signing_seed() -> Result<Seed> {
    let b64: Zeroizing<String> = if let Ok(path) = env::var(KEY_FILE_ENV) {
        Zeroizing::new(
            fs::read_to_string(path.trim())
                .with_context(|| format!("Failed reading signing key file from {KEY_FILE_ENV}"))?,
        )
    } else if cfg!(debug_assertions) {
        Zeroizing::new(
            env::var(KEY_ENV).map_err(|_| anyhow!("Missing signing key: set {KEY_FILE_ENV}"))?,
        )
    } else {
        bail!("Missing signing key: set {KEY_FILE_ENV}");
    };

    let raw = Zeroizing::new(
        general_purpose::STANDARD
            .decode(b64.trim())
            .context("Invalid base64 in signing key")?,
    );
    let bytes: [u8; 32] = raw.as_slice().try_into().map_err(|_| {
        anyhow!(
            "Signing key seed must be 32 bytes after base64 decode (got {})",
            raw.len()
        )
    })?;
    Ok(Seed(bytes))
}

fn build_manifest(artifact: &Path, serial: Option<u64>) -> Result<SignedManifest> {
    let name = artifact
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Artifact path has no file name"))?
        .to_string();
    let bytes = fs::read(artifact).with_context(|| format!("Failed to read {artifact:?}"))?;

    let created_at = chrono::Utc::now().timestamp();
    let mut nonce = [0u8; 16];
    OsRng.fill_bytes(&mut nonce);

    Ok(SignedManifest {
        version: MANIFEST_VERSION,
        serial: serial.unwrap_or_else(|| u64::try_from(created_at).unwrap_or(1)),
        created_at,
        nonce_b64: general_purpose::STANDARD.encode(nonce),
        files: [(name, sha256_hex(&bytes))].into_iter().collect(),
    })
}

fn sign(artifact: &Path, serial: Option<u64>, seed: &Seed) -> Result<(PathBuf, PathBuf)> {
    let dir = artifact
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let signing_key = SigningKey::from_bytes(&seed.0);

    let manifest = build_manifest(artifact, serial)?;
    let manifest_bytes =
        serde_json::to_vec_pretty(&manifest).context("Failed to serialize manifest")?;

    let manifest_path = dir.join(MANIFEST_FILE);
    fs::write(&manifest_path, &manifest_bytes)
        .with_context(|| format!("Failed to write {manifest_path:?}"))?;

    let sig_path = dir.join(SIGNATURE_FILE);
    fs::write(&sig_path, signing_key.sign(&manifest_bytes).to_bytes())
        .with_context(|| format!("Failed to write {sig_path:?}"))?;

    Ok((manifest_path, sig_path))
}

fn write_file(path: &Path, contents: &[u8], mode: u32, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("Refusing to overwrite existing file {path:?}. Use --force.");
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {parent:?}"))?;
    }

    let mut opts = fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = opts
        .open(path)
        .with_context(|| format!("Failed to open {path:?}"))?;
    file.write_all(contents)?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Returns the base64 public key of the new seed.
fn generate_seed(seed_path: &Path, pub_path: Option<&Path>, force: bool) -> Result<String> {
    let mut seed = Seed([0u8; 32]);
    OsRng.fill_bytes(&mut seed.0);

    let seed_b64 = Zeroizing::new(general_purpose::STANDARD.encode(seed.0));
    let pub_b64 =
        general_purpose::STANDARD.encode(SigningKey::from_bytes(&seed.0).verifying_key().as_bytes());

    write_file(seed_path, seed_b64.as_bytes(), 0o600, force)?;
    if let Some(pub_path) = pub_path {
        write_file(pub_path, pub_b64.as_bytes(), 0o644, force)?;
    }
    Ok(pub_b64)
}

fn run() -> Result<()> {
    match parse_args(env::args().skip(1))? {
        Command::Sign { artifact, serial } => {
            let seed = read_signing_seed()?;
            let (manifest_path, sig_path) = sign(&artifact, serial, &seed)?;
            let pub_b64 = general_purpose::STANDARD
                .encode(SigningKey::from_bytes(&seed.0).verifying_key().as_bytes());
            println!("Signed manifest: {manifest_path:?}");
            println!("Wrote signature: {sig_path:?}");
            println!("PUBKEY (base64)={pub_b64}");
        }
        Command::GenerateSeed {
            seed_path,
            pub_path,
            force,
        } => {
            let pub_b64 = generate_seed(&seed_path, pub_path.as_deref(), force)?;
            println!("Wrote signing seed (base64) to {seed_path:?}");
            if let Some(pub_path) = &pub_path {
                println!("Wrote public key (base64) to {pub_path:?}");
            }
            println!("PUBKEY (base64)={pub_b64}");
        }
    }
    Ok(())
}

fn main() -> std::process::ExitCode {
    match run() {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            std::process::ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use partus::adapters::json_model::signature::{
        verify_artifact, verifying_key_from_b64, SignaturePolicy, Verification,
    };

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(
            parse_args(args(&["models/a.json", "--serial", "7"])).expect("parse"),
            Command::Sign {
                artifact: "models/a.json".into(),
                serial: Some(7),
            }
        );
        assert_eq!(
            parse_args(args(&["--generate-seed", "seed.b64", "--out-pub", "pub.b64"]))
                .expect("parse"),
            Command::GenerateSeed {
                seed_path: "seed.b64".into(),
                pub_path: Some("pub.b64".into()),
                force: false,
            }
        );
        assert!(parse_args(args(&[])).is_err());
        assert!(parse_args(args(&["a.json", "--serial", "x"])).is_err());
        assert!(parse_args(args(&["a.json", "b.json"])).is_err());
        assert!(parse_args(args(&["a.json", "--generate-seed", "s"])).is_err());
    }

    #[test]
    fn test_sign_then_verify() {
        let dir = tempfile::tempdir().expect("tempdir");
        let artifact = dir.path().join("delivery_model.json");
        fs::write(&artifact, b"{}").expect("write");

        let seed_path = dir.path().join("keys/seed.b64");
        let pub_b64 = generate_seed(&seed_path, None, false).expect("Should generate");
        assert!(generate_seed(&seed_path, None, false).is_err());

        let seed_b64 = fs::read_to_string(&seed_path).expect("read seed");
        let raw = general_purpose::STANDARD.decode(seed_b64.trim()).expect("b64");
        let seed = Seed(raw.as_slice().try_into().expect("32 bytes"));

        sign(&artifact, Some(42), &seed).expect("Should sign");

        let policy = SignaturePolicy {
            require_signature: true,
            verifying_key: Some(verifying_key_from_b64(&pub_b64).expect("pubkey")),
        };
        assert_eq!(
            verify_artifact(&artifact, &policy).expect("Should verify"),
            Verification::Signed { serial: 42 }
        );
    }
}

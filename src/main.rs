//! Partus: delivery-mode prediction CLI.
//!
//! Reads one JSON request from the first argument (or uses a built-in example
//! payload), prints exactly one JSON object to stdout and exits 0 on success
//! or 1 on failure. Logs go to stderr or a log file, never stdout.

use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use partus::adapters::redact::RedactingMakeWriter;
use partus::adapters::JsonArtifactSource;
use partus::config::{LogMode, Settings};
use partus::domain::ErrorReport;
use partus::ports::{ArtifactSource, ModelArtifact, ModelError};
use partus::{PartusError, PatientInput, PredictionService};

/// Resolves the verification policy at load time, so a bad key setting
/// only fails requests that actually need the model.
struct ConfiguredSource {
    settings: Settings,
}

impl ArtifactSource for ConfiguredSource {
    fn load(&self) -> Result<ModelArtifact, ModelError> {
        let policy = self.settings.signature_policy()?;
        JsonArtifactSource::new(&self.settings.model_path, policy).load()
    }

    fn describe(&self) -> String {
        self.settings.model_path.display().to_string()
    }
}

fn init_logging(settings: &Settings) -> Result<WorkerGuard> {
    let (writer, guard, ansi) = match settings.log_mode {
        LogMode::File => {
            if let Some(parent) = settings.log_file.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {parent:?}"))?;
                }
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&settings.log_file)
                .with_context(|| format!("Failed to open {:?}", settings.log_file))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            (writer, guard, false)
        }
        LogMode::Stderr => {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
            (writer, guard, true)
        }
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(ansi)
                .with_writer(RedactingMakeWriter::new(writer)),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// Run one request and render the stdout document.
fn run<S: ArtifactSource>(service: &PredictionService<S>, payload: Option<&str>) -> (String, bool) {
    let outcome = match payload {
        Some(raw) => service.predict_json(raw),
        None => {
            tracing::warn!("No input payload given, using the built-in example request");
            service.predict(&PatientInput::example())
        }
    };

    let rendered = outcome.and_then(|result| serde_json::to_string(&result).map_err(PartusError::from));
    match rendered {
        Ok(json) => (json, true),
        Err(e) => {
            tracing::error!(kind = ?e.kind(), "{e}");
            let report = ErrorReport::new(e.to_string());
            let json = serde_json::to_string(&report).unwrap_or_else(|_| {
                r#"{"error":"Prediction execution failed","confidence_score":0.0}"#.to_string()
            });
            (json, false)
        }
    }
}

fn main() -> ExitCode {
    let settings = Settings::from_env();
    let _guard = match init_logging(&settings) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Logging disabled: {e:#}");
            None
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() > 1 {
        tracing::warn!(extra = args.len() - 1, "Ignoring extra arguments");
    }

    let service = PredictionService::new(ConfiguredSource { settings });
    let (json, ok) = run(&service, args.first().map(String::as_str));
    println!("{json}");

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use partus::config::MODEL_PATH_ENV;
    use serde_json::Value;

    fn service_for(model_path: &std::path::Path) -> PredictionService<ConfiguredSource> {
        let path = model_path.display().to_string();
        let settings = Settings::from_lookup(move |name| (name == MODEL_PATH_ENV).then(|| path.clone()));
        PredictionService::new(ConfiguredSource { settings })
    }

    fn parse(json: &str) -> Value {
        serde_json::from_str(json).expect("stdout must be JSON")
    }

    #[test]
    fn test_malformed_json_reports_input_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let svc = service_for(&dir.path().join("absent.json"));

        let (json, ok) = run(&svc, Some("{oops"));
        assert!(!ok);
        let doc = parse(&json);
        assert!(doc["error"]
            .as_str()
            .expect("error string")
            .starts_with("Invalid JSON input: "));
        assert_eq!(doc["confidence_score"], 0.0);
    }

    #[test]
    fn test_override_needs_no_model() {
        let dir = tempfile::tempdir().expect("tempdir");
        let svc = service_for(&dir.path().join("absent.json"));

        let (json, ok) = run(&svc, Some(r#"{"placenta_location": "previa"}"#));
        assert!(ok);
        assert_eq!(
            json,
            r#"{"prediction_result":"C-Section","confidence_score":100.0,"model_used":"Clinical_Rule_Exclusion (Placenta Previa)"}"#
        );
    }

    #[test]
    fn test_missing_model_reports_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let svc = service_for(&dir.path().join("absent.json"));

        let (json, ok) = run(&svc, None);
        assert!(!ok);
        let doc = parse(&json);
        assert!(doc["error"]
            .as_str()
            .expect("error string")
            .starts_with("Prediction models failed to load: "));
    }

    #[test]
    fn test_bundled_artifact_predicts() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("models/delivery_model.json");
        let svc = service_for(&path);

        let (json, ok) = run(&svc, None);
        assert!(ok, "{json}");
        let doc = parse(&json);
        assert!(doc["model_used"]
            .as_str()
            .expect("trace")
            .starts_with("Model_A_History"));
        let confidence = doc["confidence_score"].as_f64().expect("confidence");
        assert!((0.0..=100.0).contains(&confidence));

        let first_time = r#"{"previous_cesarean":"No","previous_vaginal_birth":"No","previous_assisted":"No","bishop_score":8,"age":25,"bmi":22,"bp_systolic":110,"bp_diastolic":70,"weight":60,"height":165,"glucoseLevel":90,"gestational_age":39}"#;
        let (json, ok) = run(&svc, Some(first_time));
        assert!(ok, "{json}");
        assert!(parse(&json)["model_used"]
            .as_str()
            .expect("trace")
            .starts_with("Model_B_95_Percent_Accurate"));
    }
}

//! Pneumoscan: chest X-ray pneumonia classification.
//!
//! One-shot command line entry point: classifies a single image file and
//! prints the result. The HTTP request layer lives outside this crate; this
//! binary exists to exercise the full pipeline against a real model.
//!
//! Usage: `pneumoscan <image-path> [patient-id]`

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pneumoscan::adapters::fs::FsArtifactStore;
use pneumoscan::adapters::onnx::OnnxEngine;
use pneumoscan::adapters::sanitize::SanitizingMakeWriter;
use pneumoscan::adapters::sqlite::SqliteStorage;
use pneumoscan::application::{PredictionRequest, PredictionService};
use pneumoscan::config::Settings;
use pneumoscan::domain::ModelConfig;

fn main() -> Result<()> {
    // Logs go to stderr so the classification result on stdout stays
    // machine-readable; PNEUMOSCAN_LOG_MODE=file redirects them to a file.
    let log_mode = std::env::var("PNEUMOSCAN_LOG_MODE").unwrap_or_else(|_| "stderr".to_string());

    let (writer, _guard) = if log_mode == "file" {
        let log_file = std::env::var("PNEUMOSCAN_LOG_FILE")
            .unwrap_or_else(|_| "data/pneumoscan.log".to_string());

        if let Some(parent) = Path::new(&log_file).parent() {
            // Best-effort: don't fail startup just because the directory is missing.
            let _ = std::fs::create_dir_all(parent);
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)?;
        tracing_appender::non_blocking(file)
    } else {
        tracing_appender::non_blocking(std::io::stderr())
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(SanitizingMakeWriter::new(writer)))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(image_path) = args.next() else {
        bail!("usage: pneumoscan <image-path> [patient-id]");
    };
    let patient_id = args
        .next()
        .map(|raw| raw.parse::<i64>().context("patient id must be an integer"))
        .transpose()?;

    let settings = Settings::from_env();
    tracing::info!("Starting pneumoscan with model {}", settings.model_path.display());

    let model_config = ModelConfig::load_or_default(&settings.model_config_path);

    if let Some(parent) = settings.database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let storage = Arc::new(SqliteStorage::new(&settings.database_path)?);
    let artifacts = Arc::new(FsArtifactStore::new(&settings.upload_dir)?);
    let engine = Arc::new(OnnxEngine::new(&settings.model_path, model_config.clone()));

    let service = PredictionService::new(
        engine,
        Arc::clone(&storage),
        Arc::clone(&storage),
        Arc::clone(&storage),
        artifacts,
        &model_config,
    );

    let bytes = std::fs::read(&image_path)
        .with_context(|| format!("failed to read image {image_path}"))?;
    let original_filename = Path::new(&image_path)
        .file_name()
        .and_then(|name| name.to_str());

    let record = service.submit(&PredictionRequest {
        bytes: &bytes,
        content_type: content_type_for(&image_path),
        original_filename,
        patient_id,
        clinical_notes: None,
    })?;

    println!("Prediction:  {}", record.label);
    println!("Confidence:  {:.3}", record.confidence);
    for (class_name, probability) in &record.probabilities {
        println!("  {class_name:<12} {probability:.3}");
    }
    println!("Record id:   {}", record.id);
    println!("Duration:    {:.0} ms", record.inference_seconds * 1000.0);

    Ok(())
}

/// Declared content type from the file extension; the service validates it.
fn content_type_for(path: &str) -> &'static str {
    match Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("bmp") => "image/bmp",
        Some("tif" | "tiff") => "image/tiff",
        _ => "application/octet-stream",
    }
}

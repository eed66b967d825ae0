//! Runtime settings resolved from the environment.
//!
//! Every knob has a sensible default so the application starts with no
//! configuration at all; deployments override via `PNEUMOSCAN_*` variables.

use std::path::PathBuf;

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Path to the ONNX model artifact.
    pub model_path: PathBuf,
    /// Path to the optional sidecar model configuration (JSON).
    pub model_config_path: PathBuf,
    /// Directory where uploaded X-ray images are stored.
    pub upload_dir: PathBuf,
    /// Path to the SQLite database file.
    pub database_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("model/pneumonia_model.onnx"),
            model_config_path: PathBuf::from("model/model_config.json"),
            upload_dir: PathBuf::from("uploads/predictions"),
            database_path: PathBuf::from("data/pneumoscan.db"),
        }
    }
}

impl Settings {
    /// Resolve settings from `PNEUMOSCAN_*` environment variables,
    /// falling back to the defaults for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            model_path: path_env("PNEUMOSCAN_MODEL_PATH", defaults.model_path),
            model_config_path: path_env("PNEUMOSCAN_MODEL_CONFIG_PATH", defaults.model_config_path),
            upload_dir: path_env("PNEUMOSCAN_UPLOAD_DIR", defaults.upload_dir),
            database_path: path_env("PNEUMOSCAN_DATABASE_PATH", defaults.database_path),
        }
    }
}

fn path_env(name: &str, default: PathBuf) -> PathBuf {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => default,
    }
}

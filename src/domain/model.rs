//! Model configuration: class list, input geometry, normalization constants.
//!
//! Loaded once from the sidecar JSON shipped next to the model artifact and
//! immutable afterwards. Every field has a default matching the trained
//! pneumonia classifier so a missing sidecar degrades gracefully.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Execution backends the engine may try, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// NVIDIA CUDA
    Cuda,
    /// Baseline CPU path (always available)
    Cpu,
}

/// Static configuration of the loaded classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Class names in model output order.
    #[serde(default = "default_class_names")]
    pub class_names: Vec<String>,

    /// Square input dimension expected by the model.
    #[serde(default = "default_input_size")]
    pub input_size: u32,

    /// Per-channel normalization mean (RGB).
    #[serde(default = "default_mean")]
    pub mean: [f32; 3],

    /// Per-channel normalization standard deviation (RGB).
    #[serde(default = "default_std")]
    pub std: [f32; 3],

    /// Execution providers to try, most preferred first.
    #[serde(default = "default_providers")]
    pub providers: Vec<ExecutionProvider>,

    /// Decision threshold exported by the training pipeline, if any.
    /// Informational only; classification always follows the argmax.
    #[serde(default)]
    pub confidence_threshold: Option<f64>,
}

fn default_class_names() -> Vec<String> {
    vec!["NORMAL".to_string(), "PNEUMONIA".to_string()]
}

fn default_input_size() -> u32 {
    224
}

// ImageNet statistics, matching the ResNet backbone the model was trained with.
fn default_mean() -> [f32; 3] {
    [0.485, 0.456, 0.406]
}

fn default_std() -> [f32; 3] {
    [0.229, 0.224, 0.225]
}

fn default_providers() -> Vec<ExecutionProvider> {
    vec![ExecutionProvider::Cuda, ExecutionProvider::Cpu]
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            class_names: default_class_names(),
            input_size: default_input_size(),
            mean: default_mean(),
            std: default_std(),
            providers: default_providers(),
            confidence_threshold: None,
        }
    }
}

impl ModelConfig {
    /// Read the sidecar configuration from `path`.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Read the sidecar configuration, falling back to defaults when the
    /// file is absent or unreadable. The fallback is logged, never fatal.
    #[must_use]
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::from_file(path) {
            Ok(config) => {
                tracing::info!("Loaded model config from {}", path.display());
                config
            }
            Err(e) => {
                tracing::warn!(
                    "No usable model config at {} ({e}), using defaults",
                    path.display()
                );
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_trained_model() {
        let config = ModelConfig::default();
        assert_eq!(config.class_names, vec!["NORMAL", "PNEUMONIA"]);
        assert_eq!(config.input_size, 224);
        assert_eq!(config.providers, vec![ExecutionProvider::Cuda, ExecutionProvider::Cpu]);
    }

    #[test]
    fn test_partial_sidecar_fills_defaults() {
        let config: ModelConfig =
            serde_json::from_str(r#"{"input_size": 299, "confidence_threshold": 0.7}"#)
                .expect("Should parse");
        assert_eq!(config.input_size, 299);
        assert_eq!(config.confidence_threshold, Some(0.7));
        assert_eq!(config.class_names, vec!["NORMAL", "PNEUMONIA"]);
        assert!((config.mean[0] - 0.485).abs() < f32::EPSILON);
    }

    #[test]
    fn test_provider_names_are_lowercase() {
        let providers: Vec<ExecutionProvider> =
            serde_json::from_str(r#"["cuda", "cpu"]"#).expect("Should parse");
        assert_eq!(providers, vec![ExecutionProvider::Cuda, ExecutionProvider::Cpu]);
    }
}

//! ONNX adapter: Implementation of InferenceEngine using ONNX Runtime.
//!
//! # Thread Safety
//!
//! The engine is the one shared mutable resource in the system. Readiness
//! lives behind an `RwLock`; taking the write lock doubles as the load-once
//! guard, so exactly one concurrent first-time `load()` builds the session
//! while the others block and then observe the outcome. ONNX Runtime
//! sessions take `&mut self` to run, so the session itself sits in a
//! `Mutex` and inference calls serialize.
//!
//! # Provider Selection
//!
//! Execution providers are registered in the configured preference order
//! (CUDA first by default); ONNX Runtime falls back transparently to the
//! next provider when one is unavailable. Nothing about the chosen provider
//! is observable beyond inference succeeding or failing.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use ndarray::Array4;
use ort::execution_providers::ExecutionProviderDispatch;
use ort::session::Session;
use ort::value::TensorRef;

use crate::domain::{ExecutionProvider, ModelConfig};
use crate::ports::InferenceEngine;

/// Input tensor names probed when the model does not use the default.
const COMMON_INPUT_NAMES: [&str; 5] = ["input", "x", "images", "data", "image"];

/// Error type for engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("model is not loaded")]
    NotLoaded,

    #[error("ONNX Runtime error: {0}")]
    Session(#[from] ort::Error),

    #[error("model output unusable: {0}")]
    Output(String),
}

struct LoadedModel {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

/// ONNX Runtime classifier engine.
pub struct OnnxEngine {
    model_path: PathBuf,
    config: ModelConfig,
    state: RwLock<Option<LoadedModel>>,
}

impl OnnxEngine {
    /// Create an unloaded engine for the model artifact at `model_path`.
    #[must_use]
    pub fn new<P: AsRef<Path>>(model_path: P, config: ModelConfig) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            config,
            state: RwLock::new(None),
        }
    }

    fn execution_providers(&self) -> Vec<ExecutionProviderDispatch> {
        let mut providers = Vec::new();
        for provider in &self.config.providers {
            match provider {
                #[cfg(feature = "cuda")]
                ExecutionProvider::Cuda => {
                    providers
                        .push(ort::execution_providers::CUDAExecutionProvider::default().build());
                }
                #[cfg(not(feature = "cuda"))]
                ExecutionProvider::Cuda => {
                    tracing::debug!(
                        "CUDA provider preferred but the 'cuda' feature is disabled, skipping"
                    );
                }
                ExecutionProvider::Cpu => {
                    providers
                        .push(ort::execution_providers::CPUExecutionProvider::default().build());
                }
            }
        }
        providers
    }

    fn build_session(&self) -> Result<Session, ort::Error> {
        let mut builder = Session::builder()?;
        let providers = self.execution_providers();
        if !providers.is_empty() {
            builder = builder.with_execution_providers(providers)?;
        }
        builder.commit_from_file(&self.model_path)
    }
}

impl InferenceEngine for OnnxEngine {
    type Error = EngineError;

    fn load(&self) -> Result<bool, Self::Error> {
        if self.is_loaded() {
            return Ok(true);
        }

        // The write lock is the load-once guard: one loader proceeds,
        // concurrent callers block here and then see the outcome.
        let mut state = self.state.write().expect("engine state lock poisoned");
        if state.is_some() {
            return Ok(true);
        }

        if !self.model_path.exists() {
            tracing::error!("Model file not found: {}", self.model_path.display());
            return Ok(false);
        }

        let session = match self.build_session() {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(
                    "Failed to create ONNX session for {}: {e}",
                    self.model_path.display()
                );
                return Ok(false);
            }
        };

        let available_inputs: Vec<String> =
            session.inputs.iter().map(|i| i.name.clone()).collect();
        let input_name = COMMON_INPUT_NAMES
            .iter()
            .find(|&&name| available_inputs.iter().any(|input| input == name))
            .map(|&name| name.to_string())
            .or_else(|| available_inputs.first().cloned())
            .ok_or_else(|| EngineError::Output("model declares no inputs".to_string()))?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| EngineError::Output("model declares no outputs".to_string()))?;

        tracing::info!(
            "ONNX model loaded from {} (input: {input_name}, output: {output_name}, classes: {:?})",
            self.model_path.display(),
            self.config.class_names
        );

        *state = Some(LoadedModel {
            session: Mutex::new(session),
            input_name,
            output_name,
        });
        Ok(true)
    }

    fn is_loaded(&self) -> bool {
        self.state
            .read()
            .expect("engine state lock poisoned")
            .is_some()
    }

    fn infer(&self, input: &Array4<f32>) -> Result<Vec<f32>, Self::Error> {
        let state = self.state.read().expect("engine state lock poisoned");
        let loaded = state.as_ref().ok_or(EngineError::NotLoaded)?;

        let tensor = TensorRef::from_array_view(input.view())?;
        let inputs = ort::inputs![loaded.input_name.as_str() => tensor];

        let mut session = loaded.session.lock().expect("session lock poisoned");
        let outputs = session.run(inputs)?;

        let value = outputs.get(loaded.output_name.as_str()).ok_or_else(|| {
            EngineError::Output(format!("model did not emit '{}'", loaded.output_name))
        })?;
        let (_, scores) = value
            .try_extract_tensor::<f32>()
            .map_err(|e| EngineError::Output(format!("output is not an f32 tensor: {e}")))?;

        Ok(scores.to_vec())
    }
}

//! # Pneumoscan
//!
//! Chest X-ray pneumonia classification with a clinical review workflow.
//!
//! This crate provides:
//! - An ONNX-backed inference pipeline (decode/normalize, forward pass,
//!   probability postprocessing)
//! - A prediction record lifecycle (creation, clinical review, deletion)
//! - Patient, audit-trail and reporting glue behind narrow storage ports
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core business types (predictions, patients, the numeric pipeline)
//! - `ports`: Trait definitions for external operations
//! - `adapters`: Concrete implementations (ONNX Runtime, SQLite, file system)
//! - `application`: Use cases orchestrating domain and ports

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use domain::{InferenceResult, ModelConfig, PredictionRecord, ReviewState};

/// Result type for Pneumoscan operations
pub type Result<T> = std::result::Result<T, PneumoscanError>;

/// Main error type for Pneumoscan
#[derive(Debug, thiserror::Error)]
pub enum PneumoscanError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Unexpected image shape: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },

    #[error("Model not loaded: {0}")]
    ModelNotLoaded(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage operation failed: {0}")]
    Storage(#[from] adapters::StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

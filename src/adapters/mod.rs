//! Adapters layer: Concrete implementations of ports.
//!
//! These modules contain the actual integration with external libraries:
//! - `onnx`: ONNX Runtime for classifier inference
//! - `sqlite`: SQLite for prediction, patient and audit persistence
//! - `fs`: upload-directory artifact storage
//! - `sanitize`: PII filtering for logs

pub mod fs;
pub mod onnx;
pub mod sanitize;
pub mod sqlite;

// Re-export the adapter error types for lib.rs
pub use onnx::EngineError;
pub use sqlite::StorageError;

//! Domain layer: Core business types and the numeric inference pipeline.
//!
//! Preprocessing and postprocessing are pure functions of their inputs;
//! everything here is serializable and validated at the boundary.

mod audit;
mod model;
mod patient;
mod postprocess;
mod prediction;
mod preprocess;

pub use audit::{AuditAction, AuditEvent};
pub use model::{ExecutionProvider, ModelConfig};
pub use patient::{NewPatient, Patient, PatientUpdate};
pub use postprocess::ResultPostprocessor;
pub use prediction::{new_record_id, InferenceResult, PredictionRecord, ReviewState};
pub use preprocess::{ImagePreprocessor, PreprocessedImage};

//! Inference engine port: Trait for classifier execution backends.
//!
//! This trait abstracts the inference runtime (ONNX Runtime) from the
//! application logic.

use ndarray::Array4;

/// Trait for a loaded image classifier.
///
/// Implementations own their readiness state: loading happens at most once
/// per engine, is safe under concurrent first-time invocation, and a failed
/// load leaves the engine unloaded rather than poisoned.
pub trait InferenceEngine: Send + Sync {
    /// Error type for engine operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Locate and load the model artifact.
    ///
    /// Returns `Ok(true)` on success and on every call after a success
    /// (load-once, no reloading). Returns `Ok(false)` when the artifact is
    /// unavailable; the failure is logged and the engine stays unloaded.
    ///
    /// # Errors
    /// Returns error only for failures that are not a plain "model
    /// unavailable" outcome.
    fn load(&self) -> Result<bool, Self::Error>;

    /// Current readiness.
    fn is_loaded(&self) -> bool;

    /// Execute a single forward pass over a preprocessed batch-of-one
    /// tensor, returning the raw class scores.
    ///
    /// Implementations must be safe to call concurrently; if the underlying
    /// execution context is not, calls are serialized internally.
    ///
    /// # Errors
    /// Fails fast when the engine is not loaded, or when the runtime
    /// rejects the input.
    fn infer(&self, input: &Array4<f32>) -> Result<Vec<f32>, Self::Error>;
}

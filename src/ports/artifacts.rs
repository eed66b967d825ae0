//! Artifact store port: Trait for the uploaded-image directory.

use std::path::PathBuf;

/// Trait for storing uploaded image artifacts.
///
/// Callers are responsible for choosing collision-resistant names (the
/// prediction service derives them from the record's UUID) so concurrent
/// uploads never overwrite one another.
pub trait ArtifactStore: Send + Sync {
    /// Error type for artifact operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Persist `bytes` under `filename` and return the full path.
    ///
    /// # Errors
    /// Returns error if the name is unsafe or the write fails.
    fn store(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, Self::Error>;

    /// Remove a stored artifact.
    ///
    /// # Returns
    /// `false` if no artifact with that name exists.
    ///
    /// # Errors
    /// Returns error if the removal fails.
    fn remove(&self, filename: &str) -> Result<bool, Self::Error>;

    /// Full path an artifact is (or would be) stored at.
    fn path(&self, filename: &str) -> PathBuf;
}

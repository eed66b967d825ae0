//! File system adapter: Implementation of ArtifactStore.
//!
//! Stores uploaded X-ray images under a flat directory. Names are chosen by
//! the caller (UUID-derived), so the only job here is safe, ordinary file
//! IO plus a guard against path traversal in artifact names.

use std::path::{Path, PathBuf};

use crate::ports::ArtifactStore;

/// Artifact store backed by a local upload directory.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Create the store, creating the upload directory if needed.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created.
    pub fn new<P: AsRef<Path>>(root: P) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn checked_path(&self, filename: &str) -> std::io::Result<PathBuf> {
        let safe = !filename.is_empty()
            && filename
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
            && !filename.contains("..");
        if !safe {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("unsafe artifact name: {filename:?}"),
            ));
        }
        Ok(self.root.join(filename))
    }
}

impl ArtifactStore for FsArtifactStore {
    type Error = std::io::Error;

    fn store(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, Self::Error> {
        let path = self.checked_path(filename)?;
        std::fs::write(&path, bytes)?;
        tracing::debug!("Stored artifact {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    fn remove(&self, filename: &str) -> Result<bool, Self::Error> {
        let path = self.checked_path(filename)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn path(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }
}

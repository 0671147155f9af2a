//! File-backed persistence for engine state blobs.
//!
//! Writes overwrite the file in place. A crash mid-write can leave a
//! truncated file behind; what is guaranteed is that a failed or short write
//! is reported as [`AppError::Storage`] rather than accepted.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::models::state::StateBlob;
use crate::{AppError, Result};

/// State file location plus the load/save/clear operations on it.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Create a store for the given state file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted blob.
    ///
    /// Returns `Ok(None)` when no state file exists.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the file exists but cannot be read.
    pub async fn load(&self) -> Result<Option<StateBlob>> {
        match fs::read(&self.path).await {
            Ok(bytes) => {
                debug!(path = %self.path.display(), bytes = bytes.len(), "state file loaded");
                Ok(Some(StateBlob::new(bytes)))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(AppError::Storage(format!(
                "cannot read state file {}: {err}",
                self.path.display()
            ))),
        }
    }

    /// Overwrite the state file with `blob`.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if any step fails or the file length after
    /// the write differs from the blob length.
    pub async fn save(&self, blob: &StateBlob) -> Result<()> {
        let storage_err = |what: &str, err: std::io::Error| {
            AppError::Storage(format!("{what} {}: {err}", self.path.display()))
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| storage_err("cannot create directory for", err))?;
        }

        let mut file = fs::File::create(&self.path)
            .await
            .map_err(|err| storage_err("cannot create state file", err))?;
        file.write_all(blob.as_bytes())
            .await
            .map_err(|err| storage_err("cannot write state file", err))?;
        file.flush()
            .await
            .map_err(|err| storage_err("cannot flush state file", err))?;
        file.sync_all()
            .await
            .map_err(|err| storage_err("cannot sync state file", err))?;

        let written = file
            .metadata()
            .await
            .map_err(|err| storage_err("cannot stat state file", err))?
            .len();
        if written != blob.len() as u64 {
            return Err(AppError::Storage(format!(
                "short write to {}: {written} of {} bytes",
                self.path.display(),
                blob.len()
            )));
        }

        info!(path = %self.path.display(), bytes = blob.len(), "state saved");
        Ok(())
    }

    /// Remove the state file so the next session starts fresh.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the file exists but cannot be removed.
    pub async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "persisted state cleared");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AppError::Storage(format!(
                "cannot remove state file {}: {err}",
                self.path.display()
            ))),
        }
    }
}

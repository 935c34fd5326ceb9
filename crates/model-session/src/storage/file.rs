//! Local snapshot files.
//!
//! Directory structure:
//! ```text
//! {root}/
//!   {snapshot_string}/
//!     {model_name}_{idx}_model.json          # Model artifact
//!     {model_name}_{idx}_request_list.json   # File backend only
//! ```

use std::path::{Path, PathBuf};

use model_session_core::RequestRecord;
use tokio::{fs, io::AsyncWriteExt};

use super::{StorageError, StorageResult};
use crate::model::ARTIFACT_EXTENSION;

/// Paths of one snapshot's artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    pub model: PathBuf,
    pub request_list: PathBuf,
}

/// Snapshot files under a root folder.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Create a file storage rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root folder.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder holding every snapshot of one lineage.
    #[must_use]
    pub fn lineage_dir(&self, snapshot_string: &str) -> PathBuf {
        self.root.join(snapshot_string)
    }

    /// Artifact paths for `snapshot_id` (`{model_name}_{idx}`).
    #[must_use]
    pub fn snapshot_paths(&self, snapshot_string: &str, snapshot_id: &str) -> SnapshotPaths {
        let dir = self.lineage_dir(snapshot_string);
        SnapshotPaths {
            model: dir.join(format!("{snapshot_id}_model.{ARTIFACT_EXTENSION}")),
            request_list: dir.join(format!("{snapshot_id}_request_list.{ARTIFACT_EXTENSION}")),
        }
    }

    /// Create the lineage folder if this is the lineage's first snapshot.
    ///
    /// # Errors
    /// Returns error if the folder cannot be created.
    pub async fn ensure_lineage_dir(&self, snapshot_string: &str) -> StorageResult<PathBuf> {
        let dir = self.lineage_dir(snapshot_string);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io(&dir, e))?;
        Ok(dir)
    }

    /// Write a request list; refuses to replace an existing snapshot.
    ///
    /// # Errors
    /// Returns error if the file exists or cannot be written.
    pub async fn write_request_list(
        &self,
        path: &Path,
        records: &[RequestRecord],
    ) -> StorageResult<()> {
        let bytes =
            serde_json::to_vec(records).map_err(|e| StorageError::Serialization(e.to_string()))?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    StorageError::SnapshotCollision(path.to_path_buf())
                } else {
                    StorageError::io(path, e)
                }
            })?;
        file.write_all(&bytes)
            .await
            .map_err(|e| StorageError::io(path, e))?;
        file.sync_all().await.map_err(|e| StorageError::io(path, e))?;
        Ok(())
    }

    /// Read a request list written by [`FileStorage::write_request_list`].
    ///
    /// # Errors
    /// Returns error if the file is missing or malformed.
    pub async fn read_request_list(&self, path: &Path) -> StorageResult<Vec<RequestRecord>> {
        let bytes = fs::read(path).await.map_err(|e| StorageError::io(path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

//! Snapshot folder preparation and rotation.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use model_session_core::config::FolderRotation;
use tokio::fs;

use super::{StorageError, StorageResult};

/// Prepare the snapshot root under `base` for `today`.
///
/// With [`FolderRotation::Daily`] the root is `base/YYYY-MM-DD`; the first
/// call on a new day removes everything else under `base`.
///
/// # Errors
/// Returns error if folders cannot be created or stale ones removed.
pub async fn prepare_storage_root(
    base: &Path,
    rotation: FolderRotation,
    today: NaiveDate,
) -> StorageResult<PathBuf> {
    match rotation {
        FolderRotation::None => {
            fs::create_dir_all(base)
                .await
                .map_err(|e| StorageError::io(base, e))?;
            Ok(base.to_path_buf())
        }
        FolderRotation::Daily => {
            let dated = base.join(today.format("%Y-%m-%d").to_string());
            if fs::try_exists(&dated).await.map_err(|e| StorageError::io(&dated, e))? {
                return Ok(dated);
            }

            let removed = clear_dir(base).await?;
            if removed > 0 {
                tracing::info!(base = %base.display(), removed, "Removed stale session folders");
            }
            fs::create_dir_all(&dated)
                .await
                .map_err(|e| StorageError::io(&dated, e))?;
            Ok(dated)
        }
    }
}

async fn clear_dir(dir: &Path) -> StorageResult<usize> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(StorageError::io(dir, e)),
    };

    let mut removed = 0;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StorageError::io(dir, e))?
    {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        let result = if file_type.is_dir() {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };
        result.map_err(|e| StorageError::io(&path, e))?;
        removed += 1;
    }
    Ok(removed)
}

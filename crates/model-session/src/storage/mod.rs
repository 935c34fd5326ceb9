//! Storage backends.
//!
//! A session is configured with exactly one backend:
//! - `File` - model snapshots and request logs as local files
//! - `Table` - model snapshots as local files, lineage and interactions in a table service
//! - `None` - persistence disabled

pub mod file;
#[cfg(feature = "http")]
pub mod http;
pub mod memory;
pub mod rotation;
pub mod table;

use std::{path::Path, sync::Arc};

use chrono::NaiveDate;
use model_session_core::config::StorageConfig;
pub use model_session_core::traits::{StorageError, TableEntity, TableService};

pub use file::{FileStorage, SnapshotPaths};
#[cfg(feature = "http")]
pub use http::HttpTableService;
pub use memory::MemoryTableService;
pub use rotation::prepare_storage_root;
pub use table::{Lineage, TableStorage};

/// Convenience type alias for storage results.
pub type StorageResult<T> = Result<T, StorageError>;

/// Outcome of a best-effort durable write.
#[derive(Debug)]
pub enum Persistence {
    /// Kept in memory until the next save.
    Buffered,
    /// Written to the table service.
    Stored,
    /// No backend wanted this write.
    Skipped,
    /// The write failed; the failure has been logged.
    Failed(StorageError),
}

impl Persistence {
    /// Whether the write failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// The durability mechanism a session writes through.
#[derive(Debug, Clone, Default)]
pub enum StorageBackend {
    #[default]
    None,
    File(FileStorage),
    Table(TableStorage),
}

impl StorageBackend {
    /// Build the backend described by `config`, preparing its snapshot folder for `today`.
    ///
    /// # Errors
    /// Returns error if the snapshot folder cannot be prepared or the table
    /// service cannot be constructed.
    pub async fn from_config(config: &StorageConfig, today: NaiveDate) -> StorageResult<Self> {
        match config {
            StorageConfig::None => Ok(Self::None),
            StorageConfig::File(file) => {
                let root = prepare_storage_root(&file.root, file.rotation, today).await?;
                Ok(Self::File(FileStorage::new(root)))
            }
            StorageConfig::Table(table) => {
                let root = prepare_storage_root(&table.root, table.rotation, today).await?;
                let service = table_service(&table.endpoint, table.sas_token.clone())?;
                Ok(Self::Table(
                    TableStorage::new(FileStorage::new(root), service)
                        .with_tables(&table.sessions_table, &table.interactions_table)
                        .with_partitions(table.partitions),
                ))
            }
        }
    }

    /// Snapshot folder, when persistence is enabled.
    #[must_use]
    pub fn root(&self) -> Option<&Path> {
        self.files().map(FileStorage::root)
    }

    /// Local snapshot files, shared by the file and table backends.
    #[must_use]
    pub const fn files(&self) -> Option<&FileStorage> {
        match self {
            Self::None => None,
            Self::File(files) => Some(files),
            Self::Table(table) => Some(table.files()),
        }
    }

    /// Short name for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::File(_) => "file",
            Self::Table(_) => "table",
        }
    }
}

#[cfg(feature = "http")]
fn table_service(endpoint: &str, sas_token: Option<String>) -> StorageResult<Arc<dyn TableService>> {
    Ok(Arc::new(HttpTableService::new(endpoint, sas_token)?))
}

#[cfg(not(feature = "http"))]
fn table_service(_endpoint: &str, _sas_token: Option<String>) -> StorageResult<Arc<dyn TableService>> {
    Err(StorageError::Internal(
        "table storage requires the `http` feature".to_string(),
    ))
}

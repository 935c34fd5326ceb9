//! Static configuration for session construction.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

/// Where the model executes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Model runs inside this process.
    #[default]
    Local,
    /// Model runs in a separately provisioned worker.
    Remote,
}

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub run_mode: RunMode,
    pub model: ModelConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Model artifact and execution parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model kind, passed to remote workers.
    #[serde(default = "default_model_kind")]
    pub kind: String,
    /// Path of the base model artifact.
    pub artifact_path: PathBuf,
    /// Embedding layer index; negative values count from the end.
    #[serde(default = "default_fine_tune_layer")]
    pub fine_tune_layer: i32,
    /// Target execution device id.
    #[serde(default)]
    pub device: u32,
    /// Optional samples applied after every hard reset.
    #[serde(default)]
    pub seed_data_path: Option<PathBuf>,
}

impl ModelConfig {
    /// Create a model config with defaults for everything but the artifact.
    #[must_use]
    pub fn new(artifact_path: impl Into<PathBuf>) -> Self {
        Self {
            kind: default_model_kind(),
            artifact_path: artifact_path.into(),
            fine_tune_layer: default_fine_tune_layer(),
            device: 0,
            seed_data_path: None,
        }
    }
}

/// Durable storage selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Persistence disabled.
    #[default]
    None,
    /// Snapshots and request logs as local files.
    File(FileStorageConfig),
    /// Snapshots as local files, interactions in a remote table service.
    Table(TableStorageConfig),
}

/// Local snapshot folder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStorageConfig {
    pub root: PathBuf,
    #[serde(default)]
    pub rotation: FolderRotation,
}

/// Remote table service settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStorageConfig {
    /// Local folder for model snapshots.
    pub root: PathBuf,
    #[serde(default)]
    pub rotation: FolderRotation,
    /// Table service endpoint, e.g. `https://account.table.core.windows.net`.
    pub endpoint: String,
    /// Shared access signature appended as the query string.
    #[serde(default)]
    pub sas_token: Option<String>,
    #[serde(default = "default_sessions_table")]
    pub sessions_table: String,
    #[serde(default = "default_interactions_table")]
    pub interactions_table: String,
    /// Number of partitions lineage entities are spread across.
    #[serde(default = "default_partitions")]
    pub partitions: u32,
}

/// Storage folder rotation policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderRotation {
    /// Use the configured root as is.
    #[default]
    None,
    /// One dated folder per day; older folders are removed when a new day starts.
    Daily,
}

/// Remote worker launch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Base command, split with shell-word rules.
    #[serde(default = "default_worker_command")]
    pub command: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            command: default_worker_command(),
        }
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl SessionConfig {
    /// Create a config for the given run mode and model with storage disabled.
    #[must_use]
    pub fn new(run_mode: RunMode, model: ModelConfig) -> Self {
        Self {
            run_mode,
            model,
            storage: StorageConfig::None,
            worker: WorkerConfig::default(),
        }
    }

    /// Set the storage backend.
    #[must_use]
    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    /// Load from a YAML file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed or validated.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_yaml_str(&contents)?;
        tracing::debug!(path = %path.display(), run_mode = ?config.run_mode, "Loaded session config");
        Ok(config)
    }

    /// Parse from YAML text.
    ///
    /// # Errors
    /// Returns error if the text is not a valid config.
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let StorageConfig::Table(table) = &self.storage {
            if table.partitions == 0 {
                return Err(ConfigError::Invalid(
                    "storage.partitions must be at least 1".to_string(),
                ));
            }
            if table.endpoint.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "storage.endpoint must not be empty".to_string(),
                ));
            }
        }
        if self.run_mode == RunMode::Remote && self.worker.command.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "worker.command must not be empty in remote mode".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Serde Defaults
// ============================================================================

fn default_model_kind() -> String {
    "dense_fine_tune".to_string()
}

const fn default_fine_tune_layer() -> i32 {
    -2
}

fn default_sessions_table() -> String {
    "webtoolsessions".to_string()
}

fn default_interactions_table() -> String {
    "webtoolinteractions".to_string()
}

const fn default_partitions() -> u32 {
    8
}

fn default_worker_command() -> String {
    "model-session-worker".to_string()
}

//! Core traits for table storage, remote models and worker provisioning.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{Fields, config::ModelConfig};

// ============================================================================
// Storage
// ============================================================================

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Snapshot already exists: {0}")]
    SnapshotCollision(PathBuf),
    #[error("Entity {partition_key}/{row_key} already exists in table {table}")]
    Conflict {
        table: String,
        partition_key: String,
        row_key: String,
    },
    #[error("Table service returned {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Table service unreachable: {0}")]
    Transport(String),
    #[error("Storage error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A flat entity for table storage.
#[derive(Debug, Clone, PartialEq)]
pub struct TableEntity {
    pub partition_key: String,
    pub row_key: String,
    /// Scalar-only properties.
    pub properties: Fields,
}

impl TableEntity {
    /// Create an entity with no properties.
    #[must_use]
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            properties: Fields::new(),
        }
    }

    /// Add a property; `null` values are skipped.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        if !value.is_null() {
            self.properties.insert(key.into(), value);
        }
        self
    }

    /// Render as the service's JSON body.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut body = self.properties.clone();
        body.insert(
            "PartitionKey".to_string(),
            Value::String(self.partition_key.clone()),
        );
        body.insert("RowKey".to_string(), Value::String(self.row_key.clone()));
        Value::Object(body)
    }
}

/// Trait for structured table storage services.
#[async_trait]
pub trait TableService: Send + Sync {
    /// Insert an entity into `table`.
    async fn insert_entity(&self, table: &str, entity: TableEntity) -> Result<(), StorageError>;
}

// ============================================================================
// Remote model
// ============================================================================

/// One labelled fine-tuning example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub input: Vec<f32>,
    pub label: usize,
}

/// Operation forwarded to a remote model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ModelCall {
    Reset,
    Predict { inputs: Vec<Vec<f32>> },
    FineTune { samples: Vec<Sample> },
    Save { path: PathBuf },
    Restore { path: PathBuf },
}

/// Reply from a remote model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum ModelReply {
    Ack,
    Predictions { outputs: Vec<Vec<f32>> },
}

/// Remote model channel error.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("No worker is serving session {0}")]
    Unavailable(String),
    #[error("Remote model failed: {0}")]
    Remote(String),
    #[error("Channel error: {0}")]
    Transport(String),
}

/// Transport to a model hosted by a worker, addressed by session id.
#[async_trait]
pub trait ModelChannel: Send + Sync {
    /// Send one call and wait for its reply.
    async fn call(&self, session_id: &str, call: ModelCall) -> Result<ModelReply, ChannelError>;
}

// ============================================================================
// Workers
// ============================================================================

/// What a worker needs to host a session's model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    pub session_id: String,
    pub model: ModelConfig,
}

/// Worker error.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),
    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),
    #[error("Command build error: {0}")]
    CommandBuild(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No worker running for session {0}")]
    NotRunning(String),
}

/// A provisioned execution context hosting one session's model.
#[async_trait]
pub trait Worker: Send + Sync {
    /// OS process id, when the worker is a local process.
    fn id(&self) -> Option<u32>;

    /// Forcibly stop the worker.
    async fn terminate(&mut self) -> Result<(), WorkerError>;
}

/// Trait for worker provisioners (local subprocess today, VMs later).
#[async_trait]
pub trait WorkerProvisioner: Send + Sync {
    /// Start a worker for `spec`.
    async fn provision(&self, spec: &WorkerSpec) -> Result<Box<dyn Worker>, WorkerError>;
}

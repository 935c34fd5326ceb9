//! Session error type.

use std::path::PathBuf;

use model_session_core::{
    reference::ReferenceError,
    traits::{StorageError, WorkerError},
};
use thiserror::Error;

use crate::model::ModelError;

/// Session error.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Interaction record has no `experiment` field")]
    MissingExperiment,
    #[error("Snapshot already exists: {0}")]
    SnapshotCollision(PathBuf),
    #[error("Model has been released")]
    ModelReleased,
    #[error("Remote run mode needs a model channel")]
    MissingModelChannel,
    #[error("No worker provisioner configured")]
    NoProvisioner,
    #[error("Invalid model reference: {0}")]
    InvalidReference(#[from] ReferenceError),
    #[error("Request list lock poisoned")]
    Poisoned,
    #[error("Storage error: {0}")]
    Storage(StorageError),
    #[error("Model error: {0}")]
    Model(ModelError),
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::SnapshotCollision(path) => Self::SnapshotCollision(path),
            other => Self::Storage(other),
        }
    }
}

impl From<ModelError> for SessionError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::ArtifactExists(path) => Self::SnapshotCollision(path),
            other => Self::Model(other),
        }
    }
}

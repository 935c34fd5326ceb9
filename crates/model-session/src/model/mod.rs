//! Model handles.
//!
//! A session owns exactly one [`ModelHandle`]: either a model running in this
//! process or a proxy to a worker hosting it.

pub mod local;
pub mod remote;

use std::path::{Path, PathBuf};

use model_session_core::traits::{ChannelError, Sample};
use thiserror::Error;

pub use local::{DenseLayer, DenseNetwork, LocalModel};
pub use remote::RemoteModelProxy;

/// File extension of model snapshots.
pub const ARTIFACT_EXTENSION: &str = "json";

/// Model error.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot decode model artifact {path}: {message}")]
    Decode { path: PathBuf, message: String },
    #[error("Artifact {path} has format {found}, not a local model snapshot")]
    IncompatibleArtifact { path: PathBuf, found: String },
    #[error("Artifact already exists: {0}")]
    ArtifactExists(PathBuf),
    #[error("Input has {found} features, model expects {expected}")]
    Shape { expected: usize, found: usize },
    #[error("Fine-tune layer {layer} must name the layer before the head of a {layers}-layer model")]
    UnsupportedFineTuneLayer { layer: i32, layers: usize },
    #[error("Label {label} out of range for {classes} classes")]
    LabelOutOfRange { label: usize, classes: usize },
    #[error("Remote model error: {0}")]
    Remote(#[from] ChannelError),
    #[error("Unexpected reply from remote model: {0}")]
    UnexpectedReply(String),
}

impl ModelError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn decode(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Handle over the inference model, local or remote.
#[derive(Debug)]
pub enum ModelHandle {
    Local(LocalModel),
    Remote(RemoteModelProxy),
}

impl ModelHandle {
    /// Whether the model runs in this process.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// Class probabilities for each input.
    ///
    /// # Errors
    /// Returns error if the model rejects the inputs or the worker call fails.
    pub async fn predict(&self, inputs: &[Vec<f32>]) -> Result<Vec<Vec<f32>>, ModelError> {
        match self {
            Self::Local(model) => model.predict(inputs),
            Self::Remote(proxy) => proxy.predict(inputs).await,
        }
    }

    /// Fine-tune on labelled samples.
    ///
    /// # Errors
    /// Returns error if the model rejects the samples or the worker call fails.
    pub async fn fine_tune(&mut self, samples: &[Sample]) -> Result<(), ModelError> {
        match self {
            Self::Local(model) => model.fine_tune(samples),
            Self::Remote(proxy) => proxy.fine_tune(samples).await,
        }
    }

    /// Discard learned state. Never fails from the caller's point of view.
    pub async fn reset(&mut self) {
        match self {
            Self::Local(model) => model.reset(),
            Self::Remote(proxy) => proxy.reset().await,
        }
    }

    /// Persist the model to `path`.
    ///
    /// # Errors
    /// Returns error if the artifact already exists or cannot be written.
    pub async fn save(&self, path: &Path) -> Result<(), ModelError> {
        match self {
            Self::Local(model) => model.save(path).await,
            Self::Remote(proxy) => proxy.save(path).await,
        }
    }

    /// Build the handle that replaces this one after loading `path`.
    ///
    /// # Errors
    /// Returns error if the artifact cannot be restored by this kind of model.
    pub async fn restore(&self, path: &Path) -> Result<Self, ModelError> {
        match self {
            Self::Local(_) => Ok(Self::Local(LocalModel::restore(path).await?)),
            Self::Remote(proxy) => {
                proxy.restore(path).await?;
                Ok(Self::Remote(proxy.clone()))
            }
        }
    }
}

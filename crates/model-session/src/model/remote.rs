//! Proxy for a model hosted by a worker.

use std::{path::Path, sync::Arc};

use model_session_core::traits::{ModelCall, ModelChannel, ModelReply, Sample};

use super::ModelError;

/// Forwards model operations to the worker serving `session_id`.
#[derive(Clone)]
pub struct RemoteModelProxy {
    session_id: String,
    channel: Arc<dyn ModelChannel>,
}

impl std::fmt::Debug for RemoteModelProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteModelProxy")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl RemoteModelProxy {
    /// Bind a proxy to a session.
    #[must_use]
    pub fn new(session_id: impl Into<String>, channel: Arc<dyn ModelChannel>) -> Self {
        Self {
            session_id: session_id.into(),
            channel,
        }
    }

    /// Session this proxy addresses.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Class probabilities for each input.
    ///
    /// # Errors
    /// Returns error if the call fails or the reply carries no predictions.
    pub async fn predict(&self, inputs: &[Vec<f32>]) -> Result<Vec<Vec<f32>>, ModelError> {
        match self
            .send(ModelCall::Predict {
                inputs: inputs.to_vec(),
            })
            .await?
        {
            ModelReply::Predictions { outputs } => Ok(outputs),
            ModelReply::Ack => Err(ModelError::UnexpectedReply("ack".to_string())),
        }
    }

    /// Fine-tune the remote model.
    ///
    /// # Errors
    /// Returns error if the call fails.
    pub async fn fine_tune(&self, samples: &[Sample]) -> Result<(), ModelError> {
        self.expect_ack(ModelCall::FineTune {
            samples: samples.to_vec(),
        })
        .await
    }

    /// Reset the remote model. Failures are logged, never returned.
    pub async fn reset(&self) {
        if let Err(e) = self.expect_ack(ModelCall::Reset).await {
            tracing::warn!(session_id = %self.session_id, error = %e, "Remote model reset failed");
        }
    }

    /// Ask the worker to write a snapshot to `path`.
    ///
    /// # Errors
    /// Returns error if the call fails.
    pub async fn save(&self, path: &Path) -> Result<(), ModelError> {
        self.expect_ack(ModelCall::Save {
            path: path.to_path_buf(),
        })
        .await
    }

    /// Ask the worker to load the snapshot at `path`.
    ///
    /// # Errors
    /// Returns error if the call fails.
    pub async fn restore(&self, path: &Path) -> Result<(), ModelError> {
        self.expect_ack(ModelCall::Restore {
            path: path.to_path_buf(),
        })
        .await
    }

    async fn send(&self, call: ModelCall) -> Result<ModelReply, ModelError> {
        Ok(self.channel.call(&self.session_id, call).await?)
    }

    async fn expect_ack(&self, call: ModelCall) -> Result<(), ModelError> {
        match self.send(call).await? {
            ModelReply::Ack => Ok(()),
            ModelReply::Predictions { .. } => {
                Err(ModelError::UnexpectedReply("predictions".to_string()))
            }
        }
    }
}

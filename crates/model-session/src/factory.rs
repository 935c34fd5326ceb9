//! Session construction.

use std::sync::Arc;

use chrono::Local;
use model_session_core::{
    RunMode, SessionConfig,
    traits::{ModelChannel, WorkerProvisioner},
};
use model_session_worker::ProcessProvisioner;

use crate::{
    error::SessionError,
    model::{LocalModel, ModelHandle, RemoteModelProxy},
    session::Session,
    storage::StorageBackend,
};

/// Builds sessions for one run mode and static configuration.
pub struct SessionFactory {
    config: SessionConfig,
    storage: StorageBackend,
    channel: Option<Arc<dyn ModelChannel>>,
    provisioner: Arc<dyn WorkerProvisioner>,
}

impl SessionFactory {
    /// Create a factory; remote workers are spawned as local processes.
    #[must_use]
    pub fn new(config: SessionConfig, storage: StorageBackend) -> Self {
        let provisioner = Arc::new(ProcessProvisioner::new(config.worker.clone()));
        Self {
            config,
            storage,
            channel: None,
            provisioner,
        }
    }

    /// Create a factory whose storage backend is built from `config`.
    ///
    /// # Errors
    /// Returns error if the storage folder or table client cannot be set up.
    pub async fn from_config(config: SessionConfig) -> Result<Self, SessionError> {
        let today = Local::now().date_naive();
        let storage = StorageBackend::from_config(&config.storage, today).await?;
        Ok(Self::new(config, storage))
    }

    /// Channel remote model proxies talk through.
    #[must_use]
    pub fn with_model_channel(mut self, channel: Arc<dyn ModelChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Replace the worker provisioner.
    #[must_use]
    pub fn with_provisioner(mut self, provisioner: Arc<dyn WorkerProvisioner>) -> Self {
        self.provisioner = provisioner;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub const fn storage(&self) -> &StorageBackend {
        &self.storage
    }

    /// Build a fresh session for `session_id`.
    ///
    /// Local mode loads the model in process; remote mode binds a proxy to
    /// the session id. No worker is started here.
    ///
    /// # Errors
    /// Returns error if the local model cannot be loaded or remote mode has no channel.
    pub async fn get_session(&self, session_id: impl Into<String>) -> Result<Session, SessionError> {
        let session_id = session_id.into();
        let model = match self.config.run_mode {
            RunMode::Local => ModelHandle::Local(LocalModel::from_config(&self.config.model).await?),
            RunMode::Remote => {
                let channel = self
                    .channel
                    .as_ref()
                    .ok_or(SessionError::MissingModelChannel)?;
                ModelHandle::Remote(RemoteModelProxy::new(session_id.clone(), Arc::clone(channel)))
            }
        };

        Ok(Session::new(session_id, model, self.storage.clone())
            .with_provisioner(Arc::clone(&self.provisioner), self.config.model.clone()))
    }
}

//! The per-user inference session.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use model_session_core::{
    AtomicCounter, Fields, ModelConfig, ModelReference, RequestRecord, RunMode,
    record::experiment_of,
    traits::{Worker, WorkerError, WorkerProvisioner, WorkerSpec},
};
use rand::{Rng, distributions::Alphanumeric};

use crate::{
    error::SessionError,
    model::ModelHandle,
    storage::{Lineage, Persistence, StorageBackend},
};

/// Length of the random snapshot lineage token.
const SNAPSHOT_STRING_LEN: usize = 8;

/// Result of logging one interaction.
#[derive(Debug)]
pub struct EntryReceipt {
    /// Request index stamped on the record.
    pub request_index: u64,
    /// What happened to the stamped record.
    pub persistence: Persistence,
}

/// A stateful model session for one user.
///
/// Mutating operations take `&mut self`; [`Session::add_entry`] takes `&self`
/// so concurrent requests can log interactions behind a shared lock.
pub struct Session {
    id: String,
    run_mode: RunMode,
    created_at: DateTime<Utc>,
    last_interaction_at: DateTime<Utc>,
    snapshot_string: String,
    snapshot_idx: u64,
    counter: AtomicCounter,
    request_list: Mutex<Vec<RequestRecord>>,
    model: Option<ModelHandle>,
    storage: StorageBackend,
    provisioner: Option<(Arc<dyn WorkerProvisioner>, ModelConfig)>,
    worker: Option<Box<dyn Worker>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("run_mode", &self.run_mode)
            .field("created_at", &self.created_at)
            .field("last_interaction_at", &self.last_interaction_at)
            .field("snapshot_string", &self.snapshot_string)
            .field("snapshot_idx", &self.snapshot_idx)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session around `model`, writing through `storage`.
    #[must_use]
    pub fn new(id: impl Into<String>, model: ModelHandle, storage: StorageBackend) -> Self {
        let id = id.into();
        let run_mode = if model.is_local() {
            RunMode::Local
        } else {
            RunMode::Remote
        };
        tracing::info!(session_id = %id, ?run_mode, storage = storage.kind(), "Instantiating new session");

        let now = Utc::now();
        Self {
            id,
            run_mode,
            created_at: now,
            last_interaction_at: now,
            snapshot_string: random_snapshot_string(),
            snapshot_idx: 0,
            counter: AtomicCounter::new(),
            request_list: Mutex::new(Vec::new()),
            model: Some(model),
            storage,
            provisioner: None,
            worker: None,
        }
    }

    /// Provision remote workers through `provisioner`, started with `model`'s parameters.
    #[must_use]
    pub fn with_provisioner(
        mut self,
        provisioner: Arc<dyn WorkerProvisioner>,
        model: ModelConfig,
    ) -> Self {
        self.provisioner = Some((provisioner, model));
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub const fn last_interaction_at(&self) -> DateTime<Utc> {
        self.last_interaction_at
    }

    /// Record that the user interacted with the session just now.
    pub fn touch(&mut self) {
        self.last_interaction_at = Utc::now();
    }

    /// Token naming the current snapshot lineage.
    #[must_use]
    pub fn snapshot_string(&self) -> &str {
        &self.snapshot_string
    }

    /// Index the next save will use.
    #[must_use]
    pub const fn snapshot_index(&self) -> u64 {
        self.snapshot_idx
    }

    /// Last request index handed out in this lineage.
    #[must_use]
    pub fn request_counter(&self) -> u64 {
        self.counter.value()
    }

    /// Copy of the in-memory request log (file backend only).
    #[must_use]
    pub fn request_list(&self) -> Vec<RequestRecord> {
        match self.request_list.lock() {
            Ok(list) => list.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    #[must_use]
    pub const fn storage(&self) -> &StorageBackend {
        &self.storage
    }

    /// The model, unless it has been released.
    #[must_use]
    pub const fn model(&self) -> Option<&ModelHandle> {
        self.model.as_ref()
    }

    /// Mutable model access for inference and fine-tuning.
    ///
    /// # Errors
    /// Returns error if the model has been released.
    pub fn model_mut(&mut self) -> Result<&mut ModelHandle, SessionError> {
        self.model.as_mut().ok_or(SessionError::ModelReleased)
    }

    /// The running worker, if any.
    #[must_use]
    pub fn worker(&self) -> Option<&dyn Worker> {
        self.worker.as_deref()
    }

    // ========================================================================
    // Worker lifecycle
    // ========================================================================

    /// Start the worker hosting a remote model. No-op when running locally.
    ///
    /// # Errors
    /// Returns error if the worker cannot be launched.
    pub async fn spawn_worker(&mut self) -> Result<(), SessionError> {
        if self.run_mode == RunMode::Local {
            tracing::debug!(session_id = %self.id, "Local session, no worker to spawn");
            return Ok(());
        }
        if self.worker.is_some() {
            tracing::warn!(session_id = %self.id, "Worker already running, not spawning another");
            return Ok(());
        }

        let (provisioner, model) = self
            .provisioner
            .as_ref()
            .ok_or(SessionError::NoProvisioner)?;
        let spec = WorkerSpec {
            session_id: self.id.clone(),
            model: model.clone(),
        };
        let worker = provisioner.provision(&spec).await?;
        tracing::info!(session_id = %self.id, pid = ?worker.id(), "Worker started");
        self.worker = Some(worker);
        Ok(())
    }

    /// Release the local model, or terminate the remote worker.
    ///
    /// # Errors
    /// Returns error if no worker is running in remote mode or it cannot be killed.
    pub async fn kill_worker(&mut self) -> Result<(), SessionError> {
        match self.run_mode {
            RunMode::Local => {
                self.model = None;
                tracing::info!(session_id = %self.id, "Released local model");
                Ok(())
            }
            RunMode::Remote => {
                let mut worker = self
                    .worker
                    .take()
                    .ok_or_else(|| WorkerError::NotRunning(self.id.clone()))?;
                worker.terminate().await?;
                tracing::info!(session_id = %self.id, "Worker terminated");
                Ok(())
            }
        }
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Start a new snapshot lineage.
    ///
    /// A hard reset (`soft == false`) also discards the model's learned state.
    /// With table storage a lineage entity is recorded; that write is best
    /// effort and its outcome is returned.
    pub async fn reset(&mut self, soft: bool, from_cached: Option<&str>) -> Persistence {
        if !soft {
            match self.model.as_mut() {
                Some(model) => model.reset().await,
                None => tracing::debug!(session_id = %self.id, "Model released, skipping model reset"),
            }
        }

        self.snapshot_string = random_snapshot_string();
        self.snapshot_idx = 0;
        self.counter = AtomicCounter::new();
        match self.request_list.get_mut() {
            Ok(list) => list.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
        tracing::info!(session_id = %self.id, snapshot = %self.snapshot_string, soft, "Session reset");

        match &self.storage {
            StorageBackend::Table(table) => {
                let lineage = Lineage::new(self.snapshot_string.clone(), from_cached.map(str::to_string));
                table.record_lineage(&lineage).await
            }
            StorageBackend::File(_) | StorageBackend::None => Persistence::Skipped,
        }
    }

    /// Save the model (and, with file storage, the request log) as the next snapshot.
    ///
    /// Returns `None` without doing anything when persistence is disabled.
    ///
    /// # Errors
    /// Returns error if the snapshot already exists, the model has been
    /// released, or artifacts cannot be written.
    pub async fn save(&mut self, model_name: &str) -> Result<Option<ModelReference>, SessionError> {
        let Some(files) = self.storage.files() else {
            tracing::debug!(session_id = %self.id, "No storage configured, skipping save");
            return Ok(None);
        };
        let model = self.model.as_ref().ok_or(SessionError::ModelReleased)?;

        let snapshot_id = format!("{model_name}_{}", self.snapshot_idx);
        files.ensure_lineage_dir(&self.snapshot_string).await?;
        let paths = files.snapshot_paths(&self.snapshot_string, &snapshot_id);

        model.save(&paths.model).await?;

        if let StorageBackend::File(files) = &self.storage {
            let records = self.request_list.get_mut().map_err(|_| SessionError::Poisoned)?;
            files.write_request_list(&paths.request_list, records).await?;
        }

        self.snapshot_idx += 1;
        tracing::info!(
            session_id = %self.id,
            snapshot = %self.snapshot_string,
            snapshot_id = %snapshot_id,
            "Saved snapshot"
        );
        Ok(Some(ModelReference::encode(paths.model)))
    }

    /// Replace the model with the snapshot named by `reference`.
    ///
    /// The current model is kept if the snapshot cannot be restored.
    ///
    /// # Errors
    /// Returns error if the reference is malformed or the artifact cannot be
    /// restored by the current kind of model.
    pub async fn load(&mut self, reference: &ModelReference) -> Result<(), SessionError> {
        let path = reference.decode()?;
        let current = self.model.as_ref().ok_or(SessionError::ModelReleased)?;
        let restored = current.restore(&path).await?;
        self.model = Some(restored);
        tracing::info!(session_id = %self.id, path = %path.display(), "Loaded snapshot");
        Ok(())
    }

    // ========================================================================
    // Interaction log
    // ========================================================================

    /// Stamp and record one user interaction.
    ///
    /// `fields` is copied, never modified. Table writes are best effort: their
    /// failure is reported in the receipt, not as an error.
    ///
    /// # Errors
    /// Returns error if `fields` has no `experiment` value.
    pub async fn add_entry(&self, fields: &Fields) -> Result<EntryReceipt, SessionError> {
        let experiment = experiment_of(fields).ok_or(SessionError::MissingExperiment)?;

        let request_index = self.counter.increment();
        let record = RequestRecord::stamp(fields, Utc::now(), self.snapshot_idx, request_index);

        let persistence = match &self.storage {
            StorageBackend::File(_) => {
                self.request_list
                    .lock()
                    .map_err(|_| SessionError::Poisoned)?
                    .push(record);
                Persistence::Buffered
            }
            StorageBackend::Table(table) => {
                table
                    .record_interaction(&self.snapshot_string, &experiment, &record)
                    .await
            }
            StorageBackend::None => Persistence::Skipped,
        };

        Ok(EntryReceipt {
            request_index,
            persistence,
        })
    }
}

fn random_snapshot_string() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SNAPSHOT_STRING_LEN)
        .map(char::from)
        .collect()
}

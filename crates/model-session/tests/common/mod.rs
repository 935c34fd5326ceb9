//! Common test utilities.
#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use model_session::{
    SessionFactory, StorageBackend,
    storage::{FileStorage, MemoryTableService, StorageError, TableEntity, TableService, TableStorage},
};
use model_session_core::{
    Fields, ModelConfig, RunMode, SessionConfig,
    traits::{
        ChannelError, ModelCall, ModelChannel, ModelReply, Worker, WorkerError, WorkerProvisioner,
        WorkerSpec,
    },
};
use serde_json::{Value, json};

/// Install a test subscriber once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Object literal to `Fields`.
pub fn fields(value: Value) -> Fields {
    value.as_object().cloned().expect("fields must be a JSON object")
}

/// Write a two-layer base model: identity embedding, zeroed two-class head.
pub fn write_base_model(dir: &Path) -> PathBuf {
    let path = dir.join("base_model.json");
    let model = json!({
        "layers": [
            {"weights": [[1.0, 0.0], [0.0, 1.0]], "bias": [0.0, 0.0]},
            {"weights": [[0.0, 0.0], [0.0, 0.0]], "bias": [0.0, 0.0]}
        ]
    });
    std::fs::write(&path, model.to_string()).unwrap();
    path
}

/// Local-mode factory over `storage`.
pub fn local_factory(dir: &Path, storage: StorageBackend) -> SessionFactory {
    let config = SessionConfig::new(RunMode::Local, ModelConfig::new(write_base_model(dir)));
    SessionFactory::new(config, storage)
}

pub fn file_backend(root: &Path) -> StorageBackend {
    StorageBackend::File(FileStorage::new(root))
}

pub fn table_backend(root: &Path, service: Arc<dyn TableService>) -> StorageBackend {
    StorageBackend::Table(TableStorage::new(FileStorage::new(root), service))
}

pub fn memory_table() -> Arc<MemoryTableService> {
    Arc::new(MemoryTableService::new())
}

// ============================================================================
// Test doubles
// ============================================================================

/// Table service that rejects every insert.
pub struct FailingTableService;

#[async_trait]
impl TableService for FailingTableService {
    async fn insert_entity(&self, _table: &str, _entity: TableEntity) -> Result<(), StorageError> {
        Err(StorageError::Transport("connection reset".to_string()))
    }
}

/// Model channel that records calls and acknowledges them.
#[derive(Default)]
pub struct RecordingChannel {
    pub calls: Mutex<Vec<(String, ModelCall)>>,
    pub fail: AtomicBool,
}

impl RecordingChannel {
    pub fn calls(&self) -> Vec<(String, ModelCall)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelChannel for RecordingChannel {
    async fn call(&self, session_id: &str, call: ModelCall) -> Result<ModelReply, ChannelError> {
        self.calls
            .lock()
            .unwrap()
            .push((session_id.to_string(), call.clone()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(ChannelError::Unavailable(session_id.to_string()));
        }
        Ok(match call {
            ModelCall::Predict { inputs } => ModelReply::Predictions {
                outputs: inputs.iter().map(|_| vec![0.5, 0.5]).collect(),
            },
            _ => ModelReply::Ack,
        })
    }
}

/// Provisioner that records specs and hands out fake workers.
#[derive(Default)]
pub struct RecordingProvisioner {
    pub specs: Mutex<Vec<WorkerSpec>>,
    pub terminated: Arc<AtomicBool>,
    pub fail: bool,
}

#[async_trait]
impl WorkerProvisioner for RecordingProvisioner {
    async fn provision(&self, spec: &WorkerSpec) -> Result<Box<dyn Worker>, WorkerError> {
        if self.fail {
            return Err(WorkerError::SpawnFailed("no capacity".to_string()));
        }
        self.specs.lock().unwrap().push(spec.clone());
        Ok(Box::new(FakeWorker {
            terminated: Arc::clone(&self.terminated),
        }))
    }
}

pub struct FakeWorker {
    terminated: Arc<AtomicBool>,
}

#[async_trait]
impl Worker for FakeWorker {
    fn id(&self) -> Option<u32> {
        Some(4242)
    }

    async fn terminate(&mut self) -> Result<(), WorkerError> {
        self.terminated.store(true, Ordering::SeqCst);
        Ok(())
    }
}

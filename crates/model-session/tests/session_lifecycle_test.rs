//! Session lifecycle tests over local and disabled storage.

mod common;

use std::{path::Path, sync::Arc};

use common::{fields, file_backend, init_tracing, local_factory, write_base_model};
use model_session::{ModelError, Persistence, SessionError, SessionFactory, StorageBackend};
use model_session_core::{ModelConfig, ModelReference, RunMode, SessionConfig, traits::Sample};
use serde_json::json;
use tempfile::TempDir;

fn training_samples() -> Vec<Sample> {
    vec![
        Sample {
            input: vec![1.0, 0.0],
            label: 0,
        },
        Sample {
            input: vec![0.0, 1.0],
            label: 1,
        },
    ]
}

// ============================================================================
// File storage
// ============================================================================

#[tokio::test]
async fn test_save_writes_numbered_snapshots() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("snapshots");
    let factory = local_factory(temp.path(), file_backend(&root));
    let mut session = factory.get_session("user-1").await.unwrap();
    assert_eq!(session.run_mode(), RunMode::Local);
    assert_eq!(session.snapshot_index(), 0);

    let first = session.save("m").await.unwrap().expect("file storage saves");
    assert_eq!(session.snapshot_index(), 1);

    let receipt = session
        .add_entry(&fields(json!({"experiment": "x", "payload": [1, 2]})))
        .await
        .unwrap();
    assert_eq!(receipt.request_index, 1);
    assert!(matches!(receipt.persistence, Persistence::Buffered));

    let second = session.save("m").await.unwrap().expect("file storage saves");
    assert_ne!(first, second);
    assert_eq!(session.snapshot_index(), 2);

    let lineage = root.join(session.snapshot_string());
    assert!(lineage.join("m_0_model.json").is_file());
    assert!(lineage.join("m_0_request_list.json").is_file());
    assert!(lineage.join("m_1_model.json").is_file());
    assert!(lineage.join("m_1_request_list.json").is_file());
    assert_eq!(second.decode().unwrap(), lineage.join("m_1_model.json"));

    let files = session.storage().files().unwrap();
    let first_list = files
        .read_request_list(&lineage.join("m_0_request_list.json"))
        .await
        .unwrap();
    assert!(first_list.is_empty());

    let second_list = files
        .read_request_list(&lineage.join("m_1_request_list.json"))
        .await
        .unwrap();
    assert_eq!(second_list.len(), 1);
    assert_eq!(second_list[0].current_snapshot_index, 1);
    assert_eq!(second_list[0].current_request_index, 1);
    assert_eq!(second_list[0].fields["payload"], json!([1, 2]));
}

#[tokio::test]
async fn test_request_list_accumulates_across_saves() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("snapshots");
    let factory = local_factory(temp.path(), file_backend(&root));
    let mut session = factory.get_session("user-1").await.unwrap();

    session
        .add_entry(&fields(json!({"experiment": "x", "n": 1})))
        .await
        .unwrap();
    session.save("m").await.unwrap();
    session
        .add_entry(&fields(json!({"experiment": "x", "n": 2})))
        .await
        .unwrap();
    session.save("m").await.unwrap();

    let lineage = root.join(session.snapshot_string());
    let list = session
        .storage()
        .files()
        .unwrap()
        .read_request_list(&lineage.join("m_1_request_list.json"))
        .await
        .unwrap();
    let indices: Vec<u64> = list.iter().map(|r| r.current_request_index).collect();
    assert_eq!(indices, vec![1, 2]);
    let snapshots: Vec<u64> = list.iter().map(|r| r.current_snapshot_index).collect();
    assert_eq!(snapshots, vec![0, 1]);
}

#[tokio::test]
async fn test_reset_starts_new_lineage() {
    let temp = TempDir::new().unwrap();
    let factory = local_factory(temp.path(), file_backend(&temp.path().join("snapshots")));
    let mut session = factory.get_session("user-1").await.unwrap();

    session.save("m").await.unwrap();
    session
        .add_entry(&fields(json!({"experiment": "x"})))
        .await
        .unwrap();
    let old_string = session.snapshot_string().to_string();

    let persistence = session.reset(true, None).await;
    assert!(matches!(persistence, Persistence::Skipped));
    assert_ne!(session.snapshot_string(), old_string);
    assert_eq!(session.snapshot_index(), 0);
    assert_eq!(session.request_counter(), 0);
    assert!(session.request_list().is_empty());

    let receipt = session
        .add_entry(&fields(json!({"experiment": "x"})))
        .await
        .unwrap();
    assert_eq!(receipt.request_index, 1);
}

#[tokio::test]
async fn test_save_refuses_to_overwrite_snapshot() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("snapshots");
    let factory = local_factory(temp.path(), file_backend(&root));
    let mut session = factory.get_session("user-1").await.unwrap();

    let lineage = root.join(session.snapshot_string());
    std::fs::create_dir_all(&lineage).unwrap();
    std::fs::write(lineage.join("m_0_model.json"), "occupied").unwrap();

    let err = session.save("m").await.unwrap_err();
    assert!(matches!(err, SessionError::SnapshotCollision(_)));
    assert_eq!(session.snapshot_index(), 0);
    assert_eq!(
        std::fs::read_to_string(lineage.join("m_0_model.json")).unwrap(),
        "occupied"
    );
}

#[tokio::test]
async fn test_save_hard_reset_load_round_trip() {
    let temp = TempDir::new().unwrap();
    let factory = local_factory(temp.path(), file_backend(&temp.path().join("snapshots")));
    let mut session = factory.get_session("user-1").await.unwrap();
    let probe = vec![vec![1.0, 0.0], vec![0.0, 1.0]];

    let model = session.model_mut().unwrap();
    let untrained = model.predict(&probe).await.unwrap();
    model.fine_tune(&training_samples()).await.unwrap();
    let trained = model.predict(&probe).await.unwrap();
    assert_ne!(trained, untrained);

    let reference = session.save("m").await.unwrap().unwrap();

    session.reset(false, None).await;
    let after_reset = session.model().unwrap().predict(&probe).await.unwrap();
    assert_eq!(after_reset, untrained);

    session.load(&reference).await.unwrap();
    let restored = session.model().unwrap().predict(&probe).await.unwrap();
    assert_eq!(restored, trained);
}

#[tokio::test]
async fn test_soft_reset_keeps_learned_state() {
    let temp = TempDir::new().unwrap();
    let factory = local_factory(temp.path(), file_backend(&temp.path().join("snapshots")));
    let mut session = factory.get_session("user-1").await.unwrap();
    let probe = vec![vec![1.0, 0.0]];

    let model = session.model_mut().unwrap();
    model.fine_tune(&training_samples()).await.unwrap();
    let trained = model.predict(&probe).await.unwrap();

    session.reset(true, None).await;
    let after = session.model().unwrap().predict(&probe).await.unwrap();
    assert_eq!(after, trained);
}

#[tokio::test]
async fn test_load_keeps_model_when_reference_is_bad() {
    let temp = TempDir::new().unwrap();
    let factory = local_factory(temp.path(), file_backend(&temp.path().join("snapshots")));
    let mut session = factory.get_session("user-1").await.unwrap();

    let malformed = ModelReference::from_encoded("***not base64***");
    let err = session.load(&malformed).await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidReference(_)));

    let missing = ModelReference::encode(temp.path().join("nowhere_model.json"));
    let err = session.load(&missing).await.unwrap_err();
    assert!(matches!(err, SessionError::Model(_)));

    let foreign = temp.path().join("foreign.json");
    std::fs::write(&foreign, r#"{"format": "something-else/v3"}"#).unwrap();
    let err = session.load(&ModelReference::encode(&foreign)).await.unwrap_err();
    assert!(matches!(err, SessionError::Model(_)));

    assert!(session.model().is_some());
    session.model().unwrap().predict(&[vec![1.0, 0.0]]).await.unwrap();
}

#[tokio::test]
async fn test_load_rejects_snapshot_with_empty_base() {
    let temp = TempDir::new().unwrap();
    let factory = local_factory(temp.path(), file_backend(&temp.path().join("snapshots")));
    let mut session = factory.get_session("user-1").await.unwrap();

    let artifact = temp.path().join("hollow_model.json");
    let layer = json!({"weights": [[1.0, 0.0], [0.0, 1.0]], "bias": [0.0, 0.0]});
    let snapshot = json!({
        "format": "dense-fine-tune/v1",
        "base": {"layers": []},
        "network": {"layers": [layer.clone(), layer]},
        "device": 0
    });
    std::fs::write(&artifact, snapshot.to_string()).unwrap();

    let err = session
        .load(&ModelReference::encode(&artifact))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Model(ModelError::Decode { .. })));

    session.reset(false, None).await;
    session.model().unwrap().predict(&[vec![1.0, 0.0]]).await.unwrap();
}

// ============================================================================
// Seed fine-tuning
// ============================================================================

fn seeded_factory(dir: &Path, seed: &serde_json::Value) -> SessionFactory {
    let seed_path = dir.join("seed.json");
    std::fs::write(&seed_path, seed.to_string()).unwrap();
    let mut model = ModelConfig::new(write_base_model(dir));
    model.seed_data_path = Some(seed_path);
    SessionFactory::new(
        SessionConfig::new(RunMode::Local, model),
        file_backend(&dir.join("snapshots")),
    )
}

#[tokio::test]
async fn test_seed_data_is_applied_on_load_and_after_hard_reset() {
    let temp = TempDir::new().unwrap();
    let seed = json!([
        {"input": [1.0, 0.0], "label": 0},
        {"input": [0.0, 1.0], "label": 1}
    ]);
    let factory = seeded_factory(temp.path(), &seed);
    let mut session = factory.get_session("user-1").await.unwrap();
    let probe = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
    let untrained = vec![vec![0.5, 0.5], vec![0.5, 0.5]];

    let seeded = session.model().unwrap().predict(&probe).await.unwrap();
    assert_ne!(seeded, untrained);
    assert!(seeded[0][0] > 0.6);
    assert!(seeded[1][1] > 0.6);

    let extra = vec![Sample {
        input: vec![1.0, 0.0],
        label: 1,
    }];
    session.model_mut().unwrap().fine_tune(&extra).await.unwrap();
    assert_ne!(session.model().unwrap().predict(&probe).await.unwrap(), seeded);

    session.reset(false, None).await;
    let after_reset = session.model().unwrap().predict(&probe).await.unwrap();
    assert_eq!(after_reset, seeded);
}

#[tokio::test]
async fn test_invalid_seed_label_fails_session_creation() {
    let temp = TempDir::new().unwrap();
    let seed = json!([{"input": [1.0, 0.0], "label": 9}]);
    let factory = seeded_factory(temp.path(), &seed);

    let err = factory.get_session("user-1").await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Model(ModelError::LabelOutOfRange { label: 9, classes: 2 })
    ));
}

// ============================================================================
// Interaction log
// ============================================================================

#[tokio::test]
async fn test_missing_experiment_is_rejected_without_consuming_index() {
    let temp = TempDir::new().unwrap();
    let factory = local_factory(temp.path(), file_backend(&temp.path().join("snapshots")));
    let session = factory.get_session("user-1").await.unwrap();

    let err = session
        .add_entry(&fields(json!({"payload": 1})))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::MissingExperiment));
    assert!(session.request_list().is_empty());

    let receipt = session
        .add_entry(&fields(json!({"experiment": "x"})))
        .await
        .unwrap();
    assert_eq!(receipt.request_index, 1);
}

#[tokio::test]
async fn test_add_entry_does_not_modify_caller_fields() {
    let temp = TempDir::new().unwrap();
    let factory = local_factory(temp.path(), file_backend(&temp.path().join("snapshots")));
    let session = factory.get_session("user-1").await.unwrap();

    let input = fields(json!({"experiment": "x", "payload": {"a": 1}}));
    let before = input.clone();
    session.add_entry(&input).await.unwrap();
    assert_eq!(input, before);

    let list = session.request_list();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].fields["experiment"], json!("x"));
    assert_eq!(list[0].current_snapshot_index, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_add_entry_indices_are_unique() {
    let temp = TempDir::new().unwrap();
    let factory = local_factory(temp.path(), file_backend(&temp.path().join("snapshots")));
    let session = Arc::new(factory.get_session("user-1").await.unwrap());

    let n = 64_u64;
    let handles: Vec<_> = (0..n)
        .map(|i| {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session
                    .add_entry(&fields(json!({"experiment": "x", "i": i})))
                    .await
                    .unwrap()
                    .request_index
            })
        })
        .collect();

    let mut indices: Vec<u64> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    indices.sort_unstable();
    assert_eq!(indices, (1..=n).collect::<Vec<_>>());
    assert_eq!(session.request_list().len(), 64);
    assert_eq!(session.request_counter(), n);
}

// ============================================================================
// Disabled storage
// ============================================================================

#[tokio::test]
async fn test_no_storage_skips_persistence() {
    let temp = TempDir::new().unwrap();
    let factory = local_factory(temp.path(), StorageBackend::None);
    let mut session = factory.get_session("user-1").await.unwrap();

    assert!(session.save("m").await.unwrap().is_none());
    assert_eq!(session.snapshot_index(), 0);

    let receipt = session
        .add_entry(&fields(json!({"experiment": "x"})))
        .await
        .unwrap();
    assert_eq!(receipt.request_index, 1);
    assert!(matches!(receipt.persistence, Persistence::Skipped));
    assert!(session.request_list().is_empty());

    assert!(matches!(session.reset(false, None).await, Persistence::Skipped));
}

// ============================================================================
// Local worker lifecycle
// ============================================================================

#[tokio::test]
async fn test_local_spawn_is_noop_and_kill_releases_model() {
    let temp = TempDir::new().unwrap();
    let factory = local_factory(temp.path(), file_backend(&temp.path().join("snapshots")));
    let mut session = factory.get_session("user-1").await.unwrap();

    tokio_test::assert_ok!(session.spawn_worker().await);
    assert!(session.worker().is_none());
    assert!(session.model().is_some());

    session.kill_worker().await.unwrap();
    assert!(session.model().is_none());
    assert!(matches!(
        session.model_mut().unwrap_err(),
        SessionError::ModelReleased
    ));

    let err = session.save("m").await.unwrap_err();
    assert!(matches!(err, SessionError::ModelReleased));
}

#[tokio::test]
async fn test_factory_rejects_unusable_fine_tune_layer() {
    let temp = TempDir::new().unwrap();
    let mut config =
        SessionConfig::new(RunMode::Local, ModelConfig::new(write_base_model(temp.path())));
    config.model.fine_tune_layer = -1;
    let factory = SessionFactory::new(config, StorageBackend::None);

    let err = factory.get_session("user-1").await.unwrap_err();
    assert!(matches!(err, SessionError::Model(_)));
}

//! Unit tests for the checkpoint crate.

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::{Checkpoint, CheckpointFile, CheckpointManager, CheckpointStore, FilesystemStore};

/// Test checkpoint type for unit tests.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
struct TestCheckpoint {
    position: i64,
}

impl Checkpoint for TestCheckpoint {
    const CHECKPOINT_TYPE: &'static str = "test";

    fn to_cli_string(&self) -> String {
        self.position.to_string()
    }

    fn from_cli_string(s: &str) -> anyhow::Result<Self> {
        Ok(Self {
            position: s.parse()?,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
struct OtherCheckpoint {
    key: String,
}

impl Checkpoint for OtherCheckpoint {
    const CHECKPOINT_TYPE: &'static str = "other";

    fn to_cli_string(&self) -> String {
        self.key.clone()
    }

    fn from_cli_string(s: &str) -> anyhow::Result<Self> {
        Ok(Self { key: s.to_string() })
    }
}

// ============================================================================
// CheckpointFile Tests
// ============================================================================

#[test]
fn test_checkpoint_file_roundtrip() {
    let original = TestCheckpoint { position: 12345 };

    let file = CheckpointFile::new(&original).unwrap();
    assert_eq!(file.checkpoint_type(), "test");

    let json = serde_json::to_string_pretty(&file).unwrap();
    let loaded: CheckpointFile = serde_json::from_str(&json).unwrap();
    let parsed: TestCheckpoint = loaded.parse().unwrap();

    assert_eq!(original, parsed);
}

#[test]
fn test_checkpoint_type_mismatch() {
    let mut file = CheckpointFile::new(&TestCheckpoint { position: 42 }).unwrap();
    file.checkpoint_type = "wrong".to_string();

    let result: anyhow::Result<TestCheckpoint> = file.parse();
    let err_msg = result.unwrap_err().to_string();
    assert!(err_msg.contains("type mismatch"));
    assert!(err_msg.contains("expected 'test'"));
    assert!(err_msg.contains("found 'wrong'"));
}

#[test]
fn test_checkpoint_file_created_at_is_recent() {
    let file = CheckpointFile::new(&TestCheckpoint { position: 99 }).unwrap();
    let diff = chrono::Utc::now() - file.created_at();
    assert!(diff.num_seconds() < 5);
}

// ============================================================================
// FilesystemStore Tests
// ============================================================================

#[tokio::test]
async fn test_filesystem_store_read_missing_is_none() {
    let dir = TempDir::new().unwrap();
    let store = FilesystemStore::new(dir.path().join("checkpoint.json"));

    assert!(store.read().await.unwrap().is_none());
}

#[tokio::test]
async fn test_filesystem_store_overwrites_single_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("checkpoint.json");
    let store = FilesystemStore::new(&path);

    store
        .store(&CheckpointFile::new(&TestCheckpoint { position: 1 }).unwrap())
        .await
        .unwrap();
    store
        .store(&CheckpointFile::new(&TestCheckpoint { position: 2 }).unwrap())
        .await
        .unwrap();

    let stored = store.read().await.unwrap().unwrap();
    assert_eq!(stored.parse::<TestCheckpoint>().unwrap().position, 2);

    // Only the checkpoint itself remains; the temp file was renamed away
    let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap())
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn test_filesystem_store_clear() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("checkpoint.json");
    let store = FilesystemStore::new(&path);

    // Clearing an empty store is fine
    store.clear().await.unwrap();

    store
        .store(&CheckpointFile::new(&TestCheckpoint { position: 7 }).unwrap())
        .await
        .unwrap();
    assert!(path.exists());

    store.clear().await.unwrap();
    assert!(!path.exists());
    assert!(store.read().await.unwrap().is_none());
}

#[tokio::test]
async fn test_filesystem_store_corrupt_file_is_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("checkpoint.json");
    std::fs::write(&path, "not json").unwrap();

    let store = FilesystemStore::new(&path);
    let err = store.read().await.unwrap_err();
    assert!(err.to_string().contains("Failed to parse checkpoint file"));
}

// ============================================================================
// CheckpointManager Tests
// ============================================================================

#[tokio::test]
async fn test_manager_save_load_clear() {
    let dir = TempDir::new().unwrap();
    let manager = CheckpointManager::new(FilesystemStore::new(dir.path().join("cp.json")));

    assert_eq!(manager.load::<TestCheckpoint>().await.unwrap(), None);

    manager.save(&TestCheckpoint { position: 300 }).await.unwrap();
    assert_eq!(
        manager.load::<TestCheckpoint>().await.unwrap(),
        Some(TestCheckpoint { position: 300 })
    );

    manager.clear().await.unwrap();
    assert_eq!(manager.load::<TestCheckpoint>().await.unwrap(), None);
}

#[tokio::test]
async fn test_manager_rejects_foreign_checkpoint_type() {
    let dir = TempDir::new().unwrap();
    let manager = CheckpointManager::new(FilesystemStore::new(dir.path().join("cp.json")));

    manager
        .save(&OtherCheckpoint {
            key: "abc".to_string(),
        })
        .await
        .unwrap();

    assert!(manager.load::<TestCheckpoint>().await.is_err());
    let raw = manager.read_file().await.unwrap().unwrap();
    assert_eq!(raw.checkpoint_type(), "other");
}

#[test]
fn test_cli_string_roundtrip() {
    let cp = TestCheckpoint { position: 55 };
    let parsed = TestCheckpoint::from_cli_string(&cp.to_cli_string()).unwrap();
    assert_eq!(cp, parsed);
    assert!(TestCheckpoint::from_cli_string("not-a-number").is_err());
}

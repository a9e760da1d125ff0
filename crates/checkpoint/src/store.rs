//! Checkpoint storage trait
//!
//! This module defines the CheckpointStore trait for backend-agnostic
//! checkpoint storage operations.

use anyhow::Result;
use async_trait::async_trait;

use crate::CheckpointFile;

/// Trait for checkpoint storage operations.
///
/// A store holds at most one checkpoint. `store` replaces it, `clear`
/// removes it.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Read the stored checkpoint, or None if there is none.
    async fn read(&self) -> Result<Option<CheckpointFile>>;

    /// Store a checkpoint, replacing any previous one.
    async fn store(&self, file: &CheckpointFile) -> Result<()>;

    /// Remove the stored checkpoint. Clearing an empty store is not an error.
    async fn clear(&self) -> Result<()>;

    /// Human-readable location, used in log output.
    fn location(&self) -> String;
}

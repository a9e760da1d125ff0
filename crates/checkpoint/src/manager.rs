//! Typed checkpoint operations over a storage backend.

use crate::{Checkpoint, CheckpointFile, CheckpointStore};

/// Saves, loads and clears typed checkpoints.
///
/// # Example
///
/// ```rust,ignore
/// use checkpoint::{CheckpointManager, FilesystemStore};
///
/// let manager = CheckpointManager::new(FilesystemStore::new(".docrel-sync-checkpoint.json"));
/// manager.save(&Offset::Int(200)).await?;
/// let resumed: Option<Offset> = manager.load().await?;
/// ```
pub struct CheckpointManager {
    store: Box<dyn CheckpointStore>,
}

impl CheckpointManager {
    pub fn new(store: impl CheckpointStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    /// Where checkpoints are kept, for log output.
    pub fn location(&self) -> String {
        self.store.location()
    }

    /// Persist `checkpoint`, replacing the previous one.
    pub async fn save<C: Checkpoint>(&self, checkpoint: &C) -> anyhow::Result<()> {
        let file = CheckpointFile::new(checkpoint)?;
        self.store.store(&file).await?;

        tracing::debug!(
            "Saved {} checkpoint to {}: {}",
            C::CHECKPOINT_TYPE,
            self.store.location(),
            checkpoint.to_cli_string()
        );
        Ok(())
    }

    /// Load the stored checkpoint, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored file can't be read, or if its type
    /// tag doesn't match `C::CHECKPOINT_TYPE`.
    pub async fn load<C: Checkpoint>(&self) -> anyhow::Result<Option<C>> {
        match self.store.read().await? {
            Some(file) => Ok(Some(file.parse::<C>()?)),
            None => Ok(None),
        }
    }

    /// Read the raw checkpoint file without parsing it.
    pub async fn read_file(&self) -> anyhow::Result<Option<CheckpointFile>> {
        self.store.read().await
    }

    /// Remove the stored checkpoint.
    pub async fn clear(&self) -> anyhow::Result<()> {
        self.store.clear().await
    }
}

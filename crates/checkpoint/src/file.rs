//! Checkpoint file wrapper for storage-agnostic serialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Checkpoint;

/// Storage-agnostic checkpoint file wrapper.
///
/// # File Format
///
/// ```json
/// {
///     "checkpoint_type": "offset",
///     "checkpoint": { "kind": "int", "value": 200 },
///     "created_at": "2024-01-01T00:00:00Z"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointFile {
    /// Checkpoint type identifier (see `Checkpoint::CHECKPOINT_TYPE`)
    pub checkpoint_type: String,
    /// Serialized checkpoint data as JSON Value
    pub checkpoint: serde_json::Value,
    /// Timestamp when this checkpoint file was created
    pub created_at: DateTime<Utc>,
}

impl CheckpointFile {
    /// Create new checkpoint file from a typed checkpoint.
    pub fn new<C: Checkpoint>(checkpoint: &C) -> anyhow::Result<Self> {
        Ok(Self {
            checkpoint_type: C::CHECKPOINT_TYPE.to_string(),
            checkpoint: serde_json::to_value(checkpoint)?,
            created_at: Utc::now(),
        })
    }

    /// Parse checkpoint into the typed checkpoint `C`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The `checkpoint_type` doesn't match `C::CHECKPOINT_TYPE`
    /// - The checkpoint data can't be deserialized into type `C`
    pub fn parse<C: Checkpoint>(&self) -> anyhow::Result<C> {
        if self.checkpoint_type != C::CHECKPOINT_TYPE {
            anyhow::bail!(
                "Checkpoint type mismatch: expected '{}', found '{}'",
                C::CHECKPOINT_TYPE,
                self.checkpoint_type
            );
        }
        Ok(serde_json::from_value(self.checkpoint.clone())?)
    }

    /// Get the checkpoint type of this file.
    pub fn checkpoint_type(&self) -> &str {
        &self.checkpoint_type
    }

    /// Get the timestamp when this checkpoint file was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

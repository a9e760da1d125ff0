//! Filesystem-based checkpoint storage implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::store::CheckpointStore;
use crate::CheckpointFile;

/// Filesystem implementation of CheckpointStore trait.
///
/// Stores the checkpoint as a single JSON file at a fixed path. Writes go
/// to a sibling temp file first and are then renamed over the target, so
/// a crash mid-write leaves the previous checkpoint intact.
pub struct FilesystemStore {
    path: PathBuf,
}

impl FilesystemStore {
    /// Create a new FilesystemStore for the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the checkpoint file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CheckpointStore for FilesystemStore {
    async fn read(&self) -> Result<Option<CheckpointFile>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read checkpoint file {}", self.path.display())
                })
            }
        };

        let file: CheckpointFile = serde_json::from_str(&content).with_context(|| {
            format!("Failed to parse checkpoint file {}", self.path.display())
        })?;
        Ok(Some(file))
    }

    async fn store(&self, file: &CheckpointFile) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, serde_json::to_string_pretty(file)?)
            .await
            .with_context(|| format!("Failed to write checkpoint file {}", temp.display()))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .with_context(|| format!("Failed to replace checkpoint file {}", self.path.display()))?;

        tracing::debug!("Stored checkpoint to {}", self.path.display());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::info!("Removed checkpoint {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to remove checkpoint file {}", self.path.display())
            }),
        }
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

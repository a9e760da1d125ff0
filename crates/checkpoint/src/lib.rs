//! Checkpoint persistence for docrel-sync
//!
//! Provides storage-agnostic checkpoint file handling for the migration
//! pipeline's resume position.
//!
//! # Architecture
//!
//! - `Checkpoint` is implemented by the type the pipeline persists
//!   (the batch offset)
//! - `CheckpointFile` wraps it with a type tag and timestamp for storage
//! - `CheckpointStore` abstracts the storage backend
//! - `CheckpointManager` saves, loads and clears typed checkpoints
//!
//! ## Storage Backends
//!
//! - `FilesystemStore` - Stores the checkpoint as one JSON file at a fixed path
//!
//! There is exactly one checkpoint per store. Runs sharing a store must
//! not overlap.

mod file;
mod filesystem;
mod manager;
pub mod store;

#[cfg(test)]
mod tests;

pub use file::CheckpointFile;
pub use filesystem::FilesystemStore;
pub use manager::CheckpointManager;
pub use store::CheckpointStore;

/// Trait that persisted checkpoint types must implement.
///
/// # Example
///
/// ```rust
/// use checkpoint::Checkpoint;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct RowPosition {
///     pub position: i64,
/// }
///
/// impl Checkpoint for RowPosition {
///     const CHECKPOINT_TYPE: &'static str = "row-position";
///
///     fn to_cli_string(&self) -> String {
///         self.position.to_string()
///     }
///
///     fn from_cli_string(s: &str) -> anyhow::Result<Self> {
///         Ok(Self { position: s.parse()? })
///     }
/// }
/// ```
pub trait Checkpoint: serde::Serialize + for<'de> serde::Deserialize<'de> + Clone {
    /// Type identifier written into the checkpoint file.
    ///
    /// Loading a file whose tag differs from this constant fails, so a
    /// checkpoint written by one kind of run is never resumed by another.
    const CHECKPOINT_TYPE: &'static str;

    /// Convert to CLI-friendly string format.
    ///
    /// The returned string should be parseable by `from_cli_string()`.
    /// Used for `--from-offset` and for log output.
    fn to_cli_string(&self) -> String;

    /// Parse from CLI string format.
    fn from_cli_string(s: &str) -> anyhow::Result<Self>
    where
        Self: Sized;
}

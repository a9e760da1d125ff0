//! Pipeline error taxonomy.
//!
//! Every fatal error carries the table or collection it happened on and,
//! where there is one, the offset to resume from.

use sync_core::{Offset, SchemaError};

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// The mapping could not be loaded or is invalid. Raised before any I/O.
    #[error("invalid mapping: {0}")]
    Config(#[from] SchemaError),

    #[error("failed to connect to {target}: {source:#}")]
    Connection {
        target: String,
        #[source]
        source: anyhow::Error,
    },

    /// Reading a batch failed. The checkpoint still points at `offset`.
    #[error("failed to extract from '{source_name}' at offset {offset}: {source:#}")]
    Extraction {
        source_name: String,
        offset: Offset,
        #[source]
        source: anyhow::Error,
    },

    /// Writing a batch failed. The checkpoint still points at `offset`, so
    /// resuming retries the same batch.
    #[error("failed to load into '{target}' at offset {offset}: {source:#}")]
    Load {
        target: String,
        offset: Offset,
        #[source]
        source: anyhow::Error,
    },

    #[error("checkpoint error: {0:#}")]
    Checkpoint(#[source] anyhow::Error),

    #[error("pipeline cannot run from state {0}")]
    InvalidState(crate::pipeline::PipelineState),
}

impl MigrationError {
    /// Offset a resumed run would start from, for errors that have one.
    pub fn resume_offset(&self) -> Option<&Offset> {
        match self {
            MigrationError::Extraction { offset, .. } | MigrationError::Load { offset, .. } => {
                Some(offset)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_carries_context() {
        let err = MigrationError::Load {
            target: "users".to_string(),
            offset: Offset::Int(200),
            source: anyhow::anyhow!("connection reset"),
        };
        assert_eq!(
            err.to_string(),
            "failed to load into 'users' at offset 200: connection reset"
        );
        assert_eq!(err.resume_offset(), Some(&Offset::Int(200)));
    }

    #[test]
    fn test_config_error_has_no_offset() {
        let err = MigrationError::from(SchemaError::Invalid {
            entity: "AppUser".to_string(),
            reason: "no fields".to_string(),
        });
        assert!(err.to_string().starts_with("invalid mapping:"));
        assert!(err.resume_offset().is_none());
    }
}

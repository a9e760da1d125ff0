//! Core types for docrel-sync.
//!
//! This crate holds everything that is independent of a concrete store:
//!
//! - [`Value`] / [`Record`] - store-neutral record representation
//! - [`MappingSchema`] - declarative bidirectional mapping for one entity
//! - [`convert`] - value-level conversion driven by a field's logical type
//! - [`Transformer`] - reshapes records between the relational and document models
//! - [`Extractor`] / [`Loader`] - capabilities implemented once per store
//! - [`Offset`] - the pipeline checkpoint position
//!
//! # Architecture
//!
//! ```text
//! sync-core (this crate)
//!    │
//!    ├─── docrel-sync-postgresql  (relational Extractor / Loader)
//!    ├─── docrel-sync-mongodb     (document Extractor / Loader)
//!    └─── docrel-sync             (pipeline driver and CLI)
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use sync_core::{MappingSchema, Record, Transformer, Value};
//!
//! let schema = MappingSchema::from_yaml(
//!     r#"
//! entity: AppUser
//! table: users
//! collection: users
//! id: { column: id, field: _id, type: int }
//! fields:
//!   - { name: userName, column: user_name, field: username, type: string }
//! "#,
//! )
//! .unwrap();
//!
//! let transformer = Transformer::new(Arc::new(schema));
//! let row = Record::from([
//!     ("id".to_string(), Value::Int(7)),
//!     ("user_name".to_string(), Value::from("ann")),
//! ]);
//! let doc = transformer.source_to_target(&row).unwrap();
//! assert_eq!(doc.get("_id"), Some(&Value::Int(7)));
//! ```

pub mod convert;
pub mod offset;
pub mod schema;
pub mod traits;
pub mod transform;
pub mod values;

pub use convert::{offset_as_int, to_source_type, to_target_type, ConversionError};
pub use offset::Offset;
pub use schema::{
    Embedding, FieldConfig, IdStrategy, LogicalType, MappingSchema, RelationConfig, RelationKind,
    SchemaError,
};
pub use traits::{Batch, Extractor, LoadSummary, Loader};
pub use transform::{RelationPayloads, TransformError, Transformer};
pub use values::{Record, Value};

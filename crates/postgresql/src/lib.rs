//! PostgreSQL support for docrel-sync
//!
//! - [`PostgresExtractor`] reads parent rows in id order and attaches
//!   one-to-many children and many-to-many far-side rows in bulk
//! - [`PostgresLoader`] upserts parent rows and rebuilds relation rows from
//!   embedded document children, one transaction per batch

mod client;
mod extractor;
mod loader;
mod relations;
pub mod sql;
pub mod value;

pub use client::new_postgresql_client;
pub use extractor::PostgresExtractor;
pub use loader::{PostgresLoader, UpsertStrategy};
pub use relations::{sync_relation, RelationSyncError, RelationSyncSummary, StatementCache};

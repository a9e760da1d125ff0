//! MongoDB support for docrel-sync
//!
//! - [`MongoExtractor`] pages through a collection in id order
//! - [`MongoLoader`] upserts reshaped rows with one bulk write per batch
//! - [`codec`] converts between BSON and the store-neutral record model

mod client;
pub mod codec;
mod extractor;
mod loader;

pub use client::new_mongodb_client;
pub use extractor::MongoExtractor;
pub use loader::MongoLoader;

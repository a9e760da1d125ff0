//! MongoDB client construction.

use anyhow::{Context, Result};
use mongodb::{bson::doc, options::ClientOptions, Client};
use std::time::Duration;

/// Connect to MongoDB and verify the server answers a ping.
pub async fn new_mongodb_client(uri: &str) -> Result<Client> {
    let mut options = ClientOptions::parse(uri)
        .await
        .context("Failed to parse MongoDB connection options")?;
    // Add connection timeout to prevent hanging
    options.connect_timeout = Some(Duration::from_secs(10));
    options.server_selection_timeout = Some(Duration::from_secs(10));

    let client = Client::with_options(options)?;
    client
        .database("admin")
        .run_command(doc! { "ping": 1 })
        .await
        .context("MongoDB ping failed")?;

    tracing::debug!("MongoDB client created successfully");
    Ok(client)
}

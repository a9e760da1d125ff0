//! PostgreSQL client utilities

use anyhow::{Context, Result};
use tokio_postgres::{Client, NoTls};
use tracing::error;

/// Create a new PostgreSQL client with connection handling.
///
/// The connection future is driven on a spawned task; the returned client
/// is ready for queries.
pub async fn new_postgresql_client(connection_string: &str) -> Result<Client> {
    let (client, connection) = tokio_postgres::connect(connection_string, NoTls)
        .await
        .context("Failed to connect to PostgreSQL")?;

    // Spawn connection handler
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("PostgreSQL connection error: {e}");
        }
    });

    client
        .simple_query("SELECT 1")
        .await
        .context("PostgreSQL connection check failed")?;

    Ok(client)
}

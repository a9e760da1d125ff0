//! Relational-target loader.

use anyhow::{Context, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use sync_core::{LoadSummary, Loader, MappingSchema, Record, Transformer, Value};
use tokio_postgres::{Client, Transaction};
use tracing::{debug, info, warn};

use crate::relations::{sync_relation, StatementCache};
use crate::sql;
use crate::value::{encode_params, param_refs};

/// How a parent row is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpsertStrategy {
    /// `INSERT ... ON CONFLICT (id) DO UPDATE`
    #[default]
    Native,
    /// Probe by id, then INSERT or UPDATE. Only safe with a single writer.
    Probe,
}

impl fmt::Display for UpsertStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpsertStrategy::Native => f.write_str("native"),
            UpsertStrategy::Probe => f.write_str("probe"),
        }
    }
}

impl FromStr for UpsertStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(UpsertStrategy::Native),
            "probe" => Ok(UpsertStrategy::Probe),
            other => Err(format!(
                "unknown upsert strategy '{other}' (expected 'native' or 'probe')"
            )),
        }
    }
}

enum RowWrite {
    Inserted,
    Updated,
    /// The row's values could not be encoded for the table's column types
    Unencodable(anyhow::Error),
}

/// Writes documents into the parent table and re-derives relation rows.
///
/// Each `load` call runs in one transaction. Each relation sync runs in its
/// own savepoint, so a failing relation is rolled back alone and the batch
/// carries on.
pub struct PostgresLoader {
    client: Client,
    schema: Arc<MappingSchema>,
    transformer: Transformer,
    strategy: UpsertStrategy,
    identity: Option<bool>,
    statements: StatementCache,
}

impl PostgresLoader {
    pub fn new(client: Client, schema: Arc<MappingSchema>) -> Self {
        Self {
            client,
            transformer: Transformer::new(schema.clone()),
            schema,
            strategy: UpsertStrategy::default(),
            identity: None,
            statements: StatementCache::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: UpsertStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> UpsertStrategy {
        self.strategy
    }

    /// Whether the id column is an identity column, looked up once.
    ///
    /// A failed lookup is treated as "not identity".
    async fn identity_column(&mut self) -> bool {
        if let Some(identity) = self.identity {
            return identity;
        }

        let (schema_name, table) = sql::split_table(&self.schema.table);
        let identity = match self
            .client
            .query_opt(
                sql::IDENTITY_COLUMN,
                &[&table, &self.schema.id.column, &schema_name],
            )
            .await
        {
            Ok(row) => row
                .and_then(|r| r.try_get::<_, Option<String>>(0).ok().flatten())
                .map(|v| v.eq_ignore_ascii_case("YES"))
                .unwrap_or(false),
            Err(e) => {
                warn!(
                    "Could not determine whether {}.{} is an identity column, assuming not: {e}",
                    self.schema.table, self.schema.id.column
                );
                false
            }
        };

        debug!(
            "Id column {}.{} identity={identity}",
            self.schema.table, self.schema.id.column
        );
        self.identity = Some(identity);
        identity
    }
}

#[async_trait::async_trait]
impl Loader for PostgresLoader {
    fn target_name(&self) -> &str {
        &self.schema.table
    }

    async fn load(&mut self, records: &[Record]) -> Result<LoadSummary> {
        let identity = self.identity_column().await;

        let Self {
            client,
            schema,
            transformer,
            strategy,
            statements,
            ..
        } = self;
        let schema: &MappingSchema = schema;

        let mut tx = client
            .transaction()
            .await
            .context("Failed to begin transaction")?;
        let mut summary = LoadSummary::default();

        for doc in records {
            let row = match transformer.target_to_source(doc) {
                Ok(row) => row,
                Err(e) => {
                    warn!("Skipping document in {}: {e}", schema.collection);
                    summary.skipped += 1;
                    continue;
                }
            };

            let Some(id) = row.get(&schema.id.column).filter(|v| !v.is_null()).cloned() else {
                warn!(
                    "Skipping document in {} without '{}'",
                    schema.collection, schema.id.field
                );
                summary.skipped += 1;
                continue;
            };

            let write = write_row(&tx, statements, schema, *strategy, identity, &row, &id)
                .await
                .with_context(|| format!("Failed to write {} row {id}", schema.table))?;
            match write {
                RowWrite::Inserted => summary.inserted += 1,
                RowWrite::Updated => summary.updated += 1,
                RowWrite::Unencodable(e) => {
                    warn!("Skipping {} row {id}: {e:#}", schema.table);
                    summary.skipped += 1;
                    continue;
                }
            }

            let payloads = transformer.extract_relations(doc, &id);
            for relation in &schema.relations {
                let Some(children) = payloads.get(&relation.name) else {
                    continue;
                };

                let savepoint = tx
                    .savepoint("relation_sync")
                    .await
                    .context("Failed to create savepoint")?;
                match sync_relation(&savepoint, statements, relation, &id, children).await {
                    Ok(_) => savepoint
                        .commit()
                        .await
                        .context("Failed to release savepoint")?,
                    Err(e) => {
                        savepoint
                            .rollback()
                            .await
                            .context("Failed to roll back savepoint")?;
                        warn!("Relation sync failed: {e}");
                        summary.relation_failures += 1;
                    }
                }
            }

            summary.written += 1;
        }

        tx.commit().await.context("Failed to commit batch")?;

        info!(
            "Loaded {} rows into {} ({} inserted, {} updated, {} skipped)",
            summary.written, schema.table, summary.inserted, summary.updated, summary.skipped
        );
        Ok(summary)
    }
}

/// Upsert one parent row. Database errors are returned as `Err`; values
/// that don't fit the column types come back as `RowWrite::Unencodable`.
async fn write_row(
    tx: &Transaction<'_>,
    statements: &mut StatementCache,
    schema: &MappingSchema,
    strategy: UpsertStrategy,
    identity: bool,
    row: &Record,
    id: &Value,
) -> Result<RowWrite> {
    let id_column = schema.id.column.as_str();
    let (columns, values): (Vec<&str>, Vec<&Value>) = row
        .iter()
        .filter(|(column, _)| column.as_str() != id_column)
        .map(|(column, value)| (column.as_str(), value))
        .unzip();

    match strategy {
        UpsertStrategy::Native => {
            let query = sql::upsert(&schema.table, id_column, &columns, identity);
            let statement = statements.prepare(tx, &query).await?;

            let mut all = vec![id];
            all.extend(values);
            let params = match encode_params(&all, statement.params()) {
                Ok(params) => params,
                Err(e) => return Ok(RowWrite::Unencodable(e)),
            };

            // No row back means an id-only document hit an existing row
            match tx.query_opt(&statement, &param_refs(&params)).await? {
                Some(result) if result.try_get::<_, bool>("inserted")? => Ok(RowWrite::Inserted),
                _ => Ok(RowWrite::Updated),
            }
        }
        UpsertStrategy::Probe => {
            let probe = statements
                .prepare(tx, &sql::exists(&schema.table, id_column))
                .await?;
            let id_param = match encode_params(&[id], probe.params()) {
                Ok(params) => params,
                Err(e) => return Ok(RowWrite::Unencodable(e)),
            };
            let exists = tx.query_opt(&probe, &param_refs(&id_param)).await?.is_some();

            if exists {
                if columns.is_empty() {
                    return Ok(RowWrite::Updated);
                }
                let statement = statements
                    .prepare(tx, &sql::update(&schema.table, id_column, &columns))
                    .await?;
                let mut all = values;
                all.push(id);
                let params = match encode_params(&all, statement.params()) {
                    Ok(params) => params,
                    Err(e) => return Ok(RowWrite::Unencodable(e)),
                };
                tx.execute(&statement, &param_refs(&params)).await?;
                Ok(RowWrite::Updated)
            } else {
                let mut all_columns = vec![id_column];
                all_columns.extend(&columns);
                let statement = statements
                    .prepare(tx, &sql::insert(&schema.table, &all_columns, identity))
                    .await?;
                let mut all = vec![id];
                all.extend(values);
                let params = match encode_params(&all, statement.params()) {
                    Ok(params) => params,
                    Err(e) => return Ok(RowWrite::Unencodable(e)),
                };
                tx.execute(&statement, &param_refs(&params)).await?;
                Ok(RowWrite::Inserted)
            }
        }
    }
}

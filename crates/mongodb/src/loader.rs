use anyhow::{Context, Result};
use bson::{doc, Bson, Document};
use mongodb::{Client, Database};
use std::sync::Arc;
use sync_core::{LoadSummary, Loader, MappingSchema, Record, Transformer};
use tracing::{debug, info, warn};

use crate::codec::{record_to_document, value_to_bson};

/// Most statements the server accepts in one `update` command.
const MAX_WRITE_BATCH: usize = 100_000;

/// Upserts reshaped rows into the mapped collection, filtered by id, as a
/// single ordered `update` command per batch.
pub struct MongoLoader {
    database: Database,
    schema: Arc<MappingSchema>,
    transformer: Transformer,
}

impl MongoLoader {
    pub fn new(client: Client, database: &str, schema: Arc<MappingSchema>) -> Self {
        Self {
            database: client.database(database),
            transformer: Transformer::new(schema.clone()),
            schema,
        }
    }

    /// Build the upsert statement for one row, or None if it has to be
    /// skipped.
    fn upsert_statement(&self, row: &Record) -> Option<Document> {
        let id_field = self.schema.id.field.as_str();

        let mut doc = match self.transformer.source_to_target(row) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Skipping {} row: {e}", self.schema.table);
                return None;
            }
        };

        let id = match doc.remove(id_field) {
            Some(id) if !id.is_null() => value_to_bson(&id),
            _ => {
                warn!(
                    "Skipping {} row without '{}'",
                    self.schema.table, self.schema.id.column
                );
                return None;
            }
        };

        let update = if doc.is_empty() {
            doc! { "$setOnInsert": { id_field: id.clone() } }
        } else {
            doc! { "$set": record_to_document(&doc) }
        };

        Some(doc! {
            "q": { id_field: id },
            "u": update,
            "upsert": true,
        })
    }

    /// Run one `update` command and fold its reply into `summary`.
    async fn run_update(&self, statements: &[Document], summary: &mut LoadSummary) -> Result<()> {
        let reply = self
            .database
            .run_command(doc! {
                "update": self.schema.collection.as_str(),
                "updates": statements.to_vec(),
                "ordered": true,
            })
            .await?;

        if let Ok(errors) = reply.get_array("writeErrors") {
            if let Some(first) = errors.first() {
                anyhow::bail!("{} write error(s), first: {first}", errors.len());
            }
        }
        if let Ok(error) = reply.get_document("writeConcernError") {
            anyhow::bail!("Write concern error: {error}");
        }

        let UpdateCounts {
            matched,
            modified,
            upserted,
        } = UpdateCounts::from_reply(&reply);
        debug!(
            "update reply for {}: n={} nModified={modified} upserted={upserted}",
            self.schema.collection,
            matched + upserted
        );

        summary.matched += matched;
        summary.updated += modified;
        summary.inserted += upserted;
        Ok(())
    }
}

/// Counters from an `update` command reply. `n` counts matched and
/// upserted statements together.
#[derive(Debug, Default, PartialEq, Eq)]
struct UpdateCounts {
    matched: usize,
    modified: usize,
    upserted: usize,
}

impl UpdateCounts {
    fn from_reply(reply: &Document) -> Self {
        let upserted = reply.get_array("upserted").map(Vec::len).unwrap_or(0);
        Self {
            matched: count(reply, "n").saturating_sub(upserted),
            modified: count(reply, "nModified"),
            upserted,
        }
    }
}

fn count(reply: &Document, key: &str) -> usize {
    match reply.get(key) {
        Some(Bson::Int32(n)) => (*n).max(0) as usize,
        Some(Bson::Int64(n)) => (*n).max(0) as usize,
        Some(Bson::Double(n)) if *n >= 0.0 => *n as usize,
        _ => 0,
    }
}

#[async_trait::async_trait]
impl Loader for MongoLoader {
    fn target_name(&self) -> &str {
        &self.schema.collection
    }

    async fn load(&mut self, records: &[Record]) -> Result<LoadSummary> {
        let statements: Vec<Document> = records
            .iter()
            .filter_map(|row| self.upsert_statement(row))
            .collect();

        let mut summary = LoadSummary {
            skipped: records.len() - statements.len(),
            ..Default::default()
        };
        if statements.is_empty() {
            return Ok(summary);
        }

        for chunk in statements.chunks(MAX_WRITE_BATCH) {
            self.run_update(chunk, &mut summary)
                .await
                .with_context(|| format!("Bulk upsert into '{}' failed", self.schema.collection))?;
        }
        summary.written = statements.len();

        info!(
            "Upserted {} documents into {} (matched {}, modified {}, inserted {})",
            summary.written,
            self.schema.collection,
            summary.matched,
            summary.updated,
            summary.inserted
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_counts_split_upserts_from_matches() {
        let reply = doc! {
            "n": 5,
            "nModified": 2,
            "upserted": [{ "index": 0, "_id": 7 }, { "index": 3, "_id": 9 }],
            "ok": 1.0,
        };
        assert_eq!(
            UpdateCounts::from_reply(&reply),
            UpdateCounts {
                matched: 3,
                modified: 2,
                upserted: 2,
            }
        );
    }

    #[test]
    fn test_update_counts_without_upserts() {
        let reply = doc! { "n": Bson::Int64(4), "nModified": 0, "ok": 1.0 };
        assert_eq!(
            UpdateCounts::from_reply(&reply),
            UpdateCounts {
                matched: 4,
                modified: 0,
                upserted: 0,
            }
        );
        assert_eq!(UpdateCounts::from_reply(&doc! {}), UpdateCounts::default());
    }
}

//! Document-source extractor.

use anyhow::{Context, Result};
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::{Client, Database};
use std::collections::HashMap;
use std::sync::Arc;
use sync_core::{Batch, Extractor, MappingSchema, Offset, Record, RelationKind, Value};
use tracing::debug;

use crate::codec::document_to_record;

/// Reads pages of the mapped collection by skip/limit, ordered by the id
/// field ascending.
///
/// One-to-many relations that name a child `collection` are filled in with
/// one extra query per relation per page. Embedded relations need nothing.
pub struct MongoExtractor {
    database: Database,
    schema: Arc<MappingSchema>,
}

impl MongoExtractor {
    pub fn new(client: &Client, database: &str, schema: Arc<MappingSchema>) -> Self {
        Self {
            database: client.database(database),
            schema,
        }
    }

    async fn enrich(&self, docs: &[Document], records: &mut [Record]) -> Result<()> {
        let id_field = self.schema.id.field.as_str();
        let ids: Vec<Bson> = docs
            .iter()
            .filter_map(|d| d.get(id_field).cloned())
            .collect();
        if ids.is_empty() {
            return Ok(());
        }

        for relation in &self.schema.relations {
            let Some(collection) = relation.collection.as_deref() else {
                continue;
            };
            if relation.kind != RelationKind::OneToMany {
                continue;
            }

            let children: Vec<Document> = self
                .database
                .collection::<Document>(collection)
                .find(doc! { relation.foreign_key.as_str(): { "$in": ids.clone() } })
                .await?
                .try_collect()
                .await
                .with_context(|| format!("Failed to read child collection '{collection}'"))?;

            debug!(
                "Fetched {} children from {} for relation '{}'",
                children.len(),
                collection,
                relation.name
            );

            let mut grouped: HashMap<String, Vec<Value>> = HashMap::new();
            for child in children {
                let child = document_to_record(child);
                if let Some(parent) = child.get(&relation.foreign_key) {
                    grouped
                        .entry(parent.to_string())
                        .or_default()
                        .push(Value::Object(child));
                }
            }

            for record in records.iter_mut() {
                let key = record
                    .get(id_field)
                    .map(|v| v.to_string())
                    .unwrap_or_default();
                let children = grouped.remove(&key).unwrap_or_default();
                record.insert(relation.field.clone(), Value::Array(children));
            }
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl Extractor for MongoExtractor {
    fn source_name(&self) -> &str {
        &self.schema.collection
    }

    async fn extract(&mut self, batch_size: usize, offset: &Offset) -> Result<Batch> {
        let collection = self
            .database
            .collection::<Document>(&self.schema.collection);
        let skip = offset.position() as u64;

        let docs: Vec<Document> = collection
            .find(doc! {})
            .sort(doc! { self.schema.id.field.as_str(): 1 })
            .skip(skip)
            .limit(batch_size as i64)
            .await?
            .try_collect()
            .await
            .with_context(|| {
                format!("Failed to read collection '{}'", self.schema.collection)
            })?;

        debug!(
            "Read {} documents from {} at offset {}",
            docs.len(),
            self.schema.collection,
            skip
        );

        let mut records: Vec<Record> = docs.iter().cloned().map(document_to_record).collect();

        if !records.is_empty() {
            self.enrich(&docs, &mut records).await?;
        }

        Ok(Batch::new(records, offset))
    }
}

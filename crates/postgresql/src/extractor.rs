//! Relational-source extractor.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use sync_core::{
    Batch, Extractor, MappingSchema, Offset, Record, RelationConfig, RelationKind, Value,
};
use tokio_postgres::Client;
use tracing::debug;

use crate::sql;
use crate::value::{encode_param, param_refs, row_to_record, SqlParam};

/// Reads pages of the parent table ordered by id, with every relation's
/// children attached under the relation name.
///
/// Children are fetched with one query per relation per page, bound to the
/// page's id set in chunks of [`sql::MAX_PARENTS_PER_QUERY`].
pub struct PostgresExtractor {
    client: Client,
    schema: Arc<MappingSchema>,
}

impl PostgresExtractor {
    pub fn new(client: Client, schema: Arc<MappingSchema>) -> Self {
        Self { client, schema }
    }

    async fn attach_relations(&self, records: &mut [Record]) -> Result<()> {
        let ids: Vec<Value> = records
            .iter()
            .map(|r| r.get(&self.schema.id.column).cloned().unwrap_or_default())
            .filter(|v| !v.is_null())
            .collect();

        for relation in &self.schema.relations {
            let mut grouped = HashMap::new();
            for chunk in ids.chunks(sql::MAX_PARENTS_PER_QUERY) {
                let children = self.fetch_children(relation, chunk).await.with_context(|| {
                    format!("Failed to fetch relation '{}'", relation.name)
                })?;
                grouped.extend(children);
            }

            for record in records.iter_mut() {
                let key = record
                    .get(&self.schema.id.column)
                    .map(|v| v.to_string())
                    .unwrap_or_default();
                let children = grouped.remove(&key).unwrap_or_default();
                record.insert(relation.name.clone(), Value::Array(children));
            }
        }

        Ok(())
    }

    /// Children for `ids`, grouped by the parent key's string form.
    async fn fetch_children(
        &self,
        relation: &RelationConfig,
        ids: &[Value],
    ) -> Result<HashMap<String, Vec<Value>>> {
        let (query, parent_column) = match relation.kind {
            RelationKind::OneToMany => {
                let table = relation.table.as_deref().unwrap_or_default();
                (
                    sql::select_children(table, &relation.foreign_key, ids.len()),
                    relation.foreign_key.as_str(),
                )
            }
            RelationKind::ManyToMany => (
                sql::select_many_to_many(
                    relation.join_table.as_deref().unwrap_or_default(),
                    &relation.foreign_key,
                    relation.far_table.as_deref().unwrap_or_default(),
                    &relation.far_key,
                    relation.join_far_column.as_deref().unwrap_or_default(),
                    &relation.fields,
                    ids.len(),
                ),
                sql::PARENT_KEY_ALIAS,
            ),
        };

        let statement = self.client.prepare(&query).await?;
        let params = statement
            .params()
            .iter()
            .zip(ids)
            .map(|(ty, id)| encode_param(id, ty))
            .collect::<Result<Vec<SqlParam>>>()?;
        let rows = self.client.query(&statement, &param_refs(&params)).await?;

        debug!(
            "Fetched {} rows for relation '{}' ({} parents)",
            rows.len(),
            relation.name,
            ids.len()
        );

        let mut grouped: HashMap<String, Vec<Value>> = HashMap::new();
        for row in &rows {
            let mut child = row_to_record(row)?;
            let parent = if relation.kind == RelationKind::ManyToMany {
                child.remove(parent_column)
            } else {
                child.get(parent_column).cloned()
            };
            let Some(parent) = parent else { continue };

            if relation.kind == RelationKind::OneToMany && !relation.fields.is_empty() {
                child.retain(|k, _| relation.fields.iter().any(|f| f == k));
            }

            grouped
                .entry(parent.to_string())
                .or_default()
                .push(Value::Object(child));
        }

        Ok(grouped)
    }
}

#[async_trait::async_trait]
impl Extractor for PostgresExtractor {
    fn source_name(&self) -> &str {
        &self.schema.table
    }

    async fn extract(&mut self, batch_size: usize, offset: &Offset) -> Result<Batch> {
        let query = sql::select_page(&self.schema.table, &self.schema.id.column);
        let start = offset.position();
        let limit = batch_size as i64;

        let rows = self
            .client
            .query(&query, &[&start, &limit])
            .await
            .with_context(|| format!("Failed to read table '{}'", self.schema.table))?;

        let mut records = rows
            .iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "Read {} rows from {} at offset {}",
            records.len(),
            self.schema.table,
            start
        );

        if !records.is_empty() {
            self.attach_relations(&mut records).await?;
        }

        Ok(Batch::new(records, offset))
    }
}

//! Relation synchronizer.
//!
//! Rebuilds a parent's relation rows from the children embedded in its
//! document. The document side is authoritative: existing children (or join
//! rows) are deleted and the embedded set is inserted.

use std::collections::{HashMap, HashSet};
use sync_core::{Record, RelationConfig, RelationKind, Value};
use tokio_postgres::{Statement, Transaction};
use tracing::debug;

use crate::sql;
use crate::value::{convert_postgres_value, encode_params, param_refs};

/// Child keys that never become child columns.
const RESERVED_CHILD_KEYS: [&str; 2] = ["_id", "id"];

/// One relation of one parent failed to sync.
#[derive(Debug, thiserror::Error)]
pub enum RelationSyncError {
    #[error("relation '{relation}' of parent {parent}: {source}")]
    Database {
        relation: String,
        parent: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("relation '{relation}' of parent {parent}: {source}")]
    Encode {
        relation: String,
        parent: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Prepared statements reused across records and batches of one loader.
#[derive(Default)]
pub struct StatementCache {
    statements: HashMap<String, Statement>,
}

impl StatementCache {
    pub async fn prepare(
        &mut self,
        tx: &Transaction<'_>,
        query: &str,
    ) -> Result<Statement, tokio_postgres::Error> {
        if let Some(statement) = self.statements.get(query) {
            return Ok(statement.clone());
        }
        let statement = tx.prepare(query).await?;
        self.statements
            .insert(query.to_string(), statement.clone());
        Ok(statement)
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Outcome of syncing one relation for one parent.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelationSyncSummary {
    pub deleted: u64,
    pub inserted: u64,
    /// Many-to-many items with no matching far-side row
    pub unresolved: usize,
}

/// Sync one relation of one parent inside `tx`.
pub async fn sync_relation(
    tx: &Transaction<'_>,
    statements: &mut StatementCache,
    relation: &RelationConfig,
    parent_id: &Value,
    children: &[Record],
) -> Result<RelationSyncSummary, RelationSyncError> {
    let mut ctx = SyncContext {
        tx,
        statements,
        relation,
        parent_id,
    };

    match relation.kind {
        RelationKind::OneToMany => ctx.replace_children(children).await,
        RelationKind::ManyToMany => ctx.replace_join_rows(children).await,
    }
}

struct SyncContext<'a, 't> {
    tx: &'a Transaction<'t>,
    statements: &'a mut StatementCache,
    relation: &'a RelationConfig,
    parent_id: &'a Value,
}

impl SyncContext<'_, '_> {
    fn db_error(&self, source: tokio_postgres::Error) -> RelationSyncError {
        RelationSyncError::Database {
            relation: self.relation.name.clone(),
            parent: self.parent_id.to_string(),
            source,
        }
    }

    fn encode_error(&self, source: anyhow::Error) -> RelationSyncError {
        RelationSyncError::Encode {
            relation: self.relation.name.clone(),
            parent: self.parent_id.to_string(),
            source,
        }
    }

    async fn execute(&mut self, query: &str, values: &[&Value]) -> Result<u64, RelationSyncError> {
        let statement = self
            .statements
            .prepare(self.tx, query)
            .await
            .map_err(|e| self.db_error(e))?;
        let params =
            encode_params(values, statement.params()).map_err(|e| self.encode_error(e))?;
        self.tx
            .execute(&statement, &param_refs(&params))
            .await
            .map_err(|e| self.db_error(e))
    }

    async fn query_first_column(
        &mut self,
        query: &str,
        values: &[&Value],
    ) -> Result<Vec<Value>, RelationSyncError> {
        let statement = self
            .statements
            .prepare(self.tx, query)
            .await
            .map_err(|e| self.db_error(e))?;
        let params =
            encode_params(values, statement.params()).map_err(|e| self.encode_error(e))?;
        let rows = self
            .tx
            .query(&statement, &param_refs(&params))
            .await
            .map_err(|e| self.db_error(e))?;
        rows.iter()
            .map(|row| convert_postgres_value(row, 0))
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(|e| self.encode_error(e))
    }

    /// One-to-many: delete all children of the parent, insert the embedded set.
    async fn replace_children(
        &mut self,
        children: &[Record],
    ) -> Result<RelationSyncSummary, RelationSyncError> {
        let relation = self.relation;
        let table = relation.table.as_deref().unwrap_or_default();
        let fk = relation.foreign_key.as_str();
        let mut summary = RelationSyncSummary {
            deleted: self.execute(&sql::delete_by(table, fk), &[self.parent_id]).await?,
            ..Default::default()
        };

        for child in children {
            let columns: Vec<&str> = child
                .keys()
                .map(String::as_str)
                .filter(|k| *k != fk && !RESERVED_CHILD_KEYS.contains(k))
                .filter(|k| relation.fields.is_empty() || relation.fields.iter().any(|f| f == k))
                .collect();

            let mut all_columns = vec![fk];
            all_columns.extend(&columns);
            let mut values = vec![self.parent_id];
            values.extend(columns.iter().filter_map(|c| child.get(*c)));

            let query = sql::insert(table, &all_columns, false);
            summary.inserted += self.execute(&query, &values).await?;
        }

        debug!(
            "Relation '{}' of parent {}: replaced {} children with {}",
            relation.name, self.parent_id, summary.deleted, summary.inserted
        );
        Ok(summary)
    }

    /// Many-to-many: delete the parent's join rows, then insert one join row
    /// per far-side row matching each item's natural key.
    async fn replace_join_rows(
        &mut self,
        children: &[Record],
    ) -> Result<RelationSyncSummary, RelationSyncError> {
        let relation = self.relation;
        let join_table = relation.join_table.as_deref().unwrap_or_default();
        let far_table = relation.far_table.as_deref().unwrap_or_default();
        let join_far_column = relation.join_far_column.as_deref().unwrap_or_default();
        let natural_key = relation.natural_key.as_deref().unwrap_or_default();
        let fk = relation.foreign_key.as_str();

        let mut summary = RelationSyncSummary {
            deleted: self
                .execute(&sql::delete_by(join_table, fk), &[self.parent_id])
                .await?,
            ..Default::default()
        };

        let resolve = sql::resolve_far_key(far_table, &relation.far_key, natural_key);
        let insert = sql::insert(join_table, &[fk, join_far_column], false);
        let mut linked = HashSet::new();

        for child in children {
            let Some(natural) = child.get(natural_key).filter(|v| !v.is_null()) else {
                summary.unresolved += 1;
                continue;
            };

            let far_keys = self.query_first_column(&resolve, &[natural]).await?;
            if far_keys.is_empty() {
                debug!(
                    "Relation '{}': no {} row with {} = {}, skipping",
                    relation.name, far_table, natural_key, natural
                );
                summary.unresolved += 1;
                continue;
            }

            for far_key in &far_keys {
                if !linked.insert(far_key.to_string()) {
                    continue;
                }
                summary.inserted += self.execute(&insert, &[self.parent_id, far_key]).await?;
            }
        }

        debug!(
            "Relation '{}' of parent {}: {} join rows, {} unresolved",
            relation.name, self.parent_id, summary.inserted, summary.unresolved
        );
        Ok(summary)
    }
}

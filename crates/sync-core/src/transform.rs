//! Record reshaping between relational rows and documents.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::convert::{convert_value, to_source_type, to_target_type, ConversionError};
use crate::schema::{Embedding, MappingSchema, RelationConfig};
use crate::values::{Record, Value};

/// Child rows per relation name, ready for the relation synchronizer.
pub type RelationPayloads = BTreeMap<String, Vec<Record>>;

/// A single record could not be reshaped. The record is skipped; the run
/// continues.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformError {
    #[error("id '{field}': {source}")]
    Id {
        field: String,
        #[source]
        source: ConversionError,
    },

    #[error("field '{field}': {source}")]
    Field {
        field: String,
        #[source]
        source: ConversionError,
    },
}

/// Applies a [`MappingSchema`] to records in either direction.
#[derive(Debug, Clone)]
pub struct Transformer {
    schema: Arc<MappingSchema>,
}

impl Transformer {
    pub fn new(schema: Arc<MappingSchema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &MappingSchema {
        &self.schema
    }

    /// Reshape a relational row (with relation children attached under each
    /// relation's name) into a document.
    ///
    /// Columns absent from the row are omitted from the document.
    pub fn source_to_target(&self, row: &Record) -> Result<Record, TransformError> {
        let schema = &self.schema;
        let mut doc = Record::new();

        if let Some(id) = row.get(&schema.id.column) {
            let converted = convert_value(id, schema.id.id_type, None).map_err(|source| {
                TransformError::Id {
                    field: schema.id.column.clone(),
                    source,
                }
            })?;
            doc.insert(schema.id.field.clone(), converted);
        }

        for field in &schema.fields {
            if let Some(value) = row.get(&field.column) {
                let converted =
                    to_target_type(value, field).map_err(|source| TransformError::Field {
                        field: field.name.clone(),
                        source,
                    })?;
                doc.insert(field.field.clone(), converted);
            }
        }

        for relation in &schema.relations {
            if let Some(Value::Array(children)) = row.get(&relation.name) {
                doc.insert(
                    relation.field.clone(),
                    Value::Array(embed_children(relation, children)),
                );
            }
        }

        Ok(doc)
    }

    /// Reshape a document into a relational row: id and scalar fields only.
    ///
    /// Relations are not resolved here; the relational loader handles them
    /// inside its transaction.
    pub fn target_to_source(&self, doc: &Record) -> Result<Record, TransformError> {
        let schema = &self.schema;
        let mut row = Record::new();

        if let Some(id) = doc.get(&schema.id.field) {
            let converted = convert_value(id, schema.id.id_type, None).map_err(|source| {
                TransformError::Id {
                    field: schema.id.field.clone(),
                    source,
                }
            })?;
            row.insert(schema.id.column.clone(), converted);
        }

        for field in &schema.fields {
            if let Some(value) = doc.get(&field.field) {
                let converted =
                    to_source_type(value, field).map_err(|source| TransformError::Field {
                        field: field.name.clone(),
                        source,
                    })?;
                row.insert(field.column.clone(), converted);
            }
        }

        Ok(row)
    }

    /// Collect relation children from a document.
    ///
    /// For every relation whose document field holds an array, returns the
    /// items as child rows with the relation's foreign key set to
    /// `parent_key`. Relations whose field is absent or not an array are not
    /// included, so their stored children are left alone. The input is not
    /// modified.
    pub fn extract_relations(&self, doc: &Record, parent_key: &Value) -> RelationPayloads {
        let mut payloads = RelationPayloads::new();

        for relation in &self.schema.relations {
            let Some(Value::Array(items)) = doc.get(&relation.field) else {
                continue;
            };

            let children = items
                .iter()
                .filter_map(|item| child_record(relation, item))
                .map(|mut child| {
                    child.insert(relation.foreign_key.clone(), parent_key.clone());
                    child
                })
                .collect();

            payloads.insert(relation.name.clone(), children);
        }

        payloads
    }
}

fn embed_children(relation: &RelationConfig, children: &[Value]) -> Vec<Value> {
    match (relation.embedding, relation.reference_key.as_deref()) {
        (Embedding::Reference, Some(key)) => children
            .iter()
            .filter_map(|child| match child {
                Value::Object(record) => record
                    .get(key)
                    .map(|v| Value::Object(Record::from([(key.to_string(), v.clone())]))),
                Value::Null => None,
                scalar => Some(Value::Object(Record::from([(
                    key.to_string(),
                    scalar.clone(),
                )]))),
            })
            .collect(),
        _ => children.to_vec(),
    }
}

/// Turn one embedded array item into a child row. Scalars are keyed by the
/// relation's reference key (or natural key); items with neither are dropped.
fn child_record(relation: &RelationConfig, item: &Value) -> Option<Record> {
    match item {
        Value::Object(record) => Some(record.clone()),
        Value::Null | Value::Array(_) => None,
        scalar => relation
            .reference_key
            .as_ref()
            .or(relation.natural_key.as_ref())
            .map(|key| Record::from([(key.clone(), scalar.clone())])),
    }
}

//! Mapping schema definitions.
//!
//! A [`MappingSchema`] describes how one entity is shaped in the relational
//! store (table, columns, foreign keys, join tables) and in the document
//! store (collection, fields, embedded arrays). It is loaded once from a
//! YAML or JSON file, validated, and then shared read-only across a run.
//!
//! ## Example (YAML)
//!
//! ```yaml
//! entity: AppUser
//! table: users
//! collection: users
//! id: { column: id, field: _id, type: int }
//! fields:
//!   - { name: userName, column: user_name, field: username, type: string }
//!   - { name: points, column: points, field: points, type: int }
//! relations:
//!   - name: orders
//!     kind: one-to-many
//!     table: orders
//!     foreign_key: user_id
//!     field: orders
//!   - name: roles
//!     kind: many-to-many
//!     join_table: user_roles
//!     foreign_key: user_id
//!     far_table: roles
//!     join_far_column: role_id
//!     natural_key: name
//!     fields: [name]
//!     field: roles
//!     embedding: reference
//!     reference_key: name
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

// ============================================================================
// Error Types
// ============================================================================

/// Error type for mapping schema loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Error reading mapping file
    #[error("Failed to read mapping file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Error parsing YAML
    #[error("Failed to parse YAML mapping: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Error parsing JSON
    #[error("Failed to parse JSON mapping: {0}")]
    Json(#[from] serde_json::Error),

    /// Mapping parsed but violates an invariant
    #[error("Invalid mapping for entity '{entity}': {reason}")]
    Invalid { entity: String, reason: String },
}

// ============================================================================
// Types
// ============================================================================

/// Logical type of a mapped field.
///
/// Unknown type names in a mapping file deserialize to `Passthrough`, so
/// the value is copied without conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalType {
    String,
    Int,
    DateTime,
    Enum,
    #[default]
    #[serde(other)]
    Passthrough,
}

impl LogicalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalType::String => "string",
            LogicalType::Int => "int",
            LogicalType::DateTime => "datetime",
            LogicalType::Enum => "enum",
            LogicalType::Passthrough => "passthrough",
        }
    }
}

/// Binds the relational primary key column to the document id field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdStrategy {
    /// Relational id column (e.g. `id`)
    pub column: String,

    /// Document id field (e.g. `_id`)
    pub field: String,

    /// Type marker used when converting the id value
    #[serde(rename = "type", default)]
    pub id_type: LogicalType,
}

/// Binds one column to one document field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Logical name of the field inside the mapping
    pub name: String,

    /// Relational column name
    pub column: String,

    /// Document field name
    pub field: String,

    /// Declared logical type
    #[serde(rename = "type", default)]
    pub field_type: LogicalType,

    /// Optional format hint (a chrono pattern for datetime fields)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl FieldConfig {
    pub fn new(
        name: impl Into<String>,
        column: impl Into<String>,
        field: impl Into<String>,
        field_type: LogicalType,
    ) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            field: field.into(),
            field_type,
            format: None,
        }
    }
}

/// Relation cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    #[serde(rename = "one-to-many")]
    OneToMany,
    #[serde(rename = "many-to-many")]
    ManyToMany,
}

/// How a relation's children appear in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Embedding {
    /// Children are embedded verbatim
    #[default]
    Inline,
    /// Children are projected to objects carrying only the reference key
    Reference,
}

fn default_far_key() -> String {
    "id".to_string()
}

/// One relation of the entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationConfig {
    /// Relation key, unique within the schema
    pub name: String,

    pub kind: RelationKind,

    /// Child table (one-to-many)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Column pointing back at the parent id (child table or join table)
    pub foreign_key: String,

    /// Document field holding the embedded array
    pub field: String,

    #[serde(default)]
    pub embedding: Embedding,

    /// Key kept on each child when `embedding` is `reference`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_key: Option<String>,

    /// Child columns to carry (all columns when empty)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,

    /// Join table (many-to-many)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_table: Option<String>,

    /// Far-side table (many-to-many)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub far_table: Option<String>,

    /// Far-side key column referenced by the join table
    #[serde(default = "default_far_key")]
    pub far_key: String,

    /// Join table column referencing `far_key`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_far_column: Option<String>,

    /// Far-side column used to resolve a document item to a far row
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub natural_key: Option<String>,

    /// Document-side child collection, when children are stored outside the parent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

impl RelationConfig {
    /// Build a one-to-many relation with inline embedding.
    pub fn one_to_many(
        name: impl Into<String>,
        table: impl Into<String>,
        foreign_key: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: RelationKind::OneToMany,
            table: Some(table.into()),
            foreign_key: foreign_key.into(),
            field: field.into(),
            embedding: Embedding::Inline,
            reference_key: None,
            fields: Vec::new(),
            join_table: None,
            far_table: None,
            far_key: default_far_key(),
            join_far_column: None,
            natural_key: None,
            collection: None,
        }
    }

    /// Build a many-to-many relation resolved through `join_table`.
    pub fn many_to_many(
        name: impl Into<String>,
        join_table: impl Into<String>,
        foreign_key: impl Into<String>,
        far_table: impl Into<String>,
        join_far_column: impl Into<String>,
        natural_key: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: RelationKind::ManyToMany,
            table: None,
            foreign_key: foreign_key.into(),
            field: field.into(),
            embedding: Embedding::Inline,
            reference_key: None,
            fields: Vec::new(),
            join_table: Some(join_table.into()),
            far_table: Some(far_table.into()),
            far_key: default_far_key(),
            join_far_column: Some(join_far_column.into()),
            natural_key: Some(natural_key.into()),
            collection: None,
        }
    }

    /// Switch to reference embedding keyed by `reference_key`.
    pub fn with_reference(mut self, reference_key: impl Into<String>) -> Self {
        self.embedding = Embedding::Reference;
        self.reference_key = Some(reference_key.into());
        self
    }
}

/// Complete mapping for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingSchema {
    /// Entity name, used in logs
    pub entity: String,

    /// Relational table
    pub table: String,

    /// Document collection
    pub collection: String,

    pub id: IdStrategy,

    #[serde(default)]
    pub fields: Vec<FieldConfig>,

    #[serde(default)]
    pub relations: Vec<RelationConfig>,
}

impl MappingSchema {
    /// Load and validate a mapping from a file.
    ///
    /// Files ending in `.json` are parsed as JSON, everything else as YAML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
    }

    /// Parse and validate a mapping from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, SchemaError> {
        let schema: MappingSchema = serde_yaml::from_str(yaml)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Parse and validate a mapping from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let schema: MappingSchema = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Check every structural invariant of the mapping.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let invalid = |reason: String| SchemaError::Invalid {
            entity: self.entity.clone(),
            reason,
        };

        if self.entity.trim().is_empty() {
            return Err(invalid("entity name is required".into()));
        }
        if self.table.trim().is_empty() {
            return Err(invalid("table is required".into()));
        }
        if self.collection.trim().is_empty() {
            return Err(invalid("collection is required".into()));
        }
        if self.id.column.trim().is_empty() || self.id.field.trim().is_empty() {
            return Err(invalid(
                "id strategy requires both a column and a field".into(),
            ));
        }

        let mut field_names = HashSet::new();
        for field in &self.fields {
            if field.column.trim().is_empty() || field.field.trim().is_empty() {
                return Err(invalid(format!(
                    "field '{}' requires both a column and a field",
                    field.name
                )));
            }
            if !field_names.insert(field.name.as_str()) {
                return Err(invalid(format!("duplicate field '{}'", field.name)));
            }
        }

        let mut relation_names = HashSet::new();
        for relation in &self.relations {
            let name = &relation.name;
            if name.trim().is_empty() {
                return Err(invalid("relation name is required".into()));
            }
            if !relation_names.insert(name.as_str()) {
                return Err(invalid(format!("duplicate relation '{name}'")));
            }
            if relation.foreign_key.trim().is_empty() {
                return Err(invalid(format!("relation '{name}' requires a foreign_key")));
            }
            if relation.field.trim().is_empty() {
                return Err(invalid(format!("relation '{name}' requires a field")));
            }
            if relation.embedding == Embedding::Reference && relation.reference_key.is_none() {
                return Err(invalid(format!(
                    "relation '{name}' uses reference embedding without a reference_key"
                )));
            }

            match relation.kind {
                RelationKind::OneToMany => {
                    if is_blank(&relation.table) {
                        return Err(invalid(format!(
                            "one-to-many relation '{name}' requires a table"
                        )));
                    }
                }
                RelationKind::ManyToMany => {
                    for (label, value) in [
                        ("join_table", &relation.join_table),
                        ("far_table", &relation.far_table),
                        ("join_far_column", &relation.join_far_column),
                        ("natural_key", &relation.natural_key),
                    ] {
                        if is_blank(value) {
                            return Err(invalid(format!(
                                "many-to-many relation '{name}' requires {label}"
                            )));
                        }
                    }
                    if relation.far_key.trim().is_empty() {
                        return Err(invalid(format!(
                            "many-to-many relation '{name}' requires far_key"
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Get a field mapping by its logical name.
    pub fn field(&self, name: &str) -> Option<&FieldConfig> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Get a relation by its key.
    pub fn relation(&self, name: &str) -> Option<&RelationConfig> {
        self.relations.iter().find(|r| r.name == name)
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or("").is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    const USERS_YAML: &str = r#"
entity: AppUser
table: users
collection: users
id: { column: id, field: _id, type: long }
fields:
  - { name: userName, column: user_name, field: username, type: string }
  - { name: points, column: points, field: points, type: int }
  - { name: registeredAt, column: registered_at, field: registeredAt, type: datetime, format: ISO8601 }
relations:
  - name: orders
    kind: one-to-many
    table: orders
    foreign_key: user_id
    field: orders
  - name: roles
    kind: many-to-many
    join_table: user_roles
    foreign_key: user_id
    far_table: roles
    join_far_column: role_id
    natural_key: name
    fields: [name]
    field: roles
    embedding: reference
    reference_key: name
"#;

    #[test]
    fn test_parse_yaml_mapping() {
        let schema = MappingSchema::from_yaml(USERS_YAML).unwrap();

        assert_eq!(schema.entity, "AppUser");
        assert_eq!(schema.id.column, "id");
        assert_eq!(schema.id.field, "_id");
        // "long" is not a known logical type
        assert_eq!(schema.id.id_type, LogicalType::Passthrough);
        assert_eq!(schema.fields.len(), 3);
        assert_eq!(schema.fields[0].name, "userName");
        assert_eq!(
            schema.field("registeredAt").unwrap().field_type,
            LogicalType::DateTime
        );

        let roles = schema.relation("roles").unwrap();
        assert_eq!(roles.kind, RelationKind::ManyToMany);
        assert_eq!(roles.embedding, Embedding::Reference);
        assert_eq!(roles.far_key, "id");
        assert_eq!(roles.join_far_column.as_deref(), Some("role_id"));

        let orders = schema.relation("orders").unwrap();
        assert_eq!(orders.embedding, Embedding::Inline);
    }

    #[test]
    fn test_parse_json_mapping() {
        let json = r#"{
            "entity": "AppUser",
            "table": "users",
            "collection": "users",
            "id": {"column": "id", "field": "_id"},
            "fields": [{"name": "email", "column": "email", "field": "email", "type": "string"}]
        }"#;
        let schema = MappingSchema::from_json(json).unwrap();
        assert_eq!(schema.fields[0].field_type, LogicalType::String);
        assert!(schema.relations.is_empty());
    }

    #[test]
    fn test_from_file_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let yaml_path = dir.path().join("users.yaml");
        std::fs::write(&yaml_path, USERS_YAML).unwrap();
        assert_eq!(MappingSchema::from_file(&yaml_path).unwrap().entity, "AppUser");

        let json_path = dir.path().join("users.json");
        let schema = MappingSchema::from_yaml(USERS_YAML).unwrap();
        std::fs::write(&json_path, serde_json::to_string(&schema).unwrap()).unwrap();
        assert_eq!(MappingSchema::from_file(&json_path).unwrap(), schema);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = MappingSchema::from_file("/nonexistent/mapping.yaml").unwrap_err();
        assert!(matches!(err, SchemaError::Io { .. }));
    }

    #[test]
    fn test_empty_id_field_rejected() {
        let yaml = r#"
entity: AppUser
table: users
collection: users
id: { column: id, field: "" }
"#;
        let err = MappingSchema::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("id strategy"));
    }

    #[test]
    fn test_empty_foreign_key_rejected() {
        let yaml = r#"
entity: AppUser
table: users
collection: users
id: { column: id, field: _id }
relations:
  - { name: orders, kind: one-to-many, table: orders, foreign_key: "", field: orders }
"#;
        let err = MappingSchema::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("foreign_key"));
    }

    #[test]
    fn test_duplicate_relation_rejected() {
        let yaml = r#"
entity: AppUser
table: users
collection: users
id: { column: id, field: _id }
relations:
  - { name: orders, kind: one-to-many, table: orders, foreign_key: user_id, field: orders }
  - { name: orders, kind: one-to-many, table: orders2, foreign_key: user_id, field: orders2 }
"#;
        let err = MappingSchema::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate relation 'orders'"));
    }

    #[test]
    fn test_many_to_many_requires_resolution_config() {
        let yaml = r#"
entity: AppUser
table: users
collection: users
id: { column: id, field: _id }
relations:
  - { name: roles, kind: many-to-many, join_table: user_roles, foreign_key: user_id, far_table: roles, field: roles }
"#;
        let err = MappingSchema::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("join_far_column"));
    }

    #[test]
    fn test_reference_embedding_requires_key() {
        let mut schema = MappingSchema::from_yaml(USERS_YAML).unwrap();
        schema.relations[1].reference_key = None;
        let err = schema.validate().unwrap_err();
        assert!(err.to_string().contains("reference_key"));
    }

    #[test]
    fn test_unknown_kind_is_parse_error() {
        let yaml = r#"
entity: AppUser
table: users
collection: users
id: { column: id, field: _id }
relations:
  - { name: x, kind: one-to-one, table: t, foreign_key: fk, field: x }
"#;
        assert!(matches!(
            MappingSchema::from_yaml(yaml).unwrap_err(),
            SchemaError::Yaml(_)
        ));
    }
}

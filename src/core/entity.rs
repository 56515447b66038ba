//! Entity descriptors: the read-only reflection surface the query engine works against
//!
//! An entity is a relational record type with typed columns, a (possibly
//! composite) primary key and named relationships to other entities. The
//! engine never introspects types at runtime; it only asks a descriptor for
//! its columns, its relationships and their join conditions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::error::GrammarError;

/// Storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    Boolean,
    Date,
    #[serde(alias = "timestamp")]
    DateTime,
    Json,
}

impl ColumnType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    pub fn is_json(&self) -> bool {
        matches!(self, ColumnType::Json)
    }

    /// Configuration name of the type
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::DateTime => "date_time",
            ColumnType::Json => "json",
        }
    }
}

/// A column of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,

    #[serde(rename = "type")]
    pub column_type: ColumnType,

    #[serde(default)]
    pub nullable: bool,

    #[serde(default)]
    pub primary_key: bool,
}

impl Column {
    /// Create a non-nullable, non-key column
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            primary_key: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Equality join between a column of the owning entity and a column of the target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinCondition {
    pub local_column: String,
    pub remote_column: String,
}

impl JoinCondition {
    pub fn new(local_column: impl Into<String>, remote_column: impl Into<String>) -> Self {
        Self {
            local_column: local_column.into(),
            remote_column: remote_column.into(),
        }
    }
}

/// A named relationship to another entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub name: String,

    /// Name of the related entity in the [`SchemaRegistry`]
    pub target: String,

    #[serde(flatten)]
    pub join: JoinCondition,
}

impl Relationship {
    pub fn new(name: impl Into<String>, target: impl Into<String>, join: JoinCondition) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            join,
        }
    }
}

/// Reflection surface of an entity type.
///
/// Implementations are computed once per entity type and treated as static
/// metadata by the query engine.
pub trait EntityDescriptor: Send + Sync {
    /// Name of the entity (e.g. "measurement")
    fn entity_name(&self) -> &str;

    /// Name of the backing table, defaults to the entity name
    fn table_name(&self) -> &str {
        self.entity_name()
    }

    /// All columns, in declaration order
    fn columns(&self) -> &[Column];

    /// All relationships, in declaration order
    fn relationships(&self) -> &[Relationship];

    /// Find a column by name
    fn column(&self, name: &str) -> Option<&Column> {
        self.columns().iter().find(|c| c.name == name)
    }

    /// Find a relationship by name
    fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships().iter().find(|r| r.name == name)
    }

    fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Names of the primary key columns, in declaration order
    fn primary_keys(&self) -> Vec<&str> {
        self.columns()
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name.clone()).collect()
    }

    fn relationship_names(&self) -> Vec<String> {
        self.relationships().iter().map(|r| r.name.clone()).collect()
    }
}

/// Plain data implementation of [`EntityDescriptor`]
///
/// # Example
///
/// ```rust
/// use dictquery::core::entity::{Column, ColumnType, EntityModel, JoinCondition};
///
/// let model = EntityModel::new("measurement")
///     .with_column(Column::new("id", ColumnType::Integer).primary_key())
///     .with_column(Column::new("attribute_id", ColumnType::Integer))
///     .with_relationship("attribute", "attribute", JoinCondition::new("attribute_id", "id"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityModel {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    pub columns: Vec<Column>,

    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl EntityModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            columns: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_relationship(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        join: JoinCondition,
    ) -> Self {
        self.relationships.push(Relationship::new(name, target, join));
        self
    }
}

impl EntityDescriptor for EntityModel {
    fn entity_name(&self) -> &str {
        &self.name
    }

    fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }

    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }
}

/// Registry of entity descriptors, keyed by entity name
///
/// Relationships name their target entity; the registry resolves those names
/// while a path is walked, so cyclic relationships need no shared ownership.
#[derive(Clone, Default)]
pub struct SchemaRegistry {
    descriptors: BTreeMap<String, Arc<dyn EntityDescriptor>>,
}

impl SchemaRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            descriptors: BTreeMap::new(),
        }
    }

    /// Register an entity descriptor
    ///
    /// The entity name is used as the key; registering the same name again
    /// replaces the previous descriptor.
    pub fn register(&mut self, descriptor: impl EntityDescriptor + 'static) {
        let name = descriptor.entity_name().to_string();
        self.descriptors.insert(name, Arc::new(descriptor));
    }

    pub fn with(mut self, descriptor: impl EntityDescriptor + 'static) -> Self {
        self.register(descriptor);
        self
    }

    pub fn get(&self, entity: &str) -> Option<&Arc<dyn EntityDescriptor>> {
        self.descriptors.get(entity)
    }

    /// Get a descriptor or fail with [`GrammarError::UnknownEntity`]
    pub fn resolve(&self, entity: &str) -> Result<&Arc<dyn EntityDescriptor>, GrammarError> {
        self.get(entity).ok_or_else(|| GrammarError::UnknownEntity {
            entity: entity.to_string(),
        })
    }

    /// Get all registered entity names
    pub fn entity_names(&self) -> Vec<&str> {
        self.descriptors.keys().map(|s| s.as_str()).collect()
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("entities", &self.entity_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measurement() -> EntityModel {
        EntityModel::new("measurement")
            .with_table("data_measurement")
            .with_column(Column::new("id", ColumnType::Integer).primary_key())
            .with_column(Column::new("variant", ColumnType::Text).primary_key())
            .with_column(Column::new("value", ColumnType::Float).nullable())
            .with_relationship("attribute", "attribute", JoinCondition::new("attribute_id", "id"))
    }

    #[test]
    fn test_primary_keys_in_declaration_order() {
        assert_eq!(measurement().primary_keys(), vec!["id", "variant"]);
    }

    #[test]
    fn test_table_name_defaults_to_entity_name() {
        assert_eq!(measurement().table_name(), "data_measurement");
        assert_eq!(EntityModel::new("unit").table_name(), "unit");
    }

    #[test]
    fn test_column_and_relationship_lookup() {
        let model = measurement();
        assert!(model.has_column("value"));
        assert!(!model.has_column("attribute"));
        assert!(model.column("value").is_some_and(|c| c.nullable));
        assert_eq!(
            model.relationship("attribute").map(|r| r.target.as_str()),
            Some("attribute")
        );
    }

    #[test]
    fn test_registry_register_and_resolve() {
        let registry = SchemaRegistry::new().with(measurement());
        assert_eq!(registry.entity_names(), vec!["measurement"]);
        assert!(registry.resolve("measurement").is_ok());
        assert!(matches!(
            registry.resolve("unknown"),
            Err(GrammarError::UnknownEntity { .. })
        ));
    }

    #[test]
    fn test_column_type_serde_names() {
        let column: Column =
            serde_json::from_str(r#"{"name": "at", "type": "timestamp"}"#).expect("should parse");
        assert_eq!(column.column_type, ColumnType::DateTime);
        assert!(!column.primary_key);
    }
}

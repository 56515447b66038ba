//! Schema configuration loading and validation
//!
//! Entities, their columns, relationships and base filters can be declared
//! in YAML:
//!
//! ```yaml
//! entities:
//!   - name: measurement
//!     columns:
//!       - { name: id, type: integer, primary_key: true }
//!       - { name: variant, type: text, primary_key: true }
//!       - { name: row_permission_id, type: integer, nullable: true }
//!     relationships:
//!       - { name: attribute, target: attribute, local_column: attribute_id, remote_column: id }
//!     base_filters:
//!       - { kind: row_permission, column: row_permission_id }
//! ```

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::core::entity::{Column, ColumnType, EntityModel, Relationship, SchemaRegistry};
use crate::core::error::ConfigError;
use crate::query::base_query::{
    BaseQueryChain, DEFAULT_OWNER_COLUMN, DEFAULT_ROW_PERMISSION_COLUMN,
    DEFAULT_SOFT_DELETE_COLUMN, OwnerFilter, RowPermissionFilter, SoftDeleteFilter,
};
use crate::query::expr::ROOT_ALIAS;

fn identifier_regex() -> &'static Regex {
    static IDENTIFIER_REGEX: OnceLock<Regex> = OnceLock::new();
    IDENTIFIER_REGEX
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex is valid"))
}

/// Base filter declared for an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BaseFilterConfig {
    RowPermission {
        #[serde(default = "default_row_permission_column")]
        column: String,
    },
    Owner {
        #[serde(default = "default_owner_column")]
        column: String,
    },
    SoftDelete {
        #[serde(default = "default_soft_delete_column")]
        column: String,
    },
}

fn default_row_permission_column() -> String {
    DEFAULT_ROW_PERMISSION_COLUMN.to_string()
}

fn default_owner_column() -> String {
    DEFAULT_OWNER_COLUMN.to_string()
}

fn default_soft_delete_column() -> String {
    DEFAULT_SOFT_DELETE_COLUMN.to_string()
}

impl BaseFilterConfig {
    pub fn column(&self) -> &str {
        match self {
            BaseFilterConfig::RowPermission { column }
            | BaseFilterConfig::Owner { column }
            | BaseFilterConfig::SoftDelete { column } => column,
        }
    }

    /// Storage type the filter column must have, if constrained
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            BaseFilterConfig::SoftDelete { .. } => Some(SoftDeleteFilter::COLUMN_TYPE),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BaseFilterConfig::RowPermission { .. } => RowPermissionFilter::NAME,
            BaseFilterConfig::Owner { .. } => OwnerFilter::NAME,
            BaseFilterConfig::SoftDelete { .. } => SoftDeleteFilter::NAME,
        }
    }
}

/// Configuration for an entity type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,

    /// Backing table, defaults to the entity name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    pub columns: Vec<Column>,

    #[serde(default)]
    pub relationships: Vec<Relationship>,

    /// Base filters, applied in declaration order
    #[serde(default)]
    pub base_filters: Vec<BaseFilterConfig>,
}

impl EntityConfig {
    fn model(&self) -> EntityModel {
        EntityModel {
            name: self.name.clone(),
            table: self.table.clone(),
            columns: self.columns.clone(),
            relationships: self.relationships.clone(),
        }
    }

    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Complete schema configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub entities: Vec<EntityConfig>,
}

impl SchemaConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    pub fn entity(&self, name: &str) -> Option<&EntityConfig> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Check the whole schema.
    ///
    /// Identifiers end up quoted inside SQL, so they must be plain
    /// identifiers; relationships must point to declared entities through
    /// existing columns; every entity needs a primary key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for entity in &self.entities {
            if !seen.insert(entity.name.as_str()) {
                return Err(ConfigError::DuplicateEntity {
                    entity: entity.name.clone(),
                });
            }
        }

        for entity in &self.entities {
            check_identifier(&entity.name, "entity name")?;
            if let Some(table) = &entity.table {
                check_identifier(table, &format!("table of entity '{}'", entity.name))?;
            }
            for column in &entity.columns {
                check_identifier(&column.name, &format!("columns of entity '{}'", entity.name))?;
            }
            if !entity.columns.iter().any(|c| c.primary_key) {
                return Err(ConfigError::MissingPrimaryKey {
                    entity: entity.name.clone(),
                });
            }

            for relationship in &entity.relationships {
                self.validate_relationship(entity, relationship)?;
            }

            for filter in &entity.base_filters {
                let context = format!("base filter '{}'", filter.kind());
                let column = entity.find_column(filter.column()).ok_or_else(|| {
                    ConfigError::UnknownColumn {
                        entity: entity.name.clone(),
                        column: filter.column().to_string(),
                        context: context.clone(),
                    }
                })?;
                match filter.column_type() {
                    Some(expected) if column.column_type != expected => {
                        return Err(ConfigError::InvalidColumnType {
                            entity: entity.name.clone(),
                            column: column.name.clone(),
                            expected: expected.name().to_string(),
                            context,
                        });
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn validate_relationship(
        &self,
        entity: &EntityConfig,
        relationship: &Relationship,
    ) -> Result<(), ConfigError> {
        let context = format!("relationships of entity '{}'", entity.name);
        check_identifier(&relationship.name, &context)?;
        if relationship.name == ROOT_ALIAS {
            return Err(ConfigError::InvalidIdentifier {
                identifier: relationship.name.clone(),
                context: format!("{context}, the name is reserved for the root alias"),
            });
        }

        let target = self
            .entity(&relationship.target)
            .ok_or_else(|| ConfigError::UnknownTarget {
                entity: entity.name.clone(),
                relationship: relationship.name.clone(),
                target: relationship.target.clone(),
            })?;

        let join_context = format!("join of relationship '{}'", relationship.name);
        if !entity.has_column(&relationship.join.local_column) {
            return Err(ConfigError::UnknownColumn {
                entity: entity.name.clone(),
                column: relationship.join.local_column.clone(),
                context: join_context,
            });
        }
        if !target.has_column(&relationship.join.remote_column) {
            return Err(ConfigError::UnknownColumn {
                entity: target.name.clone(),
                column: relationship.join.remote_column.clone(),
                context: join_context,
            });
        }
        Ok(())
    }

    /// Validate and build the schema registry
    pub fn into_registry(&self) -> Result<SchemaRegistry, ConfigError> {
        self.validate()?;
        let mut registry = SchemaRegistry::new();
        for entity in &self.entities {
            registry.register(entity.model());
        }
        Ok(registry)
    }

    /// Base query chain declared for `entity`
    pub fn base_query_for(&self, entity: &str) -> Option<BaseQueryChain> {
        let config = self.entity(entity)?;
        let mut chain = BaseQueryChain::new();
        for filter in &config.base_filters {
            match filter {
                BaseFilterConfig::RowPermission { column } => {
                    chain.push(RowPermissionFilter::new(column.clone()))
                }
                BaseFilterConfig::Owner { column } => chain.push(OwnerFilter::new(column.clone())),
                BaseFilterConfig::SoftDelete { column } => {
                    chain.push(SoftDeleteFilter::new(column.clone()))
                }
            }
        }
        Some(chain)
    }
}

fn check_identifier(identifier: &str, context: &str) -> Result<(), ConfigError> {
    if identifier_regex().is_match(identifier) {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier {
            identifier: identifier.to_string(),
            context: context.to_string(),
        })
    }
}

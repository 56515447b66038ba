//! Composed, unexecuted query descriptions
//!
//! A [`Query`] is what the builder hands to an executor: the root entity, the
//! joins it needs, conjunctive predicates and ordering. Nothing here touches
//! storage; executors interpret the structure.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::core::entity::{ColumnType, EntityDescriptor, JoinCondition};
use crate::query::operators::{Operator, OrderModifier};

/// Alias of the root entity inside a query
pub const ROOT_ALIAS: &str = "root";

/// Separator between path tokens
pub const PATH_SEPARATOR: &str = "__";

/// Separator between a column and a JSON key
pub const JSON_KEY_SEPARATOR: &str = "->";

/// A resolved column, qualified by the alias of the entity it belongs to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnRef {
    /// [`ROOT_ALIAS`] or the relationship path of a join (`attribute__unit`)
    pub alias: String,

    /// Entity owning the column
    pub entity: String,

    pub column: String,

    pub column_type: ColumnType,

    /// Key extracted (as text) from a JSON column
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_key: Option<String>,
}

impl ColumnRef {
    /// Column of the root entity
    pub fn root(entity: impl Into<String>, column: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            alias: ROOT_ALIAS.to_string(),
            entity: entity.into(),
            column: column.into(),
            column_type,
            json_key: None,
        }
    }

    pub fn with_json_key(mut self, key: impl Into<String>) -> Self {
        self.json_key = Some(key.into());
        self
    }

    pub fn is_root(&self) -> bool {
        self.alias == ROOT_ALIAS
    }
}

impl fmt::Display for ColumnRef {
    /// Path notation, `attribute__description` or `extra->unit`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_root() {
            write!(f, "{}{}", self.alias, PATH_SEPARATOR)?;
        }
        f.write_str(&self.column)?;
        if let Some(key) = &self.json_key {
            write!(f, "{}{}", JSON_KEY_SEPARATOR, key)?;
        }
        Ok(())
    }
}

/// Boolean condition over one row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Compare {
        column: ColumnRef,
        operator: Operator,
        value: Value,
    },
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }

    /// Parse an order dictionary value, only `"asc"` and `"desc"` are valid
    pub fn from_value(value: &Value) -> Option<Self> {
        match value.as_str() {
            Some("asc") => Some(Direction::Asc),
            Some("desc") => Some(Direction::Desc),
            _ => None,
        }
    }
}

/// One ordering clause
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderTerm {
    pub column: ColumnRef,
    pub direction: Direction,
    pub modifier: OrderModifier,
}

/// Join requirement collected while walking a relationship path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Join {
    /// Relationship path from the root, also the alias of the joined table
    pub alias: String,

    /// Alias of the entity owning the relationship
    pub parent_alias: String,

    pub relationship: String,

    /// Target entity
    pub entity: String,

    /// Target table
    pub table: String,

    pub condition: JoinCondition,
}

/// Composed query rooted at one entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    pub entity: String,
    pub table: String,
    pub joins: Vec<Join>,
    pub predicates: Vec<Predicate>,
    pub order_by: Vec<OrderTerm>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Query {
    /// Unrestricted query over every row of `entity`
    pub fn new(entity: &dyn EntityDescriptor) -> Self {
        Self {
            entity: entity.entity_name().to_string(),
            table: entity.table_name().to_string(),
            joins: Vec::new(),
            predicates: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn has_join(&self, alias: &str) -> bool {
        self.joins.iter().any(|j| j.alias == alias)
    }

    /// Add a join unless one with the same alias is already present.
    ///
    /// Returns `true` when the join was added.
    pub fn add_join(&mut self, join: Join) -> bool {
        if self.has_join(&join.alias) {
            return false;
        }
        self.joins.push(join);
        true
    }

    /// Add a conjunctive predicate
    pub fn filter(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    pub fn order(&mut self, term: OrderTerm) {
        self.order_by.push(term);
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::{Column, EntityModel};
    use serde_json::json;

    fn join(alias: &str) -> Join {
        Join {
            alias: alias.to_string(),
            parent_alias: ROOT_ALIAS.to_string(),
            relationship: alias.to_string(),
            entity: "attribute".to_string(),
            table: "attribute".to_string(),
            condition: JoinCondition::new("attribute_id", "id"),
        }
    }

    #[test]
    fn test_column_ref_display() {
        let root = ColumnRef::root("measurement", "extra", ColumnType::Json).with_json_key("unit");
        assert_eq!(root.to_string(), "extra->unit");

        let joined = ColumnRef {
            alias: "attribute__unit".to_string(),
            entity: "unit".to_string(),
            column: "code".to_string(),
            column_type: ColumnType::Text,
            json_key: None,
        };
        assert_eq!(joined.to_string(), "attribute__unit__code");
    }

    #[test]
    fn test_add_join_deduplicates_by_alias() {
        let model = EntityModel::new("measurement").with_column(Column::new("id", ColumnType::Integer));
        let mut query = Query::new(&model);
        assert!(query.add_join(join("attribute")));
        assert!(!query.add_join(join("attribute")));
        assert!(query.add_join(join("other_attribute")));
        assert_eq!(query.joins.len(), 2);
    }

    #[test]
    fn test_direction_from_value() {
        assert_eq!(Direction::from_value(&json!("asc")), Some(Direction::Asc));
        assert_eq!(Direction::from_value(&json!("desc")), Some(Direction::Desc));
        assert_eq!(Direction::from_value(&json!("DESC")), None);
        assert_eq!(Direction::from_value(&json!(1)), None);
    }
}

//! Dimension listing
//!
//! Rows may carry a JSON object of dimensions (`{"site": "north", "sensor":
//! "t1"}`). Two listings run over the rows a filtered query selects:
//!
//! ```text
//! SELECT DISTINCT jsonb_object_keys(dimensions) AS keys FROM (<query>) ORDER BY keys
//! SELECT DISTINCT dimensions -> key AS value FROM (<query>) WHERE <not null> ORDER BY value
//! ```

use serde::Serialize;
use tracing::debug;

use crate::core::entity::{ColumnType, SchemaRegistry};
use crate::core::error::{DimensionError, QueryResult};
use crate::core::query::DimensionParams;
use crate::query::builder::QueryBuilder;
use crate::query::expr::Query;

pub const DEFAULT_DIMENSIONS_COLUMN: &str = "dimensions";

/// What a dimension query lists
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "list", rename_all = "snake_case")]
pub enum DimensionTarget {
    /// Distinct keys of the dimension objects
    Keys,
    /// Distinct non-null values of one dimension
    Values { key: String },
}

/// Distinct dimension keys or values over a filtered source query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionQuery {
    pub source: Query,
    /// JSON column holding the dimensions
    pub column: String,
    pub target: DimensionTarget,
}

impl DimensionQuery {
    /// Name of the single column of the listing
    pub fn output_column(&self) -> &'static str {
        match self.target {
            DimensionTarget::Keys => "keys",
            DimensionTarget::Values { .. } => "value",
        }
    }
}

/// Builds [`DimensionQuery`] values
#[derive(Debug, Clone)]
pub struct DimensionBuilder<'a> {
    registry: &'a SchemaRegistry,
    column: String,
}

impl<'a> DimensionBuilder<'a> {
    /// Builder listing the `dimensions` column
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self {
            registry,
            column: DEFAULT_DIMENSIONS_COLUMN.to_string(),
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// List `target` over an already filtered query.
    ///
    /// The dimension column must be a JSON column of the query's root
    /// entity. Ordering and limit of the source are dropped, the listing is
    /// always ordered by its own output.
    pub fn dimensions(&self, query: Query, target: DimensionTarget) -> QueryResult<DimensionQuery> {
        let descriptor = self.registry.resolve(&query.entity)?;
        let column = descriptor
            .column(&self.column)
            .ok_or_else(|| DimensionError::UnknownColumn {
                entity: query.entity.clone(),
                column: self.column.clone(),
            })?;
        if column.column_type != ColumnType::Json {
            return Err(DimensionError::NotJson {
                entity: query.entity.clone(),
                column: column.name.clone(),
                found: column.column_type.name().to_string(),
            }
            .into());
        }

        debug!(entity = %query.entity, column = %column.name, target = ?target, "Built dimension listing");
        Ok(DimensionQuery {
            column: column.name.clone(),
            source: Query {
                order_by: Vec::new(),
                limit: None,
                ..query
            },
            target,
        })
    }

    /// Distinct dimension keys of the rows selected by `params`
    pub fn list_dimensions(
        &self,
        entity: &str,
        base: Option<Query>,
        params: &DimensionParams,
    ) -> QueryResult<DimensionQuery> {
        let query = QueryBuilder::new(self.registry).build(entity, base, &params.list_params())?;
        self.dimensions(query, DimensionTarget::Keys)
    }

    /// Distinct values of dimension `params.key` of the rows selected by `params`
    pub fn list_dimension_values(
        &self,
        entity: &str,
        base: Option<Query>,
        params: &DimensionParams,
    ) -> QueryResult<DimensionQuery> {
        let key = params.key.clone().ok_or(DimensionError::MissingKey)?;
        let query = QueryBuilder::new(self.registry).build(entity, base, &params.list_params())?;
        self.dimensions(query, DimensionTarget::Values { key })
    }
}

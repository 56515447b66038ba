//! Aggregation builder
//!
//! Turns a filtered [`Query`] into a grouped query:
//!
//! ```text
//! SELECT group_by..., FN(field) AS key, ...
//! FROM (<filtered query>) GROUP BY group_by...
//! ```
//!
//! When an order is requested the grouped query is wrapped once more, so the
//! order may reference aggregate keys as well as grouping columns.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::core::entity::SchemaRegistry;
use crate::core::error::{AggregationError, QueryResult};
use crate::core::query::AggregateParams;
use crate::query::builder::QueryBuilder;
use crate::query::expr::{Direction, Query};

/// Aggregation function registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Sum,
    Mean,
    /// Count of non-null values
    Count,
    Min,
    Max,
    /// Population standard deviation
    Std,
    /// Population variance
    Var,
}

pub const AGGREGATE_FUNCTIONS: &[&str] = &["sum", "mean", "count", "min", "max", "std", "var"];

impl AggregateFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sum" => Some(AggregateFunction::Sum),
            "mean" => Some(AggregateFunction::Mean),
            "count" => Some(AggregateFunction::Count),
            "min" => Some(AggregateFunction::Min),
            "max" => Some(AggregateFunction::Max),
            "std" => Some(AggregateFunction::Std),
            "var" => Some(AggregateFunction::Var),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Sum => "sum",
            AggregateFunction::Mean => "mean",
            AggregateFunction::Count => "count",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Std => "std",
            AggregateFunction::Var => "var",
        }
    }

    /// PostgreSQL function name
    pub fn sql_name(&self) -> &'static str {
        match self {
            AggregateFunction::Sum => "sum",
            AggregateFunction::Mean => "avg",
            AggregateFunction::Count => "count",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Std => "stddev_pop",
            AggregateFunction::Var => "var_pop",
        }
    }
}

/// One named aggregate column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateSpec {
    /// Output column name
    pub key: String,
    pub field: String,
    pub function: AggregateFunction,
}

impl AggregateSpec {
    /// Parse `{"field": ..., "function": ...}` for result key `key`
    pub fn from_json(key: &str, spec: &Value) -> Result<Self, AggregationError> {
        let invalid = |message: &str| AggregationError::InvalidSpec {
            key: key.to_string(),
            message: message.to_string(),
        };
        let object = spec
            .as_object()
            .ok_or_else(|| invalid("expected an object with field and function"))?;
        let field = object
            .get("field")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("field must be a string"))?;
        let function = object
            .get("function")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("function must be a string"))?;

        let function =
            AggregateFunction::from_name(function).ok_or_else(|| AggregationError::UnknownFunction {
                key: key.to_string(),
                function: function.to_string(),
                available: AGGREGATE_FUNCTIONS.iter().map(|f| f.to_string()).collect(),
            })?;

        Ok(Self {
            key: key.to_string(),
            field: field.to_string(),
            function,
        })
    }
}

/// Ordering over the grouped output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateOrder {
    pub column: String,
    pub direction: Direction,
}

/// Grouped query over a filtered source query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateQuery {
    /// Filtered rows being aggregated, exposing the root entity columns
    pub source: Query,
    pub group_by: Vec<String>,
    pub aggregates: Vec<AggregateSpec>,
    /// Empty unless the grouped query is wrapped for ordering
    pub order_by: Vec<AggregateOrder>,
}

impl AggregateQuery {
    /// Columns exposed by the grouped query, grouping columns first
    pub fn output_columns(&self) -> Vec<String> {
        self.group_by
            .iter()
            .cloned()
            .chain(self.aggregates.iter().map(|a| a.key.clone()))
            .collect()
    }

    pub fn is_wrapped(&self) -> bool {
        !self.order_by.is_empty()
    }
}

/// Builds [`AggregateQuery`] values
#[derive(Debug, Clone, Copy)]
pub struct AggregationBuilder<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> AggregationBuilder<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Group and aggregate an already filtered query.
    ///
    /// `group_by` and every aggregated field must be columns of the query's
    /// root entity; `order_by` entries must name a grouping column or an
    /// aggregate key, `-` prefixed for descending order.
    pub fn aggregate<S: AsRef<str>>(
        &self,
        query: Query,
        group_by: &[S],
        agg: &Map<String, Value>,
        order_by: &[S],
    ) -> QueryResult<AggregateQuery> {
        let descriptor = self.registry.resolve(&query.entity)?;
        let entity = descriptor.entity_name().to_string();

        let mut grouping = Vec::with_capacity(group_by.len());
        for field in group_by {
            let field = field.as_ref();
            if !descriptor.has_column(field) {
                return Err(AggregationError::UnknownGroupBy {
                    field: field.to_string(),
                    entity,
                }
                .into());
            }
            grouping.push(field.to_string());
        }

        let mut aggregates = Vec::with_capacity(agg.len());
        for (key, spec) in agg {
            let spec = AggregateSpec::from_json(key, spec)?;
            if !descriptor.has_column(&spec.field) {
                return Err(AggregationError::UnknownField {
                    key: key.clone(),
                    field: spec.field,
                    entity,
                }
                .into());
            }
            if grouping.contains(key) {
                return Err(AggregationError::InvalidSpec {
                    key: key.clone(),
                    message: "aggregate key collides with a group by column".to_string(),
                }
                .into());
            }
            aggregates.push(spec);
        }

        let mut aggregate = AggregateQuery {
            source: Query {
                order_by: Vec::new(),
                limit: None,
                ..query
            },
            group_by: grouping,
            aggregates,
            order_by: Vec::new(),
        };

        let available = aggregate.output_columns();
        for entry in order_by {
            let entry = entry.as_ref();
            let (column, direction) = match entry.strip_prefix('-') {
                Some(column) => (column, Direction::Desc),
                None => (entry, Direction::Asc),
            };
            if !available.iter().any(|c| c == column) {
                return Err(AggregationError::UnknownOrderBy {
                    column: column.to_string(),
                    available,
                }
                .into());
            }
            aggregate.order_by.push(AggregateOrder {
                column: column.to_string(),
                direction,
            });
        }

        debug!(
            entity = %entity,
            group_by = ?aggregate.group_by,
            aggregates = aggregate.aggregates.len(),
            wrapped = aggregate.is_wrapped(),
            "Built aggregation"
        );
        Ok(aggregate)
    }

    /// Build the filtered query for `entity` and aggregate it
    pub fn build(
        &self,
        entity: &str,
        base: Option<Query>,
        params: &AggregateParams,
    ) -> QueryResult<AggregateQuery> {
        let query = QueryBuilder::new(self.registry).build(entity, base, &params.list_params())?;
        self.aggregate(query, &params.group_by, &params.agg, &params.order_by)
    }
}

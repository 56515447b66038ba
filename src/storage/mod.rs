//! Query executors for different backends
//!
//! The translation engine only produces [`Query`], [`AggregateQuery`] and
//! [`DimensionQuery`] descriptions; executors interpret them against a store.

#[cfg(feature = "in-memory")]
pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::error::QueryResult;
use crate::query::aggregate::AggregateQuery;
use crate::query::dimensions::DimensionQuery;
use crate::query::expr::Query;

#[cfg(feature = "in-memory")]
pub use in_memory::InMemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresExecutor;
pub use postgres::{PostgresRenderer, SqlParam, SqlStatement};

/// One result row, column name to value
pub type Row = Map<String, Value>;

/// Executes composed queries
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Rows of the query's root entity, filtered, ordered and limited
    async fn fetch(&self, query: &Query) -> QueryResult<Vec<Row>>;

    /// Grouped rows, grouping columns first then aggregate keys
    async fn fetch_aggregate(&self, query: &AggregateQuery) -> QueryResult<Vec<Row>>;

    /// Distinct dimension keys (strings) or values (JSON), ascending
    async fn fetch_dimensions(&self, query: &DimensionQuery) -> QueryResult<Vec<Value>>;
}

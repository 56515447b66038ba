//! Row-access base queries
//!
//! Strategies applied before any caller filter to restrict which rows a
//! caller may see. Each strategy checks its configured column exists on the
//! entity (soft delete also needs it to be boolean), then adds one
//! conjunctive predicate, unless the caller is a superuser who asked for that
//! strategy to be skipped.

use serde_json::Value;
use tracing::{debug, info};

use crate::core::auth::AuthContext;
use crate::core::entity::{Column, ColumnType, EntityDescriptor};
use crate::core::error::{BaseQueryError, QueryResult};
use crate::query::expr::{ColumnRef, Query};
use crate::query::operators::Operator;

pub const DEFAULT_ROW_PERMISSION_COLUMN: &str = "row_permission_id";
pub const DEFAULT_OWNER_COLUMN: &str = "owner_id";
pub const DEFAULT_SOFT_DELETE_COLUMN: &str = "deleted";

/// Strategy producing the base query of an entity
pub trait BaseQuery: Send + Sync {
    /// Key used by skip requests (e.g. "row_permission")
    fn name(&self) -> &str;

    /// Restrict `query` (or a fresh query over every row of `entity`)
    fn apply(
        &self,
        entity: &dyn EntityDescriptor,
        query: Option<Query>,
        auth: &AuthContext,
    ) -> QueryResult<Query>;
}

fn start(entity: &dyn EntityDescriptor, query: Option<Query>) -> Query {
    query.unwrap_or_else(|| Query::new(entity))
}

fn require_column<'e>(
    strategy: &str,
    entity: &'e dyn EntityDescriptor,
    column: &str,
) -> Result<&'e Column, BaseQueryError> {
    entity
        .column(column)
        .ok_or_else(|| BaseQueryError::MissingColumn {
            strategy: strategy.to_string(),
            entity: entity.entity_name().to_string(),
            column: column.to_string(),
        })
}

fn require_type(
    strategy: &str,
    entity: &dyn EntityDescriptor,
    column: &Column,
    expected: ColumnType,
) -> Result<(), BaseQueryError> {
    if column.column_type == expected {
        return Ok(());
    }
    Err(BaseQueryError::InvalidColumnType {
        strategy: strategy.to_string(),
        entity: entity.entity_name().to_string(),
        column: column.name.clone(),
        expected: expected.name().to_string(),
        found: column.column_type.name().to_string(),
    })
}

/// Shared body of the column based strategies
fn restrict(
    strategy: &str,
    column: &str,
    operator: Operator,
    value: Value,
    entity: &dyn EntityDescriptor,
    query: Option<Query>,
    auth: &AuthContext,
) -> QueryResult<Query> {
    let found = require_column(strategy, entity, column)?;
    let mut query = start(entity, query);

    if auth.skips(strategy) {
        info!(
            strategy = %strategy,
            entity = %entity.entity_name(),
            user_id = auth.user_id,
            "Skipping base filter at superuser request"
        );
        return Ok(query);
    }

    let column = ColumnRef::root(entity.entity_name(), &found.name, found.column_type);
    query.filter(operator.apply(column, value)?);
    debug!(strategy = %strategy, entity = %entity.entity_name(), "Applied base filter");
    Ok(query)
}

/// No restriction
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFilter;

impl BaseQuery for NoFilter {
    fn name(&self) -> &str {
        "no_filter"
    }

    fn apply(
        &self,
        entity: &dyn EntityDescriptor,
        query: Option<Query>,
        _auth: &AuthContext,
    ) -> QueryResult<Query> {
        Ok(start(entity, query))
    }
}

/// Rows whose permission id is one the caller is authorized for
#[derive(Debug, Clone)]
pub struct RowPermissionFilter {
    pub column: String,
}

impl RowPermissionFilter {
    pub const NAME: &'static str = "row_permission";

    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
        }
    }
}

impl Default for RowPermissionFilter {
    fn default() -> Self {
        Self::new(DEFAULT_ROW_PERMISSION_COLUMN)
    }
}

impl BaseQuery for RowPermissionFilter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(
        &self,
        entity: &dyn EntityDescriptor,
        query: Option<Query>,
        auth: &AuthContext,
    ) -> QueryResult<Query> {
        let allowed: Vec<Value> = auth.row_permissions.iter().map(|id| Value::from(*id)).collect();
        restrict(
            Self::NAME,
            &self.column,
            Operator::In,
            Value::Array(allowed),
            entity,
            query,
            auth,
        )
    }
}

/// Rows owned by the caller
#[derive(Debug, Clone)]
pub struct OwnerFilter {
    pub column: String,
}

impl OwnerFilter {
    pub const NAME: &'static str = "owner";

    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
        }
    }
}

impl Default for OwnerFilter {
    fn default() -> Self {
        Self::new(DEFAULT_OWNER_COLUMN)
    }
}

impl BaseQuery for OwnerFilter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(
        &self,
        entity: &dyn EntityDescriptor,
        query: Option<Query>,
        auth: &AuthContext,
    ) -> QueryResult<Query> {
        restrict(
            Self::NAME,
            &self.column,
            Operator::Exact,
            Value::from(auth.user_id),
            entity,
            query,
            auth,
        )
    }
}

/// Rows not flagged as deleted
#[derive(Debug, Clone)]
pub struct SoftDeleteFilter {
    pub column: String,
}

impl SoftDeleteFilter {
    pub const NAME: &'static str = "soft_delete";
    /// Storage type the flag column must have
    pub const COLUMN_TYPE: ColumnType = ColumnType::Boolean;

    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
        }
    }
}

impl Default for SoftDeleteFilter {
    fn default() -> Self {
        Self::new(DEFAULT_SOFT_DELETE_COLUMN)
    }
}

impl BaseQuery for SoftDeleteFilter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(
        &self,
        entity: &dyn EntityDescriptor,
        query: Option<Query>,
        auth: &AuthContext,
    ) -> QueryResult<Query> {
        let found = require_column(Self::NAME, entity, &self.column)?;
        require_type(Self::NAME, entity, found, Self::COLUMN_TYPE)?;
        restrict(
            Self::NAME,
            &self.column,
            Operator::Exact,
            Value::Bool(false),
            entity,
            query,
            auth,
        )
    }
}

/// Strategies applied in sequence, each on the query returned by the previous one
#[derive(Default)]
pub struct BaseQueryChain {
    filters: Vec<Box<dyn BaseQuery>>,
}

impl BaseQueryChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: impl BaseQuery + 'static) {
        self.filters.push(Box::new(filter));
    }

    pub fn with(mut self, filter: impl BaseQuery + 'static) -> Self {
        self.push(filter);
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Names of the chained strategies, in application order
    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }
}

impl std::fmt::Debug for BaseQueryChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseQueryChain")
            .field("filters", &self.names())
            .finish()
    }
}

impl BaseQuery for BaseQueryChain {
    fn name(&self) -> &str {
        "chain"
    }

    fn apply(
        &self,
        entity: &dyn EntityDescriptor,
        query: Option<Query>,
        auth: &AuthContext,
    ) -> QueryResult<Query> {
        let mut query = start(entity, query);
        for filter in &self.filters {
            query = filter.apply(entity, Some(query), auth)?;
        }
        Ok(query)
    }
}

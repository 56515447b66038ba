//! Typed error handling for dictquery
//!
//! Every failure raised while translating a request into a query is a
//! caller-input (or configuration) error. Each category carries enough
//! structured payload for the caller to correct the request: the offending
//! path, the received value and the valid alternatives.
//!
//! # Error Categories
//!
//! - [`GrammarError`]: unrecognized path tokens, misplaced operators, bad order values
//! - [`CompositeKeyError`]: misuse of `pk`/`pk__in` on composite primary keys
//! - [`AggregationError`]: unknown aggregation functions or fields
//! - [`DimensionError`]: dimension listing over a missing or non-JSON column
//! - [`BaseQueryError`]: base filters configured against missing columns
//! - [`CodecError`]: malformed primary-key tokens
//! - [`ConfigError`]: invalid schema configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use dictquery::prelude::*;
//!
//! match builder.build("measurement", None, &params) {
//!     Ok(query) => executor.fetch(&query).await?,
//!     Err(QueryError::Grammar(GrammarError::UnknownToken { token, columns, .. })) => {
//!         eprintln!("unknown token {token}, try one of {columns:?}");
//!     }
//!     Err(e) => return Err(e.into()),
//! }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

/// The main error type for dictquery
#[derive(Debug, Error)]
pub enum QueryError {
    /// Filter/exclude/order path grammar errors
    #[error(transparent)]
    Grammar(#[from] GrammarError),

    /// Composite primary key filter errors
    #[error(transparent)]
    CompositeKey(#[from] CompositeKeyError),

    /// Aggregation specification errors
    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    /// Dimension listing errors
    #[error(transparent)]
    Dimension(#[from] DimensionError),

    /// Base query configuration errors
    #[error(transparent)]
    BaseQuery(#[from] BaseQueryError),

    /// Primary key token errors
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Schema configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Query execution failures reported by a storage backend
    #[error("{backend} execution error: {message}")]
    Execution { backend: String, message: String },
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Structured payload describing the offending input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl QueryError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            QueryError::Grammar(_) => StatusCode::BAD_REQUEST,
            QueryError::CompositeKey(_) => StatusCode::BAD_REQUEST,
            QueryError::Aggregation(_) => StatusCode::BAD_REQUEST,
            QueryError::Dimension(e) => e.status_code(),
            QueryError::BaseQuery(e) => e.status_code(),
            QueryError::Codec(_) => StatusCode::BAD_REQUEST,
            QueryError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            QueryError::Execution { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            QueryError::Grammar(e) => e.error_code(),
            QueryError::CompositeKey(e) => e.error_code(),
            QueryError::Aggregation(e) => e.error_code(),
            QueryError::Dimension(e) => e.error_code(),
            QueryError::BaseQuery(e) => e.error_code(),
            QueryError::Codec(e) => e.error_code(),
            QueryError::Config(_) => "CONFIG_ERROR",
            QueryError::Execution { .. } => "EXECUTION_ERROR",
        }
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    /// Get the structured payload for the error
    pub fn details(&self) -> Option<Value> {
        match self {
            QueryError::Grammar(e) => Some(e.details()),
            QueryError::CompositeKey(e) => Some(e.details()),
            QueryError::Aggregation(e) => Some(e.details()),
            QueryError::Dimension(e) => Some(e.details()),
            QueryError::BaseQuery(e) => Some(e.details()),
            QueryError::Codec(e) => Some(e.details()),
            QueryError::Config(_) => None,
            QueryError::Execution { backend, .. } => Some(json!({ "backend": backend })),
        }
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

// =============================================================================
// Grammar Errors
// =============================================================================

/// Errors raised while resolving a path expression against an entity
#[derive(Debug, Clone, Error)]
pub enum GrammarError {
    /// The root entity is not registered
    #[error("Unknown entity: {entity}")]
    UnknownEntity { entity: String },

    /// A token is neither a relationship, a column nor an operator
    #[error(
        "Token '{token}' not found on entity [{entity}] columns, relationships or operators. \
         Query string: '{path}'"
    )]
    UnknownToken {
        entity: String,
        token: String,
        path: String,
        columns: Vec<String>,
        relationships: Vec<String>,
        operators: Vec<String>,
    },

    /// An operator appeared before the last token
    #[error("No tokens are permitted after operator '{operator}'. Query string: '{path}'")]
    TokenAfterOperator { operator: String, path: String },

    /// A relationship appeared after a column was selected
    #[error("No relationships are permitted after column '{column}'. Query string: '{path}'")]
    RelationshipAfterColumn { column: String, path: String },

    /// A second column appeared on the same path
    #[error("No columns are permitted after column '{column}'. Query string: '{path}'")]
    MultipleColumns { column: String, path: String },

    /// The path only traversed relationships
    #[error("Query string '{path}' does not select a column")]
    MissingColumn { path: String },

    /// `a->b->c` style access
    #[error("Nested JSON key access is not implemented. Query string: '{path}'")]
    NestedJsonKey { path: String },

    /// `->key` used on a column that is not JSON
    #[error("Column '{column}' is not a JSON column, key access is not possible. Query string: '{path}'")]
    JsonKeyOnNonJson { column: String, path: String },

    /// Order value other than `asc`/`desc`
    #[error("Order value {value} not implemented for column '{column}', asc and desc available. Query string: '{path}'")]
    InvalidOrderDirection {
        column: String,
        value: Value,
        path: String,
    },

    /// Operand has the wrong shape for the operator
    #[error("Operator '{operator}' expects {expected}, received {received}. Query string: '{path}'")]
    InvalidOperand {
        operator: String,
        expected: String,
        received: Value,
        path: String,
    },
}

impl GrammarError {
    pub fn error_code(&self) -> &'static str {
        match self {
            GrammarError::UnknownEntity { .. } => "QUERY_UNKNOWN_ENTITY",
            GrammarError::UnknownToken { .. } => "QUERY_UNKNOWN_TOKEN",
            GrammarError::TokenAfterOperator { .. } => "QUERY_TOKEN_AFTER_OPERATOR",
            GrammarError::RelationshipAfterColumn { .. } => "QUERY_RELATIONSHIP_AFTER_COLUMN",
            GrammarError::MultipleColumns { .. } => "QUERY_MULTIPLE_COLUMNS",
            GrammarError::MissingColumn { .. } => "QUERY_MISSING_COLUMN",
            GrammarError::NestedJsonKey { .. } => "QUERY_NESTED_JSON_NOT_IMPLEMENTED",
            GrammarError::JsonKeyOnNonJson { .. } => "QUERY_JSON_KEY_ON_NON_JSON",
            GrammarError::InvalidOrderDirection { .. } => "QUERY_INVALID_ORDER_DIRECTION",
            GrammarError::InvalidOperand { .. } => "QUERY_INVALID_OPERAND",
        }
    }

    pub fn details(&self) -> Value {
        match self {
            GrammarError::UnknownEntity { entity } => json!({ "entity": entity }),
            GrammarError::UnknownToken {
                entity,
                token,
                path,
                columns,
                relationships,
                operators,
            } => json!({
                "entity": entity,
                "token": token,
                "query": path,
                "columns": columns,
                "relationships": relationships,
                "operators": operators,
            }),
            GrammarError::TokenAfterOperator { operator, path } => {
                json!({ "operator": operator, "query": path })
            }
            GrammarError::RelationshipAfterColumn { column, path }
            | GrammarError::MultipleColumns { column, path }
            | GrammarError::JsonKeyOnNonJson { column, path } => {
                json!({ "column": column, "query": path })
            }
            GrammarError::MissingColumn { path } | GrammarError::NestedJsonKey { path } => {
                json!({ "query": path })
            }
            GrammarError::InvalidOrderDirection {
                column,
                value,
                path,
            } => json!({
                "column": column,
                "value": value,
                "query": path,
                "available": ["asc", "desc"],
            }),
            GrammarError::InvalidOperand {
                operator,
                expected,
                received,
                path,
            } => json!({
                "operator": operator,
                "expected": expected,
                "received": received,
                "query": path,
            }),
        }
    }
}

// =============================================================================
// Composite Key Errors
// =============================================================================

/// Which dictionary a composite key error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DictKind {
    Filter,
    Exclude,
}

impl DictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DictKind::Filter => "filter_dict",
            DictKind::Exclude => "exclude_dict",
        }
    }
}

impl std::fmt::Display for DictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while opening `pk` filters on composite primary keys
#[derive(Debug, Clone, Error)]
pub enum CompositeKeyError {
    /// More than one pk-style key in the same dictionary
    #[error("Use just one {kind} entry for the composite primary key, found {keys:?}")]
    DuplicatePkKey { kind: DictKind, keys: Vec<String> },

    /// `pk__gt` and friends
    #[error(
        "Composite primary key filters support only the exact and in operators, \
         {kind} key '{key}' is not supported"
    )]
    UnsupportedPkOperator { kind: DictKind, key: String },

    /// Exclude clauses need the `id` component
    #[error("Composite primary key {pk} has no 'id' component to be used on {kind}")]
    MissingIdComponent { kind: DictKind, pk: Value },

    /// `pk__in` value is not a list
    #[error("{kind} key 'pk__in' expects a list of primary keys, received {received}")]
    InvalidPkList { kind: DictKind, received: Value },
}

impl CompositeKeyError {
    pub fn error_code(&self) -> &'static str {
        match self {
            CompositeKeyError::DuplicatePkKey { .. } => "COMPOSITE_PK_DUPLICATE_KEY",
            CompositeKeyError::UnsupportedPkOperator { .. } => "COMPOSITE_PK_UNSUPPORTED_OPERATOR",
            CompositeKeyError::MissingIdComponent { .. } => "COMPOSITE_PK_MISSING_ID",
            CompositeKeyError::InvalidPkList { .. } => "COMPOSITE_PK_INVALID_LIST",
        }
    }

    pub fn details(&self) -> Value {
        match self {
            CompositeKeyError::DuplicatePkKey { kind, keys } => {
                json!({ "dict": kind, "keys": keys })
            }
            CompositeKeyError::UnsupportedPkOperator { kind, key } => {
                json!({ "dict": kind, "key": key, "available": ["pk", "pk__in"] })
            }
            CompositeKeyError::MissingIdComponent { kind, pk } => {
                json!({ "dict": kind, "pk": pk })
            }
            CompositeKeyError::InvalidPkList { kind, received } => {
                json!({ "dict": kind, "received": received })
            }
        }
    }
}

// =============================================================================
// Aggregation Errors
// =============================================================================

/// Errors raised while building grouped/aggregated queries
#[derive(Debug, Clone, Error)]
pub enum AggregationError {
    /// Aggregation function not in the registry
    #[error("agg key [{key}] function [{function}] is not implemented")]
    UnknownFunction {
        key: String,
        function: String,
        available: Vec<String>,
    },

    /// `field`/`function` missing or not strings
    #[error("agg key [{key}] is malformed: {message}")]
    InvalidSpec { key: String, message: String },

    /// Aggregated field absent from the source query
    #[error("Field [{field}] used on aggregation clause [{key}] not found on entity [{entity}]")]
    UnknownField {
        key: String,
        field: String,
        entity: String,
    },

    /// Group by column absent from the source query
    #[error("Field [{field}] used on group by clause not found on entity [{entity}]")]
    UnknownGroupBy { field: String, entity: String },

    /// Order by column absent from the grouped query
    #[error("Order by column [{column}] not found on aggregated query")]
    UnknownOrderBy {
        column: String,
        available: Vec<String>,
    },
}

impl AggregationError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AggregationError::UnknownFunction { .. } => "AGG_UNKNOWN_FUNCTION",
            AggregationError::InvalidSpec { .. } => "AGG_INVALID_SPEC",
            AggregationError::UnknownField { .. } => "AGG_UNKNOWN_FIELD",
            AggregationError::UnknownGroupBy { .. } => "AGG_UNKNOWN_GROUP_BY",
            AggregationError::UnknownOrderBy { .. } => "AGG_UNKNOWN_ORDER_BY",
        }
    }

    pub fn details(&self) -> Value {
        match self {
            AggregationError::UnknownFunction {
                key,
                function,
                available,
            } => json!({ "key": key, "function": function, "available": available }),
            AggregationError::InvalidSpec { key, message } => {
                json!({ "key": key, "message": message })
            }
            AggregationError::UnknownField { key, field, entity } => {
                json!({ "key": key, "field": field, "entity": entity })
            }
            AggregationError::UnknownGroupBy { field, entity } => {
                json!({ "field": field, "entity": entity })
            }
            AggregationError::UnknownOrderBy { column, available } => {
                json!({ "column": column, "available": available })
            }
        }
    }
}

// =============================================================================
// Dimension Errors
// =============================================================================

/// Errors raised while listing the dimensions held in a JSON column
#[derive(Debug, Clone, Error)]
pub enum DimensionError {
    /// The dimension column does not exist on the entity
    #[error("Dimension column [{column}] not found on entity [{entity}]")]
    UnknownColumn { entity: String, column: String },

    /// The dimension column is not a JSON column
    #[error("Dimension column [{column}] of entity [{entity}] is {found}, expected json")]
    NotJson {
        entity: String,
        column: String,
        found: String,
    },

    /// Value listing requested without a dimension key
    #[error("Dimension key must be passed as {{\"key\": <dimension>}}")]
    MissingKey,
}

impl DimensionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DimensionError::UnknownColumn { .. } | DimensionError::NotJson { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            DimensionError::MissingKey => StatusCode::BAD_REQUEST,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            DimensionError::UnknownColumn { .. } => "DIMENSION_UNKNOWN_COLUMN",
            DimensionError::NotJson { .. } => "DIMENSION_NOT_JSON",
            DimensionError::MissingKey => "DIMENSION_MISSING_KEY",
        }
    }

    pub fn details(&self) -> Value {
        match self {
            DimensionError::UnknownColumn { entity, column } => {
                json!({ "entity": entity, "column": column })
            }
            DimensionError::NotJson {
                entity,
                column,
                found,
            } => json!({ "entity": entity, "column": column, "found": found }),
            DimensionError::MissingKey => json!({ "key": null }),
        }
    }
}

// =============================================================================
// Base Query Errors
// =============================================================================

/// Errors raised by the base-query filter strategies
#[derive(Debug, Clone, Error)]
pub enum BaseQueryError {
    /// The configured column does not exist on the entity
    #[error(
        "Base query [{strategy}] not correctly configured for entity [{entity}], \
         column [{column}] does not exist on the entity"
    )]
    MissingColumn {
        strategy: String,
        entity: String,
        column: String,
    },

    /// The configured column exists but has the wrong storage type
    #[error(
        "Base query [{strategy}] not correctly configured for entity [{entity}], \
         column [{column}] must be {expected}, found {found}"
    )]
    InvalidColumnType {
        strategy: String,
        entity: String,
        column: String,
        expected: String,
        found: String,
    },

    /// The skip list is not a JSON list of strings
    #[error("base_filter_skip must be a serialized JSON list of strings, received {received}")]
    InvalidSkip { received: String },
}

impl BaseQueryError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BaseQueryError::MissingColumn { .. } | BaseQueryError::InvalidColumnType { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            BaseQueryError::InvalidSkip { .. } => StatusCode::BAD_REQUEST,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            BaseQueryError::MissingColumn { .. } => "BASE_QUERY_MISSING_COLUMN",
            BaseQueryError::InvalidColumnType { .. } => "BASE_QUERY_INVALID_COLUMN_TYPE",
            BaseQueryError::InvalidSkip { .. } => "BASE_QUERY_INVALID_SKIP",
        }
    }

    pub fn details(&self) -> Value {
        match self {
            BaseQueryError::MissingColumn {
                strategy,
                entity,
                column,
            } => json!({ "strategy": strategy, "entity": entity, "column": column }),
            BaseQueryError::InvalidColumnType {
                strategy,
                entity,
                column,
                expected,
                found,
            } => json!({
                "strategy": strategy,
                "entity": entity,
                "column": column,
                "expected": expected,
                "found": found,
            }),
            BaseQueryError::InvalidSkip { received } => json!({ "base_filter_skip": received }),
        }
    }
}

// =============================================================================
// Codec Errors
// =============================================================================

/// Errors raised by the composite primary key codec
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// Value is neither a number nor a token string
    #[error("Primary key {value} is neither a number nor an encoded token")]
    InvalidToken { value: Value },

    /// Token is not valid base64
    #[error("Primary key token '{token}' is not valid base64: {message}")]
    InvalidEncoding { token: String, message: String },

    /// Decoded token is not a JSON object
    #[error("Primary key token '{token}' does not hold a column mapping: {message}")]
    InvalidPayload { token: String, message: String },

    /// Record has no value for a primary key column
    #[error("Record has no value for primary key column '{column}'")]
    MissingComponent { column: String },

    /// Primary key component is an object or array
    #[error("Primary key column '{column}' holds a non-primitive value {value}")]
    UnsupportedComponent { column: String, value: Value },
}

impl CodecError {
    pub fn error_code(&self) -> &'static str {
        match self {
            CodecError::InvalidToken { .. } => "PK_INVALID_TOKEN",
            CodecError::InvalidEncoding { .. } => "PK_INVALID_ENCODING",
            CodecError::InvalidPayload { .. } => "PK_INVALID_PAYLOAD",
            CodecError::MissingComponent { .. } => "PK_MISSING_COMPONENT",
            CodecError::UnsupportedComponent { .. } => "PK_UNSUPPORTED_COMPONENT",
        }
    }

    pub fn details(&self) -> Value {
        match self {
            CodecError::InvalidToken { value } => json!({ "pk": value }),
            CodecError::InvalidEncoding { token, message }
            | CodecError::InvalidPayload { token, message } => {
                json!({ "pk": token, "message": message })
            }
            CodecError::MissingComponent { column } => json!({ "column": column }),
            CodecError::UnsupportedComponent { column, value } => {
                json!({ "column": column, "value": value })
            }
        }
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to schema configuration
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Failed to parse configuration file
    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    /// Entity declared twice
    #[error("Entity '{entity}' is declared more than once")]
    DuplicateEntity { entity: String },

    /// Entity without primary key columns
    #[error("Entity '{entity}' has no primary key column")]
    MissingPrimaryKey { entity: String },

    /// Identifier that cannot be safely quoted into SQL
    #[error("Invalid identifier '{identifier}' in {context}")]
    InvalidIdentifier { identifier: String, context: String },

    /// Relationship pointing to an unknown entity
    #[error("Relationship '{relationship}' on entity '{entity}' targets unknown entity '{target}'")]
    UnknownTarget {
        entity: String,
        relationship: String,
        target: String,
    },

    /// Join or filter column that does not exist
    #[error("Column '{column}' referenced by {context} does not exist on entity '{entity}'")]
    UnknownColumn {
        entity: String,
        column: String,
        context: String,
    },

    /// Column referenced by a base filter has the wrong storage type
    #[error("Column '{column}' of entity '{entity}' used by {context} must be {expected}")]
    InvalidColumnType {
        entity: String,
        column: String,
        expected: String,
        context: String,
    },
}

impl From<serde_yaml::Error> for QueryError {
    fn from(err: serde_yaml::Error) -> Self {
        QueryError::Config(ConfigError::ParseError {
            message: err.to_string(),
        })
    }
}

// =============================================================================
// Result type alias
// =============================================================================

/// A specialized Result type for dictquery operations
pub type QueryResult<T> = Result<T, QueryError>;

// =============================================================================
// Tests
// =============================================================================

//! # dictquery
//!
//! Translate Django-style query dictionaries into composable relational queries.
//!
//! ## Features
//!
//! - **Path syntax**: `attribute__unit__code__in` walks relationships, selects a
//!   column and applies an operator; `extra->unit` extracts a JSON key
//! - **Composite primary keys**: multi-column keys travel as one opaque token
//!   and expand back into per-column filters
//! - **Aggregation**: grouped `sum`/`mean`/`count`/`min`/`max`/`std`/`var`
//!   with ordering over the aggregated output
//! - **Row-access base queries**: row-permission, owner and soft-delete
//!   strategies applied before any caller filter
//! - **Configuration-Based**: declare entities and base filters in YAML
//! - **Executors**: an in-memory engine and a PostgreSQL renderer/executor
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dictquery::prelude::*;
//! use serde_json::json;
//!
//! let config = SchemaConfig::from_yaml_file("schema.yaml")?;
//! let registry = config.into_registry()?;
//!
//! let auth = AuthContext::user(7, [1, 2]);
//! let base = config
//!     .base_query_for("measurement")
//!     .unwrap_or_default()
//!     .apply(registry.resolve("measurement")?.as_ref(), None, &auth)?;
//!
//! let params = ListParams::new()
//!     .filter("attribute__description__icontains", "temp")
//!     .exclude("value__isnull", true)
//!     .order("-taken_at");
//! let query = QueryBuilder::new(&registry).build("measurement", Some(base), &params)?;
//!
//! let rows = store.fetch(&query).await?;
//! ```

pub mod config;
pub mod core;
pub mod query;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        auth::{AuthContext, BaseFilterSkip},
        entity::{Column, ColumnType, EntityDescriptor, EntityModel, JoinCondition, Relationship, SchemaRegistry},
        error::{
            AggregationError, BaseQueryError, CodecError, CompositeKeyError, ConfigError, DictKind,
            DimensionError, ErrorResponse, GrammarError, QueryError, QueryResult,
        },
        pk::{CompositePkCodec, PrimaryKey, Record},
        query::{AggregateParams, DimensionParams, ListParams, QueryDict},
    };

    // === Query engine ===
    pub use crate::query::{
        AggregateFunction, AggregateQuery, AggregateSpec, AggregationBuilder, BaseQuery, BaseQueryChain,
        ColumnRef, DimensionBuilder, DimensionQuery, DimensionTarget, Direction, Join, NoFilter, Operator,
        OrderModifier, OrderTerm, OwnerFilter, ParsedQuery, Predicate, Query, QueryBuilder, QueryParser,
        RowPermissionFilter, SoftDeleteFilter, open_composite_pk,
    };

    // === Configuration ===
    pub use crate::config::{BaseFilterConfig, EntityConfig, SchemaConfig};

    // === Storage ===
    pub use crate::storage::{PostgresRenderer, QueryExecutor, Row, SqlParam, SqlStatement};

    #[cfg(feature = "in-memory")]
    pub use crate::storage::InMemoryStore;

    #[cfg(feature = "postgres")]
    pub use crate::storage::PostgresExecutor;

    // === External re-exports ===
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{Value, json};
}

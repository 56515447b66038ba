//! Query translation engine
//!
//! ```text
//! filter_dict / exclude_dict / order_by
//!        │
//!        ▼
//!   expander (composite pk) ──► parser ──► builder ──► Query
//!                                             ▲          │
//!                        base_query ──────────┘          ▼
//!                                              aggregate / dimensions
//! ```

pub mod aggregate;
pub mod base_query;
pub mod builder;
pub mod dimensions;
pub mod expander;
pub mod expr;
pub mod operators;
pub mod parser;

pub use aggregate::{AggregateFunction, AggregateQuery, AggregateSpec, AggregationBuilder};
pub use base_query::{BaseQuery, BaseQueryChain, NoFilter, OwnerFilter, RowPermissionFilter, SoftDeleteFilter};
pub use builder::QueryBuilder;
pub use dimensions::{DimensionBuilder, DimensionQuery, DimensionTarget};
pub use expander::open_composite_pk;
pub use expr::{ColumnRef, Direction, Join, OrderTerm, Predicate, Query};
pub use operators::{Operator, OrderModifier};
pub use parser::{ParsedQuery, QueryParser};

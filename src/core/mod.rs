//! Core module containing fundamental traits and types for the query engine

pub mod auth;
pub mod entity;
pub mod error;
pub mod pk;
pub mod query;

pub use auth::{AuthContext, BaseFilterSkip};
pub use entity::{Column, ColumnType, EntityDescriptor, EntityModel, JoinCondition, Relationship, SchemaRegistry};
pub use error::{QueryError, QueryResult};
pub use pk::{CompositePkCodec, PrimaryKey, Record};
pub use query::{AggregateParams, ListParams, QueryDict};

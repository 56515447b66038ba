//! Query builder
//!
//! Composes parsed filter, exclude and order dictionaries on top of a base
//! query. The builder never executes anything; it returns a [`Query`] that
//! the caller limits and hands to an executor.

use serde_json::Value;
use tracing::{debug, trace};

use crate::core::entity::SchemaRegistry;
use crate::core::error::{DictKind, GrammarError, QueryResult};
use crate::core::pk::CompositePkCodec;
use crate::core::query::{ListParams, QueryDict};
use crate::query::expander::open_composite_pk;
use crate::query::expr::{ColumnRef, Query};
use crate::query::operators::Operator;
use crate::query::parser::{QueryParser, order_by_pairs};

/// Builds [`Query`] values from list parameters
///
/// # Example
///
/// ```rust,ignore
/// let builder = QueryBuilder::new(&registry);
/// let params = ListParams::new()
///     .filter("attribute__description__icontains", "temp")
///     .exclude("variant", "draft")
///     .order("-value");
/// let query = builder.build("measurement", None, &params)?;
/// let rows = store.fetch(&query).await?;
/// ```
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'a SchemaRegistry {
        self.registry
    }

    /// Build a query for `entity`.
    ///
    /// `base` is an already restricted query (see
    /// [`BaseQuery`](crate::query::base_query::BaseQuery)); without one the
    /// query starts from every row of the entity. Joins required by the
    /// filter, exclude and order dictionaries are applied once each; filters
    /// are added as conjunctions, excludes as negated conjunctions, and order
    /// terms keep the listed precedence.
    pub fn build(&self, entity: &str, base: Option<Query>, params: &ListParams) -> QueryResult<Query> {
        let descriptor = self.registry.resolve(entity)?;

        let (filter_dict, exclude_dict) = if descriptor.primary_keys().len() > 1 {
            (
                open_composite_pk(&params.filter_dict, DictKind::Filter)?,
                open_composite_pk(&params.exclude_dict, DictKind::Exclude)?,
            )
        } else {
            (params.filter_dict.clone(), params.exclude_dict.clone())
        };

        let parser = QueryParser::new(self.registry);
        let filters = parser.parse_filter(entity, &filter_dict)?;
        let excludes = parser.parse_filter(entity, &exclude_dict)?;
        let ordering = parser.parse_order(entity, &order_by_pairs(&params.order_by))?;

        let mut query = base.unwrap_or_else(|| Query::new(descriptor.as_ref()));

        let joins = filters
            .joins
            .into_iter()
            .chain(excludes.joins)
            .chain(ordering.joins);
        for join in joins {
            let alias = join.alias.clone();
            if query.add_join(join) {
                trace!(entity = %entity, alias = %alias, "Applied join");
            }
        }

        let (n_filters, n_excludes, n_order) = (
            filters.predicates.len(),
            excludes.predicates.len(),
            ordering.order_by.len(),
        );
        for predicate in filters.predicates {
            query.filter(predicate);
        }
        for predicate in excludes.predicates {
            query.filter(predicate.negate());
        }
        for term in ordering.order_by {
            query.order(term);
        }
        if params.limit.is_some() {
            query.limit = params.limit;
        }

        debug!(
            entity = %entity,
            filters = n_filters,
            excludes = n_excludes,
            order_by = n_order,
            joins = query.joins.len(),
            "Built query"
        );
        Ok(query)
    }

    /// Query retrieving one row by primary key.
    ///
    /// `pk` is a scalar `id` value, a numeric string or a composite token;
    /// every decoded component must name a primary key column.
    pub fn by_pk(&self, entity: &str, base: Option<Query>, pk: &Value) -> QueryResult<Query> {
        let descriptor = self.registry.resolve(entity)?;
        let decoded = CompositePkCodec::decode(pk)?;
        let primary_keys = descriptor.primary_keys();

        let mut query = base.unwrap_or_else(|| Query::new(descriptor.as_ref()));
        for (name, value) in decoded.into_filter() {
            let column = descriptor
                .column(&name)
                .filter(|c| c.primary_key)
                .ok_or_else(|| GrammarError::UnknownToken {
                    entity: entity.to_string(),
                    token: name.clone(),
                    path: "pk".to_string(),
                    columns: primary_keys.iter().map(|s| s.to_string()).collect(),
                    relationships: Vec::new(),
                    operators: Vec::new(),
                })?;
            let column = ColumnRef::root(entity, &column.name, column.column_type);
            query.filter(Operator::Exact.apply(column, value)?);
        }

        debug!(entity = %entity, pk = %pk, "Built primary key query");
        Ok(query)
    }

    /// Parse a dictionary without building, useful to validate user input early
    pub fn validate(&self, entity: &str, dict: &QueryDict) -> QueryResult<()> {
        QueryParser::new(self.registry).parse_filter(entity, dict)?;
        Ok(())
    }
}

//! Query-dictionary parser
//!
//! Resolves flat `{"path__path__operator": value}` dictionaries against the
//! schema registry. Each key is split on `__` and walked left to right from
//! the root entity; at every step the token is tried, in order, as:
//!
//! 1. a relationship of the current entity (only before a column is chosen)
//! 2. the `pk` alias of the first primary key column
//! 3. a column of the current entity (only one per path)
//! 4. an operator (filter mode) or order modifier (order mode), which must be
//!    the last token
//!
//! A token may carry a `->key` suffix selecting a key inside a JSON column.
//! Anything else is an unknown token and fails the whole dictionary.

use serde_json::Value;

use crate::core::entity::{EntityDescriptor, SchemaRegistry};
use crate::core::error::GrammarError;
use crate::core::query::QueryDict;
use crate::query::expr::{
    ColumnRef, Direction, JSON_KEY_SEPARATOR, Join, OrderTerm, PATH_SEPARATOR, Predicate,
    ROOT_ALIAS,
};
use crate::query::operators::{Operator, OrderModifier};

/// Alias of the first primary key column
pub const PK_ALIAS: &str = "pk";

/// Output of one parser run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    /// Join requirements, de-duplicated by relationship path
    pub joins: Vec<Join>,
    pub predicates: Vec<Predicate>,
    pub order_by: Vec<OrderTerm>,
}

impl ParsedQuery {
    fn add_joins(&mut self, joins: Vec<Join>) {
        for join in joins {
            if !self.joins.iter().any(|j| j.alias == join.alias) {
                self.joins.push(join);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Filter,
    Order,
}

#[derive(Debug, Clone, Copy)]
enum Suffix {
    Operator(Operator),
    Modifier(OrderModifier),
}

impl Suffix {
    fn token(&self) -> &'static str {
        match self {
            Suffix::Operator(op) => op.token(),
            Suffix::Modifier(m) => m.token(),
        }
    }
}

struct ResolvedPath {
    joins: Vec<Join>,
    column: ColumnRef,
    suffix: Option<Suffix>,
}

/// Parser bound to a schema registry
#[derive(Debug, Clone, Copy)]
pub struct QueryParser<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> QueryParser<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Parse a filter (or exclude) dictionary into predicates.
    ///
    /// Paths without an operator default to `exact`.
    pub fn parse_filter(&self, entity: &str, dict: &QueryDict) -> Result<ParsedQuery, GrammarError> {
        let root = self.registry.resolve(entity)?;
        let mut parsed = ParsedQuery::default();

        for (key, value) in dict {
            let resolved = self.resolve_path(root.as_ref(), key, Mode::Filter)?;
            let operator = match resolved.suffix {
                Some(Suffix::Operator(op)) => op,
                _ => Operator::Exact,
            };
            let predicate = operator
                .apply(resolved.column, value.clone())
                .map_err(|e| at_path(e, key))?;

            parsed.add_joins(resolved.joins);
            parsed.predicates.push(predicate);
        }
        Ok(parsed)
    }

    /// Parse an order dictionary `{path: "asc" | "desc"}` into order terms.
    ///
    /// The final token may be an order modifier instead of an operator.
    pub fn parse_order(&self, entity: &str, dict: &QueryDict) -> Result<ParsedQuery, GrammarError> {
        let root = self.registry.resolve(entity)?;
        let mut parsed = ParsedQuery::default();

        for (key, value) in dict {
            let resolved = self.resolve_path(root.as_ref(), key, Mode::Order)?;
            let direction =
                Direction::from_value(value).ok_or_else(|| GrammarError::InvalidOrderDirection {
                    column: resolved.column.to_string(),
                    value: value.clone(),
                    path: key.clone(),
                })?;
            let modifier = match resolved.suffix {
                Some(Suffix::Modifier(m)) => m,
                _ => OrderModifier::Exact,
            };

            parsed.add_joins(resolved.joins);
            parsed.order_by.push(OrderTerm {
                column: resolved.column,
                direction,
                modifier,
            });
        }
        Ok(parsed)
    }

    fn resolve_path(
        &self,
        root: &'a dyn EntityDescriptor,
        key: &str,
        mode: Mode,
    ) -> Result<ResolvedPath, GrammarError> {
        let mut current = root;
        let mut alias = ROOT_ALIAS.to_string();
        let mut relationship_path: Vec<&str> = Vec::new();
        let mut joins = Vec::new();
        let mut column: Option<ColumnRef> = None;
        let mut suffix: Option<Suffix> = None;

        for raw in key.split(PATH_SEPARATOR) {
            if let Some(found) = suffix {
                return Err(GrammarError::TokenAfterOperator {
                    operator: found.token().to_string(),
                    path: key.to_string(),
                });
            }

            let (token, json_key) = split_json_key(raw, key)?;

            if json_key.is_none() {
                if let Some(relationship) = current.relationship(token) {
                    if let Some(selected) = &column {
                        return Err(GrammarError::RelationshipAfterColumn {
                            column: selected.column.clone(),
                            path: key.to_string(),
                        });
                    }
                    let target = self.registry.resolve(&relationship.target)?;
                    relationship_path.push(token);
                    let join_alias = relationship_path.join(PATH_SEPARATOR);
                    joins.push(Join {
                        alias: join_alias.clone(),
                        parent_alias: alias,
                        relationship: relationship.name.clone(),
                        entity: target.entity_name().to_string(),
                        table: target.table_name().to_string(),
                        condition: relationship.join.clone(),
                    });
                    alias = join_alias;
                    current = target.as_ref();
                    continue;
                }
            }

            let column_name = if token == PK_ALIAS {
                current.primary_keys().first().copied().unwrap_or(token)
            } else {
                token
            };
            if let Some(found) = current.column(column_name) {
                if let Some(selected) = &column {
                    return Err(GrammarError::MultipleColumns {
                        column: selected.column.clone(),
                        path: key.to_string(),
                    });
                }
                if json_key.is_some() && !found.column_type.is_json() {
                    return Err(GrammarError::JsonKeyOnNonJson {
                        column: found.name.clone(),
                        path: key.to_string(),
                    });
                }
                column = Some(ColumnRef {
                    alias: alias.clone(),
                    entity: current.entity_name().to_string(),
                    column: found.name.clone(),
                    column_type: found.column_type,
                    json_key: json_key.map(str::to_string),
                });
                continue;
            }

            if json_key.is_none() {
                let found = match mode {
                    Mode::Filter => Operator::from_token(token).map(Suffix::Operator),
                    Mode::Order => OrderModifier::from_token(token).map(Suffix::Modifier),
                };
                if found.is_some() {
                    suffix = found;
                    continue;
                }
            }

            return Err(GrammarError::UnknownToken {
                entity: current.entity_name().to_string(),
                token: raw.to_string(),
                path: key.to_string(),
                columns: current.column_names(),
                relationships: current.relationship_names(),
                operators: match mode {
                    Mode::Filter => Operator::tokens(),
                    Mode::Order => OrderModifier::tokens(),
                },
            });
        }

        let column = column.ok_or_else(|| GrammarError::MissingColumn {
            path: key.to_string(),
        })?;
        Ok(ResolvedPath {
            joins,
            column,
            suffix,
        })
    }
}

/// Split `column->key`; nested keys are not supported
fn split_json_key<'k>(raw: &'k str, path: &str) -> Result<(&'k str, Option<&'k str>), GrammarError> {
    let mut parts = raw.split(JSON_KEY_SEPARATOR);
    let token = parts.next().unwrap_or(raw);
    let json_key = parts.next();
    if parts.next().is_some() {
        return Err(GrammarError::NestedJsonKey {
            path: path.to_string(),
        });
    }
    Ok((token, json_key))
}

/// Report operand errors against the full dictionary key
fn at_path(err: GrammarError, key: &str) -> GrammarError {
    match err {
        GrammarError::InvalidOperand {
            operator,
            expected,
            received,
            ..
        } => GrammarError::InvalidOperand {
            operator,
            expected,
            received,
            path: key.to_string(),
        },
        other => other,
    }
}

/// Convert a `-`-prefixed order list into an order dictionary
pub fn order_by_pairs<S: AsRef<str>>(order_by: &[S]) -> QueryDict {
    let mut dict = QueryDict::new();
    for entry in order_by {
        let entry = entry.as_ref();
        match entry.strip_prefix('-') {
            Some(path) => dict.insert(path.to_string(), Value::from(Direction::Desc.as_str())),
            None => dict.insert(entry.to_string(), Value::from(Direction::Asc.as_str())),
        };
    }
    dict
}

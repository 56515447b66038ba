//! In-memory query executor for testing and development
//!
//! Tables are vectors of JSON rows. Queries are interpreted with PostgreSQL
//! semantics where they matter to callers:
//!
//! - joins are inner joins following the relationship join condition
//! - predicates use three-valued logic, so `NOT` over a comparison with a
//!   NULL column is still unknown and the row is dropped
//! - NULLs sort last ascending and first descending
//! - trigram operators follow pg_trgm with its default thresholds; word
//!   similarity is computed over whole-word extents

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use indexmap::IndexMap;
use serde_json::{Number, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::core::entity::ColumnType;
use crate::core::error::{QueryError, QueryResult};
use crate::query::aggregate::{AggregateFunction, AggregateQuery, AggregateSpec};
use crate::query::dimensions::{DimensionQuery, DimensionTarget};
use crate::query::expr::{ColumnRef, Direction, Join, OrderTerm, Predicate, Query, ROOT_ALIAS};
use crate::query::operators::{Operator, OrderModifier};
use crate::storage::{QueryExecutor, Row};

const BACKEND: &str = "in_memory";

/// `pg_trgm.similarity_threshold`
pub const SIMILARITY_THRESHOLD: f64 = 0.3;
/// `pg_trgm.word_similarity_threshold`
pub const WORD_SIMILARITY_THRESHOLD: f64 = 0.6;
/// `pg_trgm.strict_word_similarity_threshold`
pub const STRICT_WORD_SIMILARITY_THRESHOLD: f64 = 0.5;

fn execution_error(message: impl Into<String>) -> QueryError {
    QueryError::Execution {
        backend: BACKEND.to_string(),
        message: message.into(),
    }
}

/// In-memory store implementation
///
/// Useful for testing and development. Uses RwLock for thread-safe access.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<HashMap<String, Vec<Row>>>>,
}

impl InMemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row (a JSON object) to `table`
    pub fn insert(&self, table: &str, row: Value) -> QueryResult<()> {
        let row = match row {
            Value::Object(row) => row,
            other => return Err(execution_error(format!("rows must be JSON objects, received {other}"))),
        };
        let mut tables = self
            .tables
            .write()
            .map_err(|e| execution_error(format!("Failed to acquire write lock: {e}")))?;
        tables.entry(table.to_string()).or_default().push(row);
        Ok(())
    }

    /// Append several rows, returning how many were inserted
    pub fn insert_many(
        &self,
        table: &str,
        rows: impl IntoIterator<Item = Value>,
    ) -> QueryResult<usize> {
        let mut count = 0;
        for row in rows {
            self.insert(table, row)?;
            count += 1;
        }
        Ok(count)
    }

    /// Number of rows stored in `table`
    pub fn count(&self, table: &str) -> QueryResult<usize> {
        let tables = self
            .tables
            .read()
            .map_err(|e| execution_error(format!("Failed to acquire read lock: {e}")))?;
        Ok(tables.get(table).map_or(0, Vec::len))
    }

    fn run(&self, query: &Query) -> QueryResult<Vec<Row>> {
        let tables = self
            .tables
            .read()
            .map_err(|e| execution_error(format!("Failed to acquire read lock: {e}")))?;

        let root_rows = tables.get(&query.table).map(Vec::as_slice).unwrap_or(&[]);
        let mut contexts: Vec<Context<'_>> = root_rows
            .iter()
            .map(|row| HashMap::from([(ROOT_ALIAS.to_string(), row)]))
            .collect();

        for join in &query.joins {
            contexts = apply_join(contexts, join, &tables);
        }

        let mut selected: Vec<Context<'_>> = contexts
            .into_iter()
            .filter(|ctx| {
                query
                    .predicates
                    .iter()
                    .all(|p| evaluate(p, ctx) == Truth::True)
            })
            .collect();

        selected.sort_by(|a, b| compare_contexts(a, b, &query.order_by));
        if let Some(limit) = query.limit {
            selected.truncate(limit);
        }

        debug!(entity = %query.entity, rows = selected.len(), "Fetched rows from memory");
        Ok(selected
            .into_iter()
            .filter_map(|ctx| ctx.get(ROOT_ALIAS).map(|row| (*row).clone()))
            .collect())
    }

    fn run_aggregate(&self, query: &AggregateQuery) -> QueryResult<Vec<Row>> {
        let rows = self.run(&query.source)?;

        let mut groups: IndexMap<String, (Vec<Value>, Vec<&Row>)> = IndexMap::new();
        for row in &rows {
            let key_values: Vec<Value> = query
                .group_by
                .iter()
                .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                .collect();
            let key = serde_json::to_string(&key_values).map_err(|e| execution_error(e.to_string()))?;
            groups
                .entry(key)
                .or_insert_with(|| (key_values, Vec::new()))
                .1
                .push(row);
        }
        // Aggregating without grouping yields one row even over no input
        if groups.is_empty() && query.group_by.is_empty() {
            groups.insert(String::new(), (Vec::new(), Vec::new()));
        }

        let mut output = Vec::with_capacity(groups.len());
        for (key_values, members) in groups.into_values() {
            let mut out = Row::new();
            for (column, value) in query.group_by.iter().zip(key_values) {
                out.insert(column.clone(), value);
            }
            for spec in &query.aggregates {
                out.insert(spec.key.clone(), aggregate(spec, &members)?);
            }
            output.push(out);
        }

        output.sort_by(|a, b| {
            for order in &query.order_by {
                let av = a.get(&order.column).unwrap_or(&Value::Null);
                let bv = b.get(&order.column).unwrap_or(&Value::Null);
                let ord = order_values(av, bv, order.direction);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });

        debug!(entity = %query.source.entity, groups = output.len(), "Aggregated rows in memory");
        Ok(output)
    }

    fn run_dimensions(&self, query: &DimensionQuery) -> QueryResult<Vec<Value>> {
        let rows = self.run(&query.source)?;
        let mut listed: Vec<Value> = match &query.target {
            DimensionTarget::Keys => rows
                .iter()
                .filter_map(|row| row.get(&query.column).and_then(Value::as_object))
                .flat_map(|dimensions| dimensions.keys().cloned().map(Value::String))
                .collect(),
            DimensionTarget::Values { key } => rows
                .iter()
                .filter_map(|row| row.get(&query.column)?.get(key))
                .filter(|value| !value.is_null())
                .cloned()
                .collect(),
        };
        listed.sort_by(jsonb_cmp);
        listed.dedup_by(|a, b| jsonb_cmp(a, b) == Ordering::Equal);

        debug!(entity = %query.source.entity, listed = listed.len(), "Listed dimensions in memory");
        Ok(listed)
    }
}

#[async_trait]
impl QueryExecutor for InMemoryStore {
    async fn fetch(&self, query: &Query) -> QueryResult<Vec<Row>> {
        self.run(query)
    }

    async fn fetch_aggregate(&self, query: &AggregateQuery) -> QueryResult<Vec<Row>> {
        self.run_aggregate(query)
    }

    async fn fetch_dimensions(&self, query: &DimensionQuery) -> QueryResult<Vec<Value>> {
        self.run_dimensions(query)
    }
}

// ---------------------------------------------------------------------------
// Joins
// ---------------------------------------------------------------------------

/// Rows of every joined alias for one candidate result row
type Context<'r> = HashMap<String, &'r Row>;

fn apply_join<'r>(
    contexts: Vec<Context<'r>>,
    join: &Join,
    tables: &'r HashMap<String, Vec<Row>>,
) -> Vec<Context<'r>> {
    let target = tables.get(&join.table).map(Vec::as_slice).unwrap_or(&[]);
    let mut joined = Vec::new();
    for ctx in contexts {
        let Some(parent) = ctx.get(&join.parent_alias) else {
            continue;
        };
        let local = parent
            .get(&join.condition.local_column)
            .unwrap_or(&Value::Null);
        for row in target {
            let remote = row.get(&join.condition.remote_column).unwrap_or(&Value::Null);
            if sql_eq(local, remote) == Some(true) {
                let mut next = ctx.clone();
                next.insert(join.alias.clone(), row);
                joined.push(next);
            }
        }
    }
    joined
}

fn column_value(ctx: &Context<'_>, column: &ColumnRef) -> Value {
    let value = ctx
        .get(&column.alias)
        .and_then(|row| row.get(&column.column))
        .unwrap_or(&Value::Null);
    match &column.json_key {
        None => value.clone(),
        // `->>`: extracted as text
        Some(key) => match value.get(key) {
            None | Some(Value::Null) => Value::Null,
            Some(Value::String(s)) => Value::String(s.clone()),
            Some(other) => Value::String(other.to_string()),
        },
    }
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Truth {
    True,
    False,
    Unknown,
}

impl Truth {
    fn not(self) -> Self {
        match self {
            Truth::True => Truth::False,
            Truth::False => Truth::True,
            Truth::Unknown => Truth::Unknown,
        }
    }

    fn and(self, other: Self) -> Self {
        match (self, other) {
            (Truth::False, _) | (_, Truth::False) => Truth::False,
            (Truth::True, Truth::True) => Truth::True,
            _ => Truth::Unknown,
        }
    }

    fn from_option(value: Option<bool>) -> Self {
        value.map_or(Truth::Unknown, Truth::from)
    }
}

impl From<bool> for Truth {
    fn from(value: bool) -> Self {
        if value { Truth::True } else { Truth::False }
    }
}

fn evaluate(predicate: &Predicate, ctx: &Context<'_>) -> Truth {
    match predicate {
        Predicate::Not(inner) => evaluate(inner, ctx).not(),
        Predicate::Compare {
            column,
            operator,
            value,
        } => compare_column(column, *operator, &column_value(ctx, column), value),
    }
}

/// Apply `operator` with the column's type in view: JSON keys compare as
/// text, `contains` on a whole JSON column is jsonb containment
fn compare_column(column: &ColumnRef, operator: Operator, c: &Value, x: &Value) -> Truth {
    if column.json_key.is_some() {
        return apply_operator(operator, c, &key_operand(operator, x));
    }
    if operator == Operator::Contains && column.column_type == ColumnType::Json {
        if c.is_null() {
            return Truth::Unknown;
        }
        return Truth::from(json_contains(c, x));
    }
    apply_operator(operator, c, x)
}

/// Operand of a comparison against a `->>` extracted key, as text
fn key_operand(operator: Operator, value: &Value) -> Value {
    match (operator, value) {
        (Operator::In | Operator::Range, Value::Array(items)) => {
            Value::Array(items.iter().map(scalar_text).collect())
        }
        (Operator::Exact | Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte, v) => {
            scalar_text(v)
        }
        (_, v) => v.clone(),
    }
}

fn scalar_text(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}

fn apply_operator(operator: Operator, c: &Value, x: &Value) -> Truth {
    match operator {
        Operator::Isnull => Truth::from(c.is_null() == x.as_bool().unwrap_or(true)),
        Operator::Exact if x.is_null() => Truth::from(c.is_null()),
        _ if c.is_null() => Truth::Unknown,
        Operator::Exact => Truth::from_option(sql_eq(c, x)),
        Operator::Gt => ordering(c, x, |o| o == Ordering::Greater),
        Operator::Lt => ordering(c, x, |o| o == Ordering::Less),
        Operator::Gte => ordering(c, x, |o| o != Ordering::Less),
        Operator::Lte => ordering(c, x, |o| o != Ordering::Greater),
        Operator::In => in_list(c, x),
        Operator::Range => match x.as_array().map(Vec::as_slice) {
            Some([low, high]) => ordering(c, low, |o| o != Ordering::Less)
                .and(ordering(c, high, |o| o != Ordering::Greater)),
            _ => Truth::Unknown,
        },
        Operator::Contains => text_op(c, x, |c, x| c.contains(x)),
        Operator::Icontains => text_op(c, x, |c, x| c.to_lowercase().contains(&x.to_lowercase())),
        Operator::UnaccentIcontains => text_op(c, x, |c, x| fold(c).contains(&fold(x))),
        Operator::Iexact => text_op(c, x, |c, x| c.to_lowercase() == x.to_lowercase()),
        Operator::UnaccentIexact => text_op(c, x, |c, x| fold(c) == fold(x)),
        Operator::Startswith => text_op(c, x, |c, x| c.starts_with(x)),
        Operator::Istartswith => {
            text_op(c, x, |c, x| c.to_lowercase().starts_with(&x.to_lowercase()))
        }
        Operator::UnaccentIstartswith => text_op(c, x, |c, x| fold(c).starts_with(&fold(x))),
        Operator::Endswith => text_op(c, x, |c, x| c.ends_with(x)),
        Operator::Iendswith => text_op(c, x, |c, x| c.to_lowercase().ends_with(&x.to_lowercase())),
        Operator::UnaccentIendswith => text_op(c, x, |c, x| fold(c).ends_with(&fold(x))),
        Operator::Year | Operator::Month | Operator::Day => date_part(operator, c, x),
        Operator::JsonContainedBy => Truth::from(json_contains(x, c)),
        Operator::JsonContains => Truth::from(json_contains(c, x)),
        Operator::JsonHasKey => Truth::from(x.as_str().is_some_and(|k| has_key(c, k))),
        Operator::JsonHasAny => Truth::from(string_items(x).any(|k| has_key(c, k))),
        Operator::JsonHasAll => Truth::from(string_items(x).all(|k| has_key(c, k))),
        Operator::Similarity => {
            text_op(c, x, |c, x| similarity(c, x) >= SIMILARITY_THRESHOLD)
        }
        Operator::WordSimilarLeft => {
            text_op(c, x, |c, x| word_similarity(c, x) >= WORD_SIMILARITY_THRESHOLD)
        }
        Operator::WordSimilarRight => {
            text_op(c, x, |c, x| word_similarity(x, c) >= WORD_SIMILARITY_THRESHOLD)
        }
        Operator::StrictWordSimilarLeft => {
            text_op(c, x, |c, x| word_similarity(c, x) >= STRICT_WORD_SIMILARITY_THRESHOLD)
        }
        Operator::StrictWordSimilarRight => {
            text_op(c, x, |c, x| word_similarity(x, c) >= STRICT_WORD_SIMILARITY_THRESHOLD)
        }
    }
}

fn ordering(c: &Value, x: &Value, accept: impl Fn(Ordering) -> bool) -> Truth {
    compare(c, x).map_or(Truth::Unknown, |o| Truth::from(accept(o)))
}

fn in_list(c: &Value, x: &Value) -> Truth {
    let items = x.as_array().map(Vec::as_slice).unwrap_or(&[]);
    if items.iter().any(|item| sql_eq(c, item) == Some(true)) {
        Truth::True
    } else if items.iter().any(Value::is_null) {
        Truth::Unknown
    } else {
        Truth::False
    }
}

fn text_op(c: &Value, x: &Value, accept: impl Fn(&str, &str) -> bool) -> Truth {
    match (as_text(c), x.as_str()) {
        (Some(c), Some(x)) => Truth::from(accept(&c, x)),
        _ => Truth::Unknown,
    }
}

fn date_part(operator: Operator, c: &Value, x: &Value) -> Truth {
    let Some(date) = c.as_str().and_then(parse_date) else {
        return Truth::Unknown;
    };
    let part = match operator {
        Operator::Year => i64::from(date.year()),
        Operator::Month => i64::from(date.month()),
        _ => i64::from(date.day()),
    };
    Truth::from(x.as_i64() == Some(part))
}

/// Date of an ISO date or timestamp string
fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.get(..10)?, "%Y-%m-%d").ok()
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// `lower(unaccent(s))`
fn fold(value: &str) -> String {
    deunicode::deunicode(value).to_lowercase()
}

fn string_items(value: &Value) -> impl Iterator<Item = &str> {
    value
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

/// jsonb `?`: object key or string array element
fn has_key(value: &Value, key: &str) -> bool {
    match value {
        Value::Object(map) => map.contains_key(key),
        Value::Array(items) => items.iter().any(|i| i.as_str() == Some(key)),
        _ => false,
    }
}

/// jsonb `@>`
fn json_contains(container: &Value, contained: &Value) -> bool {
    match (container, contained) {
        (Value::Object(a), Value::Object(b)) => b
            .iter()
            .all(|(k, bv)| a.get(k).is_some_and(|av| json_contains(av, bv))),
        (Value::Array(a), Value::Array(b)) => b
            .iter()
            .all(|bv| a.iter().any(|av| json_contains(av, bv))),
        (Value::Array(a), scalar) if !scalar.is_object() => a.iter().any(|av| av == scalar),
        (a, b) => a == b,
    }
}

// ---------------------------------------------------------------------------
// Comparison and ordering
// ---------------------------------------------------------------------------

/// SQL comparison of two non-null values, `None` when not comparable
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::String(s)) => {
            let y = s.trim().parse::<f64>().ok()?;
            x.as_f64()?.partial_cmp(&y)
        }
        (Value::String(s), Value::Number(y)) => {
            let x = s.trim().parse::<f64>().ok()?;
            x.partial_cmp(&y.as_f64()?)
        }
        _ => None,
    }
}

fn compare_numbers(x: &Number, y: &Number) -> Option<Ordering> {
    match (x.as_i64(), y.as_i64()) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
    }
}

/// `=`, unknown when either side is NULL
fn sql_eq(a: &Value, b: &Value) -> Option<bool> {
    if a.is_null() || b.is_null() {
        return None;
    }
    Some(match compare(a, b) {
        Some(o) => o == Ordering::Equal,
        None => a == b,
    })
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn sort_cmp(a: &Value, b: &Value) -> Ordering {
    compare(a, b).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b)))
}

/// NULL is larger than every value: last ascending, first descending
fn order_values(a: &Value, b: &Value, direction: Direction) -> Ordering {
    let ord = match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => sort_cmp(a, b),
    };
    match direction {
        Direction::Asc => ord,
        Direction::Desc => ord.reverse(),
    }
}

fn sort_key(value: Value, modifier: OrderModifier) -> Value {
    match value {
        Value::String(s) => {
            let s = if modifier.unaccents() { deunicode::deunicode(&s) } else { s };
            let s = if modifier.lowercases() { s.to_lowercase() } else { s };
            Value::String(s)
        }
        other => other,
    }
}

fn jsonb_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn stored_pairs(map: &serde_json::Map<String, Value>) -> Vec<(&String, &Value)> {
    let mut pairs: Vec<(&String, &Value)> = map.iter().collect();
    pairs.sort_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    pairs
}

/// jsonb btree order: Object > Array > Boolean > Number > String > Null.
/// Containers compare by size first; object keys in jsonb storage order
/// (shorter keys first).
fn jsonb_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y).unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x.len().cmp(&y.len()).then_with(|| {
            x.iter()
                .zip(y)
                .map(|(a, b)| jsonb_cmp(a, b))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        }),
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()).then_with(|| {
            stored_pairs(x)
                .into_iter()
                .zip(stored_pairs(y))
                .map(|((ka, va), (kb, vb))| {
                    ka.len()
                        .cmp(&kb.len())
                        .then_with(|| ka.cmp(kb))
                        .then_with(|| jsonb_cmp(va, vb))
                })
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        }),
        _ => jsonb_rank(a).cmp(&jsonb_rank(b)),
    }
}

fn compare_contexts(a: &Context<'_>, b: &Context<'_>, terms: &[OrderTerm]) -> Ordering {
    for term in terms {
        let av = sort_key(column_value(a, &term.column), term.modifier);
        let bv = sort_key(column_value(b, &term.column), term.modifier);
        let ord = order_values(&av, &bv, term.direction);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

fn aggregate(spec: &AggregateSpec, members: &[&Row]) -> QueryResult<Value> {
    let values: Vec<&Value> = members
        .iter()
        .filter_map(|row| row.get(&spec.field))
        .filter(|v| !v.is_null())
        .collect();

    let result = match spec.function {
        AggregateFunction::Count => Value::from(values.len() as i64),
        AggregateFunction::Min => extreme(&values, Ordering::Less),
        AggregateFunction::Max => extreme(&values, Ordering::Greater),
        AggregateFunction::Sum => {
            let integers = values
                .iter()
                .map(|v| v.as_i64())
                .try_fold(0i64, |acc, v| acc.checked_add(v?));
            match integers {
                _ if values.is_empty() => Value::Null,
                Some(total) => Value::from(total),
                None => float(numbers(spec, &values)?.iter().sum()),
            }
        }
        AggregateFunction::Mean => mean(&numbers(spec, &values)?).map_or(Value::Null, float),
        AggregateFunction::Var => variance(&numbers(spec, &values)?).map_or(Value::Null, float),
        AggregateFunction::Std => variance(&numbers(spec, &values)?)
            .map(f64::sqrt)
            .map_or(Value::Null, float),
    };
    Ok(result)
}

fn numbers(spec: &AggregateSpec, values: &[&Value]) -> QueryResult<Vec<f64>> {
    values
        .iter()
        .map(|v| {
            v.as_f64().ok_or_else(|| {
                execution_error(format!(
                    "function {}({}) received non-numeric value {v}",
                    spec.function.sql_name(),
                    spec.field
                ))
            })
        })
        .collect()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population variance
fn variance(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    Some(values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64)
}

fn extreme(values: &[&Value], wanted: Ordering) -> Value {
    values
        .iter()
        .copied()
        .reduce(|best, v| if sort_cmp(v, best) == wanted { v } else { best })
        .cloned()
        .unwrap_or(Value::Null)
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

// ---------------------------------------------------------------------------
// Trigrams
// ---------------------------------------------------------------------------

fn words(value: &str) -> Vec<String> {
    value
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Trigrams of words padded with two leading blanks and one trailing blank
fn trigrams(words: &[String]) -> HashSet<String> {
    let mut set = HashSet::new();
    for word in words {
        let padded: Vec<char> = "  ".chars().chain(word.chars()).chain(" ".chars()).collect();
        for window in padded.windows(3) {
            set.insert(window.iter().collect());
        }
    }
    set
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// pg_trgm `similarity(a, b)`
pub fn similarity(a: &str, b: &str) -> f64 {
    jaccard(&trigrams(&words(a)), &trigrams(&words(b)))
}

/// Greatest similarity between `a` and any contiguous run of words of `b`
pub fn word_similarity(a: &str, b: &str) -> f64 {
    let needle = trigrams(&words(a));
    let haystack = words(b);
    let mut best: f64 = 0.0;
    for start in 0..haystack.len() {
        for end in start + 1..=haystack.len() {
            best = best.max(jaccard(&needle, &trigrams(&haystack[start..end])));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compare_pred(column: &str, operator: Operator, value: Value) -> Predicate {
        Predicate::Compare {
            column: ColumnRef::root("item", column, ColumnType::Text),
            operator,
            value,
        }
    }

    fn query(predicates: Vec<Predicate>, order_by: Vec<OrderTerm>) -> Query {
        Query {
            entity: "item".to_string(),
            table: "item".to_string(),
            joins: Vec::new(),
            predicates,
            order_by,
            limit: None,
        }
    }

    fn store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .insert_many(
                "item",
                [
                    json!({"id": 1, "name": "Ação", "score": 3, "tags": {"a": 1}, "at": "2024-03-05"}),
                    json!({"id": 2, "name": "acao", "score": null, "tags": {"b": 2}, "at": "2023-12-31T10:00:00"}),
                    json!({"id": 3, "name": "Beta", "score": 1, "tags": null, "at": null}),
                ],
            )
            .unwrap();
        store
    }

    fn ids(rows: &[Row]) -> Vec<i64> {
        rows.iter().filter_map(|r| r["id"].as_i64()).collect()
    }

    #[tokio::test]
    async fn test_null_comparisons_are_unknown() {
        let store = store();
        let gt = compare_pred("score", Operator::Gt, json!(2));
        let rows = store.fetch(&query(vec![gt.clone()], vec![])).await.unwrap();
        assert_eq!(ids(&rows), vec![1]);

        // NOT (score > 2) drops the NULL row as well
        let rows = store.fetch(&query(vec![gt.negate()], vec![])).await.unwrap();
        assert_eq!(ids(&rows), vec![3]);
    }

    #[tokio::test]
    async fn test_isnull_and_exact_null() {
        let store = store();
        let rows = store
            .fetch(&query(vec![compare_pred("score", Operator::Isnull, json!(true))], vec![]))
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![2]);

        let rows = store
            .fetch(&query(vec![compare_pred("score", Operator::Isnull, json!(false))], vec![]))
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![1, 3]);

        let rows = store
            .fetch(&query(vec![compare_pred("tags", Operator::Exact, Value::Null)], vec![]))
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![3]);
    }

    #[tokio::test]
    async fn test_unaccent_operators() {
        let store = store();
        let rows = store
            .fetch(&query(
                vec![compare_pred("name", Operator::UnaccentIexact, json!("ACAO"))],
                vec![],
            ))
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![1, 2]);

        let rows = store
            .fetch(&query(vec![compare_pred("name", Operator::Iexact, json!("ACAO"))], vec![]))
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![2]);
    }

    #[tokio::test]
    async fn test_date_parts() {
        let store = store();
        let rows = store
            .fetch(&query(vec![compare_pred("at", Operator::Year, json!(2023))], vec![]))
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![2]);
        let rows = store
            .fetch(&query(vec![compare_pred("at", Operator::Day, json!(5))], vec![]))
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![1]);
    }

    #[tokio::test]
    async fn test_null_ordering_follows_postgres() {
        let store = store();
        let asc = OrderTerm {
            column: ColumnRef::root("item", "score", ColumnType::Integer),
            direction: Direction::Asc,
            modifier: OrderModifier::Exact,
        };
        let rows = store.fetch(&query(vec![], vec![asc.clone()])).await.unwrap();
        assert_eq!(ids(&rows), vec![3, 1, 2]);

        let desc = OrderTerm {
            direction: Direction::Desc,
            ..asc
        };
        let rows = store.fetch(&query(vec![], vec![desc])).await.unwrap();
        assert_eq!(ids(&rows), vec![2, 1, 3]);
    }

    #[tokio::test]
    async fn test_limit_and_insert_validation() {
        let store = store();
        let mut q = query(vec![], vec![]);
        q.limit = Some(2);
        assert_eq!(store.fetch(&q).await.unwrap().len(), 2);
        assert_eq!(store.count("item").unwrap(), 3);
        assert!(matches!(
            store.insert("item", json!([1, 2])),
            Err(QueryError::Execution { .. })
        ));
    }

    #[tokio::test]
    async fn test_json_keys_compare_as_text() {
        let store = InMemoryStore::new();
        store
            .insert_many(
                "item",
                [json!({"id": 1, "extra": {"n": 10}}), json!({"id": 2, "extra": {"n": "1.0"}})],
            )
            .unwrap();
        let key = |operator, value| Predicate::Compare {
            column: ColumnRef::root("item", "extra", ColumnType::Json).with_json_key("n"),
            operator,
            value,
        };

        // '10' and '1.0' both sort before '5'
        let rows = store.fetch(&query(vec![key(Operator::Gt, json!(5))], vec![])).await.unwrap();
        assert!(rows.is_empty());

        let rows = store.fetch(&query(vec![key(Operator::Exact, json!(1))], vec![])).await.unwrap();
        assert!(rows.is_empty());

        let rows = store
            .fetch(&query(vec![key(Operator::Exact, json!("1.0"))], vec![]))
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![2]);

        let rows = store
            .fetch(&query(vec![key(Operator::In, json!([10, 2]))], vec![]))
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![1]);
    }

    #[tokio::test]
    async fn test_contains_on_json_column_is_containment() {
        let store = InMemoryStore::new();
        store
            .insert_many(
                "item",
                [
                    json!({"id": 1, "tags": {"a": 1}}),
                    json!({"id": 2, "tags": ["a", "b"]}),
                    json!({"id": 3, "tags": null}),
                ],
            )
            .unwrap();
        let contains = |column_type| Predicate::Compare {
            column: ColumnRef::root("item", "tags", column_type),
            operator: Operator::Contains,
            value: json!("a"),
        };

        // an object never contains a bare string
        let rows = store
            .fetch(&query(vec![contains(ColumnType::Json)], vec![]))
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![2]);

        let rows = store
            .fetch(&query(vec![contains(ColumnType::Json).negate()], vec![]))
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![1]);
    }

    #[tokio::test]
    async fn test_dimension_listings() {
        let store = InMemoryStore::new();
        store
            .insert_many(
                "item",
                [
                    json!({"id": 1, "dims": {"site": "north", "level": 2}}),
                    json!({"id": 2, "dims": {"site": "south", "level": 2.0, "unit": null}}),
                    json!({"id": 3, "dims": {"site": "north", "level": "high"}}),
                    json!({"id": 4, "dims": ["site"]}),
                    json!({"id": 5, "dims": null}),
                ],
            )
            .unwrap();
        let listing = |target| DimensionQuery {
            source: query(vec![], vec![]),
            column: "dims".to_string(),
            target,
        };

        let keys = store.fetch_dimensions(&listing(DimensionTarget::Keys)).await.unwrap();
        assert_eq!(keys, vec![json!("level"), json!("site"), json!("unit")]);

        let values = |key: &str| {
            listing(DimensionTarget::Values {
                key: key.to_string(),
            })
        };
        let sites = store.fetch_dimensions(&values("site")).await.unwrap();
        assert_eq!(sites, vec![json!("north"), json!("south")]);

        // 2 and 2.0 are one jsonb value; strings sort before numbers
        let levels = store.fetch_dimensions(&values("level")).await.unwrap();
        assert_eq!(levels, vec![json!("high"), json!(2)]);

        assert!(store.fetch_dimensions(&values("unit")).await.unwrap().is_empty());
    }

    #[test]
    fn test_jsonb_ordering() {
        let mut values = vec![
            json!({"a": 1}),
            json!([1]),
            json!(true),
            json!(3),
            json!("z"),
            json!(null),
            json!({"bb": 1, "c": 1}),
            json!([0, 5]),
        ];
        values.sort_by(jsonb_cmp);
        assert_eq!(
            values,
            vec![
                json!(null),
                json!("z"),
                json!(3),
                json!(true),
                json!([1]),
                json!([0, 5]),
                json!({"a": 1}),
                json!({"bb": 1, "c": 1}),
            ]
        );
    }

    #[test]
    fn test_json_containment() {
        assert!(json_contains(&json!({"a": 1, "b": [1, 2]}), &json!({"b": [2]})));
        assert!(!json_contains(&json!({"a": 1}), &json!({"a": 2})));
        assert!(json_contains(&json!(["x", "y"]), &json!("x")));
        assert!(has_key(&json!({"k": null}), "k"));
        assert!(has_key(&json!(["k"]), "k"));
        assert!(!has_key(&json!("k"), "k"));
    }

    #[test]
    fn test_trigram_similarity() {
        assert!((similarity("word", "word") - 1.0).abs() < 1e-9);
        assert!(similarity("temperature", "temperatura") >= SIMILARITY_THRESHOLD);
        assert!(similarity("temperature", "pressure") < similarity("temperature", "temperatura"));
        assert_eq!(similarity("", ""), 0.0);
        assert!(word_similarity("temperature", "max temperature reading") > 0.99);
        assert!(word_similarity("max temperature reading", "temperature") < 0.6);
    }

    #[test]
    fn test_aggregate_functions() {
        let rows: Vec<Row> = [json!({"v": 1}), json!({"v": 3}), json!({"v": null})]
            .into_iter()
            .filter_map(|v| v.as_object().cloned())
            .collect();
        let members: Vec<&Row> = rows.iter().collect();
        let spec = |function| AggregateSpec {
            key: "k".to_string(),
            field: "v".to_string(),
            function,
        };
        assert_eq!(aggregate(&spec(AggregateFunction::Sum), &members).unwrap(), json!(4));
        assert_eq!(aggregate(&spec(AggregateFunction::Count), &members).unwrap(), json!(2));
        assert_eq!(aggregate(&spec(AggregateFunction::Mean), &members).unwrap(), json!(2.0));
        assert_eq!(aggregate(&spec(AggregateFunction::Var), &members).unwrap(), json!(1.0));
        assert_eq!(aggregate(&spec(AggregateFunction::Std), &members).unwrap(), json!(1.0));
        assert_eq!(aggregate(&spec(AggregateFunction::Min), &members).unwrap(), json!(1));
        assert_eq!(aggregate(&spec(AggregateFunction::Max), &members).unwrap(), json!(3));
        assert_eq!(aggregate(&spec(AggregateFunction::Sum), &[]).unwrap(), Value::Null);
    }
}

//! Composite primary key expansion
//!
//! On entities whose primary key spans more than one column, the synthetic
//! `pk` / `pk__in` keys carry encoded tokens. Before parsing they are opened
//! into per-column terms:
//!
//! - filter: every component becomes an equality (or `__in`) term, which
//!   lets partitioned tables prune on the non-`id` components
//! - exclude: only the `id` component is kept
//!
//! At most one pk-style key is allowed per dictionary, and only the exact and
//! `in` forms are supported.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::core::error::{CompositeKeyError, DictKind, QueryError};
use crate::core::pk::{CompositePkCodec, DEFAULT_PK_COLUMN, PrimaryKey};
use crate::core::query::QueryDict;
use crate::query::parser::PK_ALIAS;

const PK_IN: &str = "pk__in";

/// Check if a dictionary key targets the synthetic primary key
pub fn is_pk_key(key: &str) -> bool {
    key == PK_ALIAS || key.starts_with("pk__")
}

/// Rewrite `pk` / `pk__in` entries of a filter or exclude dictionary.
///
/// Entries that do not target the primary key are kept in place; the opened
/// terms are appended after them.
pub fn open_composite_pk(dict: &QueryDict, kind: DictKind) -> Result<QueryDict, QueryError> {
    let pk_keys: Vec<&String> = dict.keys().filter(|k| is_pk_key(k)).collect();
    if pk_keys.is_empty() {
        return Ok(dict.clone());
    }

    if let Some(unsupported) = pk_keys.iter().find(|k| **k != PK_ALIAS && **k != PK_IN) {
        return Err(CompositeKeyError::UnsupportedPkOperator {
            kind,
            key: unsupported.to_string(),
        }
        .into());
    }
    if pk_keys.len() > 1 {
        return Err(CompositeKeyError::DuplicatePkKey {
            kind,
            keys: pk_keys.iter().map(|k| k.to_string()).collect(),
        }
        .into());
    }

    let mut opened: QueryDict = dict
        .iter()
        .filter(|(k, _)| !is_pk_key(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    if let Some(value) = dict.get(PK_ALIAS) {
        let pk = CompositePkCodec::decode(value)?;
        match kind {
            DictKind::Filter => {
                for (column, component) in pk.into_filter() {
                    opened.insert(column, component);
                }
            }
            DictKind::Exclude => {
                opened.insert(DEFAULT_PK_COLUMN.to_string(), id_component(&pk, kind)?);
            }
        }
    }

    if let Some(value) = dict.get(PK_IN) {
        let tokens = value
            .as_array()
            .ok_or_else(|| CompositeKeyError::InvalidPkList {
                kind,
                received: value.clone(),
            })?;
        let keys = tokens
            .iter()
            .map(CompositePkCodec::decode)
            .collect::<Result<Vec<_>, _>>()?;

        match kind {
            DictKind::Filter => {
                for (column, values) in unique_by_column(keys) {
                    opened.insert(format!("{column}__in"), Value::Array(values));
                }
            }
            DictKind::Exclude => {
                let mut ids = Vec::with_capacity(keys.len());
                for pk in &keys {
                    push_unique(&mut ids, id_component(pk, kind)?);
                }
                opened.insert(format!("{DEFAULT_PK_COLUMN}__in"), Value::Array(ids));
            }
        }
    }

    debug!(
        dict = %kind,
        before = ?dict.keys().collect::<Vec<_>>(),
        after = ?opened.keys().collect::<Vec<_>>(),
        "Opened composite primary key"
    );
    Ok(opened)
}

fn id_component(pk: &PrimaryKey, kind: DictKind) -> Result<Value, CompositeKeyError> {
    pk.component(DEFAULT_PK_COLUMN)
        .cloned()
        .ok_or_else(|| CompositeKeyError::MissingIdComponent {
            kind,
            pk: pk.to_value(),
        })
}

/// Distinct values per column, both in order of first appearance
fn unique_by_column(keys: Vec<PrimaryKey>) -> IndexMap<String, Vec<Value>> {
    let mut columns: IndexMap<String, Vec<Value>> = IndexMap::new();
    for pk in keys {
        for (column, value) in pk.into_filter() {
            push_unique(columns.entry(column).or_default(), value);
        }
    }
    columns
}

fn push_unique(values: &mut Vec<Value>, value: Value) {
    if !values.contains(&value) {
        values.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token(value: Value) -> Value {
        let record = value.as_object().cloned().unwrap_or_default();
        let keys: Vec<&String> = record.keys().collect();
        CompositePkCodec::encode(&record, &keys).unwrap()
    }

    fn dict(value: Value) -> QueryDict {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_filter_pk_opens_every_component() {
        let pk = token(json!({"id": 1, "variant": "x"}));
        let opened =
            open_composite_pk(&dict(json!({"value__gt": 0, "pk": pk})), DictKind::Filter).unwrap();
        assert_eq!(opened, dict(json!({"value__gt": 0, "id": 1, "variant": "x"})));
    }

    #[test]
    fn test_exclude_pk_keeps_only_id() {
        let pk = token(json!({"id": 1, "variant": "x"}));
        let opened = open_composite_pk(&dict(json!({"pk": pk})), DictKind::Exclude).unwrap();
        assert_eq!(opened, dict(json!({"id": 1})));
    }

    #[test]
    fn test_filter_pk_in_groups_unique_values() {
        let pks = json!([
            token(json!({"id": 1, "variant": "x"})),
            token(json!({"id": 2, "variant": "x"})),
            token(json!({"id": 1, "variant": "y"})),
        ]);
        let opened = open_composite_pk(&dict(json!({"pk__in": pks})), DictKind::Filter).unwrap();
        assert_eq!(opened["id__in"], json!([1, 2]));
        assert_eq!(opened["variant__in"], json!(["x", "y"]));
    }

    #[test]
    fn test_exclude_pk_in_uses_ids() {
        let pks = json!([
            token(json!({"id": 3, "variant": "x"})),
            token(json!({"id": 3, "variant": "y"})),
            token(json!({"id": 4, "variant": "y"})),
        ]);
        let opened = open_composite_pk(&dict(json!({"pk__in": pks})), DictKind::Exclude).unwrap();
        assert_eq!(opened, dict(json!({"id__in": [3, 4]})));
    }

    #[test]
    fn test_scalar_pk_is_the_id_component() {
        let opened = open_composite_pk(&dict(json!({"pk": 9})), DictKind::Filter).unwrap();
        assert_eq!(opened, dict(json!({"id": 9})));
    }

    #[test]
    fn test_dictionaries_without_pk_are_unchanged() {
        let original = dict(json!({"variant": "x", "value__lt": 3}));
        assert_eq!(open_composite_pk(&original, DictKind::Filter).unwrap(), original);
    }

    #[test]
    fn test_two_pk_keys_are_rejected() {
        let pk = token(json!({"id": 1, "variant": "x"}));
        let err = open_composite_pk(
            &dict(json!({"pk": pk.clone(), "pk__in": [pk]})),
            DictKind::Filter,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            QueryError::CompositeKey(CompositeKeyError::DuplicatePkKey { .. })
        ));
    }

    #[test]
    fn test_other_pk_operators_are_rejected() {
        let err = open_composite_pk(&dict(json!({"pk__gt": 1})), DictKind::Exclude).unwrap_err();
        assert!(matches!(
            err,
            QueryError::CompositeKey(CompositeKeyError::UnsupportedPkOperator {
                kind: DictKind::Exclude,
                ..
            })
        ));
    }

    #[test]
    fn test_exclude_without_id_component() {
        let pk = token(json!({"code": "a", "variant": "x"}));
        let err = open_composite_pk(&dict(json!({"pk": pk})), DictKind::Exclude).unwrap_err();
        assert!(matches!(
            err,
            QueryError::CompositeKey(CompositeKeyError::MissingIdComponent { .. })
        ));
    }

    #[test]
    fn test_pk_in_requires_a_list_and_valid_tokens() {
        let err = open_composite_pk(&dict(json!({"pk__in": "abc"})), DictKind::Filter).unwrap_err();
        assert!(matches!(
            err,
            QueryError::CompositeKey(CompositeKeyError::InvalidPkList { .. })
        ));

        let err =
            open_composite_pk(&dict(json!({"pk__in": ["%%%"]})), DictKind::Filter).unwrap_err();
        assert!(matches!(err, QueryError::Codec(_)));
    }
}

//! Tests for the composite primary key codec and its query expansion

mod common;

use common::*;
use dictquery::prelude::*;
use indexmap::IndexMap;

fn token(id: i64, variant: &str) -> Value {
    CompositePkCodec::encode(&json!({"id": id, "variant": variant}), &["id", "variant"]).unwrap()
}

// =============================================================================
// Codec
// =============================================================================

mod codec_tests {
    use super::*;

    #[test]
    fn test_round_trip_preserves_mapping() {
        let record = json!({
            "tenant": "acme",
            "id": 42,
            "ratio": 0.5,
            "active": true,
            "day": "2024-02-29",
        });
        let keys = ["tenant", "id", "ratio", "active", "day"];
        let encoded = CompositePkCodec::encode(&record, &keys).unwrap();
        assert!(encoded.is_string());

        let PrimaryKey::Composite(decoded) = CompositePkCodec::decode(&encoded).unwrap() else {
            panic!("expected a composite key");
        };
        let expected: IndexMap<String, Value> = keys
            .iter()
            .map(|k| (k.to_string(), record[*k].clone()))
            .collect();
        assert_eq!(decoded, expected);
        assert_eq!(decoded.keys().collect::<Vec<_>>(), keys.to_vec());
    }

    #[test]
    fn test_default_id_is_a_bare_scalar() {
        assert_eq!(CompositePkCodec::encode(&json!({"id": 7}), &["id"]).unwrap(), json!(7));
        assert_eq!(
            CompositePkCodec::decode(&json!(7)).unwrap(),
            PrimaryKey::Scalar(json!(7))
        );
        assert_eq!(
            CompositePkCodec::decode(&json!("7")).unwrap(),
            PrimaryKey::Scalar(json!(7))
        );
    }

    #[test]
    fn test_single_non_default_key_is_wrapped() {
        let encoded = CompositePkCodec::encode(&json!({"code": "BR"}), &["code"]).unwrap();
        assert!(encoded.is_string());
        let decoded = CompositePkCodec::decode(&encoded).unwrap();
        assert_eq!(decoded.component("code"), Some(&json!("BR")));
        assert_eq!(decoded.to_value(), encoded);
    }

    #[test]
    fn test_invalid_tokens() {
        let err = CompositePkCodec::decode(&json!("not a token!")).unwrap_err();
        assert!(matches!(err, CodecError::InvalidEncoding { .. }));

        let err = CompositePkCodec::decode(&json!(true)).unwrap_err();
        assert!(matches!(err, CodecError::InvalidToken { .. }));

        let err = CompositePkCodec::encode(&json!({"id": 1}), &["id", "variant"]).unwrap_err();
        assert!(matches!(err, CodecError::MissingComponent { .. }));
    }
}

// =============================================================================
// Expansion
// =============================================================================

mod expansion_tests {
    use super::*;

    #[tokio::test]
    async fn test_filter_by_pk_equals_filter_by_components() {
        let registry = registry();
        let builder = QueryBuilder::new(&registry);

        let by_token = builder
            .build("measurement", None, &ListParams::new().filter("pk", token(1, "x")))
            .unwrap();
        let by_columns = builder
            .build(
                "measurement",
                None,
                &ListParams::new().filter("id", 1).filter("variant", "x"),
            )
            .unwrap();
        assert_eq!(by_token, by_columns);

        let rows = store().fetch(&by_token).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["variant"], json!("x"));
        assert_eq!(rows[0]["v"], json!(1));
    }

    #[tokio::test]
    async fn test_exclude_by_pk_only_uses_id() {
        let registry = registry();
        let builder = QueryBuilder::new(&registry);

        let by_token = builder
            .build("measurement", None, &ListParams::new().exclude("pk", token(1, "x")))
            .unwrap();
        let by_id = builder
            .build("measurement", None, &ListParams::new().exclude("id", 1))
            .unwrap();
        assert_eq!(by_token, by_id);

        // both variants of id 1 are excluded
        let rows = store().fetch(&by_token).await.unwrap();
        assert_eq!(ids(&rows), vec![2]);
    }

    #[tokio::test]
    async fn test_pk_in_expands_per_column() {
        let registry = registry();
        let params = ListParams::new()
            .filter("pk__in", json!([token(1, "y"), token(2, "x")]))
            .order("v");
        let query = QueryBuilder::new(&registry).build("measurement", None, &params).unwrap();
        let rows = store().fetch(&query).await.unwrap();
        // per-column membership over-selects the (1, x) row
        let values: Vec<i64> = rows.iter().filter_map(|r| r["v"].as_i64()).collect();
        assert_eq!(values, vec![1, 3, 5]);

        let params = ListParams::new().exclude("pk__in", json!([token(1, "y")]));
        let query = QueryBuilder::new(&registry).build("measurement", None, &params).unwrap();
        assert_eq!(ids(&store().fetch(&query).await.unwrap()), vec![2]);
    }

    #[test]
    fn test_open_composite_pk_keeps_other_terms_first() {
        let dict = json!({"pk": token(2, "x"), "cat": "b"});
        let opened = open_composite_pk(dict.as_object().unwrap(), DictKind::Filter).unwrap();
        let keys: Vec<&str> = opened.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["cat", "id", "variant"]);
    }

    #[test]
    fn test_pk_misuse_is_rejected() {
        let registry = registry();
        let builder = QueryBuilder::new(&registry);

        let params = ListParams::new()
            .filter("pk", token(1, "x"))
            .filter("pk__in", json!([token(1, "x")]));
        let err = builder.build("measurement", None, &params).unwrap_err();
        assert!(matches!(
            err,
            QueryError::CompositeKey(CompositeKeyError::DuplicatePkKey { kind: DictKind::Filter, .. })
        ));

        let params = ListParams::new().exclude("pk__gt", token(1, "x"));
        let err = builder.build("measurement", None, &params).unwrap_err();
        assert!(matches!(
            err,
            QueryError::CompositeKey(CompositeKeyError::UnsupportedPkOperator { kind: DictKind::Exclude, .. })
        ));

        let params = ListParams::new().filter("pk__in", "nope");
        let err = builder.build("measurement", None, &params).unwrap_err();
        assert!(matches!(
            err,
            QueryError::CompositeKey(CompositeKeyError::InvalidPkList { .. })
        ));
    }

    #[tokio::test]
    async fn test_single_key_entity_uses_pk_alias() {
        assert_eq!(filter_ids("pk", json!(3)).await, vec![3]);
        assert_eq!(filter_ids("pk__in", json!([1, 4])).await, vec![1, 4]);
    }
}

// =============================================================================
// Retrieve by primary key
// =============================================================================

mod by_pk_tests {
    use super::*;

    #[tokio::test]
    async fn test_by_pk_composite_token() {
        let registry = registry();
        let query = QueryBuilder::new(&registry)
            .by_pk("measurement", None, &token(1, "y"))
            .unwrap();
        let rows = store().fetch(&query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["v"], json!(3));
    }

    #[tokio::test]
    async fn test_by_pk_scalar_and_numeric_string() {
        let registry = registry();
        let builder = QueryBuilder::new(&registry);
        for pk in [json!(2), json!("2")] {
            let query = builder.by_pk("person", None, &pk).unwrap();
            assert_eq!(ids(&store().fetch(&query).await.unwrap()), vec![2]);
        }
    }

    #[test]
    fn test_by_pk_rejects_foreign_components() {
        let registry = registry();
        let builder = QueryBuilder::new(&registry);

        let err = builder.by_pk("person", None, &token(1, "x")).unwrap_err();
        let QueryError::Grammar(GrammarError::UnknownToken { token, path, .. }) = err else {
            panic!("expected unknown token");
        };
        assert_eq!(token, "variant");
        assert_eq!(path, "pk");

        let not_pk = CompositePkCodec::encode(&json!({"id": 1, "cat": "a"}), &["id", "cat"]).unwrap();
        assert!(builder.by_pk("measurement", None, &not_pk).is_err());
    }

    #[tokio::test]
    async fn test_by_pk_respects_base_query() {
        let registry = registry();
        let config = config();
        let entity = registry.resolve("measurement").unwrap();
        let base = config
            .base_query_for("measurement")
            .unwrap()
            .apply(entity.as_ref(), None, &AuthContext::user(5, [1]))
            .unwrap();

        let query = QueryBuilder::new(&registry)
            .by_pk("measurement", Some(base), &token(1, "y"))
            .unwrap();
        assert!(store().fetch(&query).await.unwrap().is_empty());
    }
}

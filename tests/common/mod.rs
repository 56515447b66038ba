//! Shared fixtures for the integration tests
//!
//! Provides a YAML schema with single and composite primary keys, a chain of
//! relationships (`person -> company -> country`) and base filters, plus an
//! in-memory store seeded with rows exercising NULLs, accents, JSON and dates.
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use dictquery::prelude::*;

pub const SCHEMA: &str = r#"
entities:
  - name: person
    columns:
      - { name: id, type: integer, primary_key: true }
      - { name: name, type: text }
      - { name: age, type: integer, nullable: true }
      - { name: email, type: text, nullable: true }
      - { name: birth_date, type: date, nullable: true }
      - { name: profile, type: json, nullable: true }
      - { name: company_id, type: integer, nullable: true }
      - { name: row_permission_id, type: integer }
      - { name: owner_id, type: integer }
      - { name: deleted, type: boolean }
    relationships:
      - { name: company, target: company, local_column: company_id, remote_column: id }
    base_filters:
      - { kind: soft_delete }
      - { kind: row_permission }
  - name: company
    columns:
      - { name: id, type: integer, primary_key: true }
      - { name: name, type: text }
      - { name: country_id, type: integer }
    relationships:
      - { name: country, target: country, local_column: country_id, remote_column: id }
  - name: country
    columns:
      - { name: id, type: integer, primary_key: true }
      - { name: code, type: text }
  - name: measurement
    columns:
      - { name: id, type: integer, primary_key: true }
      - { name: variant, type: text, primary_key: true }
      - { name: cat, type: text }
      - { name: v, type: integer, nullable: true }
      - { name: dimensions, type: json, nullable: true }
      - { name: row_permission_id, type: integer }
    base_filters:
      - { kind: row_permission }
"#;

pub fn config() -> SchemaConfig {
    SchemaConfig::from_yaml_str(SCHEMA).expect("fixture schema parses")
}

pub fn registry() -> SchemaRegistry {
    config().into_registry().expect("fixture schema is valid")
}

/// Store seeded with the fixture rows
pub fn store() -> InMemoryStore {
    let store = InMemoryStore::new();
    store
        .insert_many(
            "person",
            [
                json!({
                    "id": 1, "name": "John Smith", "age": 30, "email": "john@example.com",
                    "birth_date": "1994-05-10", "profile": {"lang": "en", "tags": ["admin", "dev"], "level": 10},
                    "company_id": 1, "row_permission_id": 1, "owner_id": 10, "deleted": false
                }),
                json!({
                    "id": 2, "name": "JOHN DOE", "age": 17, "email": null,
                    "birth_date": "2007-01-20", "profile": {"lang": "pt", "level": "1.0"},
                    "company_id": 2, "row_permission_id": 2, "owner_id": 11, "deleted": false
                }),
                json!({
                    "id": 3, "name": "Maria José", "age": 45, "email": "maria@example.com",
                    "birth_date": "1979-05-03", "profile": null,
                    "company_id": 2, "row_permission_id": 3, "owner_id": 10, "deleted": true
                }),
                json!({
                    "id": 4, "name": "Jonas", "age": null, "email": null,
                    "birth_date": null, "profile": {"lang": "en"},
                    "company_id": null, "row_permission_id": 1, "owner_id": 12, "deleted": false
                }),
            ],
        )
        .expect("seed person");
    store
        .insert_many(
            "company",
            [
                json!({"id": 1, "name": "Acme", "country_id": 1}),
                json!({"id": 2, "name": "Globex", "country_id": 2}),
            ],
        )
        .expect("seed company");
    store
        .insert_many(
            "country",
            [json!({"id": 1, "code": "US"}), json!({"id": 2, "code": "BR"})],
        )
        .expect("seed country");
    store
        .insert_many(
            "measurement",
            [
                json!({
                    "id": 1, "variant": "x", "cat": "a", "v": 1,
                    "dimensions": {"site": "north", "sensor": "t1"}, "row_permission_id": 1
                }),
                json!({
                    "id": 1, "variant": "y", "cat": "a", "v": 3,
                    "dimensions": {"site": "south", "sensor": null}, "row_permission_id": 2
                }),
                json!({
                    "id": 2, "variant": "x", "cat": "b", "v": 5,
                    "dimensions": {"site": "east", "depth": 12}, "row_permission_id": 3
                }),
            ],
        )
        .expect("seed measurement");
    store
}

/// Build and run a list query without base filters
pub async fn list(entity: &str, params: ListParams) -> QueryResult<Vec<Row>> {
    let registry = registry();
    let query = QueryBuilder::new(&registry).build(entity, None, &params)?;
    store().fetch(&query).await
}

/// `id` column of every row, in result order
pub fn ids(rows: &[Row]) -> Vec<i64> {
    rows.iter().filter_map(|r| r.get("id").and_then(Value::as_i64)).collect()
}

pub async fn filter_ids(path: &str, value: Value) -> Vec<i64> {
    let rows = list("person", ListParams::new().filter(path, value).order("id"))
        .await
        .unwrap_or_else(|e| panic!("filter {path} failed: {e}"));
    ids(&rows)
}

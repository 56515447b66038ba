//! Build and run list and aggregation queries against the in-memory store
//!
//! ```sh
//! RUST_LOG=dictquery=debug cargo run --example list_query
//! ```

use anyhow::Result;
use dictquery::prelude::*;
use tracing_subscriber::EnvFilter;

const SCHEMA: &str = r#"
entities:
  - name: measurement
    columns:
      - { name: id, type: integer, primary_key: true }
      - { name: variant, type: text, primary_key: true }
      - { name: value, type: float, nullable: true }
      - { name: taken_at, type: date }
      - { name: attribute_id, type: integer }
      - { name: extra, type: json, nullable: true }
      - { name: row_permission_id, type: integer, nullable: true }
    relationships:
      - { name: attribute, target: attribute, local_column: attribute_id, remote_column: id }
    base_filters:
      - { kind: row_permission }
  - name: attribute
    columns:
      - { name: id, type: integer, primary_key: true }
      - { name: description, type: text }
"#;

fn seed(store: &InMemoryStore) -> Result<()> {
    store.insert_many(
        "attribute",
        [
            json!({"id": 1, "description": "Temperature"}),
            json!({"id": 2, "description": "Pressão"}),
        ],
    )?;
    store.insert_many(
        "measurement",
        [
            json!({"id": 1, "variant": "a", "value": 21.5, "taken_at": "2024-03-01", "attribute_id": 1, "extra": {"unit": "C"}, "row_permission_id": 1}),
            json!({"id": 1, "variant": "b", "value": 22.0, "taken_at": "2024-03-02", "attribute_id": 1, "extra": {"unit": "C"}, "row_permission_id": 2}),
            json!({"id": 2, "variant": "a", "value": 1013.0, "taken_at": "2024-03-01", "attribute_id": 2, "extra": {"unit": "hPa"}, "row_permission_id": 1}),
            json!({"id": 3, "variant": "a", "value": null, "taken_at": "2023-12-31", "attribute_id": 2, "extra": null, "row_permission_id": 3}),
        ],
    )?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = SchemaConfig::from_yaml_str(SCHEMA)?;
    let registry = config.into_registry()?;
    let store = InMemoryStore::new();
    seed(&store)?;

    let entity = registry.resolve("measurement")?;
    let auth = AuthContext::user(7, [1, 2]);
    let base = config
        .base_query_for("measurement")
        .unwrap_or_default()
        .apply(entity.as_ref(), None, &auth)?;

    // Filtered list, joined through a relationship
    let params = ListParams::new()
        .filter("attribute__description__unaccent_icontains", "pressao")
        .exclude("value__isnull", true)
        .order("-taken_at");
    let query = QueryBuilder::new(&registry).build("measurement", Some(base.clone()), &params)?;
    println!("📋 Pressure readings:");
    for row in store.fetch(&query).await? {
        println!("  {}", Value::Object(row));
    }

    // Composite key round-trip
    let token = CompositePkCodec::encode(&json!({"id": 1, "variant": "b"}), &["id", "variant"])?;
    let query = QueryBuilder::new(&registry).by_pk("measurement", Some(base.clone()), &token)?;
    println!("\n🔑 Row for token {token}:");
    for row in store.fetch(&query).await? {
        println!("  {}", Value::Object(row));
    }

    // Aggregation ordered by the aggregated output
    let params: AggregateParams = serde_json::from_value(json!({
        "group_by": ["attribute_id"],
        "agg": {
            "total": {"field": "value", "function": "sum"},
            "readings": {"field": "value", "function": "count"}
        },
        "order_by": ["-total"]
    }))?;
    let aggregate = AggregationBuilder::new(&registry).build("measurement", Some(base), &params)?;
    println!("\n📊 Totals per attribute:");
    for row in store.fetch_aggregate(&aggregate).await? {
        println!("  {}", Value::Object(row));
    }

    let statement = PostgresRenderer::new().render_aggregate(&aggregate);
    println!("\n🐘 PostgreSQL:\n  {}\n  params: {:?}", statement.sql, statement.params);

    Ok(())
}

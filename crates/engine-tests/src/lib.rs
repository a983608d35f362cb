#![allow(dead_code)]

use engine_config::mapping::{TableMapping, TableRule};
use model::{
    core::schema::{ColumnSchema, CompositeKey, SystemColumns},
    execution::config::RunConfig,
};
use serde_json::{Value, json};
use std::{num::NonZeroUsize, path::Path, time::Duration};

pub mod destination;


pub const ITEMS_TABLE: &str = "items";
pub const BIDS_TABLE: &str = "bids";

/// Value of `name` that makes the mock destination reject the whole batch.
pub const POISON: &str = "boom";

/// `items_*` files load into `items`; `bids_*` files into `bids` with a
/// generated `id = {bidNo}_{bidOrd}_{offset+1}`.
pub fn mapping() -> TableMapping {
    TableMapping {
        rules: vec![
            TableRule {
                prefix: "items_".into(),
                table: ITEMS_TABLE.into(),
                composite_key: None,
            },
            TableRule {
                prefix: "bids_".into(),
                table: BIDS_TABLE.into(),
                composite_key: Some(CompositeKey::new("id", &["bidNo", "bidOrd"])),
            },
        ],
        sample_file: "sample_data.json".into(),
        system_columns: SystemColumns::default(),
    }
}

/// Destination columns as introspection reports them, system columns included.
pub fn destination_tables() -> Vec<(&'static str, Vec<ColumnSchema>)> {
    vec![
        (
            ITEMS_TABLE,
            vec![
                ColumnSchema::new("id", "integer", "pg_catalog", "int4"),
                ColumnSchema::text("name"),
                ColumnSchema::new("price", "numeric", "pg_catalog", "numeric"),
                ColumnSchema::new("createdAt", "timestamp with time zone", "pg_catalog", "timestamptz"),
                ColumnSchema::new("updatedAt", "timestamp with time zone", "pg_catalog", "timestamptz"),
            ],
        ),
        (
            BIDS_TABLE,
            vec![
                ColumnSchema::text("id"),
                ColumnSchema::text("bidNo"),
                ColumnSchema::text("bidOrd"),
                ColumnSchema::text("name"),
                ColumnSchema::new("createdAt", "timestamp with time zone", "pg_catalog", "timestamptz"),
                ColumnSchema::new("updatedAt", "timestamp with time zone", "pg_catalog", "timestamptz"),
            ],
        ),
    ]
}

pub fn run_config(batch_size: usize, concurrency: usize) -> RunConfig {
    let mapping = mapping();
    let mut config = RunConfig::new(
        NonZeroUsize::new(batch_size).unwrap(),
        NonZeroUsize::new(concurrency).unwrap(),
    )
    .with_tables(mapping.tables())
    .with_labels("TEST", "local")
    .with_acquire_timeout(Duration::from_secs(5))
    .with_system_columns(mapping.system_columns.clone());
    for rule in &mapping.rules {
        if let Some(key) = &rule.composite_key {
            config = config.with_composite_key(&rule.table, key.clone());
        }
    }
    config
}

/// `count` item records; record `poison_at` (0-based) carries [`POISON`] as its name.
pub fn item_records(count: usize, poison_at: Option<usize>) -> Vec<Value> {
    (0..count)
        .map(|i| {
            let name = if poison_at == Some(i) {
                POISON.to_string()
            } else {
                format!("item-{i}")
            };
            json!({ "name": name, "price": i as f64 + 0.5, "unmapped": true })
        })
        .collect()
}

pub fn bid_records(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| json!({ "bidNo": format!("B{}", i % 7), "bidOrd": "00", "name": format!("bid-{i}") }))
        .collect()
}

pub fn write_json_array(dir: &Path, file_name: &str, records: &[Value]) {
    let body = serde_json::to_string_pretty(records).unwrap();
    std::fs::write(dir.join(file_name), body).unwrap();
}

pub fn write_ndjson(dir: &Path, file_name: &str, records: &[Value]) {
    let body: Vec<String> = records.iter().map(|r| r.to_string()).collect();
    std::fs::write(dir.join(file_name), body.join("\n\n")).unwrap();
}

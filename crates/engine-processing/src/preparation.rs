//! Turns a planned batch into bound insert statements.

use crate::error::ValidationError;
use connectors::sql::base::connection::InsertStatement;
use model::{
    core::{
        schema::{CompositeKey, SystemColumns, TableSchema},
        value::Value,
    },
    execution::metric::DroppedRecord,
    records::{batch::Batch, batch::PlannedRecord},
};
use planner::query::{
    MAX_BIND_PARAMS,
    ast::{common::TableRef, expr::Expr, expr::TypeName},
    builder::insert::InsertBuilder,
    dialect::Postgres,
    param, raw,
    renderer::{Render, Renderer},
};

const CURRENT_TIMESTAMP: &str = "CURRENT_TIMESTAMP";

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedBatch {
    pub statements: Vec<InsertStatement>,
    /// Rows bound across all statements.
    pub rows: usize,
    pub dropped: Vec<DroppedRecord>,
}

impl PreparedBatch {
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }
}

/// Where the generated identifier goes in each row.
enum KeySlot<'a> {
    None,
    Prepended(&'a CompositeKey),
    InSchema(&'a CompositeKey, usize),
}

/// Column layout for one table: `[generated key] schema columns [timestamp markers]`.
pub struct RowPreparer<'a> {
    schema: &'a TableSchema,
    key: KeySlot<'a>,
    timestamps: Vec<&'a str>,
    casts: Vec<Option<TypeName>>,
    max_params: usize,
}

impl<'a> RowPreparer<'a> {
    pub fn new(
        schema: &'a TableSchema,
        composite_key: Option<&'a CompositeKey>,
        system: &'a SystemColumns,
    ) -> Self {
        let key = match composite_key {
            None => KeySlot::None,
            Some(key) => match schema.position(&key.column) {
                Some(idx) => KeySlot::InSchema(key, idx),
                None => KeySlot::Prepended(key),
            },
        };

        let timestamps = system
            .timestamp_columns
            .iter()
            .map(String::as_str)
            .filter(|c| schema.position(c).is_none())
            .collect();

        let casts = schema
            .columns
            .iter()
            .map(|c| c.cast_target().map(|(s, n)| TypeName::new(s, n)))
            .collect();

        Self {
            schema,
            key,
            timestamps,
            casts,
            max_params: MAX_BIND_PARAMS,
        }
    }

    pub fn with_max_params(mut self, max_params: usize) -> Self {
        self.max_params = max_params.max(1);
        self
    }

    pub fn columns(&self) -> Vec<&str> {
        let mut columns = Vec::with_capacity(self.schema.len() + 1 + self.timestamps.len());
        if let KeySlot::Prepended(key) = self.key {
            columns.push(key.column.as_str());
        }
        columns.extend(self.schema.column_names());
        columns.extend(self.timestamps.iter().copied());
        columns
    }

    /// One row of expressions in [`Self::columns`] order.
    pub fn row(&self, planned: &PlannedRecord) -> Result<Vec<Expr>, ValidationError> {
        let projected = planned.record.project(self.schema);
        let mut row = Vec::with_capacity(projected.values.len() + 1 + self.timestamps.len());

        if let KeySlot::Prepended(key) = self.key {
            row.push(param(Some(composite_id(key, planned)), None));
        }

        for (idx, value) in projected.values.iter().enumerate() {
            let text = match self.key {
                KeySlot::InSchema(key, pos) if pos == idx => Some(composite_id(key, planned)),
                _ => coerce(&self.schema.columns[idx].name, value)?,
            };
            row.push(param(text, self.casts[idx].clone()));
        }

        row.extend(self.timestamps.iter().map(|_| raw(CURRENT_TIMESTAMP)));
        Ok(row)
    }

    /// Prepares every record of `batch`; records that fail validation are
    /// dropped and reported, the rest are rendered into one or more statements.
    pub fn prepare(&self, batch: &Batch) -> PreparedBatch {
        let mut builder = InsertBuilder::new(TableRef::new(&self.schema.table)).columns(self.columns());
        let mut dropped = Vec::new();
        let mut rows = 0;

        for planned in &batch.records {
            match self.row(planned) {
                Ok(row) => {
                    builder.push_row(row);
                    rows += 1;
                }
                Err(e) => dropped.push(DroppedRecord {
                    offset: planned.offset,
                    reason: e.to_string(),
                }),
            }
        }

        if rows == 0 {
            return PreparedBatch {
                statements: Vec::new(),
                rows,
                dropped,
            };
        }

        let statements = builder
            .build()
            .chunked(self.max_params)
            .into_iter()
            .map(|insert| {
                let mut renderer = Renderer::new(&Postgres);
                insert.render(&mut renderer);
                let (sql, params) = renderer.finish();
                InsertStatement {
                    sql,
                    params,
                    rows: insert.values.len(),
                }
            })
            .collect();

        PreparedBatch {
            statements,
            rows,
            dropped,
        }
    }
}

/// Text bound for one value. Blank values become NULL.
pub fn coerce(field: &str, value: &Value) -> Result<Option<String>, ValidationError> {
    if value.is_blank() {
        return Ok(None);
    }
    match value.as_text() {
        Some(text) => Ok(Some(text)),
        None => Err(ValidationError {
            field: field.to_string(),
            found: value.type_name(),
        }),
    }
}

/// `{field_a}_{field_b}_{offset+1}`. A missing or blank field contributes an
/// empty segment.
pub fn composite_id(key: &CompositeKey, planned: &PlannedRecord) -> String {
    let mut id = String::new();
    for field in &key.fields {
        if let Some(text) = planned.record.get(field).and_then(Value::as_text) {
            id.push_str(&text);
        }
        id.push('_');
    }
    id.push_str(&(planned.offset + 1).to_string());
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{
        core::schema::ColumnSchema,
        records::{batch::BatchKey, record::Record},
    };
    use std::collections::HashSet;

    fn schema() -> TableSchema {
        TableSchema::new(
            "opn_std_scsbid_info",
            vec![
                ColumnSchema::text("bidNtceNo"),
                ColumnSchema::text("bidNtceOrd"),
                ColumnSchema::new("presmptPrce", "numeric", "pg_catalog", "numeric"),
            ],
        )
    }

    fn planned(offset: u64, record: Record) -> PlannedRecord {
        PlannedRecord { offset, record }
    }

    fn batch(records: Vec<PlannedRecord>) -> Batch {
        Batch {
            key: BatchKey {
                file_index: 0,
                batch_number: 1,
            },
            table_name: "opn_std_scsbid_info".into(),
            source_file: "f.json".into(),
            records,
        }
    }

    #[test]
    fn test_composite_id_format() {
        let key = CompositeKey::new("id", &["bidNtceNo", "bidNtceOrd"]);
        let record: Record = [("bidNtceNo", Value::from("R25BK0001")), ("bidNtceOrd", Value::from("000"))]
            .into_iter()
            .collect();
        assert_eq!(composite_id(&key, &planned(41, record)), "R25BK0001_000_42");

        let partial: Record = [("bidNtceNo", Value::from("X"))].into_iter().collect();
        assert_eq!(composite_id(&key, &planned(0, partial)), "X__1");
    }

    #[test]
    fn test_composite_ids_unique_per_offset() {
        let key = CompositeKey::new("id", &["bidNtceNo"]);
        let ids: HashSet<String> = (0..500u64)
            .map(|offset| {
                let record: Record = [("bidNtceNo", Value::from("same"))].into_iter().collect();
                composite_id(&key, &planned(offset, record))
            })
            .collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn test_row_layout_and_coercion() {
        let schema = schema();
        let key = CompositeKey::new("id", &["bidNtceNo", "bidNtceOrd"]);
        let system = SystemColumns::default();
        let preparer = RowPreparer::new(&schema, Some(&key), &system);

        assert_eq!(
            preparer.columns(),
            vec!["id", "bidNtceNo", "bidNtceOrd", "presmptPrce", "createdAt", "updatedAt"]
        );

        let record: Record = [
            ("bidNtceNo", Value::from("R1")),
            ("bidNtceOrd", Value::from("")),
            ("presmptPrce", Value::Float(1500.0)),
            ("unknownField", Value::from("ignored")),
        ]
        .into_iter()
        .collect();

        let row = preparer.row(&planned(9, record)).unwrap();
        assert_eq!(row[0], param(Some("R1__10".into()), None));
        assert_eq!(row[1], param(Some("R1".into()), None));
        assert_eq!(row[2], param(None, None));
        assert_eq!(
            row[3],
            param(Some("1500.0".into()), Some(TypeName::new("pg_catalog", "numeric")))
        );
        assert_eq!(row[4], raw("CURRENT_TIMESTAMP"));
        assert_eq!(row.len(), 6);
    }

    #[test]
    fn test_nested_values_drop_only_that_record() {
        let schema = schema();
        let system = SystemColumns::default();
        let preparer = RowPreparer::new(&schema, None, &system);

        let good: Record = [("bidNtceNo", Value::from("A"))].into_iter().collect();
        let bad: Record = [(
            "presmptPrce",
            Value::from(serde_json::json!({"amount": 1})),
        )]
        .into_iter()
        .collect();

        let prepared = preparer.prepare(&batch(vec![planned(0, good.clone()), planned(1, bad), planned(2, good)]));
        assert_eq!(prepared.rows, 2);
        assert_eq!(prepared.dropped.len(), 1);
        assert_eq!(prepared.dropped[0].offset, 1);
        assert!(prepared.dropped[0].reason.contains("presmptPrce"));

        let stmt = &prepared.statements[0];
        assert_eq!(
            stmt.sql,
            r#"INSERT INTO "opn_std_scsbid_info" ("bidNtceNo", "bidNtceOrd", "presmptPrce", "createdAt", "updatedAt") VALUES ($1, $2, $3::text::"pg_catalog"."numeric", CURRENT_TIMESTAMP, CURRENT_TIMESTAMP), ($4, $5, $6::text::"pg_catalog"."numeric", CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)"#
        );
        assert_eq!(stmt.params.len(), 6);
        assert_eq!(stmt.rows, 2);
    }

    #[test]
    fn test_large_batches_split_under_param_cap() {
        let schema = schema();
        let system = SystemColumns::default();
        let preparer = RowPreparer::new(&schema, None, &system).with_max_params(7);

        let records = (0..5u64)
            .map(|i| planned(i, [("bidNtceNo", Value::Int(i as i64))].into_iter().collect()))
            .collect();
        let prepared = preparer.prepare(&batch(records));

        assert_eq!(prepared.rows, 5);
        assert_eq!(prepared.statements.len(), 3);
        assert!(prepared.statements.iter().all(|s| s.params.len() <= 7));
        assert_eq!(prepared.statements.iter().map(|s| s.rows).sum::<usize>(), 5);
        assert_eq!(prepared.statements[2].params[0].as_deref(), Some("4"));
    }

    #[test]
    fn test_all_dropped_yields_no_statements() {
        let schema = schema();
        let system = SystemColumns::default();
        let preparer = RowPreparer::new(&schema, None, &system);
        let bad: Record = [("bidNtceNo", Value::from(serde_json::json!([1, 2])))]
            .into_iter()
            .collect();

        let prepared = preparer.prepare(&batch(vec![planned(0, bad)]));
        assert!(prepared.is_empty());
        assert!(prepared.statements.is_empty());
        assert_eq!(prepared.dropped[0].reason, "Field 'bidNtceNo' holds an unsupported array value");
    }
}

use serde::{Deserialize, Serialize};

/// Postgres types that accept a text parameter without an explicit cast.
const TEXT_TYPES: &[&str] = &["text", "character varying", "character", "name"];

/// One destination column as reported by `information_schema.columns`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub udt_schema: String,
    pub udt_name: String,
}

impl ColumnSchema {
    pub fn new(name: &str, data_type: &str, udt_schema: &str, udt_name: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            udt_schema: udt_schema.to_string(),
            udt_name: udt_name.to_string(),
        }
    }

    /// A text column, mostly used by tests and by composite-key columns.
    pub fn text(name: &str) -> Self {
        Self::new(name, "text", "pg_catalog", "text")
    }

    /// Qualified type the bound text parameter has to be cast to, or `None`
    /// when the column already takes text.
    pub fn cast_target(&self) -> Option<(&str, &str)> {
        if TEXT_TYPES.contains(&self.data_type.as_str()) {
            None
        } else {
            Some((self.udt_schema.as_str(), self.udt_name.as_str()))
        }
    }
}

/// Ordered, case-preserving column list for one destination table,
/// without the system-managed columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(table: &str, columns: Vec<ColumnSchema>) -> Self {
        Self {
            table: table.to_string(),
            columns,
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == column)
    }
}

/// Rule for a loader-generated identifier: `{field_a}_{field_b}_{offset+1}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeKey {
    pub column: String,
    pub fields: Vec<String>,
}

impl CompositeKey {
    pub fn new(column: &str, fields: &[&str]) -> Self {
        Self {
            column: column.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// Columns the loader never takes from input records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemColumns {
    /// Filled with `CURRENT_TIMESTAMP` at execution time.
    pub timestamp_columns: Vec<String>,
    /// Left out of schema resolution entirely.
    pub excluded: Vec<String>,
}

impl SystemColumns {
    pub fn is_excluded(&self, column: &str) -> bool {
        self.excluded.iter().any(|c| c == column)
            || self.timestamp_columns.iter().any(|c| c == column)
    }
}

impl Default for SystemColumns {
    fn default() -> Self {
        Self {
            timestamp_columns: vec!["createdAt".to_string(), "updatedAt".to_string()],
            excluded: vec!["id".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_columns_need_no_cast() {
        assert_eq!(ColumnSchema::text("bidNtceNo").cast_target(), None);
        let varchar = ColumnSchema::new("name", "character varying", "pg_catalog", "varchar");
        assert_eq!(varchar.cast_target(), None);
    }

    #[test]
    fn typed_columns_cast_through_udt() {
        let col = ColumnSchema::new("amount", "numeric", "pg_catalog", "numeric");
        assert_eq!(col.cast_target(), Some(("pg_catalog", "numeric")));
        let ts = ColumnSchema::new("openedAt", "timestamp without time zone", "pg_catalog", "timestamp");
        assert_eq!(ts.cast_target(), Some(("pg_catalog", "timestamp")));
    }

    #[test]
    fn default_system_columns() {
        let sys = SystemColumns::default();
        assert!(sys.is_excluded("createdAt"));
        assert!(sys.is_excluded("updatedAt"));
        assert!(sys.is_excluded("id"));
        assert!(!sys.is_excluded("bidNtceNo"));
    }
}

//! Maps input file names to destination tables.

use crate::error::SettingsError;
use model::core::schema::{CompositeKey, SystemColumns};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_SAMPLE_FILE: &str = "sample_data.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRule {
    pub prefix: String,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite_key: Option<CompositeKey>,
}

impl TableRule {
    fn new(prefix: &str, table: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            table: table.to_string(),
            composite_key: None,
        }
    }
}

/// Ordered prefix rules; the first matching prefix wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMapping {
    pub rules: Vec<TableRule>,
    #[serde(default = "default_sample_file")]
    pub sample_file: String,
    #[serde(default)]
    pub system_columns: SystemColumns,
}

fn default_sample_file() -> String {
    DEFAULT_SAMPLE_FILE.to_string()
}

impl Default for TableMapping {
    fn default() -> Self {
        let mut scsbid = TableRule::new("PubDataOpnStdService_ScsBidInfo_", "opn_std_scsbid_info");
        scsbid.composite_key = Some(CompositeKey::new("id", &["bidNtceNo", "bidNtceOrd"]));

        Self {
            rules: vec![
                TableRule::new("BidPublicInfoService_BID_CNSTWK_", "bid_pblanclistinfo_cnstwk"),
                TableRule::new("BidPublicInfoService_BID_SERVC_", "bid_pblanclistinfo_servc"),
                TableRule::new("BidPublicInfoService_BID_THNG_", "bid_pblanclistinfo_thng"),
                TableRule::new("BidPublicInfoService_BID_FRGCPT_", "bid_pblanclistinfo_frgcpt"),
                scsbid,
            ],
            sample_file: default_sample_file(),
            system_columns: SystemColumns::default(),
        }
    }
}

impl TableMapping {
    pub fn from_json_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        let mapping: TableMapping = serde_json::from_str(&content)?;
        mapping.validate()?;
        Ok(mapping)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.rules.is_empty() {
            return Err(SettingsError::Mapping("no table rules".into()));
        }
        for rule in &self.rules {
            if rule.prefix.is_empty() || rule.table.is_empty() {
                return Err(SettingsError::Mapping(format!(
                    "rule '{}' -> '{}' has an empty prefix or table",
                    rule.prefix, rule.table
                )));
            }
            if let Some(key) = &rule.composite_key
                && (key.column.is_empty() || key.fields.is_empty())
            {
                return Err(SettingsError::Mapping(format!(
                    "composite key for '{}' needs a column and at least one field",
                    rule.table
                )));
            }
        }
        Ok(())
    }

    pub fn rule_for(&self, file_name: &str) -> Option<&TableRule> {
        self.rules.iter().find(|r| file_name.starts_with(&r.prefix))
    }

    pub fn table_for(&self, file_name: &str) -> Option<&str> {
        self.rule_for(file_name).map(|r| r.table.as_str())
    }

    /// Distinct destination tables, in rule order.
    pub fn tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            if !tables.contains(&rule.table) {
                tables.push(rule.table.clone());
            }
        }
        tables
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_prefixes() {
        let mapping = TableMapping::default();
        assert_eq!(
            mapping.table_for("BidPublicInfoService_BID_THNG_20240101.json"),
            Some("bid_pblanclistinfo_thng")
        );
        assert_eq!(
            mapping.table_for("PubDataOpnStdService_ScsBidInfo_1.json"),
            Some("opn_std_scsbid_info")
        );
        assert_eq!(mapping.table_for("something_else.json"), None);
        assert_eq!(mapping.sample_file, "sample_data.json");
        assert!(mapping.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        std::fs::write(
            &path,
            r#"{"rules": [
                {"prefix": "orders_", "table": "orders",
                 "composite_key": {"column": "id", "fields": ["shop", "no"]}},
                {"prefix": "legacy_orders_", "table": "orders"}
            ]}"#,
        )
        .unwrap();

        let mapping = TableMapping::from_json_file(&path).unwrap();
        assert_eq!(mapping.tables(), vec!["orders"]);
        assert_eq!(mapping.sample_file, DEFAULT_SAMPLE_FILE);
        assert!(mapping.system_columns.is_excluded("createdAt"));
        assert!(mapping.rule_for("orders_1.json").unwrap().composite_key.is_some());
    }

    #[test]
    fn test_rejects_empty_rules() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        std::fs::write(&path, r#"{"rules": [{"prefix": "", "table": "t"}]}"#).unwrap();
        assert!(matches!(
            TableMapping::from_json_file(&path),
            Err(SettingsError::Mapping(_))
        ));
    }
}

use crate::core::{schema::TableSchema, value::Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub name: String,
    pub value: Value,
}

/// A flat input record. Field order is the order in which the source produced them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    pub fields: Vec<FieldValue>,
}

/// A record split against a destination schema: `values` follows the schema's
/// column order (missing fields become `Null`), unknown fields go to `extras`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedRecord {
    pub values: Vec<Value>,
    pub extras: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(fields: Vec<FieldValue>) -> Self {
        Self { fields }
    }

    pub fn from_json_object(map: serde_json::Map<String, serde_json::Value>) -> Self {
        let fields = map
            .into_iter()
            .map(|(name, value)| FieldValue {
                name,
                value: Value::from(value),
            })
            .collect();
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn project(&self, schema: &TableSchema) -> ProjectedRecord {
        let mut values = vec![Value::Null; schema.len()];
        let mut extras = BTreeMap::new();

        for field in &self.fields {
            match schema.position(&field.name) {
                Some(idx) => values[idx] = field.value.clone(),
                None => {
                    extras.insert(field.name.clone(), field.value.clone());
                }
            }
        }

        ProjectedRecord { values, extras }
    }
}

impl<S: Into<String>, V: Into<Value>> FromIterator<(S, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (S, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(name, value)| FieldValue {
                    name: name.into(),
                    value: value.into(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::ColumnSchema;
    use serde_json::json;

    #[test]
    fn keeps_source_field_order() {
        let value = json!({"b": 1, "a": "x", "c": null});
        let serde_json::Value::Object(map) = value else {
            panic!("expected object");
        };
        let record = Record::from_json_object(map);
        let names: Vec<_> = record.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert_eq!(record.get("b"), Some(&Value::Int(1)));
    }

    #[test]
    fn projection_fills_missing_and_collects_extras() {
        let schema = TableSchema::new(
            "t",
            vec![ColumnSchema::text("a"), ColumnSchema::text("b")],
        );
        let record: Record = [("b", Value::from("2")), ("zzz", Value::from("?"))]
            .into_iter()
            .collect();

        let projected = record.project(&schema);
        assert_eq!(projected.values, vec![Value::Null, Value::from("2")]);
        assert_eq!(projected.extras.get("zzz"), Some(&Value::from("?")));
    }
}

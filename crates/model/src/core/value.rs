use serde::{Deserialize, Serialize};
use std::fmt;

/// A single field value as read from an input record.
///
/// Records are expected to be flat, so anything that is not a scalar ends up in
/// `Nested` and is rejected when the record is prepared for insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
    Nested(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null and empty strings are both loaded as SQL NULL.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::Nested(_))
    }

    /// Textual form of a scalar. `None` for nested values.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Boolean(v) => Some(v.to_string()),
            Value::Int(v) => Some(v.to_string()),
            Value::Float(v) => Some(format_float(*v)),
            Value::String(v) => Some(v.clone()),
            Value::Nested(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Nested(serde_json::Value::Array(_)) => "array",
            Value::Nested(_) => "object",
        }
    }
}

fn format_float(v: f64) -> String {
    if v.is_finite() {
        let mut buf = ryu::Buffer::new();
        buf.format_finite(v).to_string()
    } else {
        v.to_string()
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if n.is_u64() {
                    // Beyond i64; keep the exact digits instead of rounding through f64.
                    Value::String(n.to_string())
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::String(n.to_string())
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            other => Value::Nested(other),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Nested(v) => write!(f, "{v}"),
            other => write!(f, "{}", other.as_text().unwrap_or_default()),
        }
    }
}

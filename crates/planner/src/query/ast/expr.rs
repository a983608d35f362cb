//! Value expressions that may appear in an INSERT row.

/// A schema-qualified type name, e.g. `pg_catalog.numeric`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeName {
    pub schema: String,
    pub name: String,
}

impl TypeName {
    pub fn new(schema: &str, name: &str) -> Self {
        Self {
            schema: schema.to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Bound as text; `None` binds SQL NULL.
    Param {
        value: Option<String>,
        cast: Option<TypeName>,
    },
    /// Emitted verbatim, e.g. `CURRENT_TIMESTAMP`.
    Raw(String),
}

impl Expr {
    pub fn is_param(&self) -> bool {
        matches!(self, Expr::Param { .. })
    }
}

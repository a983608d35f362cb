//! Defines the `Dialect` trait for database-specific SQL syntax.

use crate::query::ast::expr::TypeName;

pub trait Dialect: Send + Sync {
    /// Wraps an identifier in the dialect's quotation marks, escaping any
    /// embedded quote characters, so case is preserved.
    fn quote_identifier(&self, ident: &str) -> String;

    /// Returns the placeholder for a zero-based parameter index.
    fn get_placeholder(&self, index: usize) -> String;

    /// Renders a text placeholder converted to `target`.
    fn cast_placeholder(&self, placeholder: &str, target: &TypeName) -> String;

    fn name(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct Postgres;

impl Dialect for Postgres {
    fn quote_identifier(&self, ident: &str) -> String {
        format!(r#""{}""#, ident.replace('"', r#""""#))
    }

    fn get_placeholder(&self, index: usize) -> String {
        // PostgreSQL uses $1, $2, etc.
        format!("${}", index + 1)
    }

    fn cast_placeholder(&self, placeholder: &str, target: &TypeName) -> String {
        // $n is always bound as text
        format!(
            "{placeholder}::text::{}.{}",
            self.quote_identifier(&target.schema),
            self.quote_identifier(&target.name)
        )
    }

    fn name(&self) -> String {
        "PostgreSQL".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier_preserves_case_and_escapes() {
        assert_eq!(Postgres.quote_identifier("bidNtceNo"), r#""bidNtceNo""#);
        assert_eq!(Postgres.quote_identifier(r#"we"ird"#), r#""we""ird""#);
    }

    #[test]
    fn test_cast_placeholder() {
        let target = TypeName::new("pg_catalog", "int4");
        assert_eq!(
            Postgres.cast_placeholder("$3", &target),
            r#"$3::text::"pg_catalog"."int4""#
        );
    }
}

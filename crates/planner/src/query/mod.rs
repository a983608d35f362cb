use crate::query::ast::expr::{Expr, TypeName};

pub mod ast;
pub mod builder;
pub mod dialect;
pub mod renderer;

/// Postgres accepts at most this many bind parameters in one statement.
pub const MAX_BIND_PARAMS: usize = 65_535;

/// A text-bound parameter, optionally cast to the column's type.
pub fn param(value: Option<String>, cast: Option<TypeName>) -> Expr {
    Expr::Param { value, cast }
}

pub fn raw(sql: &str) -> Expr {
    Expr::Raw(sql.to_string())
}

//! Defines the AST for a multi-row INSERT statement.

use crate::query::ast::{common::TableRef, expr::Expr};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Insert {
    pub table: TableRef,
    pub columns: Vec<String>,
    /// One inner vector per row, in `columns` order.
    pub values: Vec<Vec<Expr>>,
}

impl Insert {
    /// Bind parameters a single row contributes.
    pub fn params_per_row(&self) -> usize {
        self.values
            .first()
            .map(|row| row.iter().filter(|e| e.is_param()).count())
            .unwrap_or(0)
    }

    pub fn param_count(&self) -> usize {
        self.values
            .iter()
            .map(|row| row.iter().filter(|e| e.is_param()).count())
            .sum()
    }

    /// Splits the rows into consecutive statements so that none binds more than
    /// `max_params` parameters. Row order is preserved across the pieces.
    pub fn chunked(self, max_params: usize) -> Vec<Insert> {
        let per_row = self.params_per_row();
        if per_row == 0 || self.param_count() <= max_params {
            return vec![self];
        }

        let rows_per_stmt = (max_params / per_row).max(1);
        let Insert {
            table,
            columns,
            values,
        } = self;

        let mut out = Vec::with_capacity(values.len().div_ceil(rows_per_stmt));
        let mut rows = values.into_iter().peekable();
        while rows.peek().is_some() {
            out.push(Insert {
                table: table.clone(),
                columns: columns.clone(),
                values: rows.by_ref().take(rows_per_stmt).collect(),
            });
        }
        out
    }
}

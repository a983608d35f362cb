use crate::query::ast::{common::TableRef, expr::Expr, insert::Insert};

#[derive(Debug, Clone)]
pub struct InsertBuilder {
    ast: Insert,
}

impl InsertBuilder {
    pub fn new(table: TableRef) -> Self {
        Self {
            ast: Insert {
                table,
                ..Default::default()
            },
        }
    }

    pub fn column(mut self, name: &str) -> Self {
        self.ast.columns.push(name.to_string());
        self
    }

    pub fn columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ast.columns.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn row(mut self, values: Vec<Expr>) -> Self {
        self.ast.values.push(values);
        self
    }

    pub fn push_row(&mut self, values: Vec<Expr>) {
        self.ast.values.push(values);
    }

    pub fn build(self) -> Insert {
        self.ast
    }
}

use crate::query::{
    ast::expr::Expr,
    renderer::{Render, Renderer},
};

impl Render for Expr {
    fn render(&self, r: &mut Renderer) {
        match self {
            Expr::Param { value, cast } => {
                let placeholder = r.push_param(value.clone());
                match cast {
                    Some(target) => {
                        let casted = r.dialect.cast_placeholder(&placeholder, target);
                        r.sql.push_str(&casted);
                    }
                    None => r.sql.push_str(&placeholder),
                }
            }
            Expr::Raw(sql) => r.sql.push_str(sql),
        }
    }
}

use crate::query::{ast::insert::Insert, renderer::Render};

impl Render for Insert {
    fn render(&self, r: &mut super::Renderer) {
        // 1. INSERT INTO table (...)
        r.sql.push_str("INSERT INTO ");
        r.render_table_ref(&self.table);
        r.sql.push_str(" (");
        let quoted_columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| r.dialect.quote_identifier(c))
            .collect();
        r.sql.push_str(&quoted_columns.join(", "));
        r.sql.push(')');

        // 2. VALUES (...), (...)
        r.sql.push_str(" VALUES ");
        for (i, row) in self.values.iter().enumerate() {
            if i > 0 {
                r.sql.push_str(", ");
            }
            r.sql.push('(');
            for (j, val) in row.iter().enumerate() {
                if j > 0 {
                    r.sql.push_str(", ");
                }
                val.render(r);
            }
            r.sql.push(')');
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::query::{
        ast::{common::TableRef, expr::TypeName, insert::Insert},
        dialect::Postgres,
        param, raw,
        renderer::{Render, Renderer},
    };

    #[test]
    fn test_render_batch_insert_postgres() {
        let ast = Insert {
            table: TableRef::new("bid_pblanclistinfo_thng"),
            columns: vec![
                "bidNtceNo".to_string(),
                "presmptPrce".to_string(),
                "createdAt".to_string(),
                "updatedAt".to_string(),
            ],
            values: vec![
                vec![
                    param(Some("R25BK001".into()), None),
                    param(
                        Some("1500.5".into()),
                        Some(TypeName::new("pg_catalog", "numeric")),
                    ),
                    raw("CURRENT_TIMESTAMP"),
                    raw("CURRENT_TIMESTAMP"),
                ],
                vec![
                    param(Some("R25BK002".into()), None),
                    param(None, Some(TypeName::new("pg_catalog", "numeric"))),
                    raw("CURRENT_TIMESTAMP"),
                    raw("CURRENT_TIMESTAMP"),
                ],
            ],
        };

        let dialect = Postgres;
        let mut renderer = Renderer::new(&dialect);
        ast.render(&mut renderer);
        let (sql, params) = renderer.finish();

        let expected_sql = concat!(
            r#"INSERT INTO "bid_pblanclistinfo_thng" ("bidNtceNo", "presmptPrce", "createdAt", "updatedAt") VALUES "#,
            r#"($1, $2::text::"pg_catalog"."numeric", CURRENT_TIMESTAMP, CURRENT_TIMESTAMP), "#,
            r#"($3, $4::text::"pg_catalog"."numeric", CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)"#
        );
        assert_eq!(sql, expected_sql);
        assert_eq!(
            params,
            vec![
                Some("R25BK001".to_string()),
                Some("1500.5".to_string()),
                Some("R25BK002".to_string()),
                None
            ]
        );
    }

    #[test]
    fn test_render_schema_qualified_table() {
        let ast = Insert {
            table: TableRef {
                schema: Some("public".into()),
                name: "t".into(),
            },
            columns: vec!["a".into()],
            values: vec![vec![param(Some("1".into()), None)]],
        };

        let dialect = Postgres;
        let mut renderer = Renderer::new(&dialect);
        ast.render(&mut renderer);
        let (sql, _) = renderer.finish();
        assert_eq!(sql, r#"INSERT INTO "public"."t" ("a") VALUES ($1)"#);
    }
}

use tokio_postgres::types::ToSql;

/// Lends the text parameters of one statement to the driver.
pub struct PgParamStore<'a> {
    pub params: &'a [Option<String>],
}

impl<'a> PgParamStore<'a> {
    pub fn new(params: &'a [Option<String>]) -> Self {
        Self { params }
    }

    pub fn as_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|param| param as &(dyn ToSql + Sync))
            .collect::<Vec<_>>()
    }
}

pub mod error;
pub mod file;
pub mod pool;
pub mod schema;
pub mod sql;

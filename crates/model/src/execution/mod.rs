pub mod config;
pub mod metric;
pub mod run;

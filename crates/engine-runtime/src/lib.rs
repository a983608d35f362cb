pub mod error;
pub mod runner;

pub use runner::{LoadReport, LoadRunner};

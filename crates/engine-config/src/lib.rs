pub mod database;
pub mod error;
pub mod mapping;
pub mod settings;

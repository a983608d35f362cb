pub mod connection;
pub mod params;
pub mod utils;

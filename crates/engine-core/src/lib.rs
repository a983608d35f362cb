pub mod artifacts;
pub mod comparison;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod state;

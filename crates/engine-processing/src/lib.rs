pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod preparation;

pub mod config;
pub mod dimensions;
pub mod error;
pub mod model;
pub mod time;
pub mod transform;

pub use error::{QueryMetricsError, Result};

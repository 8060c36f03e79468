pub mod backend;
pub mod credentials;
mod http;
pub mod log_analytics;
pub mod resource_graph;

pub use backend::{Backends, QueryBackend};
pub use credentials::Credential;

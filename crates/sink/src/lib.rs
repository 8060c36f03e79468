pub mod datadog;
mod http;
pub mod sender;
pub mod signalfx;

pub use sender::{MetricsSender, Sender, SinkCompression, SinkConfig, build_sender};

pub mod orchestrator;
pub mod source;
pub mod summary;

pub use orchestrator::{Orchestrator, ensure_backends};
pub use source::load_descriptors;
pub use summary::{DescriptorFailure, DescriptorOutcome, DescriptorState, FailureKind, RunSummary};

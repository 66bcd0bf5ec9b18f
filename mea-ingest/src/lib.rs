pub mod pipeline;
pub mod config;
pub mod sources;
pub mod sinks;
pub mod transform;
pub mod observability;
pub mod metrics_textfile;

pub use pipeline::{Pipeline, Envelope, RunSummary};

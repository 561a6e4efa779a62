//! Document pipeline shared by the HTTP, MCP, and CLI surfaces.

mod service;
mod types;

pub use service::{DocumentPipeline, PipelineApi};
pub use types::{DocumentAnswer, HealthSnapshot, IngestOutcome, PipelineError};

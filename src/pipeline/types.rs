//! Data types and error definitions for the document pipeline.

use crate::engine::EngineError;
use crate::store::{StoreError, UpsertSummary};
use crate::upload::UploadError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors emitted by pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Session identifier is not registered.
    #[error("Unknown session: {0}")]
    UnknownSession(String),
    /// Uploaded files could not be saved.
    #[error(transparent)]
    Upload(#[from] UploadError),
    /// Store write or read failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Retrieval or synthesis failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Result of ingesting a batch of files into a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
    /// Source keys with extracted text, in key order.
    pub processed: Vec<String>,
    /// Source keys whose extraction failed or produced no text.
    pub empty: Vec<String>,
    /// Records newly written to the store.
    pub inserted: usize,
    /// Records skipped because their key was already stored.
    pub skipped: usize,
    /// Number of documents the session now holds.
    pub session_documents: usize,
}

impl IngestOutcome {
    pub(crate) fn with_summary(mut self, summary: UpsertSummary) -> Self {
        self.inserted = summary.inserted;
        self.skipped = summary.skipped;
        self
    }
}

/// Answer produced from a single session document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentAnswer {
    /// Source key of the document.
    pub document: String,
    /// Model answer, or an error description when synthesis failed for this document.
    pub answer: String,
    /// Whether `answer` holds an error description.
    #[serde(default)]
    pub failed: bool,
}

/// Reachability and readiness snapshot for the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Store backend location.
    pub store: String,
    /// Whether the store answered a count request.
    pub store_reachable: bool,
    /// Stored record count when reachable.
    pub documents: Option<usize>,
    /// Error message when the store could not be reached.
    pub error: Option<String>,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Synthesis model identifier.
    pub language_model: String,
}

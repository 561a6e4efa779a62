//! Record types shared by the embedding store and its backends.

use serde::Serialize;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

/// Document text and vector ready to be persisted under its source key.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    /// Deduplication identity of the document.
    pub source_key: String,
    /// Extracted document text.
    pub text: String,
    /// Embedding of `text`.
    pub vector: Vec<f32>,
}

/// Similarity search hit.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredRecord {
    /// Source key of the matching document.
    pub source_key: String,
    /// Stored document text.
    pub text: String,
    /// Cosine similarity between the query and the document.
    pub score: f32,
}

/// Persisted document as read back for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct StoredDocument {
    /// Source key of the document.
    pub source_key: String,
    /// Stored document text.
    pub text: String,
    /// SHA-256 of the text at insertion time.
    pub content_hash: String,
    /// RFC 3339 timestamp of the insertion.
    pub ingested_at: Option<String>,
}

/// Counters describing one `upsert_batch` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    /// Records newly written to the store.
    pub inserted: usize,
    /// Entries skipped because their source key was already known.
    pub skipped: usize,
}

/// Compute a deterministic SHA-256 hash for document text.
pub fn compute_content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Current timestamp formatted for storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

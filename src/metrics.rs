use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and query activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_ingested: AtomicU64,
    duplicates_skipped: AtomicU64,
    extraction_failures: AtomicU64,
    queries_answered: AtomicU64,
    query_failures: AtomicU64,
    theme_runs: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one store write.
    pub fn record_upsert(&self, inserted: u64, skipped: u64) {
        self.documents_ingested
            .fetch_add(inserted, Ordering::Relaxed);
        self.duplicates_skipped
            .fetch_add(skipped, Ordering::Relaxed);
    }

    /// Record files whose text could not be extracted.
    pub fn record_extraction_failures(&self, count: u64) {
        self.extraction_failures
            .fetch_add(count, Ordering::Relaxed);
    }

    /// Record a finished query, successful or not.
    pub fn record_query(&self, succeeded: bool) {
        let counter = if succeeded {
            &self.queries_answered
        } else {
            &self.query_failures
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one theme extraction request.
    pub fn record_theme_run(&self) {
        self.theme_runs.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            extraction_failures: self.extraction_failures.load(Ordering::Relaxed),
            queries_answered: self.queries_answered.load(Ordering::Relaxed),
            query_failures: self.query_failures.load(Ordering::Relaxed),
            theme_runs: self.theme_runs.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MetricsSnapshot {
    /// Documents newly written to the store since startup.
    pub documents_ingested: u64,
    /// Documents skipped because their source key was already stored.
    pub duplicates_skipped: u64,
    /// Files whose extraction failed or produced no text.
    pub extraction_failures: u64,
    /// Questions answered successfully.
    pub queries_answered: u64,
    /// Questions that failed in retrieval or synthesis.
    pub query_failures: u64,
    /// Theme extraction requests served.
    pub theme_runs: u64,
}

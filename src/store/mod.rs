//! Deduplicating embedding store.
//!
//! [`EmbeddingStore`] owns the embedding client and a [`VectorBackend`]. Source keys are the
//! dedup identity: a key that is already stored is never re-embedded or rewritten, so repeated
//! ingestion of the same batch leaves the store unchanged. Mutations are serialized through a
//! single writer lock; searches go straight to the backend.

pub mod qdrant;
mod record;
pub mod sqlite;

pub use qdrant::QdrantBackend;
pub use record::{
    DocumentRecord, ScoredRecord, StoredDocument, UpsertSummary, compute_content_hash,
};
pub use sqlite::SqliteBackend;

use crate::config::{Config, StoreBackend};
use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell};

/// Errors raised by the embedding store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Persistent storage could not be opened, read, or written.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    /// Embedding provider failed while vectorizing documents or queries.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Embedding provider did not answer in time.
    #[error("Embedding request timed out after {0} seconds")]
    EmbeddingTimeout(u64),
    /// Provider returned vectors of an unexpected size.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the store was configured with.
        expected: usize,
        /// Dimension produced by the provider.
        actual: usize,
    },
    /// Search was requested with `k == 0`.
    #[error("search limit must be at least 1")]
    InvalidLimit,
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        Self::Unavailable(error.to_string())
    }
}

impl From<qdrant::QdrantError> for StoreError {
    fn from(error: qdrant::QdrantError) -> Self {
        Self::Unavailable(error.to_string())
    }
}

/// Persistent key/vector storage behind the embedding store.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Create the underlying table or collection if it does not exist yet.
    async fn ensure_ready(&self, dimension: usize) -> Result<(), StoreError>;

    /// Return the subset of `keys` already present in storage.
    async fn existing_keys(&self, keys: &[String]) -> Result<HashSet<String>, StoreError>;

    /// Persist records whose keys are not yet stored, returning how many were written.
    async fn insert(&self, records: Vec<DocumentRecord>) -> Result<usize, StoreError>;

    /// Return up to `limit` records ordered by descending cosine similarity to `vector`.
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredRecord>, StoreError>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize, StoreError>;

    /// Fetch a stored record by key.
    async fn get(&self, source_key: &str) -> Result<Option<StoredDocument>, StoreError>;

    /// Human-readable location used in logs and health output.
    fn describe(&self) -> String;
}

/// Dedup-aware store pairing an embedding client with a persistent backend.
pub struct EmbeddingStore {
    backend: Box<dyn VectorBackend>,
    embedder: Box<dyn EmbeddingClient>,
    dimension: usize,
    timeout: Duration,
    ready: OnceCell<()>,
    write_lock: Mutex<()>,
}

impl EmbeddingStore {
    /// Assemble a store from explicit parts.
    pub fn new(
        backend: Box<dyn VectorBackend>,
        embedder: Box<dyn EmbeddingClient>,
        dimension: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            embedder,
            dimension,
            timeout,
            ready: OnceCell::new(),
            write_lock: Mutex::new(()),
        }
    }

    /// Open the backend selected by configuration.
    pub async fn from_config(
        config: &Config,
        embedder: Box<dyn EmbeddingClient>,
    ) -> Result<Self, StoreError> {
        let backend: Box<dyn VectorBackend> = match config.store_backend {
            StoreBackend::Sqlite => Box::new(SqliteBackend::open(&config.store_path).await?),
            StoreBackend::Qdrant => {
                let url = config.qdrant_url.as_deref().ok_or_else(|| {
                    StoreError::Unavailable("QDRANT_URL is required for the qdrant backend".into())
                })?;
                Box::new(QdrantBackend::new(
                    url,
                    config.qdrant_api_key.clone(),
                    config.qdrant_collection_name.clone(),
                )?)
            }
        };
        tracing::info!(backend = %backend.describe(), "Embedding store opened");
        Ok(Self::new(
            backend,
            embedder,
            config.embedding_dimension,
            config.request_timeout(),
        ))
    }

    /// Embed and persist every entry whose source key is not stored yet.
    ///
    /// Known keys are skipped without touching their text or vector. When a key repeats inside
    /// the batch, the first occurrence wins.
    pub async fn upsert_batch<I>(&self, records: I) -> Result<UpsertSummary, StoreError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        let mut skipped = 0usize;
        for (source_key, text) in records {
            if seen.insert(source_key.clone()) {
                entries.push((source_key, text));
            } else {
                skipped += 1;
            }
        }

        if entries.is_empty() {
            return Ok(UpsertSummary {
                inserted: 0,
                skipped,
            });
        }

        let _guard = self.write_lock.lock().await;
        self.ensure_ready().await?;

        let keys: Vec<String> = entries.iter().map(|(key, _)| key.clone()).collect();
        let existing = self.backend.existing_keys(&keys).await?;
        let fresh: Vec<(String, String)> = entries
            .into_iter()
            .filter(|(key, _)| {
                let known = existing.contains(key);
                if known {
                    tracing::debug!(source_key = %key, "Source key already stored; skipping");
                }
                !known
            })
            .collect();
        skipped += existing.len();

        if fresh.is_empty() {
            tracing::info!(skipped, "No new documents to embed");
            return Ok(UpsertSummary {
                inserted: 0,
                skipped,
            });
        }

        let texts: Vec<String> = fresh.iter().map(|(_, text)| text.clone()).collect();
        let vectors = self.embed(texts).await?;
        let records: Vec<DocumentRecord> = fresh
            .into_iter()
            .zip(vectors)
            .map(|((source_key, text), vector)| DocumentRecord {
                source_key,
                text,
                vector,
            })
            .collect();

        let inserted = self.backend.insert(records).await?;
        tracing::info!(
            backend = %self.backend.describe(),
            inserted,
            skipped,
            "Documents stored"
        );
        Ok(UpsertSummary { inserted, skipped })
    }

    /// Return up to `k` stored records most similar to `query`, best first.
    ///
    /// An empty store yields an empty result. Each source key appears at most once.
    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredRecord>, StoreError> {
        if k == 0 {
            return Err(StoreError::InvalidLimit);
        }
        self.ensure_ready().await?;

        let mut vectors = self.embed(vec![query.to_string()]).await?;
        let vector = vectors.pop().ok_or_else(|| {
            StoreError::Embedding(EmbeddingClientError::InvalidResponse(
                "provider returned no vector for the query".into(),
            ))
        })?;

        let hits = self.backend.search(&vector, k).await?;
        let mut seen = HashSet::new();
        let results: Vec<ScoredRecord> = hits
            .into_iter()
            .filter(|hit| seen.insert(hit.source_key.clone()))
            .take(k)
            .collect();
        tracing::debug!(k, returned = results.len(), "Similarity search completed");
        Ok(results)
    }

    /// Number of stored records.
    pub async fn count(&self) -> Result<usize, StoreError> {
        self.ensure_ready().await?;
        self.backend.count().await
    }

    /// Fetch a stored record by key.
    pub async fn get(&self, source_key: &str) -> Result<Option<StoredDocument>, StoreError> {
        self.ensure_ready().await?;
        self.backend.get(source_key).await
    }

    /// Backend location used in health output.
    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    /// Embedding model identifier.
    pub fn embedding_model(&self) -> &str {
        self.embedder.model_name()
    }

    async fn ensure_ready(&self) -> Result<(), StoreError> {
        self.ready
            .get_or_try_init(|| self.backend.ensure_ready(self.dimension))
            .await
            .map(|_| ())
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, StoreError> {
        let expected = texts.len();
        let vectors = tokio::time::timeout(self.timeout, self.embedder.generate_embeddings(texts))
            .await
            .map_err(|_| StoreError::EmbeddingTimeout(self.timeout.as_secs()))??;

        if vectors.len() != expected {
            return Err(StoreError::Embedding(EmbeddingClientError::InvalidResponse(
                format!("expected {expected} vectors, received {}", vectors.len()),
            )));
        }
        if let Some(vector) = vectors.iter().find(|vector| vector.len() != self.dimension) {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingClient;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingEmbedder {
        inner: HashEmbeddingClient,
        calls: Arc<AtomicUsize>,
        texts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EmbeddingClient for CountingEmbedder {
        async fn generate_embeddings(
            &self,
            texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.fetch_add(texts.len(), Ordering::SeqCst);
            self.inner.generate_embeddings(texts).await
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    struct SlowEmbedder;

    #[async_trait]
    impl EmbeddingClient for SlowEmbedder {
        async fn generate_embeddings(
            &self,
            _texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }

        fn model_name(&self) -> &str {
            "slow"
        }
    }

    async fn open_store(dir: &TempDir) -> (EmbeddingStore, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let texts = Arc::new(AtomicUsize::new(0));
        let backend = SqliteBackend::open(&dir.path().join("store.db"))
            .await
            .expect("sqlite backend");
        let embedder = CountingEmbedder {
            inner: HashEmbeddingClient::new(64),
            calls: calls.clone(),
            texts: texts.clone(),
        };
        let store = EmbeddingStore::new(
            Box::new(backend),
            Box::new(embedder),
            64,
            Duration::from_secs(5),
        );
        (store, calls, texts)
    }

    fn batch(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(key, text)| (key.to_string(), text.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn repeated_batch_is_idempotent() {
        let dir = TempDir::new().expect("tempdir");
        let (store, _, texts) = open_store(&dir).await;
        let documents = batch(&[
            ("a.pdf", "The penalty for late delivery is $500."),
            ("b.pdf", "Quarterly revenue grew by ten percent."),
        ]);

        let first = store.upsert_batch(documents.clone()).await.expect("first");
        let count_after_first = store.count().await.expect("count");
        let second = store.upsert_batch(documents).await.expect("second");

        assert_eq!(first, UpsertSummary { inserted: 2, skipped: 0 });
        assert_eq!(second, UpsertSummary { inserted: 0, skipped: 2 });
        assert_eq!(store.count().await.expect("count"), count_after_first);
        assert_eq!(texts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn known_key_keeps_original_text() {
        let dir = TempDir::new().expect("tempdir");
        let (store, _, _) = open_store(&dir).await;

        store
            .upsert_batch(batch(&[("a.txt", "Contract penalty is $500.")]))
            .await
            .expect("insert");
        store
            .upsert_batch(batch(&[("a.txt", "different text")]))
            .await
            .expect("reinsert");

        let stored = store.get("a.txt").await.expect("get").expect("present");
        assert_eq!(stored.text, "Contract penalty is $500.");
        assert_eq!(stored.content_hash, compute_content_hash("Contract penalty is $500."));
    }

    #[tokio::test]
    async fn first_occurrence_wins_within_a_batch() {
        let dir = TempDir::new().expect("tempdir");
        let (store, _, _) = open_store(&dir).await;

        let summary = store
            .upsert_batch(batch(&[("a.txt", "first"), ("a.txt", "second")]))
            .await
            .expect("insert");

        assert_eq!(summary, UpsertSummary { inserted: 1, skipped: 1 });
        let stored = store.get("a.txt").await.expect("get").expect("present");
        assert_eq!(stored.text, "first");
    }

    #[tokio::test]
    async fn empty_batch_never_calls_the_embedder() {
        let dir = TempDir::new().expect("tempdir");
        let (store, calls, _) = open_store(&dir).await;

        let summary = store.upsert_batch(Vec::new()).await.expect("empty");

        assert_eq!(summary, UpsertSummary::default());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn search_on_empty_store_returns_nothing() {
        let dir = TempDir::new().expect("tempdir");
        let (store, _, _) = open_store(&dir).await;

        for k in [1, 5, 50] {
            let hits = store.similarity_search("penalty", k).await.expect("search");
            assert!(hits.is_empty());
        }
    }

    #[tokio::test]
    async fn search_respects_k_and_orders_by_similarity() {
        let dir = TempDir::new().expect("tempdir");
        let (store, _, _) = open_store(&dir).await;
        store
            .upsert_batch(batch(&[
                ("a.pdf", "late delivery penalty clause penalty"),
                ("b.pdf", "weather report for the coastal region"),
                ("c.pdf", "holiday schedule and office hours"),
            ]))
            .await
            .expect("insert");

        let top = store.similarity_search("penalty", 1).await.expect("search");
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].source_key, "a.pdf");

        let all = store.similarity_search("penalty", 10).await.expect("search");
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|pair| pair[0].score >= pair[1].score));
        let unique: HashSet<_> = all.iter().map(|hit| hit.source_key.clone()).collect();
        assert_eq!(unique.len(), all.len());
    }

    #[tokio::test]
    async fn zero_limit_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let (store, _, _) = open_store(&dir).await;
        let error = store.similarity_search("q", 0).await.expect_err("k = 0");
        assert!(matches!(error, StoreError::InvalidLimit));
    }

    #[tokio::test]
    async fn records_survive_reopening_the_store() {
        let dir = TempDir::new().expect("tempdir");
        {
            let (store, _, _) = open_store(&dir).await;
            store
                .upsert_batch(batch(&[("a.txt", "persisted text")]))
                .await
                .expect("insert");
        }

        let (reopened, _, texts) = open_store(&dir).await;
        assert_eq!(reopened.count().await.expect("count"), 1);
        let summary = reopened
            .upsert_batch(batch(&[("a.txt", "persisted text")]))
            .await
            .expect("reinsert");
        assert_eq!(summary.skipped, 1);
        assert_eq!(texts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn slow_embedder_times_out() {
        let dir = TempDir::new().expect("tempdir");
        let backend = SqliteBackend::open(&dir.path().join("store.db"))
            .await
            .expect("backend");
        let store = EmbeddingStore::new(
            Box::new(backend),
            Box::new(SlowEmbedder),
            64,
            Duration::from_millis(50),
        );

        let error = store
            .upsert_batch(batch(&[("a.txt", "text")]))
            .await
            .expect_err("timeout");
        assert!(matches!(error, StoreError::EmbeddingTimeout(_)));
    }

    #[tokio::test]
    async fn wrong_dimension_is_reported() {
        let dir = TempDir::new().expect("tempdir");
        let backend = SqliteBackend::open(&dir.path().join("store.db"))
            .await
            .expect("backend");
        let store = EmbeddingStore::new(
            Box::new(backend),
            Box::new(HashEmbeddingClient::new(8)),
            64,
            Duration::from_secs(5),
        );

        let error = store
            .upsert_batch(batch(&[("a.txt", "text")]))
            .await
            .expect_err("dimension");
        assert!(matches!(
            error,
            StoreError::DimensionMismatch {
                expected: 64,
                actual: 8
            }
        ));
    }
}

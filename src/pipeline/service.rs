//! Pipeline service coordinating upload, extraction, the embedding store, and the engine.

use crate::{
    config::Config,
    embedding::get_embedding_client,
    engine::{Answer, EngineSettings, QueryEngine, ThemeRecord},
    extraction::{ExtractionSettings, extract_all_text},
    llm::get_language_model,
    metrics::{MetricsSnapshot, PipelineMetrics},
    pipeline::types::{DocumentAnswer, HealthSnapshot, IngestOutcome, PipelineError},
    session::{SessionId, SessionRegistry},
    store::{EmbeddingStore, StoreError, UpsertSummary},
    upload::{UploadedFile, save_uploaded_files},
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Coordinates the full document workflow: save, extract, store, answer, and theme.
///
/// The pipeline owns the long-lived store, engine, session registry, and metrics so that the
/// HTTP surface, the MCP tools, and the CLI reuse the same components. Construct it once near
/// process start and share it through an `Arc`.
pub struct DocumentPipeline {
    store: Arc<EmbeddingStore>,
    engine: QueryEngine,
    sessions: SessionRegistry,
    extraction: ExtractionSettings,
    upload_dir: PathBuf,
    metrics: PipelineMetrics,
}

/// Abstraction over the pipeline used by external surfaces (HTTP, MCP, CLI).
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Start a new, empty session.
    async fn create_session(&self) -> SessionId;

    /// Drop every document from a session while keeping its id.
    async fn reset_session(&self, session: &str) -> Result<(), PipelineError>;

    /// Forget a session entirely.
    async fn remove_session(&self, session: &str) -> Result<(), PipelineError>;

    /// Sorted source keys held by a session.
    async fn session_documents(&self, session: &str) -> Result<Vec<String>, PipelineError>;

    /// Embed and store documents given as (source key, text) pairs.
    async fn store_embeddings(
        &self,
        documents: Vec<(String, String)>,
    ) -> Result<UpsertSummary, PipelineError>;

    /// Extract files already on disk, add them to the session, and store them.
    async fn ingest_files(
        &self,
        session: &str,
        paths: Vec<PathBuf>,
    ) -> Result<IngestOutcome, PipelineError>;

    /// Save uploaded files, then ingest them into the session.
    async fn ingest_uploads(
        &self,
        session: &str,
        files: Vec<UploadedFile>,
    ) -> Result<IngestOutcome, PipelineError>;

    /// Answer a question over the whole store with citations.
    async fn answer_query(&self, query: &str) -> Result<Answer, PipelineError>;

    /// Answer a question once per session document.
    async fn answer_per_document(
        &self,
        session: &str,
        query: &str,
    ) -> Result<Vec<DocumentAnswer>, PipelineError>;

    /// Identify themes across the session's documents.
    async fn identify_themes(&self, session: &str) -> Result<Vec<ThemeRecord>, PipelineError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;

    /// Probe the store and report model identifiers.
    async fn health(&self) -> HealthSnapshot;
}

impl DocumentPipeline {
    /// Build the pipeline from configuration, opening the configured store backend.
    pub async fn from_config(config: &Config) -> Result<Self, StoreError> {
        tracing::info!("Initializing embedding client");
        let embedder = get_embedding_client(config);
        let store = Arc::new(EmbeddingStore::from_config(config, embedder).await?);
        let engine = QueryEngine::new(
            store.clone(),
            get_language_model(config),
            EngineSettings::from_config(config),
        );
        Ok(Self::new(
            store,
            engine,
            ExtractionSettings::from_config(config),
            config.upload_dir.clone(),
        )
        .with_sessions(SessionRegistry::with_limits(
            config.max_sessions,
            config.session_idle_timeout(),
        )))
    }

    /// Assemble a pipeline from explicit parts.
    pub fn new(
        store: Arc<EmbeddingStore>,
        engine: QueryEngine,
        extraction: ExtractionSettings,
        upload_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            engine,
            sessions: SessionRegistry::new(),
            extraction,
            upload_dir,
            metrics: PipelineMetrics::new(),
        }
    }

    /// Replace the session registry, e.g. to apply configured limits.
    pub fn with_sessions(mut self, sessions: SessionRegistry) -> Self {
        self.sessions = sessions;
        self
    }

    /// Directory uploads are saved under.
    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    async fn session_snapshot(&self, session: &str) -> Result<Vec<(String, String)>, PipelineError> {
        let snapshot = self
            .sessions
            .get(session)
            .await
            .ok_or_else(|| PipelineError::UnknownSession(session.to_string()))?;
        Ok(snapshot
            .documents()
            .iter()
            .map(|(key, text)| (key.clone(), text.clone()))
            .collect())
    }

    /// Swap each extracted text for the copy the store kept, so a key skipped as known carries
    /// its first stored text into the session.
    async fn stored_texts(
        &self,
        documents: Vec<(String, String)>,
    ) -> Result<Vec<(String, String)>, PipelineError> {
        let mut resolved = Vec::with_capacity(documents.len());
        for (key, text) in documents {
            let text = match self.store.get(&key).await? {
                Some(stored) if stored.text != text => {
                    tracing::debug!(source_key = %key, "Using stored text for known key");
                    stored.text
                }
                _ => text,
            };
            resolved.push((key, text));
        }
        Ok(resolved)
    }

    async fn ensure_session(&self, session: &str) -> Result<(), PipelineError> {
        if self.sessions.get(session).await.is_some() {
            Ok(())
        } else {
            Err(PipelineError::UnknownSession(session.to_string()))
        }
    }
}

#[async_trait]
impl PipelineApi for DocumentPipeline {
    async fn create_session(&self) -> SessionId {
        self.sessions.create().await
    }

    async fn reset_session(&self, session: &str) -> Result<(), PipelineError> {
        if self.sessions.reset(session).await {
            tracing::info!(session_id = session, "Session reset");
            Ok(())
        } else {
            Err(PipelineError::UnknownSession(session.to_string()))
        }
    }

    async fn remove_session(&self, session: &str) -> Result<(), PipelineError> {
        if self.sessions.remove(session).await {
            tracing::info!(session_id = session, "Session removed");
            Ok(())
        } else {
            Err(PipelineError::UnknownSession(session.to_string()))
        }
    }

    async fn session_documents(&self, session: &str) -> Result<Vec<String>, PipelineError> {
        self.sessions
            .get(session)
            .await
            .map(|snapshot| snapshot.document_names())
            .ok_or_else(|| PipelineError::UnknownSession(session.to_string()))
    }

    async fn store_embeddings(
        &self,
        documents: Vec<(String, String)>,
    ) -> Result<UpsertSummary, PipelineError> {
        let summary = self.store.upsert_batch(documents).await?;
        self.metrics
            .record_upsert(summary.inserted as u64, summary.skipped as u64);
        Ok(summary)
    }

    async fn ingest_files(
        &self,
        session: &str,
        paths: Vec<PathBuf>,
    ) -> Result<IngestOutcome, PipelineError> {
        self.ensure_session(session).await?;
        tracing::info!(session_id = session, files = paths.len(), "Ingesting files");

        let extracted = extract_all_text(&paths, &self.extraction).await;
        let (documents, empty): (Vec<_>, Vec<_>) = extracted
            .into_iter()
            .partition(|(_, text)| !text.is_empty());
        let empty: Vec<String> = empty.into_iter().map(|(key, _)| key).collect();
        if !empty.is_empty() {
            self.metrics.record_extraction_failures(empty.len() as u64);
        }

        let processed: Vec<String> = documents.iter().map(|(key, _)| key.clone()).collect();
        let summary = self.store_embeddings(documents.clone()).await?;
        let documents = self.stored_texts(documents).await?;
        let session_documents = self
            .sessions
            .with_session(session, |state| {
                state.add_documents(documents);
                state.documents().len()
            })
            .await
            .ok_or_else(|| PipelineError::UnknownSession(session.to_string()))?;

        tracing::info!(
            session_id = session,
            processed = processed.len(),
            empty = empty.len(),
            inserted = summary.inserted,
            skipped = summary.skipped,
            "Files ingested"
        );

        Ok(IngestOutcome {
            processed,
            empty,
            session_documents,
            ..IngestOutcome::default()
        }
        .with_summary(summary))
    }

    async fn ingest_uploads(
        &self,
        session: &str,
        files: Vec<UploadedFile>,
    ) -> Result<IngestOutcome, PipelineError> {
        self.ensure_session(session).await?;
        let paths = save_uploaded_files(&self.upload_dir, files).await?;
        self.ingest_files(session, paths).await
    }

    async fn answer_query(&self, query: &str) -> Result<Answer, PipelineError> {
        let result = self.engine.answer_query(query).await;
        self.metrics.record_query(result.is_ok());
        match result {
            Ok(answer) => {
                tracing::info!(citations = answer.citations.len(), "Query answered");
                Ok(answer)
            }
            Err(error) => {
                tracing::warn!(error = %error, "Query failed");
                Err(error.into())
            }
        }
    }

    async fn answer_per_document(
        &self,
        session: &str,
        query: &str,
    ) -> Result<Vec<DocumentAnswer>, PipelineError> {
        if query.trim().is_empty() {
            return Err(crate::engine::EngineError::EmptyQuery.into());
        }
        let documents = self.session_snapshot(session).await?;

        let mut answers = Vec::with_capacity(documents.len());
        for (document, text) in documents {
            let entry = match self.engine.answer_query_single_document(query, &text).await {
                Ok(answer) => DocumentAnswer {
                    document,
                    answer,
                    failed: false,
                },
                Err(error) => {
                    tracing::warn!(document = %document, error = %error, "Per-document answer failed");
                    DocumentAnswer {
                        document,
                        answer: format!("Error processing this document: {error}"),
                        failed: true,
                    }
                }
            };
            self.metrics.record_query(!entry.failed);
            answers.push(entry);
        }
        Ok(answers)
    }

    async fn identify_themes(&self, session: &str) -> Result<Vec<ThemeRecord>, PipelineError> {
        let documents = self.session_snapshot(session).await?;
        self.metrics.record_theme_run();
        Ok(self.engine.identify_themes(&documents).await)
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn health(&self) -> HealthSnapshot {
        let (store_reachable, documents, error) = match self.store.count().await {
            Ok(count) => (true, Some(count), None),
            Err(error) => {
                tracing::warn!(error = %error, "Store health probe failed");
                (false, None, Some(error.to_string()))
            }
        };
        HealthSnapshot {
            store: self.store.describe(),
            store_reachable,
            documents,
            error,
            embedding_model: self.store.embedding_model().to_string(),
            language_model: self.engine.model_name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::ScriptedModel;
    use crate::embedding::HashEmbeddingClient;
    use crate::llm::LanguageModelError;
    use crate::store::SqliteBackend;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn pipeline(dir: &TempDir, model: ScriptedModel) -> DocumentPipeline {
        let backend = SqliteBackend::open(&dir.path().join("store.db"))
            .await
            .expect("backend");
        let store = Arc::new(EmbeddingStore::new(
            Box::new(backend),
            Box::new(HashEmbeddingClient::new(64)),
            64,
            Duration::from_secs(5),
        ));
        let engine = QueryEngine::new(store.clone(), Box::new(model), EngineSettings::default());
        DocumentPipeline::new(
            store,
            engine,
            ExtractionSettings::default(),
            dir.path().join("uploads"),
        )
    }

    #[tokio::test]
    async fn uploads_are_saved_extracted_and_stored_once() {
        let dir = TempDir::new().expect("tempdir");
        let pipeline = pipeline(&dir, ScriptedModel::new(false)).await;
        let session = pipeline.create_session().await;
        let files = vec![
            UploadedFile::new("a.txt", "Contract penalty is $500."),
            UploadedFile::new("broken.pdf", "not really a pdf"),
            UploadedFile::new("sheet.xlsx", "ignored"),
        ];

        let first = pipeline
            .ingest_uploads(&session, files.clone())
            .await
            .expect("ingest");
        let second = pipeline.ingest_uploads(&session, files).await.expect("again");

        assert_eq!(first.processed, vec!["a.txt"]);
        assert_eq!(first.empty, vec!["broken.pdf"]);
        assert_eq!((first.inserted, first.skipped), (1, 0));
        assert_eq!((second.inserted, second.skipped), (0, 1));
        assert_eq!(
            pipeline.session_documents(&session).await.expect("docs"),
            vec!["a.txt"]
        );
        assert!(dir.path().join("uploads/a.txt").exists());

        let metrics = pipeline.metrics_snapshot();
        assert_eq!(metrics.documents_ingested, 1);
        assert_eq!(metrics.duplicates_skipped, 1);
        assert_eq!(metrics.extraction_failures, 2);
    }

    #[tokio::test]
    async fn known_key_gives_every_session_the_stored_text() {
        let dir = TempDir::new().expect("tempdir");
        let pipeline = pipeline(&dir, ScriptedModel::new(false)).await;
        let first = pipeline.create_session().await;
        let second = pipeline.create_session().await;

        pipeline
            .ingest_uploads(&first, vec![UploadedFile::new("a.txt", "Contract penalty is $500.")])
            .await
            .expect("first ingest");
        let outcome = pipeline
            .ingest_uploads(&second, vec![UploadedFile::new("a.txt", "different text")])
            .await
            .expect("second ingest");

        assert_eq!((outcome.inserted, outcome.skipped), (0, 1));
        let stored = pipeline
            .store
            .get("a.txt")
            .await
            .expect("get")
            .expect("stored");
        assert_eq!(stored.text, "Contract penalty is $500.");
        let documents = pipeline.session_snapshot(&second).await.expect("snapshot");
        assert_eq!(
            documents,
            vec![("a.txt".to_string(), "Contract penalty is $500.".to_string())]
        );
    }

    #[tokio::test]
    async fn failed_store_write_leaves_session_untouched() {
        let dir = TempDir::new().expect("tempdir");
        let backend = SqliteBackend::open(&dir.path().join("store.db"))
            .await
            .expect("backend");
        let store = Arc::new(EmbeddingStore::new(
            Box::new(backend),
            Box::new(HashEmbeddingClient::new(32)),
            64,
            Duration::from_secs(5),
        ));
        let engine = QueryEngine::new(
            store.clone(),
            Box::new(ScriptedModel::new(false)),
            EngineSettings::default(),
        );
        let pipeline = DocumentPipeline::new(
            store,
            engine,
            ExtractionSettings::default(),
            dir.path().join("uploads"),
        );
        let session = pipeline.create_session().await;

        let error = pipeline
            .ingest_uploads(&session, vec![UploadedFile::new("a.txt", "alpha")])
            .await
            .expect_err("dimension mismatch");

        assert!(matches!(error, PipelineError::Store(_)));
        assert!(pipeline.session_documents(&session).await.expect("docs").is_empty());
    }

    #[tokio::test]
    async fn unknown_session_is_reported() {
        let dir = TempDir::new().expect("tempdir");
        let pipeline = pipeline(&dir, ScriptedModel::new(false)).await;

        let error = pipeline
            .identify_themes("missing")
            .await
            .expect_err("unknown");
        assert!(matches!(error, PipelineError::UnknownSession(id) if id == "missing"));
        assert!(pipeline.reset_session("missing").await.is_err());
    }

    #[tokio::test]
    async fn per_document_failures_are_captured_per_entry() {
        let dir = TempDir::new().expect("tempdir");
        let model = ScriptedModel::new(false)
            .reply("Penalty is $500.")
            .fail(LanguageModelError::GenerationFailed("boom".into()));
        let pipeline = pipeline(&dir, model).await;
        let session = pipeline.create_session().await;
        pipeline
            .ingest_uploads(
                &session,
                vec![
                    UploadedFile::new("a.txt", "Contract penalty is $500."),
                    UploadedFile::new("b.txt", "Quarterly revenue grew."),
                ],
            )
            .await
            .expect("ingest");

        let answers = pipeline
            .answer_per_document(&session, "What is the penalty?")
            .await
            .expect("answers");

        assert_eq!(answers.len(), 2);
        assert_eq!(answers[0].document, "a.txt");
        assert!(!answers[0].failed);
        assert!(answers[1].failed);
        assert!(answers[1].answer.starts_with("Error processing this document"));
    }

    #[tokio::test]
    async fn reset_session_empties_documents_but_keeps_store() {
        let dir = TempDir::new().expect("tempdir");
        let pipeline = pipeline(&dir, ScriptedModel::new(false)).await;
        let session = pipeline.create_session().await;
        pipeline
            .ingest_uploads(&session, vec![UploadedFile::new("a.txt", "alpha")])
            .await
            .expect("ingest");

        pipeline.reset_session(&session).await.expect("reset");

        assert!(pipeline.session_documents(&session).await.expect("docs").is_empty());
        let health = pipeline.health().await;
        assert!(health.store_reachable);
        assert_eq!(health.documents, Some(1));
        assert_eq!(health.language_model, "scripted");
    }
}

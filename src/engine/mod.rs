//! Retrieval-augmented answering and cross-document theme extraction.
//!
//! The engine only reads from the embedding store. Answers are synthesized from the top-K
//! retrieved documents and always carry one citation per retrieved record. Theme extraction
//! degrades to an empty list whenever the model fails or replies with something unparseable.

pub mod prompts;
mod themes;

pub use themes::{ThemeParseError, ThemeRecord};

use crate::config::Config;
use crate::llm::{CompletionRequest, LanguageModelClient, LanguageModelError, ResponseSchema};
use crate::store::{EmbeddingStore, ScoredRecord, StoreError};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by [`QueryEngine`] operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Query was empty or whitespace.
    #[error("query must not be empty")]
    EmptyQuery,
    /// Retrieval failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The language model failed or timed out.
    #[error("Answer synthesis failed: {0}")]
    SynthesisFailed(#[from] LanguageModelError),
}

/// Source reference attached to an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    /// Source key of the retrieved document.
    pub source_key: String,
    /// Leading excerpt of the document text.
    pub snippet: String,
}

/// Synthesized answer plus the records it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// Model output, trimmed.
    pub answer: String,
    /// One citation per retrieved record, in retrieval order.
    pub citations: Vec<Citation>,
}

/// Tunables controlling retrieval and prompt sizes.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Number of documents retrieved per question.
    pub top_k: usize,
    /// Characters kept in each citation snippet.
    pub snippet_chars: usize,
    /// Sampling temperature for every completion.
    pub temperature: f32,
    /// Characters of each document included in the theme prompt.
    pub theme_excerpt_chars: usize,
    /// Maximum documents included in the theme prompt.
    pub theme_max_documents: usize,
    /// Deadline for each model call.
    pub timeout: Duration,
}

impl EngineSettings {
    /// Derive settings from the application configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.retrieval_top_k,
            snippet_chars: config.snippet_chars,
            temperature: config.llm_temperature,
            theme_excerpt_chars: config.theme_excerpt_chars,
            theme_max_documents: config.theme_max_documents,
            timeout: config.request_timeout(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            snippet_chars: 300,
            temperature: 0.3,
            theme_excerpt_chars: 1000,
            theme_max_documents: 10,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Answers questions and extracts themes over the embedding store.
pub struct QueryEngine {
    store: Arc<EmbeddingStore>,
    llm: Box<dyn LanguageModelClient>,
    settings: EngineSettings,
}

impl QueryEngine {
    /// Build an engine over `store` using `llm` for synthesis.
    pub fn new(
        store: Arc<EmbeddingStore>,
        llm: Box<dyn LanguageModelClient>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            llm,
            settings,
        }
    }

    /// Model identifier used for synthesis.
    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Answer `query` from the top-K most similar stored documents.
    pub async fn answer_query(&self, query: &str) -> Result<Answer, EngineError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(EngineError::EmptyQuery);
        }

        let records = self
            .store
            .similarity_search(query, self.settings.top_k)
            .await?;
        let context = prompts::labelled_context(
            records
                .iter()
                .map(|record| (record.source_key.as_str(), record.text.as_str())),
        );
        tracing::debug!(retrieved = records.len(), "Synthesizing answer");

        let answer = self
            .complete(CompletionRequest::text(
                prompts::answer_prompt(query, &context),
                self.settings.temperature,
            ))
            .await?;

        Ok(Answer {
            answer,
            citations: self.citations(&records),
        })
    }

    /// Answer `query` using only the full text of one document.
    pub async fn answer_query_single_document(
        &self,
        query: &str,
        document_text: &str,
    ) -> Result<String, EngineError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(EngineError::EmptyQuery);
        }

        Ok(self
            .complete(CompletionRequest::text(
                prompts::single_document_prompt(query, document_text),
                self.settings.temperature,
            ))
            .await?)
    }

    /// Identify recurring themes across `documents` (source key, text).
    ///
    /// Returns an empty list without calling the model when there is nothing to analyse, and
    /// also when the model fails or its output cannot be parsed.
    pub async fn identify_themes(&self, documents: &[(String, String)]) -> Vec<ThemeRecord> {
        let mut seen = HashSet::new();
        let mut selected: Vec<(&str, String)> = Vec::new();
        for (key, text) in documents {
            if selected.len() >= self.settings.theme_max_documents {
                break;
            }
            if seen.insert(key.as_str()) {
                selected.push((
                    key.as_str(),
                    truncate_chars(text, self.settings.theme_excerpt_chars),
                ));
            }
        }

        if selected.is_empty() {
            return Vec::new();
        }

        let known_keys: HashSet<&str> = selected.iter().map(|(key, _)| *key).collect();
        let excerpts = prompts::labelled_context(
            selected
                .iter()
                .map(|(key, excerpt)| (*key, excerpt.as_str())),
        );

        let structured = self.llm.supports_structured_output();
        let mut request =
            CompletionRequest::text(prompts::theme_prompt(&excerpts), self.settings.temperature);
        if structured {
            request = request.with_schema(ResponseSchema {
                name: "themes".into(),
                schema: prompts::theme_schema(),
            });
        }

        let output = match self.complete(request).await {
            Ok(output) => output,
            Err(error) => {
                tracing::warn!(error = %error, "Theme synthesis failed");
                return Vec::new();
            }
        };

        let parsed = if structured {
            themes::parse_structured(&output, &known_keys)
                .or_else(|_| themes::parse_free_form(&output, &known_keys))
        } else {
            themes::parse_free_form(&output, &known_keys)
        };

        match parsed {
            Ok(themes) => {
                tracing::info!(
                    documents = selected.len(),
                    themes = themes.len(),
                    "Themes identified"
                );
                themes
            }
            Err(error) => {
                tracing::warn!(error = %error, "Discarding unparseable theme output");
                Vec::new()
            }
        }
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, LanguageModelError> {
        let timeout = self.settings.timeout;
        let output = tokio::time::timeout(timeout, self.llm.complete(request))
            .await
            .map_err(|_| LanguageModelError::Timeout(timeout.as_secs()))??;
        Ok(output.trim().to_string())
    }

    fn citations(&self, records: &[ScoredRecord]) -> Vec<Citation> {
        records
            .iter()
            .map(|record| Citation {
                source_key: record.source_key.clone(),
                snippet: truncate_chars(&record.text, self.settings.snippet_chars),
            })
            .collect()
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Language model that replays scripted replies and records prompts.
    pub(crate) struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String, LanguageModelError>>>,
        prompts: Arc<Mutex<Vec<CompletionRequest>>>,
        calls: Arc<AtomicUsize>,
        structured: bool,
    }

    impl ScriptedModel {
        pub(crate) fn new(structured: bool) -> Self {
            Self {
                replies: Mutex::new(VecDeque::new()),
                prompts: Arc::new(Mutex::new(Vec::new())),
                calls: Arc::new(AtomicUsize::new(0)),
                structured,
            }
        }

        pub(crate) fn reply(self, reply: &str) -> Self {
            self.push(Ok(reply.to_string()))
        }

        pub(crate) fn fail(self, error: LanguageModelError) -> Self {
            self.push(Err(error))
        }

        fn push(self, reply: Result<String, LanguageModelError>) -> Self {
            self.replies.lock().expect("replies").push_back(reply);
            self
        }

        pub(crate) fn calls(&self) -> Arc<AtomicUsize> {
            self.calls.clone()
        }

        pub(crate) fn prompts(&self) -> Arc<Mutex<Vec<CompletionRequest>>> {
            self.prompts.clone()
        }
    }

    #[async_trait]
    impl LanguageModelClient for ScriptedModel {
        async fn complete(&self, request: CompletionRequest) -> Result<String, LanguageModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().expect("prompts").push(request);
            self.replies
                .lock()
                .expect("replies")
                .pop_front()
                .unwrap_or_else(|| Ok("no scripted reply".into()))
        }

        fn supports_structured_output(&self) -> bool {
            self.structured
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedModel;
    use super::*;
    use crate::embedding::HashEmbeddingClient;
    use crate::store::SqliteBackend;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    async fn store_with(dir: &TempDir, documents: &[(&str, &str)]) -> Arc<EmbeddingStore> {
        let backend = SqliteBackend::open(&dir.path().join("store.db"))
            .await
            .expect("backend");
        let store = EmbeddingStore::new(
            Box::new(backend),
            Box::new(HashEmbeddingClient::new(64)),
            64,
            Duration::from_secs(5),
        );
        store
            .upsert_batch(
                documents
                    .iter()
                    .map(|(key, text)| (key.to_string(), text.to_string())),
            )
            .await
            .expect("seed");
        Arc::new(store)
    }

    fn pairs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(key, text)| (key.to_string(), text.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn answer_cites_single_matching_document() {
        let dir = TempDir::new().expect("tempdir");
        let store = store_with(&dir, &[("a.txt", "Contract penalty is $500.")]).await;
        let model = ScriptedModel::new(false).reply("The penalty is $500 (source: a.txt)");
        let prompts = model.prompts();
        let engine = QueryEngine::new(store, Box::new(model), EngineSettings::default());

        let answer = engine
            .answer_query("What is the penalty?")
            .await
            .expect("answer");

        assert_eq!(answer.answer, "The penalty is $500 (source: a.txt)");
        assert_eq!(
            answer.citations,
            vec![Citation {
                source_key: "a.txt".into(),
                snippet: "Contract penalty is $500.".into(),
            }]
        );
        let recorded = prompts.lock().expect("prompts");
        assert!(recorded[0].prompt.contains("a.txt:\nContract penalty is $500."));
        assert!((recorded[0].temperature - 0.3).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn citation_count_matches_retrieved_records() {
        let dir = TempDir::new().expect("tempdir");
        let long_text = "x".repeat(500);
        let store = store_with(
            &dir,
            &[("a.txt", long_text.as_str()), ("b.txt", "beta"), ("c.txt", "gamma")],
        )
        .await;
        let settings = EngineSettings {
            top_k: 2,
            ..EngineSettings::default()
        };
        let engine = QueryEngine::new(
            store,
            Box::new(ScriptedModel::new(false).reply("answer")),
            settings,
        );

        let answer = engine.answer_query("anything").await.expect("answer");
        assert_eq!(answer.citations.len(), 2);
        assert!(answer.citations.iter().all(|c| c.snippet.chars().count() <= 300));
    }

    #[tokio::test]
    async fn blank_query_is_rejected_without_model_call() {
        let dir = TempDir::new().expect("tempdir");
        let store = store_with(&dir, &[]).await;
        let model = ScriptedModel::new(false);
        let calls = model.calls();
        let engine = QueryEngine::new(store, Box::new(model), EngineSettings::default());

        let error = engine.answer_query("   ").await.expect_err("empty");
        assert!(matches!(error, EngineError::EmptyQuery));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn model_failure_surfaces_as_synthesis_failed() {
        let dir = TempDir::new().expect("tempdir");
        let store = store_with(&dir, &[("a.txt", "text")]).await;
        let model = ScriptedModel::new(false)
            .fail(LanguageModelError::ProviderUnavailable("down".into()));
        let calls = model.calls();
        let engine = QueryEngine::new(store, Box::new(model), EngineSettings::default());

        let error = engine.answer_query("question").await.expect_err("failure");
        assert!(matches!(error, EngineError::SynthesisFailed(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn single_document_answer_uses_full_text() {
        let dir = TempDir::new().expect("tempdir");
        let store = store_with(&dir, &[]).await;
        let model = ScriptedModel::new(false).reply("  Penalty is $500.  ");
        let prompts = model.prompts();
        let engine = QueryEngine::new(store, Box::new(model), EngineSettings::default());

        let answer = engine
            .answer_query_single_document("What is the penalty?", "Contract penalty is $500.")
            .await
            .expect("answer");

        assert_eq!(answer, "Penalty is $500.");
        assert!(prompts.lock().expect("prompts")[0]
            .prompt
            .contains("Document text:\nContract penalty is $500."));
    }

    #[tokio::test]
    async fn no_documents_means_no_themes_and_no_model_call() {
        let dir = TempDir::new().expect("tempdir");
        let store = store_with(&dir, &[]).await;
        let model = ScriptedModel::new(true);
        let calls = model.calls();
        let engine = QueryEngine::new(store, Box::new(model), EngineSettings::default());

        assert!(engine.identify_themes(&[]).await.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn structured_themes_span_both_documents() {
        let dir = TempDir::new().expect("tempdir");
        let store = store_with(&dir, &[]).await;
        let model = ScriptedModel::new(true).reply(
            r#"{"themes": [{"theme": "Penalties", "summary": "Both mention late fees.", "supporting_docs": ["x.pdf", "y.pdf"]}]}"#,
        );
        let prompts = model.prompts();
        let engine = QueryEngine::new(store, Box::new(model), EngineSettings::default());

        let themes = engine
            .identify_themes(&pairs(&[
                ("x.pdf", "Late delivery incurs a penalty."),
                ("y.pdf", "Penalties apply to late payments."),
            ]))
            .await;

        assert_eq!(themes.len(), 1);
        assert_eq!(themes[0].supporting_docs, vec!["x.pdf", "y.pdf"]);
        let recorded = prompts.lock().expect("prompts");
        assert!(recorded[0].response_schema.is_some());
    }

    #[tokio::test]
    async fn theme_prompt_is_bounded() {
        let dir = TempDir::new().expect("tempdir");
        let store = store_with(&dir, &[]).await;
        let model = ScriptedModel::new(false).reply("[]");
        let prompts = model.prompts();
        let settings = EngineSettings {
            theme_max_documents: 2,
            theme_excerpt_chars: 5,
            ..EngineSettings::default()
        };
        let engine = QueryEngine::new(store, Box::new(model), settings);

        engine
            .identify_themes(&pairs(&[
                ("a.txt", "alpha-long-text"),
                ("a.txt", "duplicate"),
                ("b.txt", "bravo-long-text"),
                ("c.txt", "charlie"),
            ]))
            .await;

        let recorded = prompts.lock().expect("prompts");
        let prompt = &recorded[0].prompt;
        assert!(recorded[0].response_schema.is_none());
        assert!(prompt.contains("a.txt:\nalpha\n\nb.txt:\nbravo"));
        assert!(!prompt.contains("duplicate"));
        assert!(!prompt.contains("c.txt"));
    }

    #[tokio::test]
    async fn unparseable_or_failed_theme_output_degrades_to_empty() {
        let dir = TempDir::new().expect("tempdir");
        let store = store_with(&dir, &[]).await;
        let documents = pairs(&[("a.txt", "alpha")]);

        let prose = QueryEngine::new(
            store.clone(),
            Box::new(ScriptedModel::new(false).reply("Themes: none really.")),
            EngineSettings::default(),
        );
        assert!(prose.identify_themes(&documents).await.is_empty());

        let failing = QueryEngine::new(
            store,
            Box::new(
                ScriptedModel::new(true).fail(LanguageModelError::GenerationFailed("500".into())),
            ),
            EngineSettings::default(),
        );
        assert!(failing.identify_themes(&documents).await.is_empty());
    }
}

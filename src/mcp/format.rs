//! Formatting helpers shared across MCP handlers and resources.

use crate::{
    config::{Config, EmbeddingProvider, LlmProvider, StoreBackend},
    engine::Answer,
    pipeline::{DocumentAnswer, HealthSnapshot},
};
use rmcp::model::ResourceContents;
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::{Map, Value, json};

pub(crate) const APPLICATION_JSON: &str = "application/json";

/// Build the health payload summarizing store reachability and configured models.
pub(crate) fn health_payload(snapshot: &HealthSnapshot) -> String {
    let mut store = Map::new();
    store.insert("location".into(), Value::String(snapshot.store.clone()));
    store.insert("reachable".into(), Value::Bool(snapshot.store_reachable));
    if let Some(documents) = snapshot.documents {
        store.insert("documents".into(), Value::from(documents as u64));
    }
    if let Some(error) = snapshot.error.as_ref() {
        store.insert("error".into(), Value::String(error.clone()));
    }

    let payload = json!({
        "store": Value::Object(store),
        "embeddingModel": snapshot.embedding_model,
        "languageModel": snapshot.language_model,
    });

    serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
}

/// Serialize a value to JSON, falling back to compact formatting on error.
pub(crate) fn serialize_json<T: Serialize>(value: &T, context_uri: &str) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|error| {
        tracing::warn!(uri = context_uri, %error, "Failed to serialize JSON prettily");
        serde_json::to_string(value).unwrap_or_else(|_| "{}".into())
    })
}

/// Build JSON resource contents for MCP resource responses.
pub(crate) fn json_resource_contents(uri: &str, text: String) -> ResourceContents {
    ResourceContents::TextResourceContents {
        uri: uri.to_string(),
        mime_type: Some(APPLICATION_JSON.into()),
        text,
        meta: None,
    }
}

/// Effective retrieval and provider settings reported by the `settings` resource.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSnapshot {
    /// Store backend label (`sqlite` or `qdrant`).
    pub store_backend: String,
    /// Embedding provider label.
    pub embedding_provider: String,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Vector dimension.
    pub embedding_dimension: usize,
    /// Language model provider label.
    pub llm_provider: String,
    /// Language model identifier.
    pub llm_model: String,
    /// Number of documents retrieved per question.
    pub top_k: usize,
    /// Characters kept per citation snippet.
    pub snippet_chars: usize,
    /// Characters of each document included in the theme prompt.
    pub theme_excerpt_chars: usize,
    /// Maximum documents included in the theme prompt.
    pub theme_max_documents: usize,
}

impl SettingsSnapshot {
    /// Capture the settings from a loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            store_backend: match config.store_backend {
                StoreBackend::Sqlite => "sqlite",
                StoreBackend::Qdrant => "qdrant",
            }
            .into(),
            embedding_provider: embedding_provider_label(config.embedding_provider).into(),
            embedding_model: config.embedding_model.clone(),
            embedding_dimension: config.embedding_dimension,
            llm_provider: match config.llm_provider {
                LlmProvider::OpenAI => "openai",
                LlmProvider::Ollama => "ollama",
            }
            .into(),
            llm_model: config.llm_model.clone(),
            top_k: config.retrieval_top_k,
            snippet_chars: config.snippet_chars,
            theme_excerpt_chars: config.theme_excerpt_chars,
            theme_max_documents: config.theme_max_documents,
        }
    }
}

fn embedding_provider_label(provider: EmbeddingProvider) -> &'static str {
    match provider {
        EmbeddingProvider::Ollama => "ollama",
        EmbeddingProvider::OpenAI => "openai",
        EmbeddingProvider::Hash => "hash",
    }
}

/// Format a cited answer into an MCP payload with a prompt-ready context string.
pub(crate) fn format_answer(answer: Answer) -> Value {
    let context = answer
        .citations
        .iter()
        .map(|citation| format!("{} [{}]", citation.snippet.trim(), citation.source_key))
        .collect::<Vec<_>>()
        .join("\n");

    let mut payload = Map::new();
    payload.insert("answer".into(), Value::String(answer.answer));
    payload.insert("citations".into(), json!(answer.citations));
    if !context.is_empty() {
        payload.insert("context".into(), Value::String(context));
    }
    Value::Object(payload)
}

/// Format per-document answers as `[{document, answer, failed}]`.
pub(crate) fn format_document_answers(answers: Vec<DocumentAnswer>) -> Value {
    json!({ "answers": answers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::engine::Citation;
    use serde_json::Value;

    #[test]
    fn health_payload_captures_store_status() {
        let snapshot = HealthSnapshot {
            store: "sqlite:data/docsift.db".into(),
            store_reachable: false,
            documents: None,
            error: Some("database is locked".into()),
            embedding_model: "nomic-embed-text".into(),
            language_model: "mistral".into(),
        };

        let body = health_payload(&snapshot);

        let value: Value = serde_json::from_str(&body).expect("health payload must be valid JSON");
        assert_eq!(value["store"]["reachable"], false);
        assert_eq!(value["store"]["error"], "database is locked");
        assert!(value["store"].get("documents").is_none());
        assert_eq!(value["embeddingModel"], "nomic-embed-text");
    }

    #[test]
    fn answer_payload_lists_citations_and_context() {
        let payload = format_answer(Answer {
            answer: "Penalty is $500 (source: a.txt)".into(),
            citations: vec![Citation {
                source_key: "a.txt".into(),
                snippet: "Contract penalty is $500. ".into(),
            }],
        });

        assert_eq!(payload["citations"][0]["source_key"], "a.txt");
        assert_eq!(payload["context"], "Contract penalty is $500. [a.txt]");
    }

    #[test]
    fn settings_snapshot_uses_camel_case_labels() {
        let config = test_config("store.db".into(), "uploads".into());
        let value = serde_json::to_value(SettingsSnapshot::from_config(&config)).expect("json");

        assert_eq!(value["storeBackend"], "sqlite");
        assert_eq!(value["embeddingProvider"], "hash");
        assert_eq!(value["topK"], 5);
    }
}

//! Language model clients used for answer and theme synthesis.
//!
//! Both adapters issue HTTP requests directly to the provider, mirroring the embedding
//! adapters. Structured output is requested by attaching a JSON schema to the completion; a
//! provider that cannot honour it reports `supports_structured_output() == false` and callers
//! fall back to free-form parsing.

mod ollama;
mod openai;

pub use ollama::OllamaLanguageModel;
pub use openai::OpenAiLanguageModel;

use crate::config::{Config, LlmProvider};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Default Ollama endpoint shared by the embedding and completion adapters.
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Errors surfaced while requesting a completion.
#[derive(Debug, Error)]
pub enum LanguageModelError {
    /// Provider was unreachable or explicitly missing.
    #[error("Language model provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// Provider did not answer within the configured timeout.
    #[error("Language model request timed out after {0} seconds")]
    Timeout(u64),
}

/// JSON schema attached to a completion request to constrain the output.
#[derive(Debug, Clone)]
pub struct ResponseSchema {
    /// Short identifier some providers require alongside the schema.
    pub name: String,
    /// JSON schema document.
    pub schema: Value,
}

/// Request payload passed to a language model provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Fully rendered prompt.
    pub prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Optional schema for structured output.
    pub response_schema: Option<ResponseSchema>,
}

impl CompletionRequest {
    /// Build a free-form completion request.
    pub fn text(prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            prompt: prompt.into(),
            temperature,
            response_schema: None,
        }
    }

    /// Attach a response schema to the request.
    pub fn with_schema(mut self, schema: ResponseSchema) -> Self {
        self.response_schema = Some(schema);
        self
    }
}

/// Interface implemented by language model providers.
#[async_trait]
pub trait LanguageModelClient: Send + Sync {
    /// Generate a completion for the request, returning the raw text output.
    async fn complete(&self, request: CompletionRequest) -> Result<String, LanguageModelError>;

    /// Whether the provider honours [`CompletionRequest::response_schema`].
    fn supports_structured_output(&self) -> bool;

    /// Model identifier reported in logs and health output.
    fn model_name(&self) -> &str;
}

/// Build a language model client based on configuration.
pub fn get_language_model(config: &Config) -> Box<dyn LanguageModelClient> {
    tracing::debug!(
        provider = ?config.llm_provider,
        model = %config.llm_model,
        structured_output = config.llm_structured_output,
        "Selecting language model client"
    );
    match config.llm_provider {
        LlmProvider::OpenAI => Box::new(OpenAiLanguageModel::new(
            config.llm_url.clone(),
            config.llm_model.clone(),
            config.llm_api_key.clone(),
            config.llm_structured_output,
        )),
        LlmProvider::Ollama => Box::new(OllamaLanguageModel::new(
            config.llm_url.clone(),
            config.llm_model.clone(),
            config.llm_structured_output,
        )),
    }
}

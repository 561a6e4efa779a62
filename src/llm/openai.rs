use super::{CompletionRequest, LanguageModelClient, LanguageModelError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

/// Completion client for OpenAI-compatible chat APIs (OpenAI, OpenRouter, vLLM).
pub struct OpenAiLanguageModel {
    http: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    structured_output: bool,
}

impl OpenAiLanguageModel {
    /// Create a client for `base_url` (including the `/v1` prefix).
    pub fn new(
        base_url: String,
        model: String,
        api_key: Option<String>,
        structured_output: bool,
    ) -> Self {
        let http = Client::builder()
            .user_agent("docsift/llm")
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base_url,
            model,
            api_key,
            structured_output,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LanguageModelClient for OpenAiLanguageModel {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LanguageModelError> {
        let mut payload = json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": request.prompt }
            ],
            "temperature": request.temperature,
        });
        if self.structured_output
            && let Some(schema) = request.response_schema
        {
            payload["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "strict": true,
                    "schema": schema.schema,
                }
            });
        }

        let mut builder = self.http.post(self.endpoint()).json(&payload);
        if let Some(key) = self.api_key.as_deref()
            && !key.is_empty()
        {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|error| {
            LanguageModelError::ProviderUnavailable(format!(
                "failed to reach {}: {error}",
                self.base_url
            ))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LanguageModelError::GenerationFailed(format!(
                "chat completion returned {status}: {body}"
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|error| {
            LanguageModelError::InvalidResponse(format!(
                "failed to decode chat completion: {error}"
            ))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| LanguageModelError::InvalidResponse("completion had no content".into()))
    }

    fn supports_structured_output(&self) -> bool {
        self.structured_output
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

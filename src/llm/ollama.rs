use super::{CompletionRequest, LanguageModelClient, LanguageModelError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

/// Completion client backed by Ollama's `/api/generate` endpoint.
pub struct OllamaLanguageModel {
    http: Client,
    base_url: String,
    model: String,
    structured_output: bool,
}

impl OllamaLanguageModel {
    /// Create a client for the runtime at `base_url`.
    pub fn new(base_url: String, model: String, structured_output: bool) -> Self {
        let http = Client::builder()
            .user_agent("docsift/llm")
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base_url,
            model,
            structured_output,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl LanguageModelClient for OllamaLanguageModel {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LanguageModelError> {
        let mut payload = json!({
            "model": self.model,
            "prompt": request.prompt,
            "stream": false,
            "options": {
                "temperature": request.temperature,
            }
        });
        if self.structured_output
            && let Some(schema) = request.response_schema
        {
            payload["format"] = schema.schema;
        }

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                LanguageModelError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(LanguageModelError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LanguageModelError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            LanguageModelError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        if !body.done {
            return Err(LanguageModelError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }

    fn supports_structured_output(&self) -> bool {
        self.structured_output
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ResponseSchema;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn ollama_client_handles_successful_response() {
        let server = MockServer::start_async().await;
        let client = OllamaLanguageModel::new(server.base_url(), "llama".into(), false);

        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).json_body(json!({
                    "response": " Penalty is $500 (source: a.txt) ",
                    "done": true
                }));
            })
            .await;

        let answer = client
            .complete(CompletionRequest::text("What is the penalty?", 0.3))
            .await
            .expect("completion");

        mock.assert();
        assert_eq!(answer, "Penalty is $500 (source: a.txt)");
    }

    #[tokio::test]
    async fn ollama_client_forwards_schema_as_format() {
        let server = MockServer::start_async().await;
        let client = OllamaLanguageModel::new(server.base_url(), "llama".into(), true);

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .json_body_partial(r#"{"format": {"type": "object"}}"#);
                then.status(200)
                    .json_body(json!({"response": "{\"themes\": []}", "done": true}));
            })
            .await;

        let request = CompletionRequest::text("themes", 0.3).with_schema(ResponseSchema {
            name: "themes".into(),
            schema: json!({"type": "object"}),
        });
        let output = client.complete(request).await.expect("completion");

        mock.assert();
        assert_eq!(output, "{\"themes\": []}");
    }

    #[tokio::test]
    async fn ollama_client_handles_error_status() {
        let server = MockServer::start_async().await;
        let client = OllamaLanguageModel::new(server.base_url(), "llama".into(), false);

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500).body("boom");
            })
            .await;

        let error = client
            .complete(CompletionRequest::text("prompt", 0.3))
            .await
            .expect_err("error response");

        assert!(
            matches!(error, LanguageModelError::GenerationFailed(message) if message.contains("500"))
        );
    }
}

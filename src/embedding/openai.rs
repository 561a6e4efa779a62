use super::{EmbeddingClient, EmbeddingClientError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub(crate) const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Embedding client for OpenAI-compatible `/embeddings` endpoints.
pub struct OpenAiEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiEmbeddingClient {
    /// Create a client for `base_url` (including the `/v1` prefix).
    pub fn new(base_url: String, model: String, api_key: Option<String>) -> Self {
        let http = Client::builder()
            .user_agent("docsift/embed")
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base_url,
            model,
            api_key,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: &texts,
        };

        let mut builder = self
            .http
            .post(format!("{}/embeddings", self.base_url.trim_end_matches('/')))
            .json(&request);
        if let Some(key) = self.api_key.as_deref()
            && !key.is_empty()
        {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|error| {
            EmbeddingClientError::ProviderUnavailable(format!(
                "failed to reach {}: {error}",
                self.base_url
            ))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "embedding API returned {status}: {body}"
            )));
        }

        let mut body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingClientError::InvalidResponse(error.to_string()))?;

        if body.data.len() != texts.len() {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected {} embeddings, received {}",
                texts.len(),
                body.data.len()
            )));
        }

        // Responses may arrive out of order; `index` is authoritative when present.
        body.data.sort_by_key(|item| item.index.unwrap_or(usize::MAX));
        Ok(body.data.into_iter().map(|item| item.embedding).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    #[tokio::test]
    async fn openai_embeddings_are_reordered_by_index() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/embeddings")
                    .header("authorization", "Bearer secret");
                then.status(200).json_body(json!({
                    "data": [
                        {"index": 1, "embedding": [0.0, 1.0]},
                        {"index": 0, "embedding": [1.0, 0.0]}
                    ]
                }));
            })
            .await;

        let client = OpenAiEmbeddingClient::new(
            format!("{}/v1", server.base_url()),
            "text-embedding-3-small".into(),
            Some("secret".into()),
        );
        let vectors = client
            .generate_embeddings(vec!["first".into(), "second".into()])
            .await
            .expect("embeddings");

        mock.assert();
        assert_eq!(vectors[0], vec![1.0, 0.0]);
        assert_eq!(vectors[1], vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn openai_error_status_is_generation_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(401).body("unauthorized");
            })
            .await;

        let client = OpenAiEmbeddingClient::new(
            format!("{}/v1", server.base_url()),
            "model".into(),
            None,
        );
        let error = client
            .generate_embeddings(vec!["text".into()])
            .await
            .expect_err("401");
        assert!(
            matches!(error, EmbeddingClientError::GenerationFailed(message) if message.contains("401"))
        );
    }
}

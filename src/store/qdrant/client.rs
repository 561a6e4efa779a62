//! HTTP client wrapper for interacting with Qdrant.

use super::payload::{build_payload, point_id_for_key};
use super::types::{
    CountResponse, QdrantError, QueryResponse, QueryResponseResult, RetrieveResponse, ScoredPoint,
};
use crate::store::record::{DocumentRecord, compute_content_hash, current_timestamp_rfc3339};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Map, Value, json};

/// Lightweight HTTP client for Qdrant operations.
pub struct QdrantService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl QdrantService {
    /// Construct a client for the Qdrant instance at `url`.
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, QdrantError> {
        let client = Client::builder().user_agent("docsift/0.1").build()?;

        let base_url = normalize_base_url(url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = %api_key
                .as_deref()
                .map(|value| !value.is_empty())
                .unwrap_or(false),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Base URL the client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a cosine collection only when it is missing from Qdrant.
    pub async fn create_collection_if_not_exists(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), QdrantError> {
        if self.collection_exists(collection_name).await? {
            return Ok(());
        }

        tracing::debug!(
            collection = collection_name,
            vector_size,
            "Creating collection"
        );
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}"))
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::info!(collection = collection_name, "Collection created");
        })
        .await
    }

    /// Ensure the keyword index used for source key lookups exists.
    pub async fn ensure_payload_indexes(&self, collection_name: &str) -> Result<(), QdrantError> {
        let body = json!({
            "field_name": "source_key",
            "field_schema": "keyword",
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}/index"))
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() || response.status() == StatusCode::CONFLICT {
            tracing::debug!(collection = collection_name, "Payload index ensured");
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::warn!(collection = collection_name, error = %error, "Failed to ensure payload index");
        }
        Ok(())
    }

    /// Upload document vectors, addressing each point by its source key.
    pub async fn upsert_documents(
        &self,
        collection_name: &str,
        records: Vec<DocumentRecord>,
    ) -> Result<usize, QdrantError> {
        if records.is_empty() {
            return Ok(0);
        }

        let now = current_timestamp_rfc3339();
        let serialized: Vec<Value> = records
            .into_iter()
            .map(|record| {
                let hash = compute_content_hash(&record.text);
                json!({
                    "id": point_id_for_key(&record.source_key),
                    "vector": record.vector,
                    "payload": build_payload(&record.source_key, &record.text, &now, &hash),
                })
            })
            .collect();

        let point_count = serialized.len();
        let response = self
            .request(
                Method::PUT,
                &format!("collections/{collection_name}/points"),
            )
            .query(&[("wait", true)])
            .json(&json!({ "points": serialized }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = collection_name,
                points = point_count,
                "Points indexed"
            );
        })
        .await?;

        Ok(point_count)
    }

    /// Perform a similarity search against a collection, returning scored payloads.
    pub async fn search_points(
        &self,
        collection_name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, QdrantError> {
        let body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/query"),
            )
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = collection_name, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        Ok(points
            .into_iter()
            .map(|point| ScoredPoint {
                id: stringify_point_id(point.id),
                score: point.score,
                payload: point.payload,
            })
            .collect())
    }

    /// Exact number of points in the collection.
    pub async fn count_points(&self, collection_name: &str) -> Result<usize, QdrantError> {
        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/count"),
            )
            .json(&json!({ "exact": true }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(QdrantError::UnexpectedStatus { status, body });
        }

        let CountResponse { result } = response.json().await?;
        Ok(result.count)
    }

    /// Fetch the payload stored for a source key, if any.
    pub async fn retrieve_payload(
        &self,
        collection_name: &str,
        source_key: &str,
    ) -> Result<Option<Map<String, Value>>, QdrantError> {
        let response = self
            .request(Method::POST, &format!("collections/{collection_name}/points"))
            .json(&json!({
                "ids": [point_id_for_key(source_key)],
                "with_payload": true,
                "with_vector": false,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(QdrantError::UnexpectedStatus { status, body });
        }

        let RetrieveResponse { result } = response.json().await?;
        Ok(result.into_iter().next().and_then(|point| point.payload))
    }

    async fn collection_exists(&self, collection_name: &str) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection_name}"))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::error!(collection = collection_name, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

pub(crate) fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
pub(crate) fn test_service(base_url: String) -> QdrantService {
    QdrantService {
        client: Client::builder()
            .user_agent("docsift-test")
            .build()
            .expect("client"),
        base_url,
        api_key: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{
        Method::{GET, POST, PUT},
        MockServer,
    };

    #[tokio::test]
    async fn search_points_emits_expected_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/demo/points/query")
                    .json_body_partial(r#"{"limit": 3, "with_payload": true}"#);
                then.status(200).json_body(json!({
                    "status": "ok",
                    "time": 0.0,
                    "result": [
                        {
                            "id": "3f1c0a52-0000-4000-8000-000000000000",
                            "score": 0.42,
                            "payload": { "source_key": "a.pdf", "text": "Example" }
                        }
                    ]
                }));
            })
            .await;

        let service = test_service(server.base_url());
        let results = service
            .search_points("demo", &[0.1, 0.2], 3)
            .await
            .expect("search request");

        mock.assert();
        assert_eq!(results.len(), 1);
        let hit = &results[0];
        assert!((hit.score - 0.42).abs() < f32::EPSILON);
        let payload = hit.payload.as_ref().expect("payload");
        assert_eq!(payload["source_key"], Value::String("a.pdf".into()));
    }

    #[tokio::test]
    async fn missing_collection_is_created_with_cosine_distance() {
        let server = MockServer::start_async().await;
        let exists = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/docs");
                then.status(404);
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/docs")
                    .json_body_partial(r#"{"vectors": {"size": 4, "distance": "Cosine"}}"#);
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;

        let service = test_service(server.base_url());
        service
            .create_collection_if_not_exists("docs", 4)
            .await
            .expect("create");

        exists.assert();
        create.assert();
    }

    #[tokio::test]
    async fn upsert_uses_deterministic_point_ids() {
        let server = MockServer::start_async().await;
        let expected_id = point_id_for_key("a.pdf");
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/docs/points")
                    .query_param("wait", "true")
                    .body_contains(&expected_id)
                    .body_contains("\"source_key\":\"a.pdf\"");
                then.status(200).json_body(json!({ "result": { "status": "completed" } }));
            })
            .await;

        let service = test_service(server.base_url());
        let written = service
            .upsert_documents(
                "docs",
                vec![DocumentRecord {
                    source_key: "a.pdf".into(),
                    text: "alpha".into(),
                    vector: vec![0.1, 0.2],
                }],
            )
            .await
            .expect("upsert");

        mock.assert();
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn count_points_reads_exact_count() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/docs/points/count");
                then.status(200).json_body(json!({ "result": { "count": 7 } }));
            })
            .await;

        let service = test_service(server.base_url());
        assert_eq!(service.count_points("docs").await.expect("count"), 7);
    }
}

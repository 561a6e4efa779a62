//! Qdrant vector store integration.

pub mod client;
pub mod payload;
/// Streaming helpers for Qdrant scroll pagination.
pub mod scroller;
pub mod types;

pub use client::QdrantService;
pub use types::{QdrantError, ScoredPoint};

use super::record::{DocumentRecord, ScoredRecord, StoredDocument};
use super::{StoreError, VectorBackend};
use async_trait::async_trait;
use futures_util::{pin_mut, stream::StreamExt};
use payload::{payload_string, stored_document_from_payload};
use serde_json::json;
use std::collections::HashSet;

/// Remote backend storing one point per source key in a Qdrant collection.
pub struct QdrantBackend {
    service: QdrantService,
    collection: String,
}

impl QdrantBackend {
    /// Build a backend for `collection` on the Qdrant instance at `url`.
    pub fn new(url: &str, api_key: Option<String>, collection: String) -> Result<Self, QdrantError> {
        Ok(Self {
            service: QdrantService::new(url, api_key)?,
            collection,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_service(service: QdrantService, collection: &str) -> Self {
        Self {
            service,
            collection: collection.to_string(),
        }
    }
}

#[async_trait]
impl VectorBackend for QdrantBackend {
    async fn ensure_ready(&self, dimension: usize) -> Result<(), StoreError> {
        self.service
            .create_collection_if_not_exists(&self.collection, dimension as u64)
            .await?;
        self.service.ensure_payload_indexes(&self.collection).await?;
        Ok(())
    }

    async fn existing_keys(&self, keys: &[String]) -> Result<HashSet<String>, StoreError> {
        if keys.is_empty() {
            return Ok(HashSet::new());
        }
        let stream = scroller::stream_payloads(
            &self.service,
            &self.collection,
            json!(["source_key"]),
            Some(scroller::source_key_filter(keys)),
        );
        pin_mut!(stream);

        let mut found = HashSet::new();
        while let Some(item) = stream.next().await {
            if let Some(key) = payload_string(&item?, "source_key") {
                found.insert(key);
            }
        }
        Ok(found)
    }

    async fn insert(&self, records: Vec<DocumentRecord>) -> Result<usize, StoreError> {
        Ok(self
            .service
            .upsert_documents(&self.collection, records)
            .await?)
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredRecord>, StoreError> {
        let points = self
            .service
            .search_points(&self.collection, vector, limit)
            .await?;
        Ok(points
            .into_iter()
            .filter_map(|point| {
                let payload = point.payload?;
                Some(ScoredRecord {
                    source_key: payload_string(&payload, "source_key")?,
                    text: payload_string(&payload, "text").unwrap_or_default(),
                    score: point.score,
                })
            })
            .collect())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.service.count_points(&self.collection).await?)
    }

    async fn get(&self, source_key: &str) -> Result<Option<StoredDocument>, StoreError> {
        let payload = self
            .service
            .retrieve_payload(&self.collection, source_key)
            .await?;
        Ok(payload.as_ref().and_then(stored_document_from_payload))
    }

    fn describe(&self) -> String {
        format!("qdrant:{}/{}", self.service.base_url(), self.collection)
    }
}

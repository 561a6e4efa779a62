//! Helpers for constructing and reading Qdrant payloads.

use crate::store::StoredDocument;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Build the payload object stored alongside each document vector.
pub(crate) fn build_payload(
    source_key: &str,
    text: &str,
    timestamp_rfc3339: &str,
    content_hash: &str,
) -> Value {
    let mut payload = Map::new();
    payload.insert("source_key".into(), Value::String(source_key.to_string()));
    payload.insert("text".into(), Value::String(text.to_string()));
    payload.insert(
        "content_hash".into(),
        Value::String(content_hash.to_string()),
    );
    payload.insert(
        "ingested_at".into(),
        Value::String(timestamp_rfc3339.to_string()),
    );
    Value::Object(payload)
}

/// Deterministic point identifier for a source key.
///
/// Qdrant only accepts integers or UUIDs as ids, so the key is hashed into a UUID. Writing the
/// same key twice therefore addresses the same point.
pub(crate) fn point_id_for_key(source_key: &str) -> String {
    let digest = Sha256::digest(source_key.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    uuid::Builder::from_random_bytes(bytes)
        .into_uuid()
        .to_string()
}

pub(crate) fn payload_string(payload: &Map<String, Value>, field: &str) -> Option<String> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub(crate) fn stored_document_from_payload(payload: &Map<String, Value>) -> Option<StoredDocument> {
    Some(StoredDocument {
        source_key: payload_string(payload, "source_key")?,
        text: payload_string(payload, "text").unwrap_or_default(),
        content_hash: payload_string(payload, "content_hash").unwrap_or_default(),
        ingested_at: payload_string(payload, "ingested_at"),
    })
}

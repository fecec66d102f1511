//! Helpers for hashing chunks and constructing Qdrant payloads.

use crate::ingestion::TextChunk;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Deterministic SHA-256 key over the chunk text and its metadata.
pub fn compute_chunk_hash(chunk: &TextChunk) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chunk.text.as_bytes());
    // Struct field order keeps the serialization stable.
    let metadata = serde_json::to_string(&chunk.metadata).unwrap_or_default();
    hasher.update(metadata.as_bytes());
    hex::encode(hasher.finalize())
}

/// Point identifier derived from a chunk key, so re-indexing the same chunk overwrites it.
pub fn point_id(chunk_hash: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, chunk_hash.as_bytes()).to_string()
}

/// Payload stored alongside each indexed chunk.
pub(crate) fn build_payload(chunk: &TextChunk, chunk_hash: &str) -> Value {
    let mut payload = Map::new();
    payload.insert("text".into(), Value::String(chunk.text.clone()));
    payload.insert(
        "source".into(),
        Value::String(chunk.metadata.source.clone()),
    );
    if let Some(page) = chunk.metadata.page {
        payload.insert("page".into(), Value::from(page));
    }
    payload.insert(
        "category".into(),
        Value::String(chunk.metadata.category.label().to_string()),
    );
    payload.insert("chunk_hash".into(), Value::String(chunk_hash.to_string()));
    Value::Object(payload)
}

//! Incremental vector upload with ledger-driven cleanup.

use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::error::{ProcessingError, ResultExt};
use crate::ingestion::{FlatTransformation, TextChunk};
use crate::ledger::RecordLedger;
use crate::qdrant::payload::build_payload;
use crate::qdrant::{PointInsert, QdrantService, compute_chunk_hash, point_id};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;

const DEFAULT_BATCH_SIZE: usize = 100;

/// Counters describing one indexing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexingOutcome {
    /// Chunks embedded and written.
    pub num_added: usize,
    /// Chunks already indexed (or repeated within the batch).
    pub num_skipped: usize,
    /// Stale chunks removed from the store.
    pub num_deleted: usize,
}

/// Embeds new chunks, upserts them to Qdrant and removes chunks a source no longer produces.
pub struct VectorIndexer {
    embedding: Arc<dyn EmbeddingClient>,
    qdrant: Arc<QdrantService>,
    ledger: Arc<RecordLedger>,
    collection: String,
    batch_size: usize,
}

impl VectorIndexer {
    /// Indexer writing into `collection`.
    pub fn new(
        embedding: Arc<dyn EmbeddingClient>,
        qdrant: Arc<QdrantService>,
        ledger: Arc<RecordLedger>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            embedding,
            qdrant,
            ledger,
            collection: collection.into(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Override how many chunks are embedded per request.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Index every chunk of `flat`, then clean up stale chunks of the sources it touched.
    pub async fn index(&self, flat: &FlatTransformation) -> Result<IndexingOutcome, ProcessingError> {
        let index_start = RecordLedger::now();
        let mut outcome = IndexingOutcome::default();
        let mut sources = BTreeSet::new();

        let chunks: Vec<TextChunk> = flat.chunks().map(indexed_chunk).collect();
        for batch in chunks.chunks(self.batch_size) {
            let mut seen = HashSet::new();
            let mut keyed: Vec<(String, &TextChunk)> = Vec::with_capacity(batch.len());
            for chunk in batch {
                let key = compute_chunk_hash(chunk);
                if seen.insert(key.clone()) {
                    keyed.push((key, chunk));
                } else {
                    outcome.num_skipped += 1;
                }
            }

            let keys: Vec<String> = keyed.iter().map(|(key, _)| key.clone()).collect();
            let exists = self
                .ledger
                .exists(&keys)
                .context("failed to query record ledger")?;
            let fresh: Vec<&(String, &TextChunk)> = keyed
                .iter()
                .zip(&exists)
                .filter(|(_, exists)| !**exists)
                .map(|(entry, _)| entry)
                .collect();
            outcome.num_skipped += keyed.len() - fresh.len();

            if !fresh.is_empty() {
                outcome.num_added += self.write_points(&fresh).await?;
            }

            let groups: Vec<Option<String>> = keyed
                .iter()
                .map(|(_, chunk)| Some(chunk.metadata.source.clone()))
                .collect();
            self.ledger
                .update(&keys, &groups, RecordLedger::now())
                .context("failed to update record ledger")?;
            sources.extend(keyed.iter().map(|(_, chunk)| chunk.metadata.source.clone()));
        }

        let groups: Vec<String> = sources.into_iter().collect();
        let stale = self
            .ledger
            .list_keys(&groups, index_start)
            .context("failed to list stale ledger keys")?;
        if !stale.is_empty() {
            let ids: Vec<String> = stale.iter().map(|key| point_id(key)).collect();
            self.qdrant
                .delete_points(&self.collection, &ids)
                .await
                .context("failed to delete stale vectors")?;
            self.ledger
                .delete_keys(&stale)
                .context("failed to delete stale ledger keys")?;
            outcome.num_deleted = stale.len();
        }

        tracing::info!(
            collection = %self.collection,
            added = outcome.num_added,
            skipped = outcome.num_skipped,
            deleted = outcome.num_deleted,
            "Indexed chunks"
        );
        Ok(outcome)
    }

    async fn write_points(&self, fresh: &[&(String, &TextChunk)]) -> Result<usize, ProcessingError> {
        let texts: Vec<String> = fresh.iter().map(|(_, chunk)| chunk.text.clone()).collect();
        let vectors = self
            .embedding
            .generate_embeddings(texts)
            .await
            .context("failed to embed chunks")?;
        if vectors.len() != fresh.len() {
            return Err(ProcessingError::new(
                "failed to embed chunks",
                EmbeddingClientError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    fresh.len(),
                    vectors.len()
                )),
            ));
        }

        let points = fresh
            .iter()
            .zip(vectors)
            .map(|((key, chunk), vector)| PointInsert {
                id: point_id(key),
                vector,
                payload: build_payload(chunk, key),
            })
            .collect();
        self.qdrant
            .upsert_points(&self.collection, points)
            .await
            .context("failed to upsert vectors")
    }
}

/// Copy of `chunk` whose source is the stored file name rather than the run-specific path.
fn indexed_chunk(chunk: &TextChunk) -> TextChunk {
    let mut chunk = chunk.clone();
    if let Some(name) = Path::new(&chunk.metadata.source)
        .file_name()
        .and_then(|name| name.to_str())
    {
        chunk.metadata.source = name.to_string();
    }
    chunk
}

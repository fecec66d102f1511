//! Upload-and-index followed by retrieval-augmented answering.

use super::retrieval::Retriever;
use super::vector::{IndexingOutcome, VectorIndexer};
use crate::error::{ProcessingError, ResultExt};
use crate::ingestion::{DocumentIngestion, UploadedFile};
use crate::llm::prompts::qa_prompt;
use crate::llm::{ChatModel, ChatRequest};
use serde::Serialize;

/// Counters reported after documents are processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DocumentProcessingOutcome {
    /// Files stored in the run.
    pub files: usize,
    /// Chunks produced by the transformation.
    pub chunks: usize,
    /// Result of the vector upload.
    #[serde(flatten)]
    pub indexing: IndexingOutcome,
}

/// Question-answering pipeline assembled per request.
pub struct QaPipeline<'a> {
    ingestion: DocumentIngestion,
    indexer: &'a VectorIndexer,
    retriever: &'a Retriever,
    chat: &'a dyn ChatModel,
    model: &'a str,
}

impl<'a> QaPipeline<'a> {
    /// Assemble the pipeline from shared components and a fresh ingestion.
    pub fn new(
        ingestion: DocumentIngestion,
        indexer: &'a VectorIndexer,
        retriever: &'a Retriever,
        chat: &'a dyn ChatModel,
        model: &'a str,
    ) -> Self {
        Self {
            ingestion,
            indexer,
            retriever,
            chat,
            model,
        }
    }

    /// Store, transform and index `files`.
    pub async fn process_documents(
        &self,
        files: &[UploadedFile],
    ) -> Result<DocumentProcessingOutcome, ProcessingError> {
        let (artifact, flat) = self.ingestion.ingest_flat(files).await?;
        tracing::info!(
            run_dir = %artifact.run_dir().display(),
            files = flat.files.len(),
            chunks = flat.chunk_count(),
            "Documents transformed"
        );
        let indexing = self.indexer.index(&flat).await?;
        Ok(DocumentProcessingOutcome {
            files: flat.files.len(),
            chunks: flat.chunk_count(),
            indexing,
        })
    }

    /// Answer `question` from the indexed chunks.
    pub async fn answer(&self, question: &str) -> Result<String, ProcessingError> {
        let context = self
            .retriever
            .retrieve(question)
            .await?
            .iter()
            .map(|point| point.text())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        if context.is_empty() {
            tracing::warn!("No context retrieved for question");
        }
        self.chat
            .complete(ChatRequest::new(self.model, qa_prompt(question, &context)))
            .await
            .context("failed to answer question")
    }
}

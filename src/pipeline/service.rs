//! Long-lived document service shared by the HTTP surface and the CLI.

use super::qa::{DocumentProcessingOutcome, QaPipeline};
use super::retrieval::Retriever;
use super::sentiment::{Sentiment, SentimentAnalyzer};
use super::summarize::SummarizationPipeline;
use super::vector::VectorIndexer;
use crate::config::Config;
use crate::embedding::get_embedding_client;
use crate::error::{ProcessingError, ResultExt};
use crate::ingestion::{DocumentIngestion, UploadedFile};
use crate::ledger::RecordLedger;
use crate::llm::{ChatModel, get_chat_model};
use crate::metrics::{MetricsSnapshot, ServiceMetrics};
use crate::qdrant::QdrantService;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Operations exposed to the HTTP router and the CLI.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// Store, transform and index uploaded files.
    async fn process_documents(
        &self,
        files: Vec<UploadedFile>,
    ) -> Result<DocumentProcessingOutcome, ProcessingError>;

    /// Answer a question from the indexed documents.
    async fn answer_question(&self, question: &str) -> Result<String, ProcessingError>;

    /// Store and summarize uploaded files, one summary per stored file name.
    async fn summarize_documents(
        &self,
        files: Vec<UploadedFile>,
    ) -> Result<BTreeMap<String, String>, ProcessingError>;

    /// Classify the sentiment of free text.
    async fn analyze_sentiment(&self, text: &str) -> Result<Sentiment, ProcessingError>;

    /// Current activity counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Owns the embedding client, chat model, Qdrant transport, record ledger and metrics.
///
/// File store and readers are rebuilt for every request so runs never share state; everything
/// else is constructed once and shared.
pub struct DocumentService {
    config: Config,
    chat: Arc<dyn ChatModel>,
    indexer: VectorIndexer,
    retriever: Retriever,
    metrics: Arc<ServiceMetrics>,
}

impl DocumentService {
    /// Build the service and make sure the target collection exists.
    pub async fn new(config: Config) -> Result<Self, ProcessingError> {
        tracing::info!("Initializing embedding client");
        let embedding =
            get_embedding_client(&config).context("failed to build embedding client")?;
        let chat = get_chat_model(&config).context("failed to build chat model")?;

        let qdrant = Arc::new(
            QdrantService::from_config(&config).context("failed to connect to Qdrant")?,
        );
        let collection = config.qdrant_collection_name.clone();
        qdrant
            .create_collection_if_not_exists(&collection, config.embedding_dimension as u64)
            .await
            .context("failed to ensure Qdrant collection")?;
        qdrant
            .ensure_payload_indexes(&collection)
            .await
            .context("failed to ensure Qdrant payload indexes")?;

        let ledger = Arc::new(
            RecordLedger::open(&config.record_ledger_path, format!("qdrant/{collection}"))
                .context("failed to open record ledger")?,
        );
        tracing::debug!(
            collection = %collection,
            ledger = %config.record_ledger_path.display(),
            "Vector store ready"
        );

        Ok(Self {
            indexer: VectorIndexer::new(embedding.clone(), qdrant.clone(), ledger, &collection),
            retriever: Retriever::new(embedding, qdrant, &collection),
            chat,
            config,
            metrics: Arc::new(ServiceMetrics::new()),
        })
    }

    /// Configuration the service was built from.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn ingestion(&self) -> Result<DocumentIngestion, ProcessingError> {
        DocumentIngestion::from_config(&self.config).context("invalid splitter settings")
    }

    fn qa_pipeline(&self) -> Result<QaPipeline<'_>, ProcessingError> {
        Ok(QaPipeline::new(
            self.ingestion()?,
            &self.indexer,
            &self.retriever,
            self.chat.as_ref(),
            &self.config.qa_model,
        ))
    }
}

#[async_trait]
impl DocumentApi for DocumentService {
    async fn process_documents(
        &self,
        files: Vec<UploadedFile>,
    ) -> Result<DocumentProcessingOutcome, ProcessingError> {
        tracing::info!(file_count = files.len(), "Processing uploaded documents");
        let outcome = self.qa_pipeline()?.process_documents(&files).await?;
        self.metrics
            .record_ingestion(outcome.files as u64, outcome.chunks as u64);
        Ok(outcome)
    }

    async fn answer_question(&self, question: &str) -> Result<String, ProcessingError> {
        let answer = self.qa_pipeline()?.answer(question).await?;
        self.metrics.record_question();
        Ok(answer)
    }

    async fn summarize_documents(
        &self,
        files: Vec<UploadedFile>,
    ) -> Result<BTreeMap<String, String>, ProcessingError> {
        tracing::info!(file_count = files.len(), "Summarizing uploaded documents");
        let ingestion = self.ingestion()?;
        let (_, named) = ingestion.ingest_named(&files).await?;
        self.metrics.record_ingestion(
            named.documents.len() as u64,
            named.chunk_count() as u64,
        );

        let pipeline =
            SummarizationPipeline::new(ingestion, self.chat.as_ref(), &self.config.summary_model);
        let summaries = pipeline.summarize_named(&named).await?;
        self.metrics.record_summaries(summaries.len() as u64);
        Ok(summaries)
    }

    async fn analyze_sentiment(&self, text: &str) -> Result<Sentiment, ProcessingError> {
        SentimentAnalyzer::new(self.chat.as_ref(), &self.config.sentiment_model)
            .analyze(text)
            .await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

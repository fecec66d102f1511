//! Pipelines built on top of ingestion: vector upload, retrieval, answering, summaries and
//! sentiment, plus the service that wires them to configuration.

pub mod qa;
pub mod retrieval;
pub mod sentiment;
pub mod service;
pub mod summarize;
pub mod vector;

pub use qa::{DocumentProcessingOutcome, QaPipeline};
pub use retrieval::{Retriever, cosine_similarity, maximal_marginal_relevance};
pub use sentiment::{Sentiment, SentimentAnalyzer};
pub use service::{DocumentApi, DocumentService};
pub use summarize::SummarizationPipeline;
pub use vector::{IndexingOutcome, VectorIndexer};

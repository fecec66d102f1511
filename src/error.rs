//! Boundary error returned by the document pipelines.

use crate::config::ConfigError;
use crate::embedding::EmbeddingClientError;
use crate::ingestion::{ReaderError, SplitterError, StoreError};
use crate::ledger::LedgerError;
use crate::llm::ChatModelError;
use crate::qdrant::QdrantError;
use thiserror::Error;

/// A failed pipeline step together with a description of what was being attempted.
#[derive(Debug, Error)]
#[error("{context}: {kind}")]
pub struct ProcessingError {
    context: String,
    #[source]
    kind: ProcessingErrorKind,
}

impl ProcessingError {
    /// Wrap an underlying failure with context.
    pub fn new(context: impl Into<String>, kind: impl Into<ProcessingErrorKind>) -> Self {
        Self {
            context: context.into(),
            kind: kind.into(),
        }
    }

    /// What the pipeline was doing when it failed.
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Underlying failure.
    pub fn kind(&self) -> &ProcessingErrorKind {
        &self.kind
    }
}

/// Underlying failures the pipelines can surface.
#[derive(Debug, Error)]
pub enum ProcessingErrorKind {
    /// Filesystem access outside the file store.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Persisting uploads failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Reading a document failed, including unsupported types and conversion failures.
    #[error(transparent)]
    Read(#[from] ReaderError),
    /// Splitter settings were invalid.
    #[error(transparent)]
    Split(#[from] SplitterError),
    /// Embedding provider failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Vector store request failed.
    #[error(transparent)]
    VectorStore(#[from] QdrantError),
    /// Record ledger failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// Language model failed.
    #[error(transparent)]
    Generation(#[from] ChatModelError),
    /// Configuration was incomplete.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A background task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

/// Attach context to fallible pipeline steps.
pub trait ResultExt<T> {
    /// Convert the error into a [`ProcessingError`] carrying `context`.
    fn context(self, context: impl Into<String>) -> Result<T, ProcessingError>;

    /// Like [`ResultExt::context`] but builds the message lazily.
    fn with_context<F>(self, context: F) -> Result<T, ProcessingError>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<ProcessingErrorKind>,
{
    fn context(self, context: impl Into<String>) -> Result<T, ProcessingError> {
        self.map_err(|err| ProcessingError::new(context, err))
    }

    fn with_context<F>(self, context: F) -> Result<T, ProcessingError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|err| ProcessingError::new(context(), err))
    }
}

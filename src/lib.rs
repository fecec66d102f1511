#![deny(missing_docs)]

//! Core library for the document question-answering and summarization service.

/// HTTP routing and REST handlers.
pub mod api;
/// Per-session conversation history.
pub mod chat;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Boundary error wrapping every pipeline failure.
pub mod error;
/// File store, type detection, readers, splitting and transformation.
pub mod ingestion;
/// SQLite record of indexed chunk keys.
pub mod ledger;
/// Chat model abstraction, adapters and prompt templates.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Activity counters.
pub mod metrics;
/// Vector upload, retrieval, answering, summaries and sentiment.
pub mod pipeline;
/// Qdrant vector store integration.
pub mod qdrant;

#[cfg(test)]
mod test_support;

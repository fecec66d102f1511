use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing document activity.
#[derive(Default)]
pub struct ServiceMetrics {
    files_ingested: AtomicU64,
    chunks_produced: AtomicU64,
    questions_answered: AtomicU64,
    summaries_generated: AtomicU64,
}

impl ServiceMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a transformed batch of files and the chunks produced for them.
    pub fn record_ingestion(&self, file_count: u64, chunk_count: u64) {
        self.files_ingested.fetch_add(file_count, Ordering::Relaxed);
        self.chunks_produced
            .fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record an answered question.
    pub fn record_question(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the number of per-file summaries returned by one request.
    pub fn record_summaries(&self, count: u64) {
        self.summaries_generated
            .fetch_add(count, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_ingested: self.files_ingested.load(Ordering::Relaxed),
            chunks_produced: self.chunks_produced.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            summaries_generated: self.summaries_generated.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of service counters used for reporting.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of files transformed since startup.
    pub files_ingested: u64,
    /// Total chunk count produced across all transformed files.
    pub chunks_produced: u64,
    /// Number of questions answered.
    pub questions_answered: u64,
    /// Number of per-file summaries generated.
    pub summaries_generated: u64,
}

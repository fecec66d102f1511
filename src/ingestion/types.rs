//! Core data types and error definitions for the ingestion pipeline.

use super::convert::ConversionError;
use super::detect::DocumentCategory;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Raw upload received from a caller; lives for the duration of one request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Name declared by the client.
    pub name: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// Wrap a declared name and its contents.
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// File persisted inside a run directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Normalized file name.
    pub name: String,
    /// Absolute or artifact-relative location on disk.
    pub path: PathBuf,
}

/// Reference to the storage directory of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandlerArtifact {
    run_dir: PathBuf,
    file_storage_dir: PathBuf,
}

impl FileHandlerArtifact {
    /// Build an artifact for an existing run directory and its storage sub-directory.
    pub fn new(run_dir: impl Into<PathBuf>, file_storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
            file_storage_dir: file_storage_dir.into(),
        }
    }

    /// Directory owned by the run (parent of the storage directory).
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Directory holding the uploaded files.
    pub fn file_storage_dir(&self) -> &Path {
        &self.file_storage_dir
    }
}

/// Provenance attached to every record and chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkMetadata {
    /// Path of the originating file.
    pub source: String,
    /// Zero-based page, slide or sheet index when the format has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Category the file was detected as.
    pub category: DocumentCategory,
}

impl ChunkMetadata {
    /// Metadata for `path` with an optional page index.
    pub fn new(path: &Path, page: Option<u32>, category: DocumentCategory) -> Self {
        Self {
            source: path.display().to_string(),
            page,
            category,
        }
    }
}

/// A page or section of extracted text, before splitting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRecord {
    /// Extracted text.
    pub text: String,
    /// Where the text came from.
    pub metadata: ChunkMetadata,
}

impl TextRecord {
    /// Pair extracted text with its metadata.
    pub fn new(text: impl Into<String>, metadata: ChunkMetadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }
}

/// Bounded span of extracted text produced by the splitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChunk {
    /// Chunk contents.
    pub text: String,
    /// Metadata copied from the record the chunk was split from.
    pub metadata: ChunkMetadata,
}

/// Per-file chunk sequences in directory-listing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatTransformation {
    /// One chunk sequence per file.
    pub files: Vec<Vec<TextChunk>>,
}

impl FlatTransformation {
    /// Total number of chunks across all files.
    pub fn chunk_count(&self) -> usize {
        self.files.iter().map(Vec::len).sum()
    }

    /// Iterate over every chunk in file order.
    pub fn chunks(&self) -> impl Iterator<Item = &TextChunk> {
        self.files.iter().flatten()
    }
}

/// Chunks and detected category for one named file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedDocument {
    /// Chunks in source order.
    pub chunks: Vec<TextChunk>,
    /// Detected category.
    pub category: DocumentCategory,
}

/// Mapping from stored file name to its chunks, ordered by file name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NamedTransformation {
    /// Documents keyed by file name.
    pub documents: BTreeMap<String, NamedDocument>,
}

impl NamedTransformation {
    /// Total number of chunks across all documents.
    pub fn chunk_count(&self) -> usize {
        self.documents.values().map(|doc| doc.chunks.len()).sum()
    }
}

/// Errors raised while persisting uploads.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Declared name normalizes to nothing usable.
    #[error("invalid file name {0:?}")]
    InvalidFileName(String),
    /// Directory could not be created.
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        /// Directory we attempted to create.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// File contents could not be written.
    #[error("failed to write {path}: {source}")]
    Write {
        /// Target file.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// Directory could not be removed.
    #[error("failed to remove {path}: {source}")]
    Remove {
        /// Directory we attempted to remove.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// Run timestamp could not be rendered.
    #[error("failed to format run timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

/// Errors raised while loading a document.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// File type is not in the supported set.
    #[error("unsupported file type for {path} (mime: {})", mime.as_deref().unwrap_or("unknown"))]
    Unsupported {
        /// File that was rejected.
        path: PathBuf,
        /// MIME type guessed from the extension, if any.
        mime: Option<String>,
    },
    /// File could not be read from disk.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// A format parser rejected the file.
    #[error("failed to parse {kind} file {path}: {message}")]
    Parse {
        /// Format being parsed (`pdf`, `pptx`, ...).
        kind: &'static str,
        /// File that failed.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },
    /// Office-to-PDF conversion failed.
    #[error("document conversion failed: {0}")]
    Conversion(#[from] ConversionError),
    /// Image OCR failed.
    #[error("image text extraction failed: {0}")]
    Ocr(#[source] ConversionError),
    /// Blocking parser task panicked or was cancelled.
    #[error("reader task for {path} failed: {message}")]
    Task {
        /// File being read.
        path: PathBuf,
        /// Join error description.
        message: String,
    },
}

impl ReaderError {
    pub(crate) fn parse(kind: &'static str, path: &Path, message: impl ToString) -> Self {
        Self::Parse {
            kind,
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }

    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Errors raised when configuring the chunk splitter.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SplitterError {
    /// A zero chunk size cannot make progress.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must not exceed the chunk size.
    #[error("chunk overlap ({overlap}) is larger than chunk size ({size})")]
    OverlapTooLarge {
        /// Configured chunk size.
        size: usize,
        /// Configured overlap.
        overlap: usize,
    },
}

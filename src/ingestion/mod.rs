//! Document ingestion: file store, type detection, readers, splitting and transformation.

pub mod convert;
pub mod detect;
pub mod readers;
pub mod splitter;
pub mod store;
pub mod transform;
pub mod types;

pub use convert::{ConversionError, ConvertedPdf, OcrEngine, OfficeConverter};
pub use detect::{DocumentCategory, detect_category, guess_mime_type};
pub use readers::{DocumentReaders, ReaderRoutine};
pub use splitter::RecursiveCharacterSplitter;
pub use store::{FileHandlerConfig, FileStore, normalize_file_name};
pub use transform::{DataTransformation, FileDetails};
pub use types::{
    ChunkMetadata, FileHandlerArtifact, FlatTransformation, NamedDocument, NamedTransformation,
    ReaderError, SplitterError, StoreError, StoredFile, TextChunk, TextRecord, UploadedFile,
};

use crate::config::Config;
use crate::error::{ProcessingError, ResultExt};

/// File store and transformation built for a single request.
#[derive(Debug, Clone)]
pub struct DocumentIngestion {
    store: FileStore,
    transformation: DataTransformation,
}

impl DocumentIngestion {
    /// Build fresh components from the service configuration.
    pub fn from_config(config: &Config) -> Result<Self, SplitterError> {
        let splitter = RecursiveCharacterSplitter::new(
            config.text_splitter_chunk_size,
            config.text_splitter_chunk_overlap,
        )?;
        let readers = DocumentReaders::new(
            splitter,
            OfficeConverter::new(
                config.document_converter_path.clone(),
                config.external_tool_timeout,
            ),
            OcrEngine::new(
                config.ocr_executable.clone(),
                config.pdf_rasterizer_path.clone(),
                config.external_tool_timeout,
            ),
        );
        Ok(Self {
            store: FileStore::new(FileHandlerConfig::from_config(config)),
            transformation: DataTransformation::new(readers),
        })
    }

    /// Assemble from explicit components.
    pub fn new(store: FileStore, transformation: DataTransformation) -> Self {
        Self {
            store,
            transformation,
        }
    }

    /// Persist uploads into a new run directory.
    pub async fn store(&self, files: &[UploadedFile]) -> Result<FileHandlerArtifact, ProcessingError> {
        self.store
            .ingest(files)
            .await
            .context("Error occurred in data ingestion")
    }

    /// Persist uploads and produce per-file chunk sequences.
    pub async fn ingest_flat(
        &self,
        files: &[UploadedFile],
    ) -> Result<(FileHandlerArtifact, FlatTransformation), ProcessingError> {
        let artifact = self.store(files).await?;
        let flat = self.transformation.transform_flat(&artifact).await?;
        Ok((artifact, flat))
    }

    /// Persist uploads and produce a name-keyed chunk mapping.
    pub async fn ingest_named(
        &self,
        files: &[UploadedFile],
    ) -> Result<(FileHandlerArtifact, NamedTransformation), ProcessingError> {
        let artifact = self.store(files).await?;
        let named = self.transformation.transform_named(&artifact).await?;
        Ok((artifact, named))
    }

    /// Underlying file store.
    pub fn file_store(&self) -> &FileStore {
        &self.store
    }

    /// Underlying transformation orchestrator.
    pub fn transformation(&self) -> &DataTransformation {
        &self.transformation
    }
}

//! Transformation orchestrator: run storage directory to chunks.

use super::detect::{DocumentCategory, detect_category};
use super::readers::DocumentReaders;
use super::types::{
    FileHandlerArtifact, FlatTransformation, NamedDocument, NamedTransformation, TextChunk,
};
use crate::error::{ProcessingError, ResultExt};
use std::path::PathBuf;

/// File discovered in a run storage directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDetails {
    /// Stored file name.
    pub file_name: String,
    /// Full path on disk.
    pub path: PathBuf,
    /// Detected category, `None` when unsupported.
    pub category: Option<DocumentCategory>,
}

/// Reads every file in a run and produces chunk collections.
#[derive(Debug, Clone)]
pub struct DataTransformation {
    readers: DocumentReaders,
}

impl DataTransformation {
    /// Wrap the readers used for every file.
    pub fn new(readers: DocumentReaders) -> Self {
        Self { readers }
    }

    /// List regular files in the storage directory, sorted by name, with detected categories.
    pub async fn list_files(
        &self,
        artifact: &FileHandlerArtifact,
    ) -> Result<Vec<FileDetails>, ProcessingError> {
        let dir = artifact.file_storage_dir();
        let context = || format!("failed to list {}", dir.display());
        let mut entries = tokio::fs::read_dir(dir).await.with_context(context)?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.with_context(context)? {
            if !entry.file_type().await.with_context(context)?.is_file() {
                continue;
            }
            let path = entry.path();
            files.push(FileDetails {
                file_name: entry.file_name().to_string_lossy().into_owned(),
                category: detect_category(&path),
                path,
            });
        }
        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(files)
    }

    /// Chunk every file, keeping one sequence per file in listing order.
    pub async fn transform_flat(
        &self,
        artifact: &FileHandlerArtifact,
    ) -> Result<FlatTransformation, ProcessingError> {
        let files = self.list_files(artifact).await?;
        let mut transformation = FlatTransformation::default();
        for file in &files {
            let (_, chunks) = self.read_file(file).await?;
            transformation.files.push(chunks);
        }
        tracing::info!(
            file_count = files.len(),
            chunk_count = transformation.chunk_count(),
            "Transformed documents"
        );
        Ok(transformation)
    }

    /// Chunk every file, keyed by its stored name together with its category.
    pub async fn transform_named(
        &self,
        artifact: &FileHandlerArtifact,
    ) -> Result<NamedTransformation, ProcessingError> {
        let files = self.list_files(artifact).await?;
        let mut transformation = NamedTransformation::default();
        for file in files {
            let (category, chunks) = self.read_file(&file).await?;
            transformation
                .documents
                .insert(file.file_name, NamedDocument { chunks, category });
        }
        tracing::info!(
            file_count = transformation.documents.len(),
            chunk_count = transformation.chunk_count(),
            "Transformed named documents"
        );
        Ok(transformation)
    }

    async fn read_file(
        &self,
        file: &FileDetails,
    ) -> Result<(DocumentCategory, Vec<TextChunk>), ProcessingError> {
        let context = || format!("failed to transform {}", file.file_name);
        let (category, routine) = self
            .readers
            .dispatch(file.category, &file.path)
            .with_context(context)?;
        let chunks = self
            .readers
            .read_dispatched(category, routine, &file.path)
            .await
            .with_context(context)?;
        tracing::debug!(file = %file.file_name, chunk_count = chunks.len(), "Read document");
        Ok((category, chunks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::convert::{OcrEngine, OfficeConverter};
    use crate::ingestion::splitter::RecursiveCharacterSplitter;
    use crate::error::ProcessingErrorKind;
    use crate::ingestion::types::ReaderError;

    fn transformation() -> DataTransformation {
        DataTransformation::new(DocumentReaders::new(
            RecursiveCharacterSplitter::new(1000, 200).unwrap(),
            OfficeConverter::new("false", None),
            OcrEngine::new("false", "false", None),
        ))
    }

    fn artifact_with(files: &[(&str, &str)]) -> (tempfile::TempDir, FileHandlerArtifact) {
        let root = tempfile::tempdir().unwrap();
        let storage = root.path().join("file_storage");
        std::fs::create_dir_all(&storage).unwrap();
        for (name, contents) in files {
            std::fs::write(storage.join(name), contents).unwrap();
        }
        let artifact = FileHandlerArtifact::new(root.path(), storage);
        (root, artifact)
    }

    #[tokio::test]
    async fn flat_transformation_follows_name_order() {
        let (_root, artifact) = artifact_with(&[
            ("b.txt", "second file"),
            ("a.md", "# First\n\nfile"),
        ]);
        let flat = transformation().transform_flat(&artifact).await.unwrap();
        assert_eq!(flat.files.len(), 2);
        assert!(flat.files[0][0].text.starts_with("First"));
        assert_eq!(flat.files[1][0].text, "second file");
        assert_eq!(flat.chunk_count(), 2);
    }

    #[tokio::test]
    async fn named_transformation_records_categories() {
        let (_root, artifact) = artifact_with(&[("a.csv", "k,v\nx,1\n"), ("notes.txt", "hello")]);
        let named = transformation().transform_named(&artifact).await.unwrap();
        let names: Vec<&str> = named.documents.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["a.csv", "notes.txt"]);
        assert_eq!(named.documents["a.csv"].category, DocumentCategory::Csv);
        assert_eq!(named.documents["notes.txt"].chunks[0].text, "hello");
    }

    #[tokio::test]
    async fn unsupported_file_fails_the_whole_run() {
        let (_root, artifact) = artifact_with(&[("a.csv", "k,v\nx,1\n"), ("b.unknownext", "??")]);
        let err = transformation().transform_flat(&artifact).await.unwrap_err();
        assert!(err.context().contains("b.unknownext"));
        assert!(matches!(
            err.kind(),
            ProcessingErrorKind::Read(ReaderError::Unsupported { .. })
        ));
    }

    #[tokio::test]
    async fn empty_run_yields_empty_transformation() {
        let (_root, artifact) = artifact_with(&[]);
        let flat = transformation().transform_flat(&artifact).await.unwrap();
        assert!(flat.files.is_empty());
    }
}

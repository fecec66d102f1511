//! Per-file summaries with a single "stuff" prompt per document.

use crate::error::{ProcessingError, ResultExt};
use crate::ingestion::{DocumentIngestion, NamedTransformation, UploadedFile};
use crate::llm::prompts::summary_prompt;
use crate::llm::{ChatModel, ChatRequest};
use std::collections::BTreeMap;

/// Stores uploads, transforms them by name and summarizes each document.
pub struct SummarizationPipeline<'a> {
    ingestion: DocumentIngestion,
    chat: &'a dyn ChatModel,
    model: &'a str,
}

impl<'a> SummarizationPipeline<'a> {
    /// Pipeline summarizing with `model`.
    pub fn new(ingestion: DocumentIngestion, chat: &'a dyn ChatModel, model: &'a str) -> Self {
        Self {
            ingestion,
            chat,
            model,
        }
    }

    /// Store `files` in a new run and return one summary per stored file name.
    pub async fn summarize(
        &self,
        files: &[UploadedFile],
    ) -> Result<BTreeMap<String, String>, ProcessingError> {
        let (_, named) = self.ingestion.ingest_named(files).await?;
        self.summarize_named(&named).await
    }

    /// Summarize an already transformed run.
    pub async fn summarize_named(
        &self,
        named: &NamedTransformation,
    ) -> Result<BTreeMap<String, String>, ProcessingError> {
        let mut summaries = BTreeMap::new();
        for (name, document) in &named.documents {
            if document.chunks.is_empty() {
                tracing::warn!(file = %name, "No text extracted; skipping summary");
                summaries.insert(name.clone(), String::new());
                continue;
            }
            let text = document
                .chunks
                .iter()
                .map(|chunk| chunk.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            let summary = self
                .chat
                .complete(ChatRequest::new(self.model, summary_prompt(&text)))
                .await
                .with_context(|| format!("failed to summarize {name}"))?;
            tracing::debug!(file = %name, category = %document.category, "Summarized document");
            summaries.insert(name.clone(), summary);
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::{ChunkMetadata, DocumentCategory, NamedDocument, TextChunk};
    use crate::llm::ChatModelError;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingModel {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatModel for RecordingModel {
        async fn complete(&self, request: ChatRequest) -> Result<String, ChatModelError> {
            let count = {
                let mut prompts = self.prompts.lock().unwrap();
                prompts.push(request.prompt);
                prompts.len()
            };
            Ok(format!("summary {count}"))
        }
    }

    fn ingestion(root: &Path) -> DocumentIngestion {
        let mut config = crate::test_support::test_config();
        config.artifact_dir = root.to_path_buf();
        DocumentIngestion::from_config(&config).unwrap()
    }

    #[tokio::test]
    async fn summarizes_each_file_in_name_order() {
        let root = tempfile::tempdir().unwrap();
        let model = RecordingModel::default();
        let pipeline = SummarizationPipeline::new(ingestion(root.path()), &model, "gpt-3.5-turbo");

        let summaries = pipeline
            .summarize(&[
                UploadedFile::new("Zeta Notes.txt", b"last file".to_vec()),
                UploadedFile::new("alpha.md", b"# Alpha\n\nfirst file".to_vec()),
            ])
            .await
            .unwrap();

        let names: Vec<&str> = summaries.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["alpha.md", "zeta-notes.txt"]);
        assert_eq!(summaries["alpha.md"], "summary 1");
        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts[0], summary_prompt("Alpha\n\nfirst file"));
        assert_eq!(prompts[1], summary_prompt("last file"));
    }

    #[tokio::test]
    async fn empty_documents_are_not_sent() {
        let model = RecordingModel::default();
        let root = tempfile::tempdir().unwrap();
        let pipeline = SummarizationPipeline::new(ingestion(root.path()), &model, "gpt-3.5-turbo");

        let mut named = NamedTransformation::default();
        named.documents.insert(
            "blank.txt".into(),
            NamedDocument {
                chunks: Vec::new(),
                category: DocumentCategory::Txt,
            },
        );
        named.documents.insert(
            "full.txt".into(),
            NamedDocument {
                chunks: vec![TextChunk {
                    text: "content".into(),
                    metadata: ChunkMetadata::new(Path::new("full.txt"), None, DocumentCategory::Txt),
                }],
                category: DocumentCategory::Txt,
            },
        );

        let summaries = pipeline.summarize_named(&named).await.unwrap();
        assert_eq!(summaries["blank.txt"], "");
        assert_eq!(summaries["full.txt"], "summary 1");
        assert_eq!(model.prompts.lock().unwrap().len(), 1);
    }
}

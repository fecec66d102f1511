use crate::config::{ChatProvider, Config, EmbeddingProvider};
use std::path::PathBuf;

pub(crate) fn test_config() -> Config {
    Config {
        artifact_dir: PathBuf::from("artifact"),
        file_storage_dir_name: "file_storage".into(),
        text_splitter_chunk_size: 1000,
        text_splitter_chunk_overlap: 200,
        document_converter_path: "false".into(),
        ocr_executable: "false".into(),
        pdf_rasterizer_path: "false".into(),
        external_tool_timeout: None,
        qdrant_url: "http://127.0.0.1:6333".into(),
        qdrant_collection_name: "docs".into(),
        qdrant_api_key: None,
        embedding_provider: EmbeddingProvider::Local,
        embedding_model: "local".into(),
        embedding_dimension: 8,
        chat_provider: ChatProvider::Ollama,
        qa_model: "gpt-3.5-turbo-0125".into(),
        summary_model: "gpt-3.5-turbo-1106".into(),
        sentiment_model: "gpt-3.5-turbo".into(),
        openai_api_key: None,
        openai_base_url: "http://127.0.0.1:9".into(),
        ollama_url: "http://127.0.0.1:11434".into(),
        record_ledger_path: PathBuf::from("record_manager_cache.sqlite"),
        server_port: None,
    }
}

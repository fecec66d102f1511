use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_ARTIFACT_DIR: &str = "artifact";
const DEFAULT_FILE_STORAGE_DIR_NAME: &str = "file_storage";
const DEFAULT_CHUNK_SIZE: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 200;
const DEFAULT_COLLECTION_NAME: &str = "docqa";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
const DEFAULT_QA_MODEL: &str = "gpt-3.5-turbo-0125";
const DEFAULT_SUMMARY_MODEL: &str = "gpt-3.5-turbo-1106";
const DEFAULT_SENTIMENT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_LEDGER_PATH: &str = "record_manager_cache.sqlite";
const DEFAULT_OCR_EXECUTABLE: &str = "tesseract";
const DEFAULT_PDF_RASTERIZER: &str = "pdftoppm";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the document service.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Root directory holding one sub-directory per run.
    pub artifact_dir: PathBuf,
    /// Name of the per-run directory that receives uploaded files.
    pub file_storage_dir_name: String,
    /// Maximum chunk length in characters.
    pub text_splitter_chunk_size: usize,
    /// Overlap between adjacent chunks in characters.
    pub text_splitter_chunk_overlap: usize,
    /// Executable used to convert office documents to PDF.
    pub document_converter_path: String,
    /// Executable used to OCR image files.
    pub ocr_executable: String,
    /// Executable rendering PDF pages that carry images to PNG before OCR.
    pub pdf_rasterizer_path: String,
    /// Optional upper bound for converter, rasterizer and OCR subprocesses.
    pub external_tool_timeout: Option<Duration>,
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Name of the Qdrant collection used for document storage.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Backend used for question answering, summaries and sentiment.
    pub chat_provider: ChatProvider,
    /// Model answering questions over retrieved context.
    pub qa_model: String,
    /// Model producing per-file summaries.
    pub summary_model: String,
    /// Model classifying sentiment.
    pub sentiment_model: String,
    /// API key for OpenAI-compatible endpoints.
    pub openai_api_key: Option<String>,
    /// Base URL for OpenAI-compatible endpoints.
    pub openai_base_url: String,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// SQLite file tracking indexed chunk keys.
    pub record_ledger_path: PathBuf,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Hosted OpenAI embeddings API.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic in-process hashing encoder.
    Local,
}

/// Supported chat completion backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatProvider {
    /// Hosted OpenAI chat completions API.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            artifact_dir: load_env_optional("ARTIFACT_DIR")
                .unwrap_or_else(|| DEFAULT_ARTIFACT_DIR.to_string())
                .into(),
            file_storage_dir_name: load_env_optional("FILE_STORAGE_DIR_NAME")
                .unwrap_or_else(|| DEFAULT_FILE_STORAGE_DIR_NAME.to_string()),
            text_splitter_chunk_size: parse_optional("TEXT_SPLITTER_CHUNK_SIZE")?
                .unwrap_or(DEFAULT_CHUNK_SIZE),
            text_splitter_chunk_overlap: parse_optional("TEXT_SPLITTER_CHUNK_OVERLAP")?
                .unwrap_or(DEFAULT_CHUNK_OVERLAP),
            document_converter_path: load_env_optional("DOCUMENT_CONVERTER_PATH")
                .unwrap_or_else(|| default_converter_path().to_string()),
            ocr_executable: load_env_optional("OCR_EXECUTABLE")
                .unwrap_or_else(|| DEFAULT_OCR_EXECUTABLE.to_string()),
            pdf_rasterizer_path: load_env_optional("PDF_RASTERIZER_PATH")
                .unwrap_or_else(|| DEFAULT_PDF_RASTERIZER.to_string()),
            external_tool_timeout: parse_optional::<u64>("EXTERNAL_TOOL_TIMEOUT_SECS")?
                .map(Duration::from_secs),
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_collection_name: load_env_optional("QDRANT_COLLECTION_NAME")
                .unwrap_or_else(|| DEFAULT_COLLECTION_NAME.to_string()),
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            embedding_provider: load_env_optional("EMBEDDING_PROVIDER")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))
                })
                .transpose()?
                .unwrap_or(EmbeddingProvider::OpenAI),
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimension: parse_optional("EMBEDDING_DIMENSION")?
                .unwrap_or(DEFAULT_EMBEDDING_DIMENSION),
            chat_provider: load_env_optional("CHAT_PROVIDER")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("CHAT_PROVIDER".into()))
                })
                .transpose()?
                .unwrap_or(ChatProvider::OpenAI),
            qa_model: load_env_optional("QA_MODEL").unwrap_or_else(|| DEFAULT_QA_MODEL.into()),
            summary_model: load_env_optional("SUMMARY_MODEL")
                .unwrap_or_else(|| DEFAULT_SUMMARY_MODEL.into()),
            sentiment_model: load_env_optional("SENTIMENT_MODEL")
                .unwrap_or_else(|| DEFAULT_SENTIMENT_MODEL.into()),
            openai_api_key: load_env_optional("OPENAI_API_KEY"),
            openai_base_url: load_env_optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.into()),
            ollama_url: load_env_optional("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.into()),
            record_ledger_path: load_env_optional("RECORD_LEDGER_PATH")
                .unwrap_or_else(|| DEFAULT_LEDGER_PATH.to_string())
                .into(),
            server_port: parse_optional("SERVER_PORT")?,
        };

        if config.text_splitter_chunk_size == 0 {
            return Err(ConfigError::InvalidValue("TEXT_SPLITTER_CHUNK_SIZE".into()));
        }
        if config.text_splitter_chunk_overlap > config.text_splitter_chunk_size {
            return Err(ConfigError::InvalidValue(
                "TEXT_SPLITTER_CHUNK_OVERLAP".into(),
            ));
        }

        Ok(config)
    }

    /// Return the OpenAI API key or fail with the variable that must be provided.
    pub fn require_openai_api_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVariable("OPENAI_API_KEY".to_string()))
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

/// Converter executable used when `DOCUMENT_CONVERTER_PATH` is unset.
pub fn default_converter_path() -> &'static str {
    if cfg!(target_os = "macos") {
        "/Applications/LibreOffice.app/Contents/MacOS/soffice"
    } else {
        "libreoffice"
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "local" => Ok(Self::Local),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for ChatProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        artifact_dir = %config.artifact_dir.display(),
        qdrant_url = %config.qdrant_url,
        collection = %config.qdrant_collection_name,
        embedding_provider = ?config.embedding_provider,
        chat_provider = ?config.chat_provider,
        chunk_size = config.text_splitter_chunk_size,
        chunk_overlap = config.text_splitter_chunk_overlap,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

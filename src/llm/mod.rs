//! Chat completion providers used for answers, summaries and sentiment.
//!
//! Both backends are called over HTTP with `reqwest`, at temperature zero. The OpenAI client
//! checks the prompt against the model's context window before sending it.

pub mod prompts;

use crate::config::{ChatProvider, Config, ConfigError};
use crate::embedding::http_client;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced while generating text.
#[derive(Debug, Error)]
pub enum ChatModelError {
    /// Provider was unreachable or the endpoint is missing.
    #[error("Chat provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// Prompt does not fit the model's context window.
    #[error("prompt for {model} has {tokens} tokens, exceeding the {limit} token context window")]
    PromptTooLarge {
        /// Model the prompt was built for.
        model: String,
        /// Token count of the prompt.
        tokens: usize,
        /// Context window of the model.
        limit: usize,
    },
}

/// A single-turn completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model identifier understood by the provider.
    pub model: String,
    /// Optional system instruction.
    pub system: Option<String>,
    /// User prompt.
    pub prompt: String,
}

impl ChatRequest {
    /// Request with no system instruction.
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            prompt: prompt.into(),
        }
    }

    /// Attach a system instruction.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Interface implemented by chat completion providers.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate a completion for `request`.
    async fn complete(&self, request: ChatRequest) -> Result<String, ChatModelError>;
}

/// Build the chat model selected by configuration.
pub fn get_chat_model(config: &Config) -> Result<Arc<dyn ChatModel>, ConfigError> {
    tracing::debug!(provider = ?config.chat_provider, "Building chat model");
    let model: Arc<dyn ChatModel> = match config.chat_provider {
        ChatProvider::OpenAI => Arc::new(OpenAiChatModel::new(
            config.openai_base_url.clone(),
            config.require_openai_api_key()?.to_string(),
        )),
        ChatProvider::Ollama => Arc::new(OllamaChatModel::new(config.ollama_url.clone())),
    };
    Ok(model)
}

/// OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChatModel {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiChatModel {
    /// Client for `base_url` (for example `https://api.openai.com/v1`).
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            http: http_client("docqa/chat"),
            base_url,
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, request: ChatRequest) -> Result<String, ChatModelError> {
        let mut full_prompt = request.system.clone().unwrap_or_default();
        full_prompt.push_str(&request.prompt);
        let tokens = prompts::ensure_prompt_fits(&request.model, &full_prompt)?;
        tracing::debug!(model = %request.model, tokens, "Requesting OpenAI completion");

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": request.model,
                "messages": messages,
                "temperature": 0.0,
            }))
            .send()
            .await
            .map_err(|error| {
                ChatModelError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.endpoint()
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatModelError::GenerationFailed(format!(
                "OpenAI returned {status}: {body}"
            )));
        }

        let body: OpenAiChatResponse = response.json().await.map_err(|error| {
            ChatModelError::InvalidResponse(format!("failed to decode response: {error}"))
        })?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| ChatModelError::InvalidResponse("response had no content".into()))
    }
}

/// Ollama `/api/generate` endpoint.
pub struct OllamaChatModel {
    http: Client,
    base_url: String,
}

impl OllamaChatModel {
    /// Client for the Ollama runtime at `base_url`.
    pub fn new(base_url: String) -> Self {
        Self {
            http: http_client("docqa/chat"),
            base_url,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl ChatModel for OllamaChatModel {
    async fn complete(&self, request: ChatRequest) -> Result<String, ChatModelError> {
        let mut payload = json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": false,
            "options": { "temperature": 0.0 }
        });
        if let (Some(system), Some(object)) = (&request.system, payload.as_object_mut()) {
            object.insert("system".into(), json!(system));
        }

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                ChatModelError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ChatModelError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatModelError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            ChatModelError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(ChatModelError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}

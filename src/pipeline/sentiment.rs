//! Single-word sentiment classification.

use crate::error::{ProcessingError, ResultExt};
use crate::llm::prompts::{SENTIMENT_SYSTEM, sentiment_prompt};
use crate::llm::{ChatModel, ChatModelError, ChatRequest};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sentiment label returned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentiment {
    /// Favourable tone.
    Positive,
    /// Neither favourable nor unfavourable.
    Neutral,
    /// Unfavourable tone.
    Negative,
}

impl FromStr for Sentiment {
    type Err = ChatModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let word = s
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_ascii_lowercase();
        match word.as_str() {
            "positive" => Ok(Self::Positive),
            "neutral" => Ok(Self::Neutral),
            "negative" => Ok(Self::Negative),
            _ => Err(ChatModelError::InvalidResponse(format!(
                "expected Positive, Neutral or Negative, got {s:?}"
            ))),
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Positive => "Positive",
            Self::Neutral => "Neutral",
            Self::Negative => "Negative",
        };
        f.write_str(label)
    }
}

/// Classifies free text with a chat model.
pub struct SentimentAnalyzer<'a> {
    chat: &'a dyn ChatModel,
    model: &'a str,
}

impl<'a> SentimentAnalyzer<'a> {
    /// Analyzer using `model` on `chat`.
    pub fn new(chat: &'a dyn ChatModel, model: &'a str) -> Self {
        Self { chat, model }
    }

    /// Classify `text`.
    pub async fn analyze(&self, text: &str) -> Result<Sentiment, ProcessingError> {
        let request =
            ChatRequest::new(self.model, sentiment_prompt(text)).with_system(SENTIMENT_SYSTEM);
        let reply = self
            .chat
            .complete(request)
            .await
            .context("failed to classify sentiment")?;
        let sentiment = reply
            .parse::<Sentiment>()
            .context("failed to classify sentiment")?;
        tracing::debug!(%sentiment, "Classified sentiment");
        Ok(sentiment)
    }
}

//! Prompt templates and token budgeting.

use super::ChatModelError;
use tiktoken_rs::CoreBPE;

/// System instruction for sentiment classification.
pub const SENTIMENT_SYSTEM: &str = "You are a bot who will do sentiment analysis";

/// Fill the question-answering template.
pub fn qa_prompt(question: &str, context: &str) -> String {
    format!(
        "You are an assistant for question-answering tasks.\n\
         The information in the context might be scattered or unstructured.\n\
         Reorganize the context as needed to provide a clear and direct answer to the question.\n\
         If the necessary information is not available, say that you don't know.\n\
         Focus on accuracy and do not summarize unnecessarily.\n\
         \n\
         Question: {question}\n\
         \n\
         Context: {context}\n\
         \n\
         Answer:"
    )
}

/// Fill the single-call summary template.
pub fn summary_prompt(text: &str) -> String {
    format!("Write a concise summary of the following:\n\n\n\"{text}\"\n\n\nCONCISE SUMMARY:")
}

/// Ask for a single-word sentiment label.
pub fn sentiment_prompt(text: &str) -> String {
    format!(
        "Classify the sentiment of the following text. \
         Answer with exactly one word: Positive, Neutral or Negative.\n\nText: {text}"
    )
}

/// Count tokens with the model's tokenizer, falling back to `cl100k_base`.
pub fn count_tokens(model: &str, text: &str) -> Result<usize, ChatModelError> {
    Ok(tokenizer(model)?.encode_with_special_tokens(text).len())
}

/// Context window for `model` as known to the tokenizer tables.
pub fn context_window(model: &str) -> usize {
    tiktoken_rs::model::get_context_size(model)
}

/// Return the prompt's token count, or `PromptTooLarge` when it exceeds the context window.
pub fn ensure_prompt_fits(model: &str, prompt: &str) -> Result<usize, ChatModelError> {
    let tokens = count_tokens(model, prompt)?;
    let limit = context_window(model);
    if tokens > limit {
        return Err(ChatModelError::PromptTooLarge {
            model: model.to_string(),
            tokens,
            limit,
        });
    }
    Ok(tokens)
}

fn tokenizer(model: &str) -> Result<CoreBPE, ChatModelError> {
    tiktoken_rs::get_bpe_from_model(model)
        .or_else(|_| tiktoken_rs::cl100k_base())
        .map_err(|err| ChatModelError::InvalidResponse(format!("tokenizer unavailable: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qa_prompt_places_question_and_context() {
        let prompt = qa_prompt("What is the total?", "Invoice total 42");
        assert!(prompt.starts_with("You are an assistant for question-answering tasks.\n"));
        assert!(prompt.contains("\n\nQuestion: What is the total?\n\nContext: Invoice total 42\n\nAnswer:"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn summary_prompt_quotes_the_text() {
        assert_eq!(
            summary_prompt("abc"),
            "Write a concise summary of the following:\n\n\n\"abc\"\n\n\nCONCISE SUMMARY:"
        );
    }

    #[test]
    fn unknown_models_fall_back_to_cl100k() {
        let tokens = count_tokens("llama3-local", "hello world").unwrap();
        assert!(tokens > 0);
    }

    #[test]
    fn small_prompts_fit() {
        let tokens = ensure_prompt_fits("gpt-3.5-turbo", "Write a concise summary").unwrap();
        assert!(tokens < 16);
    }
}

//! LLM integration: the text-in/text-out boundary to the hosted model.
//!
//! - [`ChatModel`] is the provider seam: one `generate(system_instruction, text)` call.
//! - [`GeminiClient`] implements it against the Gemini REST API.
//! - [`ModelAdapter`] binds a shared model to one system prompt for a single turn.
//!
//! The model is stateless from our side: only the latest user text is sent,
//! never the transcript.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

mod gemini;

pub use gemini::GeminiClient;

/// Every way a model call can fail.
///
/// The `Display` text is what users see after the `"Error: "` prefix.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider answered with a non-success status.
    #[error("{status} {message}")]
    Api { status: u16, message: String },

    /// The request never produced an HTTP response (DNS, TLS, timeout, ...).
    #[error("request to the model provider failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("could not decode the model response: {0}")]
    Decode(String),

    /// A well-formed response with no text, e.g. a safety block.
    #[error("the model returned no text{}", reason_suffix(.reason))]
    EmptyResponse { reason: Option<String> },

    /// Failures from other [`ChatModel`] implementations.
    #[error("{0}")]
    Other(String),
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(" (reason: {r})"))
        .unwrap_or_default()
}

impl LlmError {
    /// The assistant-message text for a failed turn: `"Error: <message>"`.
    pub fn to_reply(&self) -> String {
        format!("Error: {self}")
    }
}

/// A hosted text-generation model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier, for logs.
    fn name(&self) -> &str;

    /// Completes `text` under `system_instruction`, returning the text verbatim.
    ///
    /// Only the latest user text is sent; implementations keep no history.
    ///
    /// # Errors
    ///
    /// Any [`LlmError`]: the provider rejected the call, the transport failed,
    /// or the response carried no text.
    async fn generate(&self, system_instruction: &str, text: &str) -> Result<String, LlmError>;
}

/// A [`ChatModel`] bound to the system prompt in force for one turn.
///
/// Built fresh for every turn from the session's current prompt, so a prompt
/// edit applies to the very next message. Construction is a pointer clone and
/// a string copy; the underlying HTTP client is shared.
#[derive(Clone)]
pub struct ModelAdapter {
    model: Arc<dyn ChatModel>,
    system_instruction: String,
}

impl ModelAdapter {
    /// Binds `model` to `system_instruction` for one turn.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use std::sync::Arc;
    ///
    /// use wellbeing_chat::llm::{GeminiClient, ModelAdapter};
    ///
    /// # async fn demo() -> Result<(), wellbeing_chat::llm::LlmError> {
    /// let model = Arc::new(GeminiClient::new("key"));
    /// let adapter = ModelAdapter::new(model, "You are a well-being officer.");
    /// let reply = adapter.generate("I can't sleep after night shifts").await?;
    /// println!("{reply}");
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(model: Arc<dyn ChatModel>, system_instruction: impl Into<String>) -> Self {
        Self {
            model,
            system_instruction: system_instruction.into(),
        }
    }

    /// Name of the bound model, for logs.
    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Sends `text` to the model. Errors are returned, not stringified; the
    /// caller decides how a failure is shown.
    ///
    /// # Errors
    ///
    /// Whatever the bound [`ChatModel`] reports.
    pub async fn generate(&self, text: &str) -> Result<String, LlmError> {
        self.model.generate(&self.system_instruction, text).await
    }
}

impl std::fmt::Debug for ModelAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelAdapter")
            .field("model", &self.model.name())
            .field("system_instruction", &self.system_instruction)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Echo {
        seen: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ChatModel for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, system_instruction: &str, text: &str) -> Result<String, LlmError> {
            self.seen
                .lock()
                .unwrap()
                .push((system_instruction.to_owned(), text.to_owned()));
            Ok(format!("{system_instruction}|{text}"))
        }
    }

    #[tokio::test]
    async fn adapter_passes_bound_prompt_and_raw_text() {
        let echo = Arc::new(Echo {
            seen: Mutex::new(Vec::new()),
        });
        let adapter = ModelAdapter::new(echo.clone(), "be calm");
        assert_eq!(adapter.generate("  hi  ").await.unwrap(), "be calm|  hi  ");
        assert_eq!(
            echo.seen.lock().unwrap().as_slice(),
            &[("be calm".to_owned(), "  hi  ".to_owned())]
        );
        assert_eq!(adapter.model_name(), "echo");
    }

    #[test]
    fn error_replies_carry_prefix() {
        let api = LlmError::Api {
            status: 429,
            message: "Resource has been exhausted".into(),
        };
        assert_eq!(api.to_reply(), "Error: 429 Resource has been exhausted");

        let other = LlmError::Other("boom".into());
        assert_eq!(other.to_reply(), "Error: boom");
    }

    #[test]
    fn empty_response_mentions_reason_when_known() {
        let blocked = LlmError::EmptyResponse {
            reason: Some("SAFETY".into()),
        };
        assert_eq!(blocked.to_string(), "the model returned no text (reason: SAFETY)");
        let bare = LlmError::EmptyResponse { reason: None };
        assert_eq!(bare.to_string(), "the model returned no text");
    }
}

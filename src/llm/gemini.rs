//! Gemini REST client (`models/{model}:generateContent`).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatModel, LlmError};
use crate::config::{DEFAULT_BASE_URL, DEFAULT_MODEL, GeminiConfig};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// [`ChatModel`] backed by the hosted Gemini API.
///
/// The key travels in a header rather than the query string so that it never
/// shows up in transport error messages, which end up in the transcript.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    /// A client for the default model and endpoint, without a request timeout.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_owned(),
            base_url: DEFAULT_BASE_URL.to_owned(),
        }
    }

    /// Builds a client from validated configuration.
    ///
    /// The configured request timeout, if any, applies to each whole call.
    ///
    /// # Errors
    ///
    /// [`LlmError::Transport`] if the HTTP client cannot be initialized
    /// (for instance when the TLS backend fails to load its root store).
    pub fn from_config(config: &GeminiConfig) -> Result<Self, LlmError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(LlmError::Transport)?;
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.clone(),
        })
    }

    /// Targets another model, e.g. `"gemini-1.5-flash"`.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sends requests to another endpoint root. A trailing `/` is ignored.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, system_instruction: &str, text: &str) -> Result<String, LlmError> {
        let body = GenerateContentRequest::new(system_instruction, text);
        debug!(model = %self.model, chars = text.len(), "calling generateContent");

        let response = self
            .http
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(LlmError::Transport)?;

        let status = response.status();
        let raw = response.text().await.map_err(LlmError::Transport)?;

        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_message(&raw),
            });
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&raw).map_err(|e| LlmError::Decode(e.to_string()))?;
        parsed.into_text()
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction<'a>>,
}

impl<'a> GenerateContentRequest<'a> {
    fn new(system_instruction: &'a str, text: &'a str) -> Self {
        let system_instruction = (!system_instruction.trim().is_empty()).then(|| SystemInstruction {
            parts: [Part {
                text: system_instruction,
            }],
        });
        Self {
            contents: [Content {
                role: "user",
                parts: [Part { text }],
            }],
            system_instruction,
        }
    }
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct SystemInstruction<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Joins the text parts of the first candidate.
    fn into_text(self) -> Result<String, LlmError> {
        let block_reason = self.prompt_feedback.and_then(|f| f.block_reason);
        let Some(candidate) = self.candidates.into_iter().next() else {
            return Err(LlmError::EmptyResponse {
                reason: block_reason,
            });
        };

        let texts: Vec<String> = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if texts.is_empty() {
            return Err(LlmError::EmptyResponse {
                reason: candidate.finish_reason.or(block_reason),
            });
        }
        Ok(texts.concat())
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// The provider's `error.message`, or the raw body when it is not the usual envelope.
fn error_message(raw: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(raw)
        .ok()
        .and_then(|e| e.error.message)
        .unwrap_or_else(|| raw.trim().to_owned())
}

//! Chat-completion adapter used for answer synthesis.
//!
//! Responses are surfaced as [`ModelOutput`] so callers never inspect raw JSON shapes: a
//! completion whose content is a JSON object with a `result` key becomes
//! [`ModelOutput::Structured`], a missing content field becomes a structured output carrying
//! the refusal text (if any), and anything else is [`ModelOutput::Text`].

use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

/// Errors surfaced while requesting a completion.
#[derive(Debug, Error)]
pub enum LanguageModelError {
    /// No API credential is configured.
    #[error("Missing API credential: set OPENAI_API_KEY")]
    MissingCredential,
    /// Provider rejected the configured credential.
    #[error("Language model rejected the API credential: {0}")]
    InvalidCredential(String),
    /// Provider could not be reached.
    #[error("Language model unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Prompt sent to the language model.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Optional system instruction.
    pub system: Option<String>,
    /// User prompt.
    pub prompt: String,
}

/// Mapping-shaped completion carrying an optional `result` field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuredResult {
    /// Answer text, when the model produced one.
    pub result: Option<String>,
}

/// Completion returned by a [`LanguageModel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelOutput {
    /// Mapping-shaped output.
    Structured(StructuredResult),
    /// Plain message content.
    Text(String),
}

impl ModelOutput {
    /// Non-blank answer text carried by this output, trimmed.
    pub fn answer_text(&self) -> Option<&str> {
        let text = match self {
            Self::Structured(structured) => structured.result.as_deref(),
            Self::Text(text) => Some(text.as_str()),
        };
        text.map(str::trim).filter(|text| !text.is_empty())
    }

    /// Interpret raw message content and an optional refusal.
    pub fn from_message(content: Option<String>, refusal: Option<String>) -> Self {
        let Some(content) = content else {
            return Self::Structured(StructuredResult { result: refusal });
        };

        if content.trim_start().starts_with('{')
            && let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&content)
            && let Some(result) = map.get("result")
        {
            let result = match result {
                Value::Null => None,
                Value::String(text) => Some(text.clone()),
                other => Some(other.to_string()),
            };
            return Self::Structured(StructuredResult { result });
        }

        Self::Text(content)
    }
}

/// Interface implemented by chat-completion providers.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier, used for logging.
    fn model(&self) -> &str;

    /// Request a single completion.
    async fn complete(&self, request: CompletionRequest)
    -> Result<ModelOutput, LanguageModelError>;
}

/// Chat client for `/chat/completions` on an OpenAI-compatible API.
pub struct OpenAiChatClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl OpenAiChatClient {
    /// Construct a client from the startup configuration.
    pub fn new(config: &Config) -> Result<Self, LanguageModelError> {
        let http = Client::builder()
            .user_agent("pdfqa/chat")
            .build()
            .map_err(|error| LanguageModelError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url: config.openai_base_url.clone(),
            api_key: config.openai_api_key.clone(),
            model: config.chat_model.clone(),
            temperature: config.chat_temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[async_trait]
impl LanguageModel for OpenAiChatClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<ModelOutput, LanguageModelError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(LanguageModelError::MissingCredential)?;

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));

        let payload = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": messages,
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                LanguageModelError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.base_url
                ))
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(LanguageModelError::InvalidCredential(format!(
                "{status}: {body}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LanguageModelError::GenerationFailed(format!(
                "provider returned {status}: {body}"
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|error| {
            LanguageModelError::InvalidResponse(format!("failed to decode response: {error}"))
        })?;

        let choice = body.choices.into_iter().next().ok_or_else(|| {
            LanguageModelError::InvalidResponse("response contained no choices".into())
        })?;

        Ok(ModelOutput::from_message(
            choice.message.content,
            choice.message.refusal,
        ))
    }
}

//! [`LlmDriver`] – OpenAI-compatible reasoning backend.
//!
//! Talks to any server exposing `/v1/chat/completions` (OpenAI, vLLM, Ollama,
//! DashScope compatible mode, ...).  The wire plan schema is generated with
//! `schemars` and sent as `response_format` so servers that support
//! structured output return a parseable plan.
//!
//! # Example
//!
//! ```rust,no_run
//! use embodia_runtime::llm_driver::LlmDriver;
//!
//! let driver = LlmDriver::new("http://localhost:11434", "qwen2.5-vl").with_api_key("sk-...");
//! // driver.complete(preamble, &turns).await requires a live server.
//! ```

use async_trait::async_trait;
use embodia_types::ConversationTurn;
use schemars::schema_for;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::backend::{ReasoningBackend, with_preamble};
use crate::plan_codec::RawPlan;

/// Errors that can arise from reasoning backend calls.
#[derive(Error, Debug)]
pub enum LlmError {
    /// The HTTP request to the model server failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The response from the model server could not be parsed.
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire shapes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct JsonSchemaFormat {
    name: &'static str,
    schema: serde_json::Value,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ConversationTurn],
    stream: bool,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// JSON schema of the action plan the model must return.
pub fn plan_schema() -> serde_json::Value {
    serde_json::to_value(schema_for!(RawPlan)).unwrap_or(serde_json::Value::Null)
}

// ─────────────────────────────────────────────────────────────────────────────
// LlmDriver
// ─────────────────────────────────────────────────────────────────────────────

/// Async client for an OpenAI-compatible chat-completions endpoint.
///
/// Construct once and reuse across rounds.
pub struct LlmDriver {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl LlmDriver {
    /// Create a driver for `model` served at `base_url` (without the
    /// `/v1/...` suffix).
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            client: reqwest::Client::new(),
        }
    }

    /// Send `Authorization: Bearer <key>` with every request.  An empty key
    /// is ignored.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.api_key = (!key.is_empty()).then_some(key);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ReasoningBackend for LlmDriver {
    async fn complete(&self, preamble: &str, turns: &[ConversationTurn]) -> Result<String, LlmError> {
        let messages = with_preamble(preamble, turns);
        let body = ChatRequest {
            model: &self.model,
            messages: &messages,
            stream: false,
            response_format: ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: "action_plan",
                    schema: plan_schema(),
                },
            },
        };
        debug!(model = %self.model, turns = messages.len(), "requesting completion");

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response: ChatResponse = request.send().await?.error_for_status()?.json().await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::BadResponse("no message content in choices".into()))
    }
}

//! Chat-completions oracle boundary.
//!
//! The simulation only needs a synchronous request/response contract: submit
//! one prompt string, receive free text back. [`HttpOracle`] speaks the
//! OpenAI-compatible wire format (DeepSeek by default), including the
//! optional `reasoning_content` channel that reasoning models return
//! alongside regular content.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default API endpoint (OpenAI-compatible).
pub const DEFAULT_API_BASE: &str = "https://api.deepseek.com";
/// Default model identifier.
pub const DEFAULT_MODEL: &str = "deepseek-reasoner";

/// Connection and sampling configuration for the HTTP oracle.
#[derive(Clone, Debug)]
pub struct OracleConfig {
    /// Base URL of the chat-completions API.
    pub api_base: String,
    /// Bearer token.
    pub api_key: String,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Token budget; bounds reasoning length and latency.
    pub max_tokens: u32,
}

impl OracleConfig {
    /// Configuration with the default endpoint, model, and sampling settings.
    pub fn new(api_key: impl Into<String>) -> Self {
        OracleConfig {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 1.0,
            max_tokens: 1000,
        }
    }
}

/// Failures of a single oracle invocation. All of these are transient from
/// the pipeline's point of view: a retry re-prompts the oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    /// Could not reach the API (connect, DNS, timeout).
    #[error("oracle transport error: {0}")]
    Transport(String),
    /// The API answered with a non-success status.
    #[error("oracle API error {status}: {message}")]
    Api { status: u16, message: String },
    /// The response body did not match the expected shape.
    #[error("malformed oracle payload: {0}")]
    MalformedPayload(String),
}

/// One oracle reply: the primary content channel, the optional extended
/// reasoning channel, and the termination signal.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OracleReply {
    pub content: Option<String>,
    pub reasoning: Option<String>,
    pub finish_reason: Option<String>,
}

/// The external decision-making service. Object-safe so the orchestrator can
/// run against a scripted stand-in under test.
pub trait Oracle {
    /// Submit a prompt and wait for the reply.
    fn complete(&self, prompt: &str) -> Result<OracleReply, OracleError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    /// Extended thinking channel of reasoning models.
    #[serde(default)]
    reasoning_content: Option<String>,
}

/// Blocking chat-completions client.
pub struct HttpOracle {
    client: reqwest::blocking::Client,
    config: OracleConfig,
}

impl HttpOracle {
    /// Build a client. Generous timeout: reasoning models routinely think
    /// for tens of seconds.
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(180))
            .build()
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        Ok(HttpOracle { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        )
    }
}

impl Oracle for HttpOracle {
    fn complete(&self, prompt: &str) -> Result<OracleReply, OracleError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(OracleError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let decoded: ChatResponse = response
            .json()
            .map_err(|e| OracleError::MalformedPayload(e.to_string()))?;
        let choice = decoded
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| OracleError::MalformedPayload("no choices in response".to_string()))?;

        Ok(OracleReply {
            content: choice.message.content,
            reasoning: choice.message.reasoning_content,
            finish_reason: choice.finish_reason,
        })
    }
}

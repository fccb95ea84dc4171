//! Language model clients behind one object-safe trait.
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::{ModelConfig, Provider};
use crate::history::Role;
use crate::stream::{FinishReason, Usage};

mod anthropic;
mod openai;
mod sse;

#[cfg(test)]
pub mod scripted;

pub use anthropic::Anthropic;
pub use openai::OpenAiCompatible;

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    pub output: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    ToolCall(ToolCall),
    ToolResult(ToolResult),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelMessage {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl ModelMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            parts: vec![Part::Text(text.into())],
        }
    }
}

impl From<&crate::history::Message> for ModelMessage {
    fn from(m: &crate::history::Message) -> Self {
        Self {
            role: m.role,
            parts: vec![Part::Text(m.content.clone())],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the argument object.
    pub parameters: Value,
}

#[derive(Debug, Clone, Default)]
pub struct Request {
    pub system: String,
    pub messages: Vec<ModelMessage>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub parts: Vec<Part>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

impl Completion {
    /// All text parts joined together.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }
}

/// Anything that went wrong talking to the model. Fatal to the run that hit it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    Unconfigured(String),
    Network(String),
    RateLimited { retry_after: Option<u64> },
    Api { status: u16, body: String },
    Malformed(String),
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::Unconfigured(what) => write!(f, "model not configured: {what}"),
            ModelError::Network(e) => write!(f, "network error: {e}"),
            ModelError::RateLimited {
                retry_after: Some(secs),
            } => write!(f, "rate limited; retry after {secs}s"),
            ModelError::RateLimited { retry_after: None } => write!(f, "rate limited"),
            ModelError::Api { status, body } => write!(f, "model api error {status}: {body}"),
            ModelError::Malformed(e) => write!(f, "malformed model output: {e}"),
        }
    }
}

impl std::error::Error for ModelError {}

impl From<reqwest::Error> for ModelError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ModelError::Malformed(e.to_string())
        } else {
            ModelError::Network(e.to_string())
        }
    }
}

/// Object-safe model interface used by the engine.
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    /// `provider/model`, for logs.
    fn describe(&self) -> String;

    /// One non-streaming round, tools included.
    async fn complete(&self, request: &Request) -> Result<Completion, ModelError>;

    /// Text-only streaming round. Each text delta goes to `pieces` as it arrives;
    /// the returned completion carries the whole text and the usage.
    async fn stream(
        &self,
        request: &Request,
        pieces: UnboundedSender<String>,
    ) -> Result<Completion, ModelError>;
}

/// Shared, dynamically chosen model binding.
pub type Model = Arc<dyn LanguageModel>;

fn http_client() -> Result<reqwest::Client, ModelError> {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::USER_AGENT,
        reqwest::header::HeaderValue::from_static(concat!("remodel/", env!("CARGO_PKG_VERSION"))),
    );
    reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(15))
        .timeout(Duration::from_secs(300))
        .build()
        .map_err(|e| ModelError::Network(e.to_string()))
}

/// Turn a non-success HTTP status into the matching error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ModelError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        return Err(ModelError::RateLimited { retry_after });
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(ModelError::Api {
        status: status.as_u16(),
        body,
    })
}

/// Render a tool output the way providers expect tool results: plain text.
fn tool_output_text(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build the client for a configured provider.
pub fn connect(config: &ModelConfig) -> Result<Model, ModelError> {
    let api_key = config.api_key.clone().ok_or_else(|| {
        ModelError::Unconfigured(format!(
            "{} is not set for provider {}",
            config.provider.key_var(),
            config.provider
        ))
    })?;
    let client = http_client()?;
    let base_url = config
        .base_url
        .clone()
        .unwrap_or_else(|| config.provider.base_url().to_string());
    tracing::debug!(provider = %config.provider, model = %config.model, "llm: connecting");
    let model: Model = match config.provider {
        Provider::Anthropic => Arc::new(Anthropic::new(
            client,
            base_url,
            api_key,
            config.model.clone(),
        )),
        Provider::OpenAi | Provider::DeepSeek | Provider::Google | Provider::DeepInfra => {
            Arc::new(OpenAiCompatible::new(
                client,
                config.provider,
                base_url,
                api_key,
                config.model.clone(),
            ))
        }
    };
    Ok(model)
}

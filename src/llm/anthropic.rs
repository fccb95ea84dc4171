//! Anthropic Messages API.
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use super::sse::SseDecoder;
use super::{
    Completion, LanguageModel, ModelError, ModelMessage, Part, Request, ToolCall, check_status,
    tool_output_text,
};
use crate::history::Role;
use crate::stream::{FinishReason, Usage};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct Anthropic {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<Block>,
}

#[derive(Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    content: Vec<Block>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: Option<StreamMessage>,
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
}

fn finish_reason(stop_reason: Option<&str>) -> FinishReason {
    match stop_reason {
        Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        _ => FinishReason::Other,
    }
}

fn to_wire(messages: &[ModelMessage]) -> Vec<WireMessage> {
    messages
        .iter()
        .filter_map(|m| {
            let content: Vec<Block> = m
                .parts
                .iter()
                .filter_map(|part| match part {
                    // The API rejects empty text blocks.
                    Part::Text(text) if text.trim().is_empty() => None,
                    Part::Text(text) => Some(Block::Text { text: text.clone() }),
                    Part::ToolCall(call) => Some(Block::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.arguments.clone(),
                    }),
                    Part::ToolResult(result) => Some(Block::ToolResult {
                        tool_use_id: result.call_id.clone(),
                        content: tool_output_text(&result.output),
                        is_error: result.output.get("error").is_some(),
                    }),
                })
                .collect();
            if content.is_empty() {
                return None;
            }
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            Some(WireMessage { role, content })
        })
        .collect()
}

impl Anthropic {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String, model: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
            model,
        }
    }

    fn body<'a>(&'a self, request: &'a Request, stream: bool) -> WireRequest<'a> {
        let tools = if stream {
            Vec::new()
        } else {
            request
                .tools
                .iter()
                .map(|t| WireTool {
                    name: &t.name,
                    description: &t.description,
                    input_schema: &t.parameters,
                })
                .collect()
        };
        WireRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            system: &request.system,
            messages: to_wire(&request.messages),
            tools,
            stream,
        }
    }

    async fn post(&self, body: &WireRequest<'_>) -> Result<reqwest::Response, ModelError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url.trim_end_matches('/')))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await?;
        check_status(response).await
    }
}

#[async_trait::async_trait]
impl LanguageModel for Anthropic {
    fn describe(&self) -> String {
        format!("anthropic/{}", self.model)
    }

    async fn complete(&self, request: &Request) -> Result<Completion, ModelError> {
        let body = self.body(request, false);
        let response = self.post(&body).await?;
        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Malformed(e.to_string()))?;

        let parts = wire
            .content
            .into_iter()
            .filter_map(|block| match block {
                Block::Text { text } => Some(Part::Text(text)),
                Block::ToolUse { id, name, input } => Some(Part::ToolCall(ToolCall {
                    id,
                    name,
                    arguments: input,
                })),
                Block::ToolResult { .. } | Block::Unknown => None,
            })
            .collect();

        Ok(Completion {
            parts,
            finish_reason: finish_reason(wire.stop_reason.as_deref()),
            usage: Usage {
                prompt_tokens: wire.usage.input_tokens,
                completion_tokens: wire.usage.output_tokens,
            },
        })
    }

    async fn stream(
        &self,
        request: &Request,
        pieces: UnboundedSender<String>,
    ) -> Result<Completion, ModelError> {
        let body = self.body(request, true);
        let response = self.post(&body).await?;

        let mut bytes = response.bytes_stream();
        let mut decoder = SseDecoder::default();
        let mut text = String::new();
        let mut usage = Usage::default();
        let mut stop_reason: Option<String> = None;

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk?;
            for data in decoder.push(&chunk) {
                let event: StreamEvent = match serde_json::from_str(&data) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::debug!(%e, %data, "anthropic: skipping unparsable event");
                        continue;
                    }
                };
                match event.kind.as_str() {
                    "message_start" => {
                        if let Some(message) = event.message {
                            usage.prompt_tokens = message.usage.input_tokens;
                        }
                    }
                    "content_block_delta" => {
                        if let Some(piece) = event.delta.and_then(|d| d.text) {
                            text.push_str(&piece);
                            // Receiver gone means nobody is listening; keep collecting the text.
                            let _ = pieces.send(piece);
                        }
                    }
                    "message_delta" => {
                        if let Some(reason) = event.delta.and_then(|d| d.stop_reason) {
                            stop_reason = Some(reason);
                        }
                        if let Some(u) = event.usage {
                            usage.completion_tokens = u.output_tokens;
                        }
                    }
                    "error" => {
                        let body = event.error.map(|e| e.to_string()).unwrap_or_default();
                        return Err(ModelError::Api { status: 500, body });
                    }
                    _ => {}
                }
            }
        }

        Ok(Completion {
            parts: vec![Part::Text(text)],
            finish_reason: finish_reason(stop_reason.as_deref()),
            usage,
        })
    }
}

//! OpenAI-style Chat Completions, shared by every provider that speaks the same dialect.
use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedSender;

use super::sse::SseDecoder;
use super::{
    Completion, LanguageModel, ModelError, ModelMessage, Part, Request, ToolCall, check_status,
    tool_output_text,
};
use crate::config::Provider;
use crate::history::Role;
use crate::stream::{FinishReason, Usage};

pub struct OpenAiCompatible {
    client: reqwest::Client,
    provider: Provider,
    base_url: String,
    api_key: String,
    model: String,
}

fn finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("tool_calls") | Some("function_call") => FinishReason::ToolCalls,
        _ => FinishReason::Other,
    }
}

fn usage_of(value: &Value) -> Usage {
    let count = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_u64)
            .map(|n| n as u32)
            .unwrap_or(0)
    };
    Usage {
        prompt_tokens: count("prompt_tokens"),
        completion_tokens: count("completion_tokens"),
    }
}

/// Flatten our messages into the chat dialect: tool results become `tool` role messages.
fn to_wire(system: &str, messages: &[ModelMessage]) -> Vec<Value> {
    let mut out = Vec::new();
    if !system.is_empty() {
        out.push(json!({ "role": "system", "content": system }));
    }
    for message in messages {
        let mut text = String::new();
        let mut calls = Vec::new();
        for part in &message.parts {
            match part {
                Part::Text(t) => text.push_str(t),
                Part::ToolCall(call) => calls.push(json!({
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": call.arguments.to_string(),
                    },
                })),
                Part::ToolResult(result) => out.push(json!({
                    "role": "tool",
                    "tool_call_id": result.call_id,
                    "content": tool_output_text(&result.output),
                })),
            }
        }
        match message.role {
            Role::User if !text.is_empty() => {
                out.push(json!({ "role": "user", "content": text }));
            }
            Role::Assistant if !calls.is_empty() => {
                let content = if text.is_empty() {
                    Value::Null
                } else {
                    Value::String(text)
                };
                out.push(json!({ "role": "assistant", "content": content, "tool_calls": calls }));
            }
            Role::Assistant if !text.is_empty() => {
                out.push(json!({ "role": "assistant", "content": text }));
            }
            _ => {}
        }
    }
    out
}

/// Decode one `choices[0].message` into parts. Unparsable arguments are kept as a raw string
/// so the tool layer can report the shape error back to the model.
fn parse_message(message: &Value) -> Vec<Part> {
    let mut parts = Vec::new();
    if let Some(text) = message.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            parts.push(Part::Text(text.to_string()));
        }
    }
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let id = call
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let function = call.get("function").cloned().unwrap_or(Value::Null);
            let name = function
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let raw = function
                .get("arguments")
                .and_then(Value::as_str)
                .unwrap_or("{}");
            let arguments = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.into()));
            parts.push(Part::ToolCall(ToolCall {
                id,
                name,
                arguments,
            }));
        }
    }
    parts
}

impl OpenAiCompatible {
    pub fn new(
        client: reqwest::Client,
        provider: Provider,
        base_url: String,
        api_key: String,
        model: String,
    ) -> Self {
        Self {
            client,
            provider,
            base_url,
            api_key,
            model,
        }
    }

    fn body(&self, request: &Request, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "messages": to_wire(&request.system, &request.messages),
        });
        if stream {
            body["stream"] = Value::Bool(true);
            body["stream_options"] = json!({ "include_usage": true });
        } else if !request.tools.is_empty() {
            body["tools"] = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        },
                    })
                })
                .collect();
        }
        body
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, ModelError> {
        let response = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        check_status(response).await
    }
}

#[async_trait::async_trait]
impl LanguageModel for OpenAiCompatible {
    fn describe(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }

    async fn complete(&self, request: &Request) -> Result<Completion, ModelError> {
        let response = self.post(&self.body(request, false)).await?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| ModelError::Malformed(e.to_string()))?;

        let choice = value
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| ModelError::Malformed("response has no choices".into()))?;
        let message = choice.get("message").cloned().unwrap_or(Value::Null);

        Ok(Completion {
            parts: parse_message(&message),
            finish_reason: finish_reason(choice.get("finish_reason").and_then(Value::as_str)),
            usage: value.get("usage").map(usage_of).unwrap_or_default(),
        })
    }

    async fn stream(
        &self,
        request: &Request,
        pieces: UnboundedSender<String>,
    ) -> Result<Completion, ModelError> {
        let response = self.post(&self.body(request, true)).await?;

        let mut bytes = response.bytes_stream();
        let mut decoder = SseDecoder::default();
        let mut text = String::new();
        let mut usage = Usage::default();
        let mut reason: Option<String> = None;

        'outer: while let Some(chunk) = bytes.next().await {
            let chunk = chunk?;
            for data in decoder.push(&chunk) {
                if data == "[DONE]" {
                    break 'outer;
                }
                let event: Value = match serde_json::from_str(&data) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::debug!(%e, %data, "openai: skipping unparsable chunk");
                        continue;
                    }
                };
                if let Some(error) = event.get("error") {
                    return Err(ModelError::Api {
                        status: 500,
                        body: error.to_string(),
                    });
                }
                if let Some(u) = event.get("usage").filter(|u| !u.is_null()) {
                    usage = usage_of(u);
                }
                let Some(choice) = event.get("choices").and_then(|c| c.get(0)) else {
                    continue;
                };
                if let Some(piece) = choice
                    .get("delta")
                    .and_then(|d| d.get("content"))
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                {
                    text.push_str(piece);
                    let _ = pieces.send(piece.to_string());
                }
                if let Some(r) = choice.get("finish_reason").and_then(Value::as_str) {
                    reason = Some(r.to_string());
                }
            }
        }

        Ok(Completion {
            parts: vec![Part::Text(text)],
            finish_reason: finish_reason(reason.as_deref()),
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolResult;

    #[test]
    fn tool_results_become_tool_messages() {
        let messages = vec![
            ModelMessage::user("add a footer"),
            ModelMessage {
                role: Role::Assistant,
                parts: vec![Part::ToolCall(ToolCall {
                    id: "call_1".into(),
                    name: "readFiles".into(),
                    arguments: json!({ "paths": ["src/App.tsx"] }),
                })],
            },
            ModelMessage {
                role: Role::User,
                parts: vec![Part::ToolResult(ToolResult {
                    call_id: "call_1".into(),
                    name: "readFiles".into(),
                    output: json!({ "src/App.tsx": "x" }),
                })],
            },
        ];
        let wire = to_wire("be brief", &messages);
        assert_eq!(wire.len(), 4);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[2]["content"], Value::Null);
        assert_eq!(
            wire[2]["tool_calls"][0]["function"]["arguments"],
            "{\"paths\":[\"src/App.tsx\"]}"
        );
        assert_eq!(wire[3]["role"], "tool");
        assert_eq!(wire[3]["tool_call_id"], "call_1");
    }

    #[test]
    fn bad_arguments_survive_as_string() {
        let parts = parse_message(&json!({
            "content": null,
            "tool_calls": [{
                "id": "c",
                "type": "function",
                "function": { "name": "updateFiles", "arguments": "{not json" }
            }]
        }));
        match &parts[..] {
            [Part::ToolCall(call)] => {
                assert_eq!(call.name, "updateFiles");
                assert_eq!(call.arguments, Value::String("{not json".into()));
            }
            other => panic!("unexpected parts {other:?}"),
        }
    }

    #[test]
    fn finish_reasons_map() {
        assert_eq!(finish_reason(Some("stop")), FinishReason::Stop);
        assert_eq!(finish_reason(Some("tool_calls")), FinishReason::ToolCalls);
        assert_eq!(finish_reason(Some("length")), FinishReason::Length);
        assert_eq!(finish_reason(None), FinishReason::Other);
    }
}

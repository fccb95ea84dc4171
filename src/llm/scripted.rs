//! In-memory model that replays canned replies, for tests.
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use super::{Completion, LanguageModel, ModelError, Part, Request, ToolCall};
use crate::stream::{FinishReason, Usage};

pub struct ScriptedModel {
    name: String,
    completions: Mutex<VecDeque<Result<Completion, ModelError>>>,
    streams: Mutex<VecDeque<Result<String, ModelError>>>,
    seen: Mutex<Vec<Request>>,
}

fn usage() -> Usage {
    Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
    }
}

impl ScriptedModel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            completions: Mutex::new(VecDeque::new()),
            streams: Mutex::new(VecDeque::new()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Queue a plain text completion.
    pub fn text(self, text: &str) -> Self {
        self.push(Ok(Completion {
            parts: vec![Part::Text(text.to_string())],
            finish_reason: FinishReason::Stop,
            usage: usage(),
        }))
    }

    /// Queue a completion that asks for tool calls, optionally preceded by text.
    pub fn tools(self, text: &str, calls: &[(&str, Value)]) -> Self {
        let mut parts = Vec::new();
        if !text.is_empty() {
            parts.push(Part::Text(text.to_string()));
        }
        for (i, (name, arguments)) in calls.iter().enumerate() {
            parts.push(Part::ToolCall(ToolCall {
                id: format!("call_{i}"),
                name: name.to_string(),
                arguments: arguments.clone(),
            }));
        }
        self.push(Ok(Completion {
            parts,
            finish_reason: FinishReason::ToolCalls,
            usage: usage(),
        }))
    }

    pub fn fail(self, error: ModelError) -> Self {
        self.push(Err(error))
    }

    /// Queue a streamed text reply.
    pub fn streamed(self, text: &str) -> Self {
        if let Ok(mut q) = self.streams.lock() {
            q.push_back(Ok(text.to_string()));
        }
        self
    }

    pub fn stream_fail(self, error: ModelError) -> Self {
        if let Ok(mut q) = self.streams.lock() {
            q.push_back(Err(error));
        }
        self
    }

    fn push(self, reply: Result<Completion, ModelError>) -> Self {
        if let Ok(mut q) = self.completions.lock() {
            q.push_back(reply);
        }
        self
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<Request> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn record(&self, request: &Request) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(request.clone());
        }
    }
}

#[async_trait::async_trait]
impl LanguageModel for ScriptedModel {
    fn describe(&self) -> String {
        format!("scripted/{}", self.name)
    }

    async fn complete(&self, request: &Request) -> Result<Completion, ModelError> {
        self.record(request);
        let next = self.completions.lock().ok().and_then(|mut q| q.pop_front());
        next.unwrap_or_else(|| Err(ModelError::Malformed(format!("{}: script exhausted", self.name))))
    }

    async fn stream(
        &self,
        request: &Request,
        pieces: UnboundedSender<String>,
    ) -> Result<Completion, ModelError> {
        self.record(request);
        let next = self.streams.lock().ok().and_then(|mut q| q.pop_front());
        let text = next.unwrap_or_else(|| {
            Err(ModelError::Malformed(format!("{}: stream script exhausted", self.name)))
        })?;
        for piece in crate::stream::chunks(&text, 5) {
            let _ = pieces.send(piece.to_string());
            tokio::task::yield_now().await;
        }
        Ok(Completion {
            parts: vec![Part::Text(text)],
            finish_reason: FinishReason::Stop,
            usage: usage(),
        })
    }
}

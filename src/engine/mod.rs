//! Orchestration of one change request: classify, acknowledge, edit, conclude.
//!
//! The engine owns no state between runs. Each run works on its own copy of the
//! project tree; the copy is handed back only when every phase succeeded.
use eyre::Result;
use serde_json::Value;
use tokio::sync::mpsc::unbounded_channel;

use crate::config::{EngineConfig, Settings};
use crate::history::{self, Message};
use crate::llm::{self, LanguageModel, Model, ModelError, ModelMessage, Request};
use crate::logging::timed;
use crate::prompting;
use crate::stream::{Sink, Usage};
use crate::tools::{Workspace, respond};
use crate::tree::FileSystemTree;

pub mod agent;
pub mod classify;

pub use classify::Complexity;

#[derive(Debug, Clone)]
pub struct ChangeRequest {
    /// Conversation before the prompt, oldest first.
    pub history: Vec<Message>,
    pub prompt: String,
    /// The run's own copy of the current project files.
    pub files: FileSystemTree,
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub files: FileSystemTree,
    /// Preliminary, per-step and concluding text in emission order.
    pub commentary: Vec<String>,
    pub complexity: Complexity,
    pub steps: usize,
    pub usage: Usage,
}

impl Outcome {
    pub fn explanation(&self) -> String {
        history::join_commentary(&self.commentary)
    }
}

pub struct Engine {
    base: Model,
    complex: Model,
    config: EngineConfig,
}

impl Engine {
    pub fn new(base: Model, complex: Model, config: EngineConfig) -> Self {
        Self {
            base,
            complex,
            config,
        }
    }

    pub fn from_settings(settings: &Settings) -> std::result::Result<Self, ModelError> {
        let base = llm::connect(&settings.base)?;
        let complex = llm::connect(&settings.complex)?;
        Ok(Self::new(base, complex, settings.engine.clone()))
    }

    pub fn base_model(&self) -> &Model {
        &self.base
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one change request, streaming progress into `sink`.
    ///
    /// On failure the stream gets an error frame and the returned error carries the
    /// cause; whatever the run did to its tree is dropped with it.
    pub async fn run(&self, request: ChangeRequest, sink: &Sink) -> Result<Outcome> {
        match self.drive(request, sink).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(error = %e, "engine: run failed");
                sink.fail(&e.to_string());
                Err(e)
            }
        }
    }

    async fn drive(&self, request: ChangeRequest, sink: &Sink) -> Result<Outcome> {
        let ChangeRequest {
            history,
            prompt,
            files,
        } = request;
        tracing::info!(
            history = history.len(),
            files = files.paths().len(),
            "engine: change request"
        );

        let (complexity, preliminary) = tokio::join!(
            self.complexity(&history, &prompt),
            timed("preliminary", self.preliminary(&history, &prompt, sink)),
        );
        let (preliminary, mut usage) = preliminary?;

        let model = match complexity {
            Complexity::Base => &self.base,
            Complexity::Complex => {
                tracing::info!(model = %self.complex.describe(), "engine: switching to complex model");
                &self.complex
            }
        };

        let ws = Workspace::new(files, sink.clone(), self.config.chunk_chars);
        let agent = timed(
            "agent loop",
            agent::run_loop(
                model.as_ref(),
                &ws,
                &history,
                &prompt,
                self.config.max_steps,
                self.config.agent_max_tokens,
            ),
        )
        .await?;
        usage += agent.usage;

        let (concluding, concluding_usage) =
            timed("concluding", self.conclude(&agent.updates)).await?;
        usage += concluding_usage;
        respond::emit_concluding(&ws, &concluding, concluding_usage);

        let mut commentary = Vec::with_capacity(agent.commentary.len() + 2);
        commentary.push(preliminary);
        commentary.extend(agent.commentary);
        commentary.extend(ws.take_remarks());

        let files = ws.snapshot().await;
        tracing::info!(
            %complexity,
            steps = agent.steps,
            exhausted = agent.exhausted,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "engine: run complete"
        );
        Ok(Outcome {
            files,
            commentary,
            complexity,
            steps: agent.steps,
            usage,
        })
    }

    async fn complexity(&self, history: &[Message], prompt: &str) -> Complexity {
        if !self.config.classify {
            return Complexity::Base;
        }
        classify::classify(
            self.base.as_ref(),
            history,
            prompt,
            self.config.classify_max_tokens,
        )
        .await
    }

    /// Stream a one or two sentence acknowledgement as its own turn.
    async fn preliminary(
        &self,
        history: &[Message],
        prompt: &str,
        sink: &Sink,
    ) -> std::result::Result<(String, Usage), ModelError> {
        let mut messages: Vec<ModelMessage> = history::recent(history, self.config.history_window)
            .iter()
            .map(ModelMessage::from)
            .collect();
        messages.push(ModelMessage::user(prompting::fill(
            prompting::PRELIMINARY_REQUEST,
            &[("prompt", prompt)],
        )));
        let request = Request {
            system: prompting::PRELIMINARY.to_string(),
            messages,
            tools: Vec::new(),
            max_tokens: self.config.preliminary_max_tokens,
        };

        let (piece_tx, mut piece_rx) = unbounded_channel::<String>();
        sink.start_turn();
        let forward = async {
            while let Some(piece) = piece_rx.recv().await {
                sink.text(&piece);
            }
        };
        let (completion, ()) = tokio::join!(self.base.stream(&request, piece_tx), forward);
        let completion = completion?;
        sink.close_turn(completion.usage, true);
        Ok((completion.text(), completion.usage))
    }

    /// Summarize what actually changed, from structured update results.
    pub async fn conclude(
        &self,
        updates: &[Value],
    ) -> std::result::Result<(String, Usage), ModelError> {
        let updates = serde_json::to_string(updates).unwrap_or_else(|_| "[]".to_string());
        let request = Request {
            system: prompting::CONCLUDING.to_string(),
            messages: vec![ModelMessage::user(prompting::fill(
                prompting::CONCLUDING_REQUEST,
                &[("updates", updates.as_str())],
            ))],
            tools: Vec::new(),
            max_tokens: self.config.concluding_max_tokens,
        };
        let completion = self.base.complete(&request).await?;
        Ok((completion.text().trim().to_string(), completion.usage))
    }
}

use serde_json::Value;
use std::sync::Arc;

use crate::history::{Message, Role};
use crate::llm::{LanguageModel, ModelError, ModelMessage, Part, Request, ToolResult};
use crate::logging::timed;
use crate::prompting;
use crate::stream::Usage;
use crate::tools::{self, Workspace};

/// What the tool-calling loop leaves behind besides the mutated tree.
#[derive(Debug, Default)]
pub struct AgentOutcome {
    /// Step text and tool-emitted remarks, in emission order.
    pub commentary: Vec<String>,
    /// Raw `updateFiles` outputs, in call order.
    pub updates: Vec<Value>,
    pub steps: usize,
    pub usage: Usage,
    /// The loop stopped because it ran out of steps, not because the model was done.
    pub exhausted: bool,
}

/// Run up to `max_steps` rounds of tool calling against `ws`.
///
/// Each round's tool results are appended to the transcript before the next round is
/// requested. Tool failures come back to the model as data; only model errors abort.
pub async fn run_loop(
    model: &dyn LanguageModel,
    ws: &Arc<Workspace>,
    history: &[Message],
    prompt: &str,
    max_steps: usize,
    max_tokens: u32,
) -> Result<AgentOutcome, ModelError> {
    let tools = tools::agent_tools(ws);
    let definitions = tools::definitions(&tools);

    let mut transcript: Vec<ModelMessage> = history.iter().map(ModelMessage::from).collect();
    transcript.push(ModelMessage::user(prompt));

    let mut out = AgentOutcome::default();
    for step in 1..=max_steps {
        let request = Request {
            system: prompting::AGENT.to_string(),
            messages: transcript.clone(),
            tools: definitions.clone(),
            max_tokens,
        };
        let completion = timed("agent step", model.complete(&request)).await?;
        out.steps = step;
        out.usage += completion.usage;

        let text = completion.text();
        if !text.trim().is_empty() {
            ws.sink
                .emit_turn(&text, ws.chunk_chars, completion.usage, true);
            out.commentary.push(text);
        }

        let calls: Vec<_> = completion.tool_calls().into_iter().cloned().collect();
        tracing::debug!(
            step,
            calls = calls.len(),
            finish = ?completion.finish_reason,
            "engine: agent step"
        );
        transcript.push(ModelMessage {
            role: Role::Assistant,
            parts: completion.parts,
        });
        if calls.is_empty() {
            return Ok(out);
        }

        // Calls of one step run in order; a later updateFiles sees an earlier one's edits.
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let output = match tools::invoke(&tools, &call.name, call.arguments.clone()).await {
                Ok(output) => output,
                Err(e) => {
                    tracing::warn!(tool = %call.name, "engine: model called an unknown tool");
                    serde_json::json!({ "error": e })
                }
            };
            if call.name == "updateFiles" {
                out.updates.push(output.clone());
            }
            results.push(Part::ToolResult(ToolResult {
                call_id: call.id,
                name: call.name,
                output,
            }));
        }
        out.commentary.extend(ws.take_remarks());
        transcript.push(ModelMessage {
            role: Role::User,
            parts: results,
        });
    }

    tracing::warn!(max_steps, "engine: step budget exhausted; keeping edits so far");
    out.exhausted = true;
    Ok(out)
}

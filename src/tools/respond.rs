use super::Workspace;
use super::common::{Param, ParamType};
use crate::stream::Usage;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct Args {
    text: String,
}

/// Tell the user what is about to happen. The run continues afterwards.
pub async fn call(ws: Arc<Workspace>, args: Args) -> serde_json::Value {
    emit_preliminary(&ws, &args.text);
    serde_json::json!({ "ok": true })
}

pub fn emit_preliminary(ws: &Workspace, text: &str) {
    ws.emit(text, Usage::default(), true);
}

/// Close the run's stream with the summary of what changed.
pub fn emit_concluding(ws: &Workspace, text: &str, usage: Usage) {
    ws.emit(text, usage, false);
}

pub fn spec() -> (&'static str, &'static str, Vec<Param>) {
    (
        "preliminaryResponse",
        "Briefly tell the user, in markdown, what changes you are about to make",
        vec![Param {
            name: "text",
            desc: "One or two sentences, no headers",
            param_type: ParamType::String,
            required: true,
        }],
    )
}

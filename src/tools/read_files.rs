use super::Workspace;
use super::common::{Param, ParamType};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct Args {
    paths: Vec<String>,
}

/// Read several files under one lock. A path that cannot be read maps to its error
/// message instead of failing the batch.
pub async fn call(ws: Arc<Workspace>, args: Args) -> serde_json::Value {
    let tree = ws.tree.lock().await;
    let mut out = serde_json::Map::new();
    for path in &args.paths {
        let value = match tree.read(path) {
            Ok(contents) => contents.to_string(),
            Err(e) => {
                tracing::debug!(%path, error = %e, "tools: readFiles miss");
                format!("Error: {e}")
            }
        };
        out.insert(path.clone(), serde_json::Value::String(value));
    }
    serde_json::Value::Object(out)
}

pub fn spec() -> (&'static str, &'static str, Vec<Param>) {
    (
        "readFiles",
        "Read the contents of one or more files from the project's current version",
        vec![Param {
            name: "paths",
            desc: "Project-relative file paths, e.g. src/App.tsx",
            param_type: ParamType::List(&ParamType::String),
            required: true,
        }],
    )
}

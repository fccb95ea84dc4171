use super::Workspace;
use super::common::{Param, ParamType};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct Args {
    /// Only paths starting with this prefix.
    #[serde(default)]
    path: Option<String>,
}

pub async fn call(ws: Arc<Workspace>, args: Args) -> serde_json::Value {
    let tree = ws.tree.lock().await;
    let prefix = args
        .path
        .as_deref()
        .map(|p| p.trim_start_matches("./").trim_matches('/'))
        .filter(|p| !p.is_empty() && *p != ".");
    let paths: Vec<String> = tree
        .paths()
        .into_iter()
        .filter(|path| match prefix {
            None => true,
            Some(prefix) => {
                path == prefix
                    || path
                        .strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        })
        .collect();
    tracing::debug!(count = paths.len(), ?prefix, "tools: listFiles");
    serde_json::json!(paths)
}

pub fn spec() -> (&'static str, &'static str, Vec<Param>) {
    (
        "listFiles",
        "List all files in the project's current version",
        vec![Param {
            name: "path",
            desc: "Optional directory to list; defaults to the whole project",
            param_type: ParamType::String,
            required: false,
        }],
    )
}

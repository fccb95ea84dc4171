//! Capabilities exposed to the model during an agent run.
//!
//! Every tool works against one run's [`Workspace`]: the cloned file tree and the
//! response stream. Nothing here touches persisted state.
use std::collections::HashMap;
use std::sync::Arc;

use crate::llm::ToolDefinition;
use crate::stream::{Sink, Usage};
use crate::tree::FileSystemTree;

pub mod common;
use self::common::{AsyncFn, Param, object_schema, with_args};

pub mod list_files;
pub mod read_files;
pub mod respond;
pub mod update_files;

pub use common::ValidationError;

/// Exposed tools are represented as a map keyed by function name.
pub type ExposedTools = HashMap<&'static str, (&'static str, AsyncFn, Vec<Param>)>;

/// State one run's tools operate on. Exclusively owned by that run.
pub struct Workspace {
    pub tree: tokio::sync::Mutex<FileSystemTree>,
    pub sink: Sink,
    pub chunk_chars: usize,
    /// Text the model pushed to the stream through a tool, in emission order.
    remarks: std::sync::Mutex<Vec<String>>,
}

impl Workspace {
    pub fn new(tree: FileSystemTree, sink: Sink, chunk_chars: usize) -> Arc<Self> {
        Arc::new(Self {
            tree: tokio::sync::Mutex::new(tree),
            sink,
            chunk_chars,
            remarks: std::sync::Mutex::new(Vec::new()),
        })
    }

    /// Stream `text` as a full turn and remember it as commentary.
    pub fn emit(&self, text: &str, usage: Usage, is_continued: bool) {
        self.sink
            .emit_turn(text, self.chunk_chars, usage, is_continued);
        self.lock_remarks().push(text.to_string());
    }

    /// Take the remarks recorded since the last call.
    pub fn take_remarks(&self) -> Vec<String> {
        std::mem::take(&mut *self.lock_remarks())
    }

    fn lock_remarks(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.remarks.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Hand back the tree once the run is over.
    pub async fn snapshot(&self) -> FileSystemTree {
        self.tree.lock().await.clone()
    }
}

/// Tools bound to `ws` for the agent loop.
pub fn agent_tools(ws: &Arc<Workspace>) -> ExposedTools {
    macro_rules! collect_tools {
      ($($module:ident),+ $(,)?) => {{
        let mut map: ExposedTools = HashMap::new();
        $(
            let (name, desc, params) = $module::spec();
            let bound = Arc::clone(ws);
            let call: AsyncFn = with_args::<$module::Args, _, _>(move |args| {
                $module::call(Arc::clone(&bound), args)
            });
            map.insert(name, (desc, call, params));
        )+
        map
      }};
    }

    collect_tools![list_files, read_files, update_files, respond]
}

/// Declarations handed to the model, sorted by name so requests are stable.
pub fn definitions(tools: &ExposedTools) -> Vec<ToolDefinition> {
    let mut defs: Vec<ToolDefinition> = tools
        .iter()
        .map(|(name, (desc, _, params))| ToolDefinition {
            name: (*name).to_string(),
            description: (*desc).to_string(),
            parameters: object_schema(params),
        })
        .collect();
    defs.sort_by(|a, b| a.name.cmp(&b.name));
    defs
}

pub async fn invoke(
    tools: &ExposedTools,
    name: &str,
    args: serde_json::Value,
) -> Result<serde_json::Value, String> {
    let Some((_, work, _)) = tools.get(name) else {
        return Err(format!("No such function: {name}"));
    };
    Ok(work(args).await)
}

#[cfg(test)]
mod tests;

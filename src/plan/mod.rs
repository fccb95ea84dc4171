//! Plan-then-apply: the model first plans edits for one file as structured data, then
//! each plan is executed by regenerating the whole file and formatting the result.
//!
//! A file that fails to regenerate or format keeps its previous contents and is reported
//! as `{ success: false, message }`; files already updated in the same run stay updated.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::llm::{LanguageModel, ModelError, ModelMessage, Request};
use crate::logging::timed;
use crate::patch::EditKind;
use crate::prompting;
use crate::tree::FileSystemTree;

pub mod format;

pub use format::{FormatError, Formatter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlan {
    pub file_path: String,
    pub updates: Vec<PlannedUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedUpdate {
    #[serde(rename = "type")]
    pub kind: EditKind,
    /// Absent only for removals.
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResult {
    pub success: bool,
    pub message: String,
}

#[derive(Debug)]
pub enum PlanError {
    Model(ModelError),
    /// The planner's reply held no JSON object.
    NoJson,
    Invalid(String),
}

impl std::fmt::Display for PlanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanError::Model(e) => write!(f, "{e}"),
            PlanError::NoJson => write!(f, "planner reply contained no JSON object"),
            PlanError::Invalid(e) => write!(f, "invalid update plan: {e}"),
        }
    }
}

impl std::error::Error for PlanError {}

impl From<ModelError> for PlanError {
    fn from(e: ModelError) -> Self {
        PlanError::Model(e)
    }
}

impl UpdatePlan {
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.file_path.trim().is_empty() {
            return Err(PlanError::Invalid("filePath is empty".into()));
        }
        for (i, update) in self.updates.iter().enumerate() {
            let has_code = update.code.as_deref().is_some_and(|c| !c.is_empty());
            if update.kind != EditKind::Removal && !has_code {
                return Err(PlanError::Invalid(format!(
                    "update {} ({}) has no code",
                    i + 1,
                    update.kind
                )));
            }
        }
        Ok(())
    }
}

/// Pull the JSON object out of a reply that may wrap it in prose or a code fence.
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let rest = &text[start + "```json".len()..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim());
        }
    }
    if let Some(start) = text.find("```") {
        let rest = &text[start + 3..];
        let rest = rest.split_once('\n').map_or(rest, |(_, body)| body);
        if let Some(end) = rest.find("```") {
            let inner = rest[..end].trim();
            if inner.starts_with('{') {
                return Some(inner);
            }
        }
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Contents of the first fenced block, or the whole reply when there is none.
pub fn strip_fences(text: &str) -> String {
    let Some(start) = text.find("```") else {
        return text.trim().to_string();
    };
    let rest = &text[start + 3..];
    // Skip the info string (`tsx`, `typescript`, ...).
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    match body.rfind("```") {
        Some(end) => body[..end].to_string(),
        None => body.to_string(),
    }
}

/// Phase A: ask for a plan for `path` given its current `contents`.
pub async fn plan(
    model: &dyn LanguageModel,
    objective: &str,
    path: &str,
    contents: &str,
    max_tokens: u32,
) -> Result<UpdatePlan, PlanError> {
    let request = Request {
        system: prompting::PLANNER.to_string(),
        messages: vec![ModelMessage::user(prompting::fill(
            prompting::PLANNER_REQUEST,
            &[("objective", objective), ("path", path), ("contents", contents)],
        ))],
        tools: Vec::new(),
        max_tokens,
    };
    let completion = timed("plan", model.complete(&request)).await?;
    let text = completion.text();
    let json = extract_json(&text).ok_or(PlanError::NoJson)?;
    let mut plan: UpdatePlan =
        serde_json::from_str(json).map_err(|e| PlanError::Invalid(e.to_string()))?;
    if plan.file_path.trim().is_empty() {
        plan.file_path = path.to_string();
    }
    plan.validate()?;
    tracing::info!(file = %plan.file_path, updates = plan.updates.len(), "plan: planned");
    Ok(plan)
}

/// Phase B for one file: regenerate, format, write. Never touches other files.
pub async fn apply_plan(
    model: &dyn LanguageModel,
    formatter: &Formatter,
    tree: &mut FileSystemTree,
    plan: &UpdatePlan,
    max_tokens: u32,
) -> FileResult {
    match rewrite(model, formatter, tree, plan, max_tokens).await {
        Ok(formatted) => match tree.write(&plan.file_path, formatted) {
            Ok(()) => FileResult {
                success: true,
                message: format!("applied {} planned updates", plan.updates.len()),
            },
            Err(e) => FileResult {
                success: false,
                message: e.to_string(),
            },
        },
        Err(message) => {
            tracing::warn!(file = %plan.file_path, %message, "plan: file update failed");
            FileResult {
                success: false,
                message,
            }
        }
    }
}

async fn rewrite(
    model: &dyn LanguageModel,
    formatter: &Formatter,
    tree: &FileSystemTree,
    plan: &UpdatePlan,
    max_tokens: u32,
) -> Result<String, String> {
    plan.validate().map_err(|e| e.to_string())?;
    // A planned file that does not exist yet starts out empty.
    let current = tree.read(&plan.file_path).unwrap_or_default();
    let updates = serde_json::to_string_pretty(&plan.updates).map_err(|e| e.to_string())?;
    let request = Request {
        system: prompting::REWRITE.to_string(),
        messages: vec![ModelMessage::user(prompting::fill(
            prompting::REWRITE_REQUEST,
            &[
                ("path", plan.file_path.as_str()),
                ("contents", current),
                ("updates", updates.as_str()),
            ],
        ))],
        tools: Vec::new(),
        max_tokens,
    };
    let completion = timed("rewrite", model.complete(&request))
        .await
        .map_err(|e| e.to_string())?;
    let source = strip_fences(&completion.text());
    if source.trim().is_empty() {
        return Err("model returned an empty file".to_string());
    }
    formatter
        .format(&plan.file_path, &source)
        .await
        .map_err(|e| e.to_string())
}

/// Phase B over several plans, in order. Each file's result is independent.
pub async fn execute(
    model: &dyn LanguageModel,
    formatter: &Formatter,
    tree: &mut FileSystemTree,
    plans: &[UpdatePlan],
    max_tokens: u32,
) -> IndexMap<String, FileResult> {
    let mut results = IndexMap::new();
    for plan in plans {
        let result = apply_plan(model, formatter, tree, plan, max_tokens).await;
        results.insert(plan.file_path.clone(), result);
    }
    results
}

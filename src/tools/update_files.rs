use super::Workspace;
use super::common::{Param, ParamType, ValidationError};
use crate::patch::{self, Edit, EditOperation};
use crate::tree::FileSystemTree;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
pub struct Args {
    updates: Vec<EditOperation>,
}

/// Outcome of one batch: new contents per updated file, a message per failed one.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReport {
    pub results: IndexMap<String, String>,
    pub errors: IndexMap<String, String>,
}

/// Apply a batch against `tree`.
///
/// The whole batch is shape-checked first; a malformed operation rejects it before
/// anything changes. Operations are then grouped by file and applied in array order.
/// A file whose edits cannot all be applied keeps its previous contents and is
/// reported in `errors`; other files are unaffected.
pub fn apply_updates(
    tree: &mut FileSystemTree,
    updates: &[EditOperation],
) -> Result<UpdateReport, ValidationError> {
    let mut per_file: IndexMap<&str, Vec<Edit>> = IndexMap::new();
    for (index, op) in updates.iter().enumerate() {
        let edit = op.to_edit().map_err(|e| ValidationError::Item {
            index,
            reason: e.to_string(),
        })?;
        per_file.entry(op.filepath.as_str()).or_default().push(edit);
    }

    let mut report = UpdateReport::default();
    for (path, edits) in per_file {
        let current = match tree.read(path) {
            Ok(contents) => contents,
            Err(e) => {
                report.errors.insert(path.to_string(), e.to_string());
                continue;
            }
        };

        for edit in &edits {
            let n = patch::occurrences(current, edit.anchor());
            if n > 1 {
                tracing::warn!(
                    %path,
                    occurrences = n,
                    kind = %edit.kind(),
                    "tools: ambiguous anchor, using first occurrence"
                );
            }
        }

        match patch::apply_all(current, &edits) {
            Ok(updated) => match tree.write(path, updated.clone()) {
                Ok(()) => {
                    report.results.insert(path.to_string(), updated);
                }
                Err(e) => {
                    report.errors.insert(path.to_string(), e.to_string());
                }
            },
            Err((index, e)) => {
                let kind = edits.get(index).map(Edit::kind);
                let message = match kind {
                    Some(kind) => format!("edit {} ({kind}) failed: {e}", index + 1),
                    None => e.to_string(),
                };
                report.errors.insert(path.to_string(), message);
            }
        }
    }
    Ok(report)
}

pub async fn call(ws: Arc<Workspace>, args: Args) -> serde_json::Value {
    let mut tree = ws.tree.lock().await;
    match apply_updates(&mut tree, &args.updates) {
        Ok(report) => {
            tracing::info!(
                updated = report.results.len(),
                failed = report.errors.len(),
                "tools: updateFiles"
            );
            serde_json::to_value(&report)
                .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }))
        }
        Err(e) => {
            tracing::info!(error = %e, "tools: updateFiles rejected");
            e.to_value()
        }
    }
}

static EDIT_FIELDS: [Param; 4] = [
    Param {
        name: "type",
        desc: "addition inserts newCode after oldCode; modification replaces oldCode; removal deletes oldCode",
        param_type: ParamType::Choice(&["addition", "modification", "removal"]),
        required: true,
    },
    Param {
        name: "filepath",
        desc: "Project-relative path of the file to edit",
        param_type: ParamType::String,
        required: true,
    },
    Param {
        name: "oldCode",
        desc: "Exact snippet from the current file; its first occurrence is the anchor",
        param_type: ParamType::String,
        required: true,
    },
    Param {
        name: "newCode",
        desc: "Code to insert or substitute; required unless type is removal",
        param_type: ParamType::String,
        required: false,
    },
];

static EDIT: ParamType = ParamType::Record(&EDIT_FIELDS);

pub fn spec() -> (&'static str, &'static str, Vec<Param>) {
    (
        "updateFiles",
        "Apply anchored edits to project files. Edits to one file apply in order",
        vec![Param {
            name: "updates",
            desc: "Edits to apply",
            param_type: ParamType::List(&EDIT),
            required: true,
        }],
    )
}

//! Anchored edits: literal, first-occurrence substring operations over one file's text.
//!
//! When the anchor occurs more than once only the first match (in string search order)
//! is touched. A missing anchor is an error, never a silent no-op.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditKind {
    Addition,
    Modification,
    Removal,
}

impl std::fmt::Display for EditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EditKind::Addition => "addition",
            EditKind::Modification => "modification",
            EditKind::Removal => "removal",
        };
        f.write_str(s)
    }
}

/// Edit as the model sends it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditOperation {
    #[serde(rename = "type")]
    pub kind: EditKind,
    pub filepath: String,
    pub old_code: String,
    #[serde(default)]
    pub new_code: Option<String>,
}

/// Edit after its shape has been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    Addition { anchor: String, code: String },
    Modification { old: String, new: String },
    Removal { old: String },
}

impl Edit {
    pub fn anchor(&self) -> &str {
        match self {
            Edit::Addition { anchor, .. } => anchor,
            Edit::Modification { old, .. } | Edit::Removal { old } => old,
        }
    }

    pub fn kind(&self) -> EditKind {
        match self {
            Edit::Addition { .. } => EditKind::Addition,
            Edit::Modification { .. } => EditKind::Modification,
            Edit::Removal { .. } => EditKind::Removal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    EmptyAnchor,
    MissingNewCode { kind: EditKind },
    AnchorNotFound { anchor: String },
}

impl std::fmt::Display for PatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatchError::EmptyAnchor => write!(f, "oldCode must not be empty"),
            PatchError::MissingNewCode { kind } => write!(f, "newCode is required for {kind}"),
            PatchError::AnchorNotFound { anchor } => {
                write!(f, "oldCode not found in file: {}", preview(anchor))
            }
        }
    }
}

impl std::error::Error for PatchError {}

impl EditOperation {
    /// Check the operation's shape without looking at any file.
    pub fn to_edit(&self) -> Result<Edit, PatchError> {
        if self.old_code.is_empty() {
            return Err(PatchError::EmptyAnchor);
        }
        let new_code = || {
            self.new_code
                .clone()
                .ok_or(PatchError::MissingNewCode { kind: self.kind })
        };
        Ok(match self.kind {
            EditKind::Addition => Edit::Addition {
                anchor: self.old_code.clone(),
                code: new_code()?,
            },
            EditKind::Modification => Edit::Modification {
                old: self.old_code.clone(),
                new: new_code()?,
            },
            EditKind::Removal => Edit::Removal {
                old: self.old_code.clone(),
            },
        })
    }
}

fn locate(contents: &str, anchor: &str) -> Result<(usize, usize), PatchError> {
    if anchor.is_empty() {
        return Err(PatchError::EmptyAnchor);
    }
    match contents.find(anchor) {
        Some(start) => Ok((start, start + anchor.len())),
        None => Err(PatchError::AnchorNotFound {
            anchor: anchor.to_string(),
        }),
    }
}

/// Delete the first occurrence of `old_code`.
pub fn remove(contents: &str, old_code: &str) -> Result<String, PatchError> {
    let (start, end) = locate(contents, old_code)?;
    let mut out = String::with_capacity(contents.len() - old_code.len());
    out.push_str(&contents[..start]);
    out.push_str(&contents[end..]);
    Ok(out)
}

/// Replace the first occurrence of `old_code` with `new_code`.
pub fn modify(contents: &str, old_code: &str, new_code: &str) -> Result<String, PatchError> {
    let (start, end) = locate(contents, old_code)?;
    let mut out = String::with_capacity(contents.len() - old_code.len() + new_code.len());
    out.push_str(&contents[..start]);
    out.push_str(new_code);
    out.push_str(&contents[end..]);
    Ok(out)
}

/// Insert `new_code` on a new line right after the first occurrence of `anchor`.
pub fn add(contents: &str, anchor: &str, new_code: &str) -> Result<String, PatchError> {
    let (_, end) = locate(contents, anchor)?;
    let mut out = String::with_capacity(contents.len() + new_code.len() + 1);
    out.push_str(&contents[..end]);
    out.push('\n');
    out.push_str(new_code);
    out.push_str(&contents[end..]);
    Ok(out)
}

pub fn apply(contents: &str, edit: &Edit) -> Result<String, PatchError> {
    match edit {
        Edit::Addition { anchor, code } => add(contents, anchor, code),
        Edit::Modification { old, new } => modify(contents, old, new),
        Edit::Removal { old } => remove(contents, old),
    }
}

/// Apply edits in order, each one seeing the result of the previous.
/// Stops at the first failure and reports its index.
pub fn apply_all(contents: &str, edits: &[Edit]) -> Result<String, (usize, PatchError)> {
    let mut text = contents.to_string();
    for (idx, edit) in edits.iter().enumerate() {
        text = apply(&text, edit).map_err(|e| (idx, e))?;
    }
    Ok(text)
}

/// How many times an anchor occurs; more than one means the edit is ambiguous.
pub fn occurrences(contents: &str, anchor: &str) -> usize {
    if anchor.is_empty() {
        return 0;
    }
    contents.matches(anchor).count()
}

/// One-line, length-capped rendering of a snippet for error messages.
pub fn preview(s: &str) -> String {
    let s = s.replace('\n', "\\n");
    if s.chars().count() > 160 {
        let head: String = s.chars().take(160).collect();
        format!("{head}…")
    } else {
        s
    }
}

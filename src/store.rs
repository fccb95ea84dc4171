//! File-backed project persistence.
//!
//! Each project is one JSON document:
//!
//! ```text
//! <home>/projects/<id>.json
//! ```
//!
//! Writes go to a sibling temporary file which is then renamed over the target,
//! so readers never observe a half-written project. Concurrent runs on the same
//! project are last-writer-wins.
use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::history::Message;
use crate::tree::FileSystemTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub kind: MessageKind,
    pub contents: String,
    pub created_at: String,
    /// File version produced alongside this message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<FileSystemTree>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub owner: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
    pub messages: Vec<StoredMessage>,
}

/// What `list_projects` returns; messages and files stay on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub id: String,
    pub title: String,
    pub updated_at: String,
}

impl Project {
    /// The snapshot of the most recent message that carries one.
    pub fn current_files(&self) -> FileSystemTree {
        self.messages
            .iter()
            .rev()
            .find_map(|m| m.files.clone())
            .unwrap_or_default()
    }

    /// Conversation as the engine sees it.
    pub fn history(&self) -> Vec<Message> {
        self.messages
            .iter()
            .map(|m| match m.kind {
                MessageKind::User => Message::user(m.contents.as_str()),
                MessageKind::Assistant => Message::assistant(m.contents.as_str()),
            })
            .collect()
    }

    fn summary(&self) -> ProjectSummary {
        ProjectSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            updated_at: self.updated_at.clone(),
        }
    }
}

/// UTC with a fixed nine-digit fraction, so stamps order lexicographically.
pub fn timestamp() -> String {
    let now = time::OffsetDateTime::now_utc();
    let format = time::macros::format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]Z"
    );
    now.format(&format).unwrap_or_else(|_| now.to_string())
}

fn message(kind: MessageKind, contents: &str, files: Option<FileSystemTree>) -> StoredMessage {
    StoredMessage {
        id: format!("msg-{}", Uuid::new_v4().simple()),
        kind,
        contents: contents.to_string(),
        created_at: timestamp(),
        files,
    }
}

pub struct Store {
    dir: PathBuf,
    /// Serializes read-modify-write cycles inside this process.
    write_lock: Mutex<()>,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(eyre!("store: invalid project id {id:?}"));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    async fn load(&self, path: &Path) -> Result<Option<Project>> {
        match tokio::fs::read_to_string(path).await {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, project: &Project) -> Result<()> {
        let path = self.path_for(&project.id)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_string_pretty(project)?;
        let temp = self
            .dir
            .join(format!(".{}.json.tmp-{}", project.id, Uuid::new_v4().simple()));
        tokio::fs::write(&temp, json).await?;
        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        tracing::debug!(project_id = %project.id, "store: saved");
        Ok(())
    }

    /// Create a project whose first user message carries `files`.
    pub async fn create_project(
        &self,
        owner: &str,
        title: &str,
        prompt: &str,
        files: &FileSystemTree,
    ) -> Result<Project> {
        let _guard = self.write_lock.lock().await;
        let now = timestamp();
        let messages = vec![message(MessageKind::User, prompt, Some(files.clone()))];
        let project = Project {
            id: Uuid::new_v4().simple().to_string(),
            owner: owner.to_string(),
            title: title.to_string(),
            created_at: now.clone(),
            updated_at: now,
            messages,
        };
        self.save(&project).await?;
        tracing::info!(project_id = %project.id, %owner, "store: project created");
        Ok(project)
    }

    pub async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let path = self.path_for(id)?;
        self.load(&path).await
    }

    /// Projects owned by `owner`, most recently updated first.
    pub async fn list_projects(&self, owner: &str) -> Result<Vec<ProjectSummary>> {
        let mut projects = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(projects),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match self.load(&path).await {
                Ok(Some(project)) if project.owner == owner => projects.push(project.summary()),
                Ok(_) => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "store: skipping unreadable project"),
            }
        }
        projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(projects)
    }

    pub async fn rename_project(&self, id: &str, owner: &str, title: &str) -> Result<Project> {
        let _guard = self.write_lock.lock().await;
        let mut project = self.owned(id, owner).await?;
        project.title = title.to_string();
        project.updated_at = timestamp();
        self.save(&project).await?;
        Ok(project)
    }

    /// Returns whether anything was deleted.
    pub async fn delete_project(&self, id: &str, owner: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let path = self.path_for(id)?;
        match self.load(&path).await? {
            None => Ok(false),
            Some(project) if project.owner != owner => {
                Err(eyre!("store: project {id} is not owned by {owner}"))
            }
            Some(_) => {
                tokio::fs::remove_file(&path).await?;
                tracing::info!(project_id = %id, "store: project deleted");
                Ok(true)
            }
        }
    }

    /// Current files; an unknown project has an empty tree.
    pub async fn current_files(&self, id: &str) -> Result<FileSystemTree> {
        Ok(self
            .get_project(id)
            .await?
            .map(|p| p.current_files())
            .unwrap_or_default())
    }

    /// Persist a completed run. `initial` marks the first generation, whose user
    /// message was already stored by `create_project`.
    pub async fn commit_run(
        &self,
        id: &str,
        prompt: &str,
        files: &FileSystemTree,
        commentary: &str,
        initial: bool,
    ) -> Result<Project> {
        let _guard = self.write_lock.lock().await;
        let path = self.path_for(id)?;
        let Some(mut project) = self.load(&path).await? else {
            return Err(eyre!("store: no such project: {id}"));
        };
        if !initial {
            project
                .messages
                .push(message(MessageKind::User, prompt, Some(files.clone())));
        }
        project
            .messages
            .push(message(MessageKind::Assistant, commentary, Some(files.clone())));
        project.updated_at = timestamp();
        self.save(&project).await?;
        tracing::info!(
            project_id = %id,
            messages = project.messages.len(),
            "store: run committed"
        );
        Ok(project)
    }

    async fn owned(&self, id: &str, owner: &str) -> Result<Project> {
        let path = self.path_for(id)?;
        match self.load(&path).await? {
            Some(project) if project.owner == owner => Ok(project),
            Some(_) => Err(eyre!("store: project {id} is not owned by {owner}")),
            None => Err(eyre!("store: no such project: {id}")),
        }
    }
}

#[cfg(test)]
mod tests;

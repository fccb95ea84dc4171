//! In-memory project file tree: path-addressed reads and writes over nested directories.
//!
//! The serialized shape matches what in-browser sandboxes mount:
//! `{ "src": { "directory": { "App.tsx": { "file": { "contents": "..." } } } } }`.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

mod starter;

pub use starter::{ENTRY_FILE, starter};

/// A single entry in a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Node {
    File(FileNode),
    Directory(FileSystemTree),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub contents: String,
}

/// Directory listing keyed by segment name, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileSystemTree {
    entries: IndexMap<String, Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    Invalid { path: String, reason: &'static str },
    NotFound { path: String },
    NotAFile { path: String },
    NotADirectory { path: String, segment: String },
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::Invalid { path, reason } => write!(f, "invalid path {path:?}: {reason}"),
            PathError::NotFound { path } => write!(f, "file not found: {path}"),
            PathError::NotAFile { path } => write!(f, "not a file: {path}"),
            PathError::NotADirectory { path, segment } => {
                write!(f, "not a directory: `{segment}` in {path}")
            }
        }
    }
}

impl std::error::Error for PathError {}

/// Split a `/`-joined path into segments. Leading `/`, `./` and empty segments are tolerated.
fn segments(path: &str) -> Result<Vec<&str>, PathError> {
    let mut out = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                return Err(PathError::Invalid {
                    path: path.to_string(),
                    reason: "parent segments are not allowed",
                });
            }
            _ => out.push(seg),
        }
    }
    if out.is_empty() {
        return Err(PathError::Invalid {
            path: path.to_string(),
            reason: "empty path",
        });
    }
    Ok(out)
}

impl FileSystemTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from `(path, contents)` pairs, creating directories as needed.
    pub fn from_files<'a, I>(files: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut tree = Self::new();
        for (path, contents) in files {
            tree.write(path, contents)?;
        }
        Ok(tree)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Depth-first list of every file path; directories themselves are not listed.
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.walk("", &mut |path, _| out.push(path));
        out
    }

    /// Depth-first list of every file with its contents.
    pub fn files(&self) -> Vec<(String, &str)> {
        let mut out = Vec::new();
        self.walk("", &mut |path, contents| out.push((path, contents)));
        out
    }

    fn walk<'a>(&'a self, prefix: &str, visit: &mut dyn FnMut(String, &'a str)) {
        for (name, node) in &self.entries {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };
            match node {
                Node::File(file) => visit(path, &file.contents),
                Node::Directory(sub) => sub.walk(&path, visit),
            }
        }
    }

    pub fn read(&self, path: &str) -> Result<&str, PathError> {
        let segs = segments(path)?;
        let Some((last, dirs)) = segs.split_last() else {
            return Err(PathError::NotFound {
                path: path.to_string(),
            });
        };
        let dir = self.descend(path, dirs)?;
        match dir.entries.get(*last) {
            Some(Node::File(file)) => Ok(&file.contents),
            Some(Node::Directory(_)) => Err(PathError::NotAFile {
                path: path.to_string(),
            }),
            None => Err(PathError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    /// Walk existing directories only.
    fn descend(&self, path: &str, dirs: &[&str]) -> Result<&FileSystemTree, PathError> {
        let mut dir = self;
        for seg in dirs {
            match dir.entries.get(*seg) {
                Some(Node::Directory(sub)) => dir = sub,
                Some(Node::File(_)) => {
                    return Err(PathError::NotADirectory {
                        path: path.to_string(),
                        segment: seg.to_string(),
                    });
                }
                None => {
                    return Err(PathError::NotFound {
                        path: path.to_string(),
                    });
                }
            }
        }
        Ok(dir)
    }

    /// Set or replace a file's contents, creating missing parent directories.
    /// A file never silently becomes a directory or the other way around.
    pub fn write(&mut self, path: &str, contents: impl Into<String>) -> Result<(), PathError> {
        let segs = segments(path)?;
        let Some((last, dirs)) = segs.split_last() else {
            return Err(PathError::NotFound {
                path: path.to_string(),
            });
        };

        // Check the whole path before creating anything, so a rejected write leaves no trace.
        self.check_writable(path, dirs, last)?;

        let mut dir = self;
        for seg in dirs {
            let node = dir
                .entries
                .entry(seg.to_string())
                .or_insert_with(|| Node::Directory(FileSystemTree::new()));
            dir = match node {
                Node::Directory(sub) => sub,
                Node::File(_) => {
                    return Err(PathError::NotADirectory {
                        path: path.to_string(),
                        segment: seg.to_string(),
                    });
                }
            };
        }
        let contents = contents.into();
        match dir.entries.get_mut(*last) {
            Some(Node::File(file)) => file.contents = contents,
            Some(Node::Directory(_)) => {
                return Err(PathError::NotAFile {
                    path: path.to_string(),
                });
            }
            None => {
                dir.entries
                    .insert(last.to_string(), Node::File(FileNode { contents }));
            }
        }
        Ok(())
    }

    fn check_writable(&self, path: &str, dirs: &[&str], last: &str) -> Result<(), PathError> {
        let mut dir = self;
        for seg in dirs {
            match dir.entries.get(*seg) {
                Some(Node::Directory(sub)) => dir = sub,
                Some(Node::File(_)) => {
                    return Err(PathError::NotADirectory {
                        path: path.to_string(),
                        segment: seg.to_string(),
                    });
                }
                // Everything below a missing directory will be created fresh.
                None => return Ok(()),
            }
        }
        match dir.entries.get(last) {
            Some(Node::Directory(_)) => Err(PathError::NotAFile {
                path: path.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

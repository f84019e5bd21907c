//! Site workspace port: reading sources and applying file changes.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Path escapes the workspace root: {0}")]
    OutsideRoot(String),

    #[error("Workspace I/O failed at {path}: {message}")]
    Io { path: String, message: String },
}

/// A planned change to one workspace-relative file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FileChange {
    Write { file: String, content: String },
    Delete { file: String },
}

impl FileChange {
    pub fn write(file: impl Into<String>, content: impl Into<String>) -> Self {
        FileChange::Write {
            file: file.into(),
            content: content.into(),
        }
    }

    pub fn delete(file: impl Into<String>) -> Self {
        FileChange::Delete { file: file.into() }
    }

    pub fn file(&self) -> &str {
        match self {
            FileChange::Write { file, .. } | FileChange::Delete { file } => file,
        }
    }

    pub fn action(&self) -> ChangeAction {
        match self {
            FileChange::Write { .. } => ChangeAction::Write,
            FileChange::Delete { .. } => ChangeAction::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Write,
    Delete,
}

/// What happened (or would happen, in dry-run) for one [`FileChange`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeResult {
    pub file: String,
    pub action: ChangeAction,
    pub dry_run: bool,
    pub applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChangeResult {
    /// The result reported for a change that was only planned.
    pub fn planned(change: &FileChange) -> Self {
        Self {
            file: change.file().to_string(),
            action: change.action(),
            dry_run: true,
            applied: false,
            bytes: match change {
                FileChange::Write { content, .. } => Some(content.len()),
                FileChange::Delete { .. } => None,
            },
            error: None,
        }
    }
}

/// A file found while listing the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceFile {
    /// Path relative to the workspace root, `/`-separated.
    pub path: String,
    pub len: u64,
}

#[async_trait]
pub trait Workspace: Send + Sync {
    /// Root directory all relative paths resolve against.
    fn root(&self) -> &Path;

    /// Applies `changes` in order, returning one result per change.
    ///
    /// With `dry_run` no filesystem call is made at all. A failing change is
    /// reported in its result and does not stop the remaining ones.
    async fn apply_changes(&self, changes: &[FileChange], dry_run: bool) -> Vec<ChangeResult>;

    /// Reads a file, returning `None` when it does not exist.
    async fn read_file(&self, file: &str) -> Result<Option<String>, WorkspaceError>;

    /// Lists regular files below `dir` recursively (empty `dir` = root).
    async fn list_files(&self, dir: &str) -> Result<Vec<WorkspaceFile>, WorkspaceError>;
}

//! Filesystem-backed site workspace.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use pipeline::{ChangeResult, FileChange, Workspace, WorkspaceError, WorkspaceFile};
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

/// Directories never descended into when listing.
const SKIPPED_DIRS: [&str; 4] = ["node_modules", ".git", ".next", "target"];

/// Applies file changes below a fixed root directory.
///
/// Relative paths only: absolute paths and `..` components are rejected so a
/// generated path can never escape the site root.
#[derive(Debug, Clone)]
pub struct FsWorkspace {
    root: PathBuf,
}

impl FsWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, file: &str) -> Result<PathBuf, WorkspaceError> {
        let relative = Path::new(file);
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if file.is_empty() || escapes {
            return Err(WorkspaceError::OutsideRoot(file.to_string()));
        }
        Ok(self.root.join(relative))
    }

    async fn apply_one(&self, change: &FileChange) -> Result<usize, WorkspaceError> {
        let path = self.resolve(change.file())?;
        let io_err = |e: std::io::Error| WorkspaceError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        };

        match change {
            FileChange::Write { content, .. } => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
                }
                tokio::fs::write(&path, content).await.map_err(io_err)?;
                Ok(content.len())
            }
            FileChange::Delete { .. } => {
                tokio::fs::remove_file(&path).await.map_err(io_err)?;
                Ok(0)
            }
        }
    }
}

#[async_trait]
impl Workspace for FsWorkspace {
    fn root(&self) -> &Path {
        &self.root
    }

    #[instrument(skip_all, fields(changes = changes.len(), dry_run))]
    async fn apply_changes(&self, changes: &[FileChange], dry_run: bool) -> Vec<ChangeResult> {
        let mut results = Vec::with_capacity(changes.len());
        for change in changes {
            if dry_run {
                results.push(ChangeResult::planned(change));
                continue;
            }

            let mut result = ChangeResult::planned(change);
            result.dry_run = false;
            match self.apply_one(change).await {
                Ok(_) => {
                    debug!(file = change.file(), action = ?change.action(), "Applied change");
                    result.applied = true;
                }
                Err(e) => {
                    warn!(file = change.file(), error = %e, "Failed to apply change");
                    result.error = Some(e.to_string());
                }
            }
            results.push(result);
        }
        results
    }

    async fn read_file(&self, file: &str) -> Result<Option<String>, WorkspaceError> {
        let path = self.resolve(file)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(WorkspaceError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn list_files(&self, dir: &str) -> Result<Vec<WorkspaceFile>, WorkspaceError> {
        let start = if dir.is_empty() {
            self.root.clone()
        } else {
            self.resolve(dir)?
        };
        let root = self.root.clone();

        tokio::task::spawn_blocking(move || walk(&root, &start))
            .await
            .map_err(|e| WorkspaceError::Io {
                path: dir.to_string(),
                message: e.to_string(),
            })?
    }
}

fn walk(root: &Path, start: &Path) -> Result<Vec<WorkspaceFile>, WorkspaceError> {
    if !start.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let entries = WalkDir::new(start).sort_by_file_name().into_iter().filter_entry(|e| {
        !(e.file_type().is_dir()
            && SKIPPED_DIRS.contains(&e.file_name().to_string_lossy().as_ref()))
    });
    for entry in entries {
        let entry = entry.map_err(|e| WorkspaceError::Io {
            path: start.display().to_string(),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let len = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push(WorkspaceFile { path, len });
    }
    Ok(files)
}

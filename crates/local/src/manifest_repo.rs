//! Manifest persistence under the output directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{ContextId, Manifest, ManifestError, ManifestRepository};
use tracing::{debug, info, warn};

/// File name of a run's manifest inside `<root>/<contextId>/`.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Stores one pretty-printed JSON manifest per run directory.
#[derive(Debug, Clone)]
pub struct FsManifestRepository {
    root: PathBuf,
}

impl FsManifestRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, context_id: ContextId) -> PathBuf {
        self.root.join(context_id.to_string()).join(MANIFEST_FILE)
    }
}

fn io_error(path: &Path, e: impl std::fmt::Display) -> ManifestError {
    ManifestError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

#[async_trait]
impl ManifestRepository for FsManifestRepository {
    async fn load(&self, context_id: ContextId) -> Result<Option<Manifest>, ManifestError> {
        let path = self.path_for(context_id);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| ManifestError::Corrupt {
                context_id,
                message: e.to_string(),
            })
    }

    async fn save(&self, manifest: &Manifest) -> Result<(), ManifestError> {
        let path = self.path_for(manifest.context_id);
        let json = serde_json::to_vec_pretty(manifest).map_err(|e| ManifestError::Corrupt {
            context_id: manifest.context_id,
            message: e.to_string(),
        })?;
        crate::write_atomic(&path, &json)
            .await
            .map_err(|e| io_error(&path, e))?;
        debug!(path = %path.display(), "Manifest saved");
        Ok(())
    }

    /// Removes every run directory whose manifest was last modified at least
    /// `max_age` ago. Directories without a manifest are left alone; a
    /// directory that cannot be removed is logged and skipped.
    async fn sweep_older_than(&self, max_age: Duration) -> Result<usize, ManifestError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(io_error(&self.root, e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.root, e))?
        {
            let dir = entry.path();
            let Ok(metadata) = tokio::fs::metadata(dir.join(MANIFEST_FILE)).await else {
                continue;
            };
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| modified.elapsed().ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }

            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {
                    info!(run = %dir.display(), "Removed stale run directory");
                    removed += 1;
                }
                Err(e) => warn!(run = %dir.display(), error = %e, "Could not remove run directory"),
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{AgentName, ManifestUpdate, Manifests};
    use std::sync::Arc;

    #[tokio::test]
    async fn round_trips_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = FsManifestRepository::new(tmp.path());
        let ctx = ContextId::new_random();

        assert!(repo.load(ctx).await.unwrap().is_none());

        let mut manifest = Manifest::empty(ctx);
        manifest.merge(
            &AgentName::from_static("builderAgent"),
            &ManifestUpdate {
                blocks: vec!["heroBlock".to_string()],
                ..Default::default()
            },
        );
        repo.save(&manifest).await.unwrap();

        assert!(tmp.path().join(ctx.to_string()).join(MANIFEST_FILE).exists());
        let loaded = repo.load(ctx).await.unwrap().unwrap();
        assert_eq!(loaded, manifest);
    }

    #[tokio::test]
    async fn corrupt_manifest_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = FsManifestRepository::new(tmp.path());
        let ctx = ContextId::new_random();
        let path = repo.path_for(ctx);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            repo.load(ctx).await,
            Err(ManifestError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn sweep_removes_only_old_runs() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = Arc::new(FsManifestRepository::new(tmp.path()));
        let manifests = Manifests::new(repo.clone());
        let ctx = ContextId::new_random();
        manifests
            .add_block(ctx, "heroBlock")
            .await
            .unwrap();
        std::fs::create_dir_all(tmp.path().join("not-a-run")).unwrap();

        let week = Duration::from_secs(7 * 24 * 60 * 60);
        assert_eq!(repo.sweep_older_than(week).await.unwrap(), 0);
        assert_eq!(repo.sweep_older_than(Duration::ZERO).await.unwrap(), 1);
        assert!(!tmp.path().join(ctx.to_string()).exists());
        assert!(tmp.path().join("not-a-run").exists());
    }

    #[tokio::test]
    async fn sweep_of_missing_root_is_zero() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = FsManifestRepository::new(tmp.path().join("absent"));
        assert_eq!(repo.sweep_older_than(Duration::ZERO).await.unwrap(), 0);
    }
}

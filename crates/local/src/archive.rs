//! Handover snapshots under `<root>/<contextId>/`.

use std::path::PathBuf;

use async_trait::async_trait;
use pipeline::ports::archive::snapshot_key;
use pipeline::{AgentName, ArchiveError, ContextId, Handover, HandoverArchive};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct FsHandoverArchive {
    root: PathBuf,
}

impl FsHandoverArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, context_id: ContextId, agent: &AgentName) -> PathBuf {
        self.root.join(snapshot_key(context_id, agent))
    }
}

#[async_trait]
impl HandoverArchive for FsHandoverArchive {
    async fn save(&self, agent: &AgentName, handover: &Handover) -> Result<String, ArchiveError> {
        let path = self.path_for(handover.context_id(), agent);
        let display = path.display().to_string();
        let json = serde_json::to_vec_pretty(handover).map_err(|e| ArchiveError::Corrupt {
            path: display.clone(),
            message: e.to_string(),
        })?;
        crate::write_atomic(&path, &json)
            .await
            .map_err(|e| ArchiveError::Io {
                path: display.clone(),
                message: e.to_string(),
            })?;
        debug!(path = %path.display(), "Handover snapshot written");
        Ok(display)
    }

    async fn load(
        &self,
        context_id: ContextId,
        agent: &AgentName,
    ) -> Result<Option<Handover>, ArchiveError> {
        let path = self.path_for(context_id, agent);
        let display = path.display().to_string();
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ArchiveError::Io {
                    path: display,
                    message: e.to_string(),
                })
            }
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| ArchiveError::Corrupt {
                path: display,
                message: e.to_string(),
            })
    }
}

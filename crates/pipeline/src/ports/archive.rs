//! Handover snapshot archive port.
//!
//! Each successful stage leaves a JSON snapshot of the handover it produced.
//! This is the only durable record of the chain itself.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;

use crate::{AgentName, ContextId, Handover};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Handover snapshot I/O failed at {path}: {message}")]
    Io { path: String, message: String },

    #[error("Handover snapshot at {path} is corrupt: {message}")]
    Corrupt { path: String, message: String },
}

#[async_trait]
pub trait HandoverArchive: Send + Sync {
    /// Stores the snapshot for `agent` and returns where it was written.
    async fn save(&self, agent: &AgentName, handover: &Handover) -> Result<String, ArchiveError>;

    async fn load(
        &self,
        context_id: ContextId,
        agent: &AgentName,
    ) -> Result<Option<Handover>, ArchiveError>;
}

/// Keeps snapshots in memory, keyed like the on-disk layout.
#[derive(Debug, Default)]
pub struct InMemoryHandoverArchive {
    snapshots: Mutex<HashMap<String, Handover>>,
}

impl InMemoryHandoverArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot keys (`<contextId>/<agent>-handover.json`) currently held.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

/// Relative location of a snapshot: `<contextId>/<shortName>-handover.json`.
pub fn snapshot_key(context_id: ContextId, agent: &AgentName) -> String {
    format!("{context_id}/{}-handover.json", agent.short_name())
}

#[async_trait]
impl HandoverArchive for InMemoryHandoverArchive {
    async fn save(&self, agent: &AgentName, handover: &Handover) -> Result<String, ArchiveError> {
        let key = snapshot_key(handover.context_id(), agent);
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), handover.clone());
        Ok(key)
    }

    async fn load(
        &self,
        context_id: ContextId,
        agent: &AgentName,
    ) -> Result<Option<Handover>, ArchiveError> {
        let key = snapshot_key(context_id, agent);
        Ok(self.snapshots.lock().unwrap_or_else(PoisonError::into_inner).get(&key).cloned())
    }
}

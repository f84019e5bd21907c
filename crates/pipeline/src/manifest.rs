//! Cumulative per-run artifact manifest.
//!
//! The manifest outlives the handover chain: every mutating agent merges its
//! contribution into the manifest stored for the run's [`ContextId`], and the
//! result stays on disk for later inspection until an age-based sweep removes
//! it.
//!
//! Storage is behind [`ManifestRepository`]; the [`Manifests`] service owns the
//! merge rules and serialises load-modify-save per run.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::{AgentName, ContextId, Timestamp};

/// Default age after which a run's manifest is swept.
pub const DEFAULT_MAX_AGE_DAYS: u32 = 7;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Manifest I/O failed at {path}: {message}")]
    Io { path: String, message: String },

    #[error("Manifest for run {context_id} is corrupt: {message}")]
    Corrupt {
        context_id: ContextId,
        message: String,
    },

    #[error("Manifest lock poisoned: {0}")]
    LockPoisoned(String),
}

fn poisoned<T>(err: std::sync::PoisonError<T>) -> ManifestError {
    ManifestError::LockPoisoned(err.to_string())
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// A media asset referenced by generated content. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaEntry {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl MediaEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

/// What one agent adds to the manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestUpdate {
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub blocks: Vec<String>,
    #[serde(default)]
    pub pages: Vec<String>,
    #[serde(default)]
    pub media: Vec<MediaEntry>,
}

impl ManifestUpdate {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
            && self.blocks.is_empty()
            && self.pages.is_empty()
            && self.media.is_empty()
    }
}

/// The latest contribution recorded for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentContribution {
    pub updated_at: Timestamp,
    #[serde(flatten)]
    pub artifacts: ManifestUpdate,
}

/// The persisted record of everything a run has produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub context_id: ContextId,
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_agent: Option<AgentName>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub blocks: Vec<String>,
    #[serde(default)]
    pub pages: Vec<String>,
    #[serde(default)]
    pub media: Vec<MediaEntry>,
    #[serde(default)]
    pub agents: BTreeMap<String, AgentContribution>,
}

impl Manifest {
    /// The shape synthesised for a run that has not written anything yet.
    pub fn empty(context_id: ContextId) -> Self {
        Self {
            context_id,
            created_at: Timestamp::now(),
            last_updated: None,
            last_agent: None,
            files: Vec::new(),
            blocks: Vec::new(),
            pages: Vec::new(),
            media: Vec::new(),
            agents: BTreeMap::new(),
        }
    }

    /// Merges an agent's contribution.
    ///
    /// Files, blocks and pages are set-unioned preserving first-seen order;
    /// media is de-duplicated by `id`, a later entry replacing an earlier one.
    pub fn merge(&mut self, agent: &AgentName, update: &ManifestUpdate) {
        self.absorb(update);
        self.agents.insert(
            agent.as_str().to_string(),
            AgentContribution {
                updated_at: Timestamp::now(),
                artifacts: update.clone(),
            },
        );
        self.last_agent = Some(agent.clone());
    }

    fn absorb(&mut self, update: &ManifestUpdate) {
        union_into(&mut self.files, &update.files);
        union_into(&mut self.blocks, &update.blocks);
        union_into(&mut self.pages, &update.pages);
        for entry in &update.media {
            upsert_media(&mut self.media, entry.clone());
        }
        self.last_updated = Some(Timestamp::now());
    }

    /// Reference time for the age-based sweep.
    pub fn last_touched(&self) -> Timestamp {
        self.last_updated.unwrap_or(self.created_at)
    }
}

fn union_into(target: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

fn upsert_media(target: &mut Vec<MediaEntry>, entry: MediaEntry) {
    match target.iter_mut().find(|existing| existing.id == entry.id) {
        Some(existing) => *existing = entry,
        None => target.push(entry),
    }
}

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// Storage backend for manifests.
#[async_trait]
pub trait ManifestRepository: Send + Sync {
    /// Returns the stored manifest, or `None` if the run has not written one.
    async fn load(&self, context_id: ContextId) -> Result<Option<Manifest>, ManifestError>;

    /// Persists the manifest, replacing any previous version.
    async fn save(&self, manifest: &Manifest) -> Result<(), ManifestError>;

    /// Deletes every run whose manifest has not been touched within `max_age`.
    ///
    /// Returns the number of runs deleted. A failure on one run is logged and
    /// does not abort the sweep.
    async fn sweep_older_than(&self, max_age: Duration) -> Result<usize, ManifestError>;
}

/// In-memory repository for tests and dry experiments.
#[derive(Debug, Default)]
pub struct InMemoryManifestRepository {
    manifests: Mutex<HashMap<ContextId, Manifest>>,
}

impl InMemoryManifestRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ManifestRepository for InMemoryManifestRepository {
    async fn load(&self, context_id: ContextId) -> Result<Option<Manifest>, ManifestError> {
        let manifests = self.manifests.lock().map_err(poisoned)?;
        Ok(manifests.get(&context_id).cloned())
    }

    async fn save(&self, manifest: &Manifest) -> Result<(), ManifestError> {
        let mut manifests = self.manifests.lock().map_err(poisoned)?;
        manifests.insert(manifest.context_id, manifest.clone());
        Ok(())
    }

    async fn sweep_older_than(&self, max_age: Duration) -> Result<usize, ManifestError> {
        let Ok(age) = chrono::Duration::from_std(max_age) else {
            return Ok(0);
        };
        let Some(cutoff) = chrono::Utc::now().checked_sub_signed(age) else {
            return Ok(0);
        };
        let mut manifests = self.manifests.lock().map_err(poisoned)?;
        let before = manifests.len();
        manifests.retain(|_, m| m.last_touched().as_datetime() >= cutoff);
        Ok(before - manifests.len())
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Manifest operations with per-run write serialisation.
///
/// Every mutator is a full load-modify-save round trip. Round trips for the
/// same run are serialised by a per-run async mutex; distinct runs never
/// contend. A run's mutex is dropped from the map once no round trip holds
/// or awaits it.
pub struct Manifests {
    repository: Arc<dyn ManifestRepository>,
    locks: Mutex<HashMap<ContextId, Arc<tokio::sync::Mutex<()>>>>,
}

impl Manifests {
    pub fn new(repository: Arc<dyn ManifestRepository>) -> Self {
        Self {
            repository,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the stored manifest or a synthesised empty one.
    pub async fn load(&self, context_id: ContextId) -> Result<Manifest, ManifestError> {
        Ok(self
            .repository
            .load(context_id)
            .await?
            .unwrap_or_else(|| Manifest::empty(context_id)))
    }

    /// Merges `update` on behalf of `agent` and persists the result.
    pub async fn update(
        &self,
        context_id: ContextId,
        agent: &AgentName,
        update: &ManifestUpdate,
    ) -> Result<Manifest, ManifestError> {
        debug!(%context_id, agent = %agent, "Merging manifest contribution");
        self.modify(context_id, |m| m.merge(agent, update)).await
    }

    pub async fn add_file(
        &self,
        context_id: ContextId,
        file: impl Into<String>,
    ) -> Result<Manifest, ManifestError> {
        let update = ManifestUpdate {
            files: vec![file.into()],
            ..Default::default()
        };
        self.modify(context_id, |m| m.absorb(&update)).await
    }

    pub async fn add_block(
        &self,
        context_id: ContextId,
        block: impl Into<String>,
    ) -> Result<Manifest, ManifestError> {
        let update = ManifestUpdate {
            blocks: vec![block.into()],
            ..Default::default()
        };
        self.modify(context_id, |m| m.absorb(&update)).await
    }

    pub async fn add_page(
        &self,
        context_id: ContextId,
        page: impl Into<String>,
    ) -> Result<Manifest, ManifestError> {
        let update = ManifestUpdate {
            pages: vec![page.into()],
            ..Default::default()
        };
        self.modify(context_id, |m| m.absorb(&update)).await
    }

    pub async fn add_media(
        &self,
        context_id: ContextId,
        entry: MediaEntry,
    ) -> Result<Manifest, ManifestError> {
        let update = ManifestUpdate {
            media: vec![entry],
            ..Default::default()
        };
        self.modify(context_id, |m| m.absorb(&update)).await
    }

    /// Sweeps manifests older than `days_old` days and returns the count deleted.
    pub async fn cleanup_old_manifests(&self, days_old: u32) -> Result<usize, ManifestError> {
        let max_age = Duration::from_secs(u64::from(days_old) * 24 * 60 * 60);
        let deleted = self.repository.sweep_older_than(max_age).await?;
        info!(deleted, days_old, "Swept old manifests");
        Ok(deleted)
    }

    async fn modify<F>(&self, context_id: ContextId, f: F) -> Result<Manifest, ManifestError>
    where
        F: FnOnce(&mut Manifest),
    {
        let lock = self.lock_for(context_id)?;
        let result = {
            let _guard = lock.lock().await;
            self.load_modify_save(context_id, f).await
        };
        self.release(context_id, lock)?;
        result
    }

    async fn load_modify_save<F>(
        &self,
        context_id: ContextId,
        f: F,
    ) -> Result<Manifest, ManifestError>
    where
        F: FnOnce(&mut Manifest),
    {
        let mut manifest = self.load(context_id).await?;
        f(&mut manifest);
        self.repository.save(&manifest).await?;
        Ok(manifest)
    }

    fn lock_for(
        &self,
        context_id: ContextId,
    ) -> Result<Arc<tokio::sync::Mutex<()>>, ManifestError> {
        let mut locks = self.locks.lock().map_err(poisoned)?;
        Ok(locks.entry(context_id).or_default().clone())
    }

    // Clones are only handed out under the map lock, so a count of two (map
    // plus ours) means nobody else holds or awaits this run's mutex.
    fn release(
        &self,
        context_id: ContextId,
        lock: Arc<tokio::sync::Mutex<()>>,
    ) -> Result<(), ManifestError> {
        let mut locks = self.locks.lock().map_err(poisoned)?;
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&context_id);
        }
        Ok(())
    }

    #[cfg(test)]
    fn tracked_runs(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or_default()
    }
}

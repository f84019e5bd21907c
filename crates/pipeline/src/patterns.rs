//! Learned fix-pattern statistics.
//!
//! The diagnostic stage records how often each of its static patches has fired.
//! The counts are reporting-only: they never influence which patches are tried.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Timestamp;

#[derive(Debug, Error)]
pub enum PatternStoreError {
    #[error("Learned patterns I/O failed at {path}: {message}")]
    Io { path: String, message: String },

    #[error("Learned patterns file is corrupt: {0}")]
    Corrupt(String),
}

/// Firing history of one patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternStats {
    pub count: u64,
    pub description: String,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnedPatterns {
    #[serde(default)]
    pub total_runs: u64,
    #[serde(default)]
    pub patterns: BTreeMap<String, PatternStats>,
}

impl LearnedPatterns {
    /// Counts one firing of `id`.
    pub fn record(&mut self, id: &str, description: &str) {
        let now = Timestamp::now();
        self.patterns
            .entry(id.to_string())
            .and_modify(|stats| {
                stats.count += 1;
                stats.last_seen = now;
            })
            .or_insert_with(|| PatternStats {
                count: 1,
                description: description.to_string(),
                first_seen: now,
                last_seen: now,
            });
    }

    pub fn count(&self, id: &str) -> u64 {
        self.patterns.get(id).map_or(0, |stats| stats.count)
    }

    /// Pattern ids ordered by descending count.
    pub fn most_frequent(&self) -> Vec<(&str, u64)> {
        let mut ranked: Vec<(&str, u64)> = self
            .patterns
            .iter()
            .map(|(id, stats)| (id.as_str(), stats.count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        ranked
    }
}

#[async_trait]
pub trait PatternStore: Send + Sync {
    /// Current statistics, empty when nothing was recorded yet.
    async fn load(&self) -> Result<LearnedPatterns, PatternStoreError>;

    async fn save(&self, patterns: &LearnedPatterns) -> Result<(), PatternStoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryPatternStore {
    patterns: Mutex<LearnedPatterns>,
}

impl InMemoryPatternStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PatternStore for InMemoryPatternStore {
    async fn load(&self) -> Result<LearnedPatterns, PatternStoreError> {
        Ok(self.patterns.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    async fn save(&self, patterns: &LearnedPatterns) -> Result<(), PatternStoreError> {
        *self.patterns.lock().unwrap_or_else(PoisonError::into_inner) = patterns.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_accumulates_counts() {
        let mut learned = LearnedPatterns::default();
        learned.record("rating-max-bound", "Rating capped at 5");
        learned.record("rating-max-bound", "Rating capped at 5");
        learned.record("pricing-price-min", "Prices cannot be negative");

        assert_eq!(learned.count("rating-max-bound"), 2);
        assert_eq!(learned.count("unknown"), 0);
        assert_eq!(
            learned.most_frequent(),
            vec![("rating-max-bound", 2), ("pricing-price-min", 1)]
        );
    }

    #[test]
    fn serialises_camel_case() {
        let mut learned = LearnedPatterns {
            total_runs: 3,
            ..Default::default()
        };
        learned.record("x", "desc");
        let value = serde_json::to_value(&learned).unwrap();
        assert_eq!(value["totalRuns"], 3);
        assert_eq!(value["patterns"]["x"]["count"], 1);
        assert!(value["patterns"]["x"]["lastSeen"].is_string());
    }
}

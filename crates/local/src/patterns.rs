//! `learned-patterns.json` in the output directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pipeline::{LearnedPatterns, PatternStore, PatternStoreError};

pub const LEARNED_PATTERNS_FILE: &str = "learned-patterns.json";

#[derive(Debug, Clone)]
pub struct FsPatternStore {
    path: PathBuf,
}

impl FsPatternStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(out_dir: &Path) -> Self {
        Self::new(out_dir.join(LEARNED_PATTERNS_FILE))
    }

    fn io_error(&self, e: std::io::Error) -> PatternStoreError {
        PatternStoreError::Io {
            path: self.path.display().to_string(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl PatternStore for FsPatternStore {
    async fn load(&self) -> Result<LearnedPatterns, PatternStoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| PatternStoreError::Corrupt(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LearnedPatterns::default()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    async fn save(&self, patterns: &LearnedPatterns) -> Result<(), PatternStoreError> {
        let json = serde_json::to_vec_pretty(patterns)
            .map_err(|e| PatternStoreError::Corrupt(e.to_string()))?;
        crate::write_atomic(&self.path, &json)
            .await
            .map_err(|e| self.io_error(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_empty_and_saves_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsPatternStore::in_dir(&tmp.path().join("out"));

        let mut learned = store.load().await.unwrap();
        assert_eq!(learned, LearnedPatterns::default());

        learned.total_runs = 1;
        learned.record("pricing-price-min", "Prices cannot be negative");
        store.save(&learned).await.unwrap();

        assert!(tmp.path().join("out").join(LEARNED_PATTERNS_FILE).exists());
        assert_eq!(store.load().await.unwrap(), learned);
    }
}

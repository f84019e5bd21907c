//! Environment and settings configuration.
//!
//! [`EnvConfig`] is a snapshot of the process environment taken once by the
//! composition root; stages check it for the variables they need before doing
//! any external work. [`Settings`] holds the tunables read from `sitegen.toml`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{RiskTolerance, SitegenError};

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Environment variables the pipeline reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EnvVar {
    AnthropicApiKey,
    ClaudeModel,
    SanityProjectId,
    SanityDataset,
    SanityApiVersion,
    SanityApiToken,
    SiteUrl,
}

impl EnvVar {
    pub const ALL: [EnvVar; 7] = [
        EnvVar::AnthropicApiKey,
        EnvVar::ClaudeModel,
        EnvVar::SanityProjectId,
        EnvVar::SanityDataset,
        EnvVar::SanityApiVersion,
        EnvVar::SanityApiToken,
        EnvVar::SiteUrl,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EnvVar::AnthropicApiKey => "ANTHROPIC_API_KEY",
            EnvVar::ClaudeModel => "CLAUDE_MODEL",
            EnvVar::SanityProjectId => "NEXT_PUBLIC_SANITY_PROJECT_ID",
            EnvVar::SanityDataset => "NEXT_PUBLIC_SANITY_DATASET",
            EnvVar::SanityApiVersion => "NEXT_PUBLIC_SANITY_API_VERSION",
            EnvVar::SanityApiToken => "SANITY_API_TOKEN",
            EnvVar::SiteUrl => "NEXT_PUBLIC_SITE_URL",
        }
    }
}

/// Variables every CMS-backed stage needs.
pub const CMS_ENV: [EnvVar; 4] = [
    EnvVar::SanityProjectId,
    EnvVar::SanityDataset,
    EnvVar::SanityApiVersion,
    EnvVar::SanityApiToken,
];

/// Snapshot of the relevant environment variables. Blank values count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvConfig {
    values: BTreeMap<EnvVar, String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a snapshot from an arbitrary lookup (tests, HTTP overrides).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let values = EnvVar::ALL
            .iter()
            .filter_map(|var| {
                lookup(var.name())
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| (*var, v))
            })
            .collect();
        Self { values }
    }

    pub fn with(mut self, var: EnvVar, value: impl Into<String>) -> Self {
        self.values.insert(var, value.into());
        self
    }

    pub fn get(&self, var: EnvVar) -> Option<&str> {
        self.values.get(&var).map(String::as_str)
    }

    /// Names of the `required` variables that are unset, in input order.
    pub fn missing(&self, required: &[EnvVar]) -> Vec<String> {
        required
            .iter()
            .filter(|var| !self.values.contains_key(var))
            .map(|var| var.name().to_string())
            .collect()
    }

    /// CMS connection parameters, or the list of missing variables.
    pub fn cms_connection(&self) -> Result<CmsConnection, SitegenError> {
        let missing = self.missing(&CMS_ENV);
        if !missing.is_empty() {
            return Err(SitegenError::MissingEnvironment { missing });
        }
        let get = |var| self.get(var).unwrap_or_default().to_string();
        Ok(CmsConnection {
            project_id: get(EnvVar::SanityProjectId),
            dataset: get(EnvVar::SanityDataset),
            api_version: get(EnvVar::SanityApiVersion),
            token: get(EnvVar::SanityApiToken),
        })
    }
}

/// Connection parameters for the CMS HTTP API.
#[derive(Clone, PartialEq, Eq)]
pub struct CmsConnection {
    pub project_id: String,
    pub dataset: String,
    pub api_version: String,
    pub token: String,
}

impl std::fmt::Debug for CmsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CmsConnection")
            .field("project_id", &self.project_id)
            .field("dataset", &self.dataset)
            .field("api_version", &self.api_version)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Tunables loaded from `sitegen.toml`. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding per-run snapshots, manifests and the event log.
    pub out_dir: PathBuf,
    /// Root of the site project agents read and write.
    pub site_root: PathBuf,
    /// Default for agents invoked without an explicit dry-run choice.
    pub dry_run: bool,
    /// Pause between LLM-calling steps of the auto-generate flow.
    pub inter_step_delay_ms: u64,
    pub max_tokens: u32,
    pub event_history_capacity: usize,
    pub manifest_max_age_days: u32,
    pub schema_dir: String,
    pub component_dir: String,
    pub tester: TesterSettings,
    pub cleanup: CleanupSettings,
    pub reviewer: ReviewerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("out"),
            site_root: PathBuf::from("."),
            dry_run: true,
            inter_step_delay_ms: 1500,
            max_tokens: 4096,
            event_history_capacity: crate::events::DEFAULT_HISTORY_CAPACITY,
            manifest_max_age_days: crate::manifest::DEFAULT_MAX_AGE_DAYS,
            schema_dir: "schemas/blocks".to_string(),
            component_dir: "components/blocks".to_string(),
            tester: TesterSettings::default(),
            cleanup: CleanupSettings::default(),
            reviewer: ReviewerSettings::default(),
        }
    }
}

impl Settings {
    pub fn from_toml_str(text: &str) -> Result<Self, SitegenError> {
        toml::from_str(text).map_err(|e| SitegenError::Configuration {
            message: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesterSettings {
    /// Check commands run in order; the first failure blocks the stage.
    pub commands: Vec<String>,
}

impl Default for TesterSettings {
    fn default() -> Self {
        Self {
            commands: vec!["npx tsc --noEmit".to_string(), "npx next lint".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupSettings {
    pub risk_tolerance: RiskTolerance,
    /// Glob patterns of paths never proposed for deletion.
    pub exclude: Vec<String>,
    /// Directories scanned for empty files and orphaned tests.
    pub scan_dirs: Vec<String>,
    /// Tool printing `path:line - symbol` lines for unused exports.
    pub unused_exports_command: Option<String>,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            risk_tolerance: RiskTolerance::Prudent,
            exclude: vec![
                "node_modules/**".to_string(),
                ".next/**".to_string(),
                "out/**".to_string(),
            ],
            scan_dirs: vec![
                "app".to_string(),
                "components".to_string(),
                "lib".to_string(),
                "schemas".to_string(),
            ],
            unused_exports_command: Some("npx ts-prune".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewerSettings {
    pub auto_fix: bool,
    pub disallowed_field_types: Vec<String>,
}

impl Default for ReviewerSettings {
    fn default() -> Self {
        Self {
            auto_fix: false,
            disallowed_field_types: vec![
                "any".to_string(),
                "html".to_string(),
                "markdown".to_string(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_lists_unset_and_blank_variables() {
        let env = EnvConfig::from_lookup(|name| match name {
            "NEXT_PUBLIC_SANITY_PROJECT_ID" => Some("abc123".to_string()),
            "NEXT_PUBLIC_SANITY_DATASET" => Some("  ".to_string()),
            _ => None,
        });

        assert_eq!(
            env.missing(&CMS_ENV),
            vec![
                "NEXT_PUBLIC_SANITY_DATASET",
                "NEXT_PUBLIC_SANITY_API_VERSION",
                "SANITY_API_TOKEN"
            ]
        );
        assert!(matches!(
            env.cms_connection(),
            Err(SitegenError::MissingEnvironment { .. })
        ));
    }

    #[test]
    fn cms_connection_debug_redacts_token() {
        let env = EnvConfig::default()
            .with(EnvVar::SanityProjectId, "abc123")
            .with(EnvVar::SanityDataset, "production")
            .with(EnvVar::SanityApiVersion, "2024-01-01")
            .with(EnvVar::SanityApiToken, "sk-secret");

        let connection = env.cms_connection().unwrap();
        assert_eq!(connection.dataset, "production");
        assert!(!format!("{connection:?}").contains("sk-secret"));
    }

    #[test]
    fn settings_fill_defaults_from_partial_toml() {
        let settings = Settings::from_toml_str(
            r#"
            dry_run = false
            inter_step_delay_ms = 0

            [cleanup]
            risk_tolerance = "medium"
            "#,
        )
        .unwrap();

        assert!(!settings.dry_run);
        assert_eq!(settings.inter_step_delay_ms, 0);
        assert_eq!(settings.cleanup.risk_tolerance, RiskTolerance::Medium);
        assert_eq!(settings.out_dir, PathBuf::from("out"));
        assert_eq!(settings.tester.commands.len(), 2);
    }

    #[test]
    fn settings_reject_malformed_toml() {
        assert!(matches!(
            Settings::from_toml_str("dry_run = \"maybe\""),
            Err(SitegenError::Configuration { .. })
        ));
    }
}

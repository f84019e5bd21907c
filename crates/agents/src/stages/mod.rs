//! Stage implementations.
//!
//! | Agent | Stage | Next | Blocked → |
//! |-------|-------|------|-----------|
//! | [`AnalystAgent`] | analysis | builder | |
//! | [`BuilderAgent`] | build | reviewer | |
//! | [`ReviewerAgent`] | review | style | builder |
//! | [`StyleAgent`] | style | tester | builder |
//! | [`TesterAgent`] | test | publisher | diagnostic |
//! | [`PublisherAgent`] | publish | cleanup | |
//! | [`CleanupAgent`] | cleanup | (done) | |
//! | [`DiagnosticAgent`] | diagnostic | tester | |
//! | [`InitAgent`] | init | page generator | |
//! | [`PageGeneratorAgent`] | pagegen | reviewer | |
//! | [`CompatAgent`] | compat | (done) | builder |

mod analyst;
mod builder;
mod cleanup;
mod compat;
mod diagnostic;
mod init;
mod pagegen;
mod publisher;
mod reviewer;
mod style;
mod tester;

pub use analyst::AnalystAgent;
pub use builder::{extract_sources, BuilderAgent, GenerationOutcome};
pub use cleanup::{CleanupAgent, CleanupCandidate};
pub use compat::CompatAgent;
pub use diagnostic::{DiagnosticAgent, PatchOutcome, PATCHES};
pub use init::{site_status, InitAgent, SiteStatus};
pub use pagegen::PageGeneratorAgent;
pub use publisher::PublisherAgent;
pub use reviewer::{autofix_schema, review_schema, ReviewerAgent};
pub use style::{check_component, StyleAgent};
pub use tester::TesterAgent;

use pipeline::{BlockName, ChangeResult, FileChange, Handover, Settings};
use serde_json::Value;

use crate::detection::component_name;
use crate::{AgentContext, AgentFailure, AgentInput};

/// Agent routing names.
pub mod names {
    pub const ANALYST: &str = "analystAgent";
    pub const BUILDER: &str = "builderAgent";
    pub const REVIEWER: &str = "reviewerAgent";
    pub const STYLE: &str = "styleAgent";
    pub const TESTER: &str = "testerAgent";
    pub const PUBLISHER: &str = "publisherAgent";
    pub const CLEANUP: &str = "cleanupAgent";
    pub const DIAGNOSTIC: &str = "diagnosticAgent";
    pub const INIT: &str = "initAgent";
    pub const PAGE_GENERATOR: &str = "pageGeneratorAgent";
    pub const COMPAT: &str = "compatAgent";
}

pub(crate) fn schema_path(settings: &Settings, block: &BlockName) -> String {
    format!("{}/{}.ts", settings.schema_dir.trim_end_matches('/'), block)
}

pub(crate) fn component_path(settings: &Settings, block: &BlockName) -> String {
    format!(
        "{}/{}.tsx",
        settings.component_dir.trim_end_matches('/'),
        component_name(block)
    )
}

/// Applies `changes`, failing the stage if any real change failed.
pub(crate) async fn apply_changes(
    ctx: &AgentContext,
    changes: &[FileChange],
    dry_run: bool,
) -> Result<Vec<ChangeResult>, AgentFailure> {
    let results = ctx.workspace.apply_changes(changes, dry_run).await;
    let failures: Vec<String> = results
        .iter()
        .filter_map(|r| r.error.as_ref().map(|e| format!("{}: {e}", r.file)))
        .collect();
    if failures.is_empty() {
        Ok(results)
    } else {
        Err(AgentFailure::Apply {
            failed: failures.len(),
            details: failures.join("; "),
        })
    }
}

/// Source text of `path`: the workspace copy, else a copy carried in the
/// incoming handover's `report.sources`, else one passed in the stage
/// config's `sources` map. Dry-run builds never hit the disk.
pub(crate) async fn read_source(
    ctx: &AgentContext,
    path: &str,
    input: &AgentInput,
) -> Result<Option<String>, AgentFailure> {
    if let Some(content) = ctx.workspace.read_file(path).await? {
        return Ok(Some(content));
    }
    let carried = input
        .handover
        .as_ref()
        .and_then(|h| h.artifacts().report.get("sources"))
        .and_then(|sources| sources.get(path));
    let configured = input.config.get("sources").and_then(|sources| sources.get(path));
    Ok(carried
        .or(configured)
        .and_then(Value::as_str)
        .map(str::to_string))
}

/// Paths listed in the incoming handover's `artifacts.files` under `dir` with
/// extension `ext`, followed by `derived` paths not already present.
pub(crate) fn target_files(
    incoming: Option<&Handover>,
    dir: &str,
    ext: &str,
    derived: impl IntoIterator<Item = String>,
) -> Vec<String> {
    let prefix = format!("{}/", dir.trim_end_matches('/'));
    let mut files: Vec<String> = incoming
        .map(|h| {
            h.artifacts()
                .files
                .iter()
                .filter(|f| f.starts_with(&prefix) && f.ends_with(ext))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    for path in derived {
        if !files.contains(&path) {
            files.push(path);
        }
    }
    files
}

//! Cross-checks generated pages against the blocks that were built.

use std::collections::BTreeSet;

use async_trait::async_trait;
use pipeline::{AgentName, BlockName, ContextId, Finding, FindingSeverity, Stage};
use serde_json::{json, Value};
use tracing::info;

use super::{component_path, names, schema_path};
use crate::{Agent, AgentContext, AgentFailure, AgentInput, StageResult};

pub const RULE_UNKNOWN_BLOCK: &str = "unknown-block";
pub const RULE_MISSING_FILE: &str = "missing-file";

#[derive(Debug, Default, Clone, Copy)]
pub struct CompatAgent;

impl CompatAgent {
    /// Pages from the incoming handover, else from the page generator's
    /// snapshot for this run.
    async fn pages(
        ctx: &AgentContext,
        input: &AgentInput,
        context_id: ContextId,
    ) -> Result<Vec<Value>, AgentFailure> {
        if let Some(pages) = input
            .handover
            .as_ref()
            .map(|h| h.artifacts().pages.clone())
            .filter(|pages| !pages.is_empty())
        {
            return Ok(pages);
        }
        let generator = AgentName::from_static(names::PAGE_GENERATOR);
        Ok(ctx
            .archive
            .load(context_id, &generator)
            .await?
            .map(|h| h.artifacts().pages.clone())
            .unwrap_or_default())
    }
}

/// Block types referenced by a page document's `sections`.
fn section_types(page: &Value) -> Vec<&str> {
    page.get("sections")
        .and_then(Value::as_array)
        .map(|sections| {
            sections
                .iter()
                .filter_map(|s| s.get("_type").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Agent for CompatAgent {
    fn name(&self) -> AgentName {
        AgentName::from_static(names::COMPAT)
    }

    fn stage(&self) -> Stage {
        Stage::Compat
    }

    fn next_agent(&self) -> Option<AgentName> {
        None
    }

    fn remediation_agent(&self) -> Option<AgentName> {
        Some(AgentName::from_static(names::BUILDER))
    }

    async fn perform(
        &self,
        ctx: &AgentContext,
        input: &AgentInput,
        context_id: ContextId,
    ) -> Result<StageResult, AgentFailure> {
        let manifest = ctx.manifests.load(context_id).await?;
        let pages = Self::pages(ctx, input, context_id).await?;
        let known: BTreeSet<&str> = manifest.blocks.iter().map(String::as_str).collect();
        let missing_severity = if input.dry_run {
            FindingSeverity::Warning
        } else {
            FindingSeverity::Blocking
        };

        let mut findings = Vec::new();
        let mut referenced: BTreeSet<&str> = BTreeSet::new();
        for page in &pages {
            let page_id = page.get("_id").and_then(Value::as_str).unwrap_or("page");
            for block in section_types(page) {
                if !known.contains(block) {
                    findings.push(Finding::new(
                        page_id,
                        RULE_UNKNOWN_BLOCK,
                        FindingSeverity::Blocking,
                        format!("Section '{block}' was not built in this run"),
                    ));
                }
                referenced.insert(block);
            }
        }

        for block in referenced.iter().filter(|b| known.contains(*b)) {
            let Some(block) = BlockName::new(*block) else {
                continue;
            };
            for file in [
                schema_path(&ctx.settings, &block),
                component_path(&ctx.settings, &block),
            ] {
                if ctx.workspace.read_file(&file).await?.is_none() {
                    findings.push(Finding::new(
                        &file,
                        RULE_MISSING_FILE,
                        missing_severity,
                        format!("{block} source is missing"),
                    ));
                }
            }
        }

        let blocking: Vec<String> = findings
            .iter()
            .filter(|f| f.is_blocking())
            .map(ToString::to_string)
            .collect();
        info!(
            pages = pages.len(),
            blocks = referenced.len(),
            findings = findings.len(),
            "Compatibility check finished"
        );

        let report = json!({
            "dryRun": input.dry_run,
            "pages": pages.len(),
            "blocks": referenced,
            "findings": findings,
        });
        if blocking.is_empty() {
            let notes = if pages.is_empty() {
                "No pages to check".to_string()
            } else {
                format!("{} page(s) compatible", pages.len())
            };
            Ok(StageResult::done(report).with_notes(notes))
        } else {
            let count = blocking.len();
            Ok(StageResult::blocked(blocking, report)
                .with_notes(format!("{count} compatibility issue(s)")))
        }
    }
}

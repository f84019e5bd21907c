//! Page composition from the run's blocks.

use async_trait::async_trait;
use pipeline::{AgentName, ContextId, ManifestUpdate, Stage};
use serde_json::{json, Value};
use tracing::info;

use super::names;
use super::publisher::page_document;
use crate::{Agent, AgentContext, AgentFailure, AgentInput, StageResult};

const DEFAULT_PAGE: &str = "home";

#[derive(Debug, Default, Clone, Copy)]
pub struct PageGeneratorAgent;

impl PageGeneratorAgent {
    /// Requested pages: stage config, then the incoming plan, then `home`.
    fn requested_pages(input: &AgentInput) -> Vec<String> {
        let configured = input.config_strings("pages");
        if !configured.is_empty() {
            return configured;
        }
        let planned: Vec<String> = input
            .handover
            .as_ref()
            .and_then(|h| h.artifacts().plan.as_ref())
            .and_then(|plan| plan.get("pages"))
            .and_then(Value::as_array)
            .map(|pages| {
                pages
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if planned.is_empty() {
            vec![DEFAULT_PAGE.to_string()]
        } else {
            planned
        }
    }
}

#[async_trait]
impl Agent for PageGeneratorAgent {
    fn name(&self) -> AgentName {
        AgentName::from_static(names::PAGE_GENERATOR)
    }

    fn stage(&self) -> Stage {
        Stage::Pagegen
    }

    fn next_agent(&self) -> Option<AgentName> {
        Some(AgentName::from_static(names::REVIEWER))
    }

    async fn perform(
        &self,
        ctx: &AgentContext,
        input: &AgentInput,
        context_id: ContextId,
    ) -> Result<StageResult, AgentFailure> {
        let manifest = ctx.manifests.load(context_id).await?;
        let pages = Self::requested_pages(input);
        let documents: Vec<Value> = pages
            .iter()
            .map(|page| page_document(page, &manifest.blocks))
            .collect();
        let slugs: Vec<String> = documents
            .iter()
            .filter_map(|d| d["slug"]["current"].as_str())
            .map(str::to_string)
            .collect();

        let publish = ctx.cms_configured() && !input.dry_run;
        if publish {
            let cms = ctx.cms()?;
            for document in &documents {
                cms.create_or_replace(document.clone()).await?;
            }
        }

        ctx.manifests
            .update(
                context_id,
                &self.name(),
                &ManifestUpdate {
                    pages: slugs.clone(),
                    ..Default::default()
                },
            )
            .await?;
        info!(
            pages = slugs.len(),
            sections = manifest.blocks.len(),
            published = publish,
            "Pages composed"
        );

        Ok(StageResult::ready(json!({
            "dryRun": input.dry_run,
            "published": publish,
            "pages": slugs,
            "sections": manifest.blocks,
        }))
        .with_pages(documents)
        .with_notes(format!("{} page(s) composed", slugs.len())))
    }
}

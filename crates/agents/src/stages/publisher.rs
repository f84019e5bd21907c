//! Publishes block definitions and pages to the CMS.

use async_trait::async_trait;
use pipeline::{
    AgentName, BlockName, CmsClient, CmsError, ContextId, DocumentId, EnvVar, Stage, CMS_ENV,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::{component_path, names, schema_path};
use crate::detection::{display_title, slugify};
use crate::{Agent, AgentContext, AgentFailure, AgentInput, StageResult};

/// What an upsert did to one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertAction {
    Created,
    Updated,
}

pub(crate) fn block_definition(ctx: &AgentContext, block: &BlockName) -> Value {
    json!({
        "_id": format!("blockDefinition-{block}"),
        "_type": "blockDefinition",
        "name": block,
        "title": display_title(block),
        "schemaFile": schema_path(&ctx.settings, block),
        "componentFile": component_path(&ctx.settings, block),
    })
}

pub(crate) fn page_document(page: &str, sections: &[String]) -> Value {
    let slug = slugify(page);
    let slug = if slug.is_empty() { "home".to_string() } else { slug };
    let title = page_title(page);
    let sections: Vec<Value> = sections
        .iter()
        .enumerate()
        .map(|(i, block)| json!({ "_type": block, "_key": format!("{block}-{i}") }))
        .collect();
    json!({
        "_id": format!("page-{slug}"),
        "_type": "page",
        "title": title,
        "slug": { "_type": "slug", "current": slug },
        "sections": sections,
    })
}

/// `contact-us` and `Contact us` both read `Contact us`.
fn page_title(page: &str) -> String {
    let words = page.trim().replace(['-', '_'], " ");
    let mut chars = words.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Home".to_string(),
    }
}

/// Fetches `document` by `_id` and patches it, or creates it when absent.
pub(crate) async fn upsert(cms: &dyn CmsClient, document: Value) -> Result<UpsertAction, CmsError> {
    upsert_preserving(cms, document, &[]).await
}

/// Like [`upsert`], but leaves `preserve` fields alone when the stored
/// document already has a non-null value for them.
pub(crate) async fn upsert_preserving(
    cms: &dyn CmsClient,
    document: Value,
    preserve: &[&str],
) -> Result<UpsertAction, CmsError> {
    let id = document
        .get("_id")
        .and_then(Value::as_str)
        .and_then(DocumentId::new)
        .ok_or(CmsError::InvalidDocument)?;
    let existing = cms
        .fetch("*[_id == $id][0]", json!({ "id": id.as_str() }))
        .await?;

    if existing.is_null() {
        cms.create(document).await?;
        debug!(%id, "Document created");
        return Ok(UpsertAction::Created);
    }

    let fields: Map<String, Value> = document
        .as_object()
        .map(|doc| {
            doc.iter()
                .filter(|(key, _)| *key != "_id" && *key != "_type")
                .filter(|(key, _)| {
                    !(preserve.contains(&key.as_str()) && !existing[key.as_str()].is_null())
                })
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default();
    cms.patch(&id, fields).await?;
    debug!(%id, "Document updated");
    Ok(UpsertAction::Updated)
}

/// Page titles composed earlier in the run, keyed by slug.
fn composed_titles(input: &AgentInput) -> Map<String, Value> {
    input
        .handover
        .iter()
        .flat_map(|h| h.artifacts().pages.iter())
        .filter_map(|doc| {
            let slug = doc["slug"]["current"].as_str()?;
            let title = doc.get("title").filter(|t| t.is_string())?;
            Some((slug.to_string(), title.clone()))
        })
        .collect()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PublisherAgent;

#[async_trait]
impl Agent for PublisherAgent {
    fn name(&self) -> AgentName {
        AgentName::from_static(names::PUBLISHER)
    }

    fn stage(&self) -> Stage {
        Stage::Publish
    }

    fn next_agent(&self) -> Option<AgentName> {
        Some(AgentName::from_static(names::CLEANUP))
    }

    fn required_env(&self) -> &'static [EnvVar] {
        &CMS_ENV
    }

    async fn perform(
        &self,
        ctx: &AgentContext,
        input: &AgentInput,
        context_id: ContextId,
    ) -> Result<StageResult, AgentFailure> {
        let manifest = ctx.manifests.load(context_id).await?;
        let mut documents: Vec<Value> = manifest
            .blocks
            .iter()
            .filter_map(BlockName::new)
            .map(|block| block_definition(ctx, &block))
            .collect();
        let titles = composed_titles(input);
        documents.extend(manifest.pages.iter().map(|page| {
            let mut document = page_document(page, &manifest.blocks);
            if let Some(title) = titles.get(page) {
                document["title"] = title.clone();
            }
            document
        }));
        let ids: Vec<String> = documents
            .iter()
            .filter_map(|d| d.get("_id").and_then(Value::as_str))
            .map(str::to_string)
            .collect();

        if input.dry_run {
            info!(planned = documents.len(), "Dry-run: documents planned, not published");
            return Ok(StageResult::ready(json!({
                "dryRun": true,
                "planned": documents.len(),
                "created": 0,
                "updated": 0,
                "documents": ids,
            }))
            .with_notes(format!("{} document(s) planned", documents.len())));
        }

        let cms = ctx.cms()?;
        let mut actions = Map::new();
        let (mut created, mut updated) = (0usize, 0usize);
        for (id, document) in ids.iter().zip(documents) {
            let preserve: &[&str] = if document["_type"] == "page" { &["title"] } else { &[] };
            let action = upsert_preserving(cms.as_ref(), document, preserve).await?;
            match action {
                UpsertAction::Created => created += 1,
                UpsertAction::Updated => updated += 1,
            }
            actions.insert(id.clone(), json!(action));
        }

        info!(created, updated, "Documents published");
        Ok(StageResult::ready(json!({
            "dryRun": false,
            "planned": ids.len(),
            "created": created,
            "updated": updated,
            "documents": ids,
            "actions": actions,
        }))
        .with_notes(format!("{created} created, {updated} updated")))
    }
}

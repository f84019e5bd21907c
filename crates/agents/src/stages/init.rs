//! Site bootstrap: base documents for an empty dataset, navigation sync
//! otherwise.

use async_trait::async_trait;
use pipeline::{AgentName, CmsClient, CmsError, ContextId, EnvVar, Stage, CMS_ENV};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, instrument};

use super::names;
use super::publisher::{page_document, upsert};
use crate::{Agent, AgentContext, AgentFailure, AgentInput, StageResult};

/// Counts every document except system ones (`_.` prefixed ids).
const DOCUMENT_COUNT_QUERY: &str = r#"count(*[!(_id in path("_.**"))])"#;
const PAGES_QUERY: &str = r#"*[_type == "page"] | order(title asc) {title, "slug": slug.current}"#;

const DEFAULT_SITE_NAME: &str = "My Site";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteStatus {
    pub empty: bool,
    pub document_count: u64,
}

#[instrument(skip_all)]
pub async fn site_status(cms: &dyn CmsClient) -> Result<SiteStatus, CmsError> {
    let count = cms.fetch(DOCUMENT_COUNT_QUERY, json!({})).await?;
    let document_count = count
        .as_u64()
        .ok_or_else(|| CmsError::InvalidResponse(format!("expected a count, got {count}")))?;
    Ok(SiteStatus {
        empty: document_count == 0,
        document_count,
    })
}

fn nav_item(title: &str, slug: &str) -> Value {
    let href = if slug == "home" {
        "/".to_string()
    } else {
        format!("/{slug}")
    };
    json!({ "_key": format!("nav-{slug}"), "label": title, "href": href })
}

fn navigation_from_pages(pages: &Value) -> Vec<Value> {
    pages
        .as_array()
        .map(|pages| {
            pages
                .iter()
                .filter_map(|page| {
                    let slug = page.get("slug").and_then(Value::as_str)?;
                    let title = page.get("title").and_then(Value::as_str).unwrap_or(slug);
                    Some(nav_item(title, slug))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn bootstrap_documents(site_name: &str, site_url: Option<&str>, sections: &[String]) -> Vec<Value> {
    let navigation = vec![nav_item("Home", "home")];
    vec![
        json!({
            "_id": "siteSettings",
            "_type": "siteSettings",
            "title": site_name,
            "url": site_url,
        }),
        json!({
            "_id": "header",
            "_type": "header",
            "title": site_name,
            "navigation": navigation,
        }),
        json!({
            "_id": "footer",
            "_type": "footer",
            "copyright": format!("© {site_name}"),
            "navigation": navigation,
        }),
        page_document("home", sections),
    ]
}

#[derive(Debug, Default, Clone, Copy)]
pub struct InitAgent;

#[async_trait]
impl Agent for InitAgent {
    fn name(&self) -> AgentName {
        AgentName::from_static(names::INIT)
    }

    fn stage(&self) -> Stage {
        Stage::Other("init".to_string())
    }

    fn next_agent(&self) -> Option<AgentName> {
        Some(AgentName::from_static(names::PAGE_GENERATOR))
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
        let cms = ctx.cms()?;
        let status = site_status(cms.as_ref()).await?;

        if status.empty {
            let manifest = ctx.manifests.load(context_id).await?;
            let site_name = input.config_str("siteName").unwrap_or(DEFAULT_SITE_NAME);
            let documents =
                bootstrap_documents(site_name, ctx.env.get(EnvVar::SiteUrl), &manifest.blocks);
            let ids: Vec<Value> = documents.iter().map(|d| d["_id"].clone()).collect();

            if !input.dry_run {
                for document in documents {
                    cms.create_or_replace(document).await?;
                }
            }
            ctx.manifests.add_page(context_id, "home").await?;
            info!(documents = ids.len(), dry_run = input.dry_run, "Empty dataset bootstrapped");

            return Ok(StageResult::ready(json!({
                "dryRun": input.dry_run,
                "status": status,
                "action": "bootstrap",
                "documents": ids,
            }))
            .with_notes(format!("Bootstrapped {} base document(s)", ids.len())));
        }

        let pages = cms.fetch(PAGES_QUERY, json!({})).await?;
        let navigation = navigation_from_pages(&pages);
        if !input.dry_run {
            for id in ["header", "footer"] {
                upsert(
                    cms.as_ref(),
                    json!({ "_id": id, "_type": id, "navigation": navigation }),
                )
                .await?;
            }
        }
        info!(
            documents = status.document_count,
            nav_items = navigation.len(),
            "Navigation synced from existing pages"
        );

        Ok(StageResult::ready(json!({
            "dryRun": input.dry_run,
            "status": status,
            "action": "sync-navigation",
            "navigation": navigation,
        }))
        .with_notes(format!(
            "Site has {} document(s); {} navigation item(s)",
            status.document_count,
            navigation.len()
        )))
    }
}

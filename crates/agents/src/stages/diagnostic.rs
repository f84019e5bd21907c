//! Known-issue patching for generated schemas.
//!
//! Each entry in [`PATCHES`] is a literal find/replace scoped to one block's
//! schema file. A patch is applied whenever its target text is present,
//! wherever the replacement may already appear. No replacement contains its
//! own target, so running the stage twice changes nothing the second time.

use std::collections::BTreeMap;

use async_trait::async_trait;
use pipeline::{AgentName, BlockName, ContextId, FileChange, Stage};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{apply_changes, names, read_source, schema_path};
use crate::{Agent, AgentContext, AgentFailure, AgentInput, StageResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Patch {
    pub id: &'static str,
    pub description: &'static str,
    pub block: &'static str,
    pub target: &'static str,
    pub replacement: &'static str,
}

pub const PATCHES: &[Patch] = &[
    Patch {
        id: "rating-max-bound",
        description: "Testimonial ratings are capped at 5",
        block: "testimonialsBlock",
        target: "Rule.min(1).max(10)",
        replacement: "Rule.min(1).max(5)",
    },
    Patch {
        id: "pricing-price-min",
        description: "Prices cannot be negative",
        block: "pricingBlock",
        target: "Rule.min(-1)",
        replacement: "Rule.min(0)",
    },
    Patch {
        id: "countdown-target-datetime",
        description: "Countdown targets need a time, not only a date",
        block: "countdownBlock",
        target: "name: 'targetDate', type: 'date'",
        replacement: "name: 'targetDate', type: 'datetime'",
    },
    Patch {
        id: "faq-answer-text",
        description: "FAQ answers are multi-line text",
        block: "faqBlock",
        target: "name: 'answer', type: 'string'",
        replacement: "name: 'answer', type: 'text'",
    },
    Patch {
        id: "hero-image-hotspot",
        description: "Hero images enable hotspot cropping",
        block: "heroBlock",
        target: "name: 'image', type: 'image' }",
        replacement: "name: 'image', type: 'image', options: { hotspot: true } }",
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PatchOutcome {
    Fixed,
    AlreadyCorrected,
    /// The file is absent or does not contain the target.
    NotApplicable,
    Errored { error: String },
}

impl Patch {
    /// Applies the patch to `content` in place.
    pub fn apply(&self, content: &mut String) -> PatchOutcome {
        if content.contains(self.target) {
            *content = content.replace(self.target, self.replacement);
            PatchOutcome::Fixed
        } else if content.contains(self.replacement) {
            PatchOutcome::AlreadyCorrected
        } else {
            PatchOutcome::NotApplicable
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PatchReport {
    id: &'static str,
    file: String,
    #[serde(flatten)]
    outcome: PatchOutcome,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DiagnosticAgent;

impl DiagnosticAgent {
    /// Ids of page documents without a slug, when the CMS is reachable.
    async fn probe_cms(ctx: &AgentContext) -> Value {
        let Some(cms) = ctx.cms.as_ref().filter(|_| ctx.cms_configured()) else {
            return json!({ "skipped": "CMS not configured" });
        };
        match cms
            .fetch(r#"*[_type == "page" && !defined(slug.current)]._id"#, json!({}))
            .await
        {
            Ok(ids) => json!({ "pagesMissingSlug": ids }),
            Err(e) => {
                warn!(error = %e, "CMS probe failed");
                json!({ "error": e.to_string() })
            }
        }
    }
}

#[async_trait]
impl Agent for DiagnosticAgent {
    fn name(&self) -> AgentName {
        AgentName::from_static(names::DIAGNOSTIC)
    }

    fn stage(&self) -> Stage {
        Stage::Diagnostic
    }

    fn next_agent(&self) -> Option<AgentName> {
        Some(AgentName::from_static(names::TESTER))
    }

    async fn perform(
        &self,
        ctx: &AgentContext,
        input: &AgentInput,
        _context_id: ContextId,
    ) -> Result<StageResult, AgentFailure> {
        let mut by_file: BTreeMap<String, Vec<&Patch>> = BTreeMap::new();
        for patch in PATCHES {
            let block = BlockName::from_static(patch.block);
            by_file
                .entry(schema_path(&ctx.settings, &block))
                .or_default()
                .push(patch);
        }

        let mut reports = Vec::new();
        let mut changes = Vec::new();
        let mut fixed: Vec<&Patch> = Vec::new();
        for (file, patches) in by_file {
            let original = match read_source(ctx, &file, input).await {
                Ok(content) => content,
                Err(e) => {
                    let error = e.to_string();
                    for patch in patches {
                        reports.push(PatchReport {
                            id: patch.id,
                            file: file.clone(),
                            outcome: PatchOutcome::Errored {
                                error: error.clone(),
                            },
                        });
                    }
                    continue;
                }
            };
            let Some(original) = original else {
                for patch in patches {
                    reports.push(PatchReport {
                        id: patch.id,
                        file: file.clone(),
                        outcome: PatchOutcome::NotApplicable,
                    });
                }
                continue;
            };

            let mut content = original.clone();
            for patch in patches {
                let outcome = patch.apply(&mut content);
                if outcome == PatchOutcome::Fixed {
                    fixed.push(patch);
                }
                reports.push(PatchReport {
                    id: patch.id,
                    file: file.clone(),
                    outcome,
                });
            }
            if content != original {
                changes.push(FileChange::write(file, content));
            }
        }

        let results = apply_changes(ctx, &changes, input.dry_run).await?;

        if !input.dry_run {
            let mut learned = ctx.patterns.load().await?;
            learned.total_runs += 1;
            for patch in &fixed {
                learned.record(patch.id, patch.description);
            }
            ctx.patterns.save(&learned).await?;
        }

        let errored = reports
            .iter()
            .filter(|r| matches!(r.outcome, PatchOutcome::Errored { .. }))
            .count();
        let skipped = reports.len() - fixed.len() - errored;
        let cms_probe = Self::probe_cms(ctx).await;
        info!(fixed = fixed.len(), skipped, errored, "Diagnostic patches evaluated");

        let report = json!({
            "dryRun": input.dry_run,
            "fixedCount": fixed.len(),
            "skipped": skipped,
            "errored": errored,
            "patches": reports,
            "changes": results,
            "cms": cms_probe,
        });
        Ok(StageResult::ready(report)
            .with_files(changes.iter().map(|c| c.file().to_string()).collect())
            .with_notes(format!(
                "{} fixed, {skipped} skipped, {errored} errored",
                fixed.len()
            )))
    }
}

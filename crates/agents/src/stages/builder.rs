//! Schema and component generation.
//!
//! Builds the block named in config, else every block in the incoming
//! analysis plan, else the one block detected from the prompt.

use std::sync::LazyLock;

use async_trait::async_trait;
use pipeline::{
    AgentName, BlockName, CompletionRequest, ContextId, FileChange, ManifestUpdate, Stage,
};
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::{apply_changes, component_path, names, schema_path};
use crate::detection::{
    component_name, configured_block, detect_block, BlockDetection, DetectionSource,
};
use crate::templates::{block_template, BlockSources};
use crate::{Agent, AgentContext, AgentFailure, AgentInput, StageResult};

static SCHEMA_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```schema[^\n]*\n(.*?)```").expect("static pattern"));
static COMPONENT_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```component[^\n]*\n(.*?)```").expect("static pattern"));

/// Where the generated sources came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationOutcome {
    Generated { model: String },
    /// The LLM was unavailable or unusable; templates were used instead.
    FallbackUsed { reason: String },
}

impl GenerationOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self, GenerationOutcome::FallbackUsed { .. })
    }

    /// One-line summary surfaced as `aiOut` in the stage report.
    pub fn ai_out(&self) -> String {
        match self {
            GenerationOutcome::Generated { model } => format!("generated by {model}"),
            GenerationOutcome::FallbackUsed { reason } => {
                format!("fallback template used: {reason}")
            }
        }
    }
}

/// Pulls the fenced `schema` and `component` sections out of an LLM answer.
/// Both must be present and non-blank.
pub fn extract_sources(text: &str) -> Option<BlockSources> {
    let section = |fence: &Regex| {
        fence
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim())
            .filter(|s| !s.is_empty())
            .map(|s| format!("{s}\n"))
    };
    Some(BlockSources {
        schema: section(&SCHEMA_FENCE)?,
        component: section(&COMPONENT_FENCE)?,
    })
}

fn generation_prompt(request: &str, block: &BlockName) -> String {
    let component = component_name(block);
    format!(
        "Generate a Sanity CMS block named `{block}` and its React component.\n\
         Request: {request}\n\n\
         Answer with exactly two fenced code blocks.\n\
         1. A block fenced as ```schema containing TypeScript that imports \
         `defineField` and `defineType` from 'sanity' and declares \
         `export const {block} = defineType({{ name: '{block}', type: 'object', ... }})`. \
         No default export. Every `title` field has a `validation` rule.\n\
         2. A block fenced as ```component containing a TSX file that declares \
         `export function {component}(props)`. Style with `className` only: no \
         inline `style` attributes and no hard-coded colours. No default export."
    )
}

/// Blocks to build for this input, in build order. Never empty.
pub fn planned_blocks(input: &AgentInput) -> Vec<BlockDetection> {
    if let Some(detection) = input.config_str("block").and_then(configured_block) {
        return vec![detection];
    }
    let mut planned: Vec<BlockDetection> = Vec::new();
    let listed = input
        .handover
        .as_ref()
        .and_then(|h| h.artifacts().plan.as_ref())
        .and_then(|plan| plan.get("blocks"))
        .and_then(Value::as_array);
    for block in listed.into_iter().flatten().filter_map(Value::as_str) {
        if let Some(block) = BlockName::new(block) {
            if !planned.iter().any(|d| d.block == block) {
                planned.push(BlockDetection {
                    block,
                    source: DetectionSource::Plan,
                });
            }
        }
    }
    if planned.is_empty() {
        planned.push(detect_block(input.prompt_text().unwrap_or_default()));
    }
    planned
}

struct BuiltBlock {
    detection: BlockDetection,
    generation: GenerationOutcome,
    schema_file: String,
    component_file: String,
    sources: BlockSources,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BuilderAgent;

impl BuilderAgent {
    async fn generate(
        &self,
        ctx: &AgentContext,
        request: &str,
        block: &BlockName,
    ) -> (BlockSources, GenerationOutcome) {
        let Some(llm) = &ctx.llm else {
            return (
                block_template(block),
                GenerationOutcome::FallbackUsed {
                    reason: "ANTHROPIC_API_KEY is not set".to_string(),
                },
            );
        };

        let completion = llm
            .complete(CompletionRequest::new(
                generation_prompt(request, block),
                ctx.settings.max_tokens,
            ))
            .await;
        match completion {
            Ok(completion) => match extract_sources(&completion.text) {
                Some(sources) => (
                    sources,
                    GenerationOutcome::Generated {
                        model: completion.model,
                    },
                ),
                None => {
                    warn!(%block, "LLM answer lacked schema/component sections; using template");
                    (
                        block_template(block),
                        GenerationOutcome::FallbackUsed {
                            reason: "LLM answer lacked schema/component sections".to_string(),
                        },
                    )
                }
            },
            Err(e) => {
                warn!(%block, error = %e, "LLM call failed; using template");
                (
                    block_template(block),
                    GenerationOutcome::FallbackUsed {
                        reason: e.to_string(),
                    },
                )
            }
        }
    }
}

#[async_trait]
impl Agent for BuilderAgent {
    fn name(&self) -> AgentName {
        AgentName::from_static(names::BUILDER)
    }

    fn stage(&self) -> Stage {
        Stage::Build
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
        let request = input.prompt_text().unwrap_or_default();

        let mut built = Vec::new();
        for detection in planned_blocks(input) {
            let (sources, generation) = self.generate(ctx, request, &detection.block).await;
            built.push(BuiltBlock {
                schema_file: schema_path(&ctx.settings, &detection.block),
                component_file: component_path(&ctx.settings, &detection.block),
                detection,
                generation,
                sources,
            });
        }

        let changes: Vec<FileChange> = built
            .iter()
            .flat_map(|b| {
                [
                    FileChange::write(&b.schema_file, &b.sources.schema),
                    FileChange::write(&b.component_file, &b.sources.component),
                ]
            })
            .collect();
        let results = apply_changes(ctx, &changes, input.dry_run).await?;

        let files: Vec<String> = built
            .iter()
            .flat_map(|b| [b.schema_file.clone(), b.component_file.clone()])
            .collect();
        ctx.manifests
            .update(
                context_id,
                &self.name(),
                &ManifestUpdate {
                    files: files.clone(),
                    blocks: built.iter().map(|b| b.detection.block.to_string()).collect(),
                    ..Default::default()
                },
            )
            .await?;

        let mut generated = Map::new();
        let mut entries = Vec::new();
        for b in &built {
            info!(
                block = %b.detection.block,
                source = ?b.detection.source,
                fallback = b.generation.is_fallback(),
                "Block built"
            );
            generated.insert(b.schema_file.clone(), Value::String(b.sources.schema.clone()));
            generated.insert(
                b.component_file.clone(),
                Value::String(b.sources.component.clone()),
            );
            entries.push(json!({
                "block": b.detection.block,
                "detection": b.detection.source,
                "generation": b.generation,
                "aiOut": b.generation.ai_out(),
            }));
        }

        // Top-level fields describe the first block, or the first fallback.
        let lead = built
            .iter()
            .find(|b| b.generation.is_fallback())
            .or_else(|| built.first())
            .ok_or_else(|| AgentFailure::InvalidInput("no block to build".to_string()))?;
        let ai_out = match built.as_slice() {
            [only] => only.generation.ai_out(),
            many => many
                .iter()
                .map(|b| format!("{}: {}", b.detection.block, b.generation.ai_out()))
                .collect::<Vec<_>>()
                .join("; "),
        };
        let notes = match built.as_slice() {
            [only] => format!("{}: {ai_out}", only.detection.block),
            many => format!("{} blocks: {ai_out}", many.len()),
        };
        let report = json!({
            "block": lead.detection.block,
            "detection": lead.detection.source,
            "generation": lead.generation,
            "aiOut": ai_out,
            "blocks": entries,
            "dryRun": input.dry_run,
            "plannedChanges": changes.len(),
            "changes": results,
            "sources": generated,
        });

        Ok(StageResult::ready(report)
            .with_files(files)
            .with_notes(notes))
    }
}

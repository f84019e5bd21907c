//! Multi-stage runs.
//!
//! [`Orchestrator::run_chain`] walks the fixed analyst → cleanup chain;
//! [`Orchestrator::auto_generate`] builds a set of blocks and carries them
//! through page generation, checks and (optionally) publishing while
//! reporting progress. Both stop at the first stage that does not succeed.
//! Nothing is rolled back.

use std::sync::Arc;
use std::time::Duration;

use pipeline::{
    AgentName, BlockName, ContextId, Handover, PipelineEventStatus, ProgressEvent,
    ProgressReporter, SitegenError,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, instrument, warn};

use crate::detection::{configured_block, detect_blocks};
use crate::stages::names;
use crate::{run_agent, AgentContext, AgentInput, AgentOutcome, AgentRegistry};

/// Stage order of [`Orchestrator::run_chain`].
pub const CHAIN: [&str; 7] = [
    names::ANALYST,
    names::BUILDER,
    names::REVIEWER,
    names::STYLE,
    names::TESTER,
    names::PUBLISHER,
    names::CLEANUP,
];

#[derive(Debug, Clone)]
pub struct ChainOptions {
    pub dry_run: bool,
    /// Passed to every stage as its config.
    pub config: Value,
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self {
            dry_run: true,
            config: Value::Null,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoGenerateRequest {
    #[serde(default)]
    pub prompt: String,
    /// Block names to build; detected from the prompt when empty.
    #[serde(default)]
    pub blocks: Vec<String>,
    #[serde(default)]
    pub pages: Vec<String>,
    #[serde(default = "default_true")]
    pub dry_run: bool,
    /// Whether the publisher runs.
    #[serde(default)]
    pub publish: bool,
}

fn default_true() -> bool {
    true
}

impl AutoGenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            blocks: Vec::new(),
            pages: Vec::new(),
            dry_run: true,
            publish: false,
        }
    }

    /// Requested blocks, or the ones the prompt mentions.
    pub fn resolved_blocks(&self) -> Vec<BlockName> {
        let requested: Vec<BlockName> = self
            .blocks
            .iter()
            .filter_map(|name| configured_block(name.trim()))
            .map(|detection| detection.block)
            .collect();
        if requested.is_empty() {
            detect_blocks(&self.prompt)
        } else {
            requested
        }
    }
}

/// Summary of a multi-stage run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<ContextId>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_agent: Option<AgentName>,
    pub outcomes: Vec<AgentOutcome>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            context_id: None,
            ok: true,
            failed_agent: None,
            outcomes: Vec::new(),
        }
    }

    /// Records `outcome`; returns the handover to pass on when it succeeded.
    fn record(&mut self, outcome: AgentOutcome) -> Option<Handover> {
        if let Some(handover) = &outcome.handover {
            self.context_id.get_or_insert(handover.context_id());
        }
        let next = outcome.ok.then(|| outcome.handover.clone()).flatten();
        if !outcome.ok {
            self.ok = false;
            self.failed_agent = Some(outcome.agent.clone());
        }
        self.outcomes.push(outcome);
        next
    }

    /// The failing outcome's reason, if the run failed.
    pub fn failure(&self) -> Option<String> {
        let failed = self.failed_agent.as_ref()?;
        let reason = self
            .outcomes
            .last()
            .map(AgentOutcome::failure_reason)
            .unwrap_or_default();
        Some(format!("{failed}: {reason}"))
    }

    pub fn into_error(self) -> Option<SitegenError> {
        let failed = self.failed_agent.clone()?;
        Some(SitegenError::PipelineHalt {
            agent: failed.to_string(),
            reason: self
                .outcomes
                .last()
                .map(AgentOutcome::failure_reason)
                .unwrap_or_default(),
        })
    }
}

/// One unit of an auto-generate run.
enum Step {
    Build(BlockName),
    Stage(&'static str),
}

impl Step {
    fn agent(&self) -> &'static str {
        match self {
            Step::Build(_) => names::BUILDER,
            Step::Stage(name) => *name,
        }
    }

    fn message(&self) -> String {
        match self {
            Step::Build(block) => format!("Building {block}"),
            Step::Stage(name) => format!("Running {name}"),
        }
    }
}

/// `base` plus the sources generated so far, so checks can read files a
/// dry-run never wrote.
fn stage_config(base: &Value, sources: &Map<String, Value>) -> Value {
    let mut config = match base {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    if !sources.is_empty() {
        config.insert("sources".to_string(), Value::Object(sources.clone()));
    }
    Value::Object(config)
}

fn collect_sources(sources: &mut Map<String, Value>, outcome: &AgentOutcome) {
    if let Some(generated) = outcome.report.get("sources").and_then(Value::as_object) {
        sources.extend(generated.clone());
    }
}

pub struct Orchestrator {
    ctx: Arc<AgentContext>,
    registry: AgentRegistry,
}

impl Orchestrator {
    pub fn new(ctx: Arc<AgentContext>, registry: AgentRegistry) -> Self {
        Self { ctx, registry }
    }

    pub fn context(&self) -> &Arc<AgentContext> {
        &self.ctx
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Runs one agent by name.
    pub async fn run_agent(
        &self,
        name: &str,
        input: AgentInput,
    ) -> Result<AgentOutcome, SitegenError> {
        let agent = self.registry.get(name)?;
        Ok(run_agent(agent.as_ref(), &self.ctx, input).await)
    }

    #[instrument(skip_all, fields(dry_run = options.dry_run))]
    pub async fn run_chain(
        &self,
        prompt: &str,
        options: ChainOptions,
    ) -> Result<RunReport, SitegenError> {
        let agents = CHAIN
            .iter()
            .map(|name| self.registry.get(name))
            .collect::<Result<Vec<_>, _>>()?;

        self.ctx.bus.publish_pipeline_event(
            PipelineEventStatus::Start,
            json!({ "flow": "chain", "prompt": prompt, "dryRun": options.dry_run }),
        );

        let mut report = RunReport::new();
        let mut handover: Option<Handover> = None;
        let mut sources = Map::new();
        for agent in agents {
            let input = AgentInput::new()
                .with_prompt(prompt)
                .with_config(stage_config(&options.config, &sources))
                .with_handover(handover.take())
                .with_dry_run(options.dry_run);
            let outcome = run_agent(agent.as_ref(), &self.ctx, input).await;
            collect_sources(&mut sources, &outcome);
            handover = report.record(outcome);
            if !report.ok {
                break;
            }
        }

        self.finish("chain", &report);
        Ok(report)
    }

    /// Builds every requested block, then composes pages, checks and
    /// publishes them. `reporter` sees one `Progress` per step and a single
    /// terminal event.
    #[instrument(skip_all, fields(dry_run = request.dry_run, publish = request.publish))]
    pub async fn auto_generate(
        &self,
        request: AutoGenerateRequest,
        reporter: &dyn ProgressReporter,
    ) -> Result<RunReport, SitegenError> {
        let blocks = request.resolved_blocks();
        let mut steps: Vec<Step> = blocks.into_iter().map(Step::Build).collect();
        steps.push(Step::Stage(names::PAGE_GENERATOR));
        steps.push(Step::Stage(names::REVIEWER));
        steps.push(Step::Stage(names::STYLE));
        steps.push(Step::Stage(names::TESTER));
        if request.publish {
            steps.push(Step::Stage(names::PUBLISHER));
        }
        steps.push(Step::Stage(names::COMPAT));

        let agents = match steps
            .iter()
            .map(|step| self.registry.get(step.agent()))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(agents) => agents,
            Err(e) => {
                reporter.report(ProgressEvent::Error {
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        self.ctx.bus.publish_pipeline_event(
            PipelineEventStatus::Start,
            json!({
                "flow": "auto-generate",
                "prompt": request.prompt,
                "steps": steps.len(),
                "dryRun": request.dry_run,
            }),
        );

        let total = steps.len();
        let delay = Duration::from_millis(self.ctx.settings.inter_step_delay_ms);
        let mut report = RunReport::new();
        let mut handover: Option<Handover> = None;
        let mut sources = Map::new();
        let mut built_once = false;

        for (index, (step, agent)) in steps.iter().zip(agents).enumerate() {
            if matches!(step, Step::Build(_)) {
                if built_once && self.ctx.llm.is_some() && !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                built_once = true;
            }
            reporter.report(ProgressEvent::Progress {
                current: index + 1,
                total,
                message: step.message(),
            });

            let config = match step {
                Step::Build(block) => json!({ "block": block }),
                Step::Stage(name) if *name == names::PAGE_GENERATOR => {
                    json!({ "pages": request.pages })
                }
                Step::Stage(_) => stage_config(&Value::Null, &sources),
            };
            let input = AgentInput::new()
                .with_prompt(request.prompt.clone())
                .with_config(config)
                .with_handover(handover.take())
                .with_dry_run(request.dry_run);
            let outcome = run_agent(agent.as_ref(), &self.ctx, input).await;

            collect_sources(&mut sources, &outcome);
            handover = report.record(outcome);
            if !report.ok {
                break;
            }
        }

        self.finish("auto-generate", &report);
        match report.failure() {
            Some(error) => reporter.report(ProgressEvent::Error { error }),
            None => reporter.report(ProgressEvent::Complete {
                result: serde_json::to_value(&report).unwrap_or(Value::Null),
            }),
        }
        Ok(report)
    }

    fn finish(&self, flow: &str, report: &RunReport) {
        let context_id = report.context_id.map(|id| id.to_string());
        if report.ok {
            info!(flow, stages = report.outcomes.len(), "Pipeline complete");
            self.ctx.bus.publish_pipeline_event(
                PipelineEventStatus::Complete,
                json!({
                    "flow": flow,
                    "contextId": context_id,
                    "stages": report.outcomes.len(),
                }),
            );
        } else {
            let failure = report.failure().unwrap_or_default();
            warn!(flow, %failure, "Pipeline halted");
            self.ctx.bus.publish_pipeline_event(
                PipelineEventStatus::Failed,
                json!({
                    "flow": flow,
                    "contextId": context_id,
                    "failedAgent": report.failed_agent,
                    "error": failure,
                }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults_to_dry_run_without_publish() {
        let request: AutoGenerateRequest =
            serde_json::from_value(json!({ "prompt": "a FAQ and pricing" })).unwrap();
        assert!(request.dry_run);
        assert!(!request.publish);
        let blocks: Vec<_> = request
            .resolved_blocks()
            .into_iter()
            .map(|b| b.to_string())
            .collect();
        assert_eq!(blocks, vec!["faqBlock", "pricingBlock"]);
    }

    #[test]
    fn explicit_blocks_win_over_prompt() {
        let mut request = AutoGenerateRequest::new("a FAQ");
        request.blocks = vec!["countdownBlock".to_string(), "not a block".to_string()];
        let blocks: Vec<_> = request
            .resolved_blocks()
            .into_iter()
            .map(|b| b.to_string())
            .collect();
        assert_eq!(blocks, vec!["countdownBlock"]);
    }

    #[test]
    fn stage_config_merges_sources_into_object_config() {
        let mut sources = Map::new();
        sources.insert("a.ts".to_string(), json!("x"));
        let config = stage_config(&json!({ "autoFix": true }), &sources);
        assert_eq!(config["autoFix"], true);
        assert_eq!(config["sources"]["a.ts"], "x");
        assert_eq!(stage_config(&Value::Null, &Map::new()), json!({}));
    }

    #[test]
    fn chain_order() {
        assert_eq!(CHAIN.first(), Some(&names::ANALYST));
        assert_eq!(CHAIN.last(), Some(&names::CLEANUP));
    }
}

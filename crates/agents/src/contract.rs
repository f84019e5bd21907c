//! The stage contract shared by every agent.
//!
//! [`run_agent`] is the only way stages are executed. It owns everything that
//! is common to all of them (lifecycle events, blocked relays, environment
//! checks, failure conversion, snapshots) so [`Agent::perform`] implementations
//! contain only their own work.

use std::time::Instant;

use async_trait::async_trait;
use pipeline::{
    create_blocked_handover, get_or_create_context_id, validate_handover, AgentEventStatus,
    AgentName, ArchiveError, Artifacts, CmsError, CommandError, ContextId, EnvVar, Handover,
    HandoverData, HandoverStatus, ManifestArtifacts, ManifestError, PatternStoreError, Stage,
    WorkspaceError,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::{AgentContext, AgentInput};

/// Error text of an outcome that relayed an incoming blocked handover.
pub const HANDOVER_BLOCKED: &str = "Handover blocked";
/// Error text of an outcome that relayed an incoming error handover.
pub const HANDOVER_IN_ERROR: &str = "Handover in error state";

// ---------------------------------------------------------------------------
// Stage results
// ---------------------------------------------------------------------------

/// How a stage wants the run to continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Hand over to [`Agent::next_agent`].
    Ready,
    /// The chain ends here.
    Done,
    /// Stop and route to [`Agent::remediation_agent`]. Carries the reasons.
    Blocked(Vec<String>),
}

/// What [`Agent::perform`] produced.
#[derive(Debug, Clone)]
pub struct StageResult {
    pub verdict: Verdict,
    /// `files`, `plan` and `pages`. `report` and `manifest` are filled in by
    /// [`run_agent`].
    pub artifacts: Artifacts,
    pub report: Value,
    pub notes: String,
}

impl StageResult {
    pub fn ready(report: Value) -> Self {
        Self::with_verdict(Verdict::Ready, report)
    }

    pub fn done(report: Value) -> Self {
        Self::with_verdict(Verdict::Done, report)
    }

    pub fn blocked(errors: Vec<String>, report: Value) -> Self {
        Self::with_verdict(Verdict::Blocked(errors), report)
    }

    fn with_verdict(verdict: Verdict, report: Value) -> Self {
        Self {
            verdict,
            artifacts: Artifacts::default(),
            report,
            notes: String::new(),
        }
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.artifacts.files = files;
        self
    }

    pub fn with_plan(mut self, plan: Value) -> Self {
        self.artifacts.plan = Some(plan);
        self
    }

    pub fn with_pages(mut self, pages: Vec<Value>) -> Self {
        self.artifacts.pages = pages;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

/// A stage-local failure. Never crosses the stage boundary: [`run_agent`]
/// turns it into a failed [`AgentOutcome`].
#[derive(Debug, Error)]
pub enum AgentFailure {
    #[error("{0}")]
    InvalidInput(String),

    #[error("CMS client is not configured")]
    CmsUnavailable,

    #[error(transparent)]
    Cms(#[from] CmsError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Patterns(#[from] PatternStoreError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Some planned file changes could not be applied.
    #[error("Failed to apply {failed} file change(s): {details}")]
    Apply { failed: usize, details: String },
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Agent: Send + Sync {
    /// Routing name (`"builderAgent"`).
    fn name(&self) -> AgentName;

    fn stage(&self) -> Stage;

    /// Consumer of this stage's `ready` handover; `None` for terminal stages.
    fn next_agent(&self) -> Option<AgentName>;

    /// Stage a `blocked` handover from this agent is routed to.
    fn remediation_agent(&self) -> Option<AgentName> {
        None
    }

    /// Variables checked before [`Agent::perform`] runs.
    fn required_env(&self) -> &'static [EnvVar] {
        &[]
    }

    async fn perform(
        &self,
        ctx: &AgentContext,
        input: &AgentInput,
        context_id: ContextId,
    ) -> Result<StageResult, AgentFailure>;
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of one [`run_agent`] call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOutcome {
    pub agent: AgentName,
    pub ok: bool,
    /// Stage label, or `"env"` when the environment check failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
    pub report: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handover: Option<Handover>,
    /// Where the handover snapshot was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
}

impl AgentOutcome {
    /// Why the stage failed, for summaries.
    pub fn failure_reason(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "stage reported failure".to_string())
    }

    /// Status of the produced handover, if any.
    pub fn status(&self) -> Option<HandoverStatus> {
        self.handover.as_ref().map(Handover::status)
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Runs one stage under the common contract.
///
/// 1. publish `agent:start`;
/// 2. validate the incoming handover (advisory);
/// 3. relay an incoming `blocked`/`error` handover without doing any work;
/// 4. check required environment variables;
/// 5. run [`Agent::perform`], converting failures into a failed outcome;
/// 6. build the outgoing handover, including the run's manifest slice;
/// 7. snapshot it;
/// 8. publish `agent:ready`, `agent:blocked` or `agent:error`.
#[instrument(skip_all, fields(agent = %agent.name(), dry_run = input.dry_run))]
pub async fn run_agent(agent: &dyn Agent, ctx: &AgentContext, input: AgentInput) -> AgentOutcome {
    let name = agent.name();
    let started = Instant::now();
    let context_id = get_or_create_context_id(input.handover.as_ref());

    ctx.bus.publish_agent_event(
        &name,
        AgentEventStatus::Start,
        json!({
            "contextId": context_id.to_string(),
            "stage": agent.stage().as_str(),
            "dryRun": input.dry_run,
        }),
    );

    if let Some(incoming) = &input.handover {
        check_incoming(incoming);
        let relay_reason = match incoming.status() {
            HandoverStatus::Blocked => Some(HANDOVER_BLOCKED),
            HandoverStatus::Error => Some(HANDOVER_IN_ERROR),
            HandoverStatus::Ready | HandoverStatus::Done => None,
        };
        if let Some(reason) = relay_reason {
            return relay(agent, ctx, incoming, reason);
        }
    }

    let missing = ctx.env.missing(agent.required_env());
    if !missing.is_empty() {
        warn!(?missing, "Required environment variables are not set");
        ctx.bus.publish_agent_event(
            &name,
            AgentEventStatus::Error,
            json!({
                "contextId": context_id.to_string(),
                "stage": "env",
                "missing": missing,
            }),
        );
        return AgentOutcome {
            agent: name,
            ok: false,
            stage: Some("env".to_string()),
            error: Some(format!(
                "Missing environment variables: {}",
                missing.join(", ")
            )),
            missing,
            report: Value::Null,
            handover: None,
            snapshot: None,
        };
    }

    let result = agent.perform(ctx, &input, context_id).await;
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    match result {
        Ok(result) => finish(agent, ctx, context_id, result, duration_ms).await,
        Err(failure) => fail(agent, ctx, context_id, failure, duration_ms).await,
    }
}

fn check_incoming(incoming: &Handover) {
    match serde_json::to_value(incoming) {
        Ok(value) => {
            let report = validate_handover(&value);
            if !report.valid {
                warn!(errors = ?report.errors, "Incoming handover failed validation; continuing");
            }
        }
        Err(e) => warn!(error = %e, "Incoming handover could not be re-encoded for validation"),
    }
}

fn relay(agent: &dyn Agent, ctx: &AgentContext, incoming: &Handover, reason: &str) -> AgentOutcome {
    let name = agent.name();
    let next = agent
        .remediation_agent()
        .or_else(|| incoming.next_agent().cloned());
    let data = HandoverData::default()
        .with_artifacts(incoming.artifacts().clone())
        .with_notes(format!("{name} did not run: {reason}"));
    let handover = create_blocked_handover(
        incoming.context_id(),
        next,
        agent.stage(),
        incoming.errors().to_vec(),
        data,
    );

    info!(reason, "Relaying upstream handover without running");
    ctx.bus.publish_agent_event(
        &name,
        AgentEventStatus::Blocked,
        json!({
            "contextId": incoming.context_id().to_string(),
            "relayed": true,
            "reason": reason,
        }),
    );

    AgentOutcome {
        agent: name,
        ok: false,
        stage: Some(agent.stage().as_str().to_string()),
        error: Some(reason.to_string()),
        missing: Vec::new(),
        report: json!({ "relayed": true }),
        handover: Some(handover),
        snapshot: None,
    }
}

async fn finish(
    agent: &dyn Agent,
    ctx: &AgentContext,
    context_id: ContextId,
    result: StageResult,
    duration_ms: u64,
) -> AgentOutcome {
    let name = agent.name();
    let StageResult {
        verdict,
        mut artifacts,
        report,
        notes,
    } = result;

    artifacts.report = report.clone();
    match ctx.manifests.load(context_id).await {
        Ok(manifest) => {
            artifacts.manifest = ManifestArtifacts {
                blocks: manifest.blocks,
                pages: manifest.pages,
                media: manifest.media,
            };
        }
        Err(e) => warn!(error = %e, "Run manifest unavailable; handover carries an empty slice"),
    }

    let data = HandoverData::default()
        .with_artifacts(artifacts)
        .with_notes(notes)
        .with_duration_ms(duration_ms);

    let (handover, error, event) = match verdict {
        Verdict::Ready => (
            Handover::ready(context_id, agent.next_agent(), agent.stage(), data),
            None,
            AgentEventStatus::Ready,
        ),
        Verdict::Done => (
            Handover::done(context_id, agent.stage(), data),
            None,
            AgentEventStatus::Ready,
        ),
        Verdict::Blocked(errors) => {
            let message = format!("{name} blocked: {}", errors.join("; "));
            let handover = create_blocked_handover(
                context_id,
                agent.remediation_agent(),
                agent.stage(),
                errors,
                data,
            );
            (handover, Some(message), AgentEventStatus::Blocked)
        }
    };

    let snapshot = save_snapshot(ctx, &name, &handover).await;
    ctx.bus.publish_agent_event(
        &name,
        event,
        json!({
            "contextId": context_id.to_string(),
            "status": handover.status().as_str(),
            "nextAgent": handover.next_agent().map(AgentName::as_str),
            "durationMs": duration_ms,
        }),
    );
    info!(
        status = %handover.status(),
        next = ?handover.next_agent().map(AgentName::as_str),
        duration_ms,
        "Stage finished"
    );

    AgentOutcome {
        agent: name,
        ok: error.is_none(),
        stage: Some(agent.stage().as_str().to_string()),
        error,
        missing: Vec::new(),
        report,
        handover: Some(handover),
        snapshot,
    }
}

async fn fail(
    agent: &dyn Agent,
    ctx: &AgentContext,
    context_id: ContextId,
    failure: AgentFailure,
    duration_ms: u64,
) -> AgentOutcome {
    let name = agent.name();
    let message = failure.to_string();
    error!(error = %message, "Stage failed");

    let handover = Handover::error(
        context_id,
        None,
        agent.stage(),
        HandoverData::default()
            .with_errors(vec![message.clone()])
            .with_duration_ms(duration_ms),
    );
    let snapshot = save_snapshot(ctx, &name, &handover).await;
    ctx.bus.publish_agent_event(
        &name,
        AgentEventStatus::Error,
        json!({
            "contextId": context_id.to_string(),
            "error": message,
        }),
    );

    AgentOutcome {
        agent: name,
        ok: false,
        stage: Some(agent.stage().as_str().to_string()),
        error: Some(message),
        missing: Vec::new(),
        report: Value::Null,
        handover: Some(handover),
        snapshot,
    }
}

async fn save_snapshot(ctx: &AgentContext, name: &AgentName, handover: &Handover) -> Option<String> {
    match ctx.archive.save(name, handover).await {
        Ok(location) => {
            debug!(%location, "Handover snapshot saved");
            Some(location)
        }
        Err(e) => {
            warn!(error = %e, "Handover snapshot could not be written");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_result_builders() {
        let result = StageResult::blocked(vec!["x".to_string()], json!({ "n": 1 }))
            .with_files(vec!["a.ts".to_string()])
            .with_notes("note");
        assert_eq!(result.verdict, Verdict::Blocked(vec!["x".to_string()]));
        assert_eq!(result.artifacts.files, vec!["a.ts"]);
        assert_eq!(result.notes, "note");
    }

    #[test]
    fn failure_messages() {
        let failure = AgentFailure::Apply {
            failed: 2,
            details: "a.ts: denied".to_string(),
        };
        assert_eq!(
            failure.to_string(),
            "Failed to apply 2 file change(s): a.ts: denied"
        );
        assert_eq!(
            AgentFailure::CmsUnavailable.to_string(),
            "CMS client is not configured"
        );
    }
}

//! Type-check and lint runs.

use async_trait::async_trait;
use pipeline::{AgentName, CommandSpec, ContextId, Stage};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::names;
use crate::{Agent, AgentContext, AgentFailure, AgentInput, StageResult};

/// Lines of stderr kept when a command fails.
const STDERR_TAIL_LINES: usize = 20;

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TesterAgent;

impl TesterAgent {
    fn commands(ctx: &AgentContext, input: &AgentInput) -> Vec<CommandSpec> {
        let configured = input.config_strings("commands");
        let lines = if configured.is_empty() {
            ctx.settings.tester.commands.clone()
        } else {
            configured
        };
        lines.iter().filter_map(|line| CommandSpec::parse(line)).collect()
    }
}

#[async_trait]
impl Agent for TesterAgent {
    fn name(&self) -> AgentName {
        AgentName::from_static(names::TESTER)
    }

    fn stage(&self) -> Stage {
        Stage::Test
    }

    fn next_agent(&self) -> Option<AgentName> {
        Some(AgentName::from_static(names::PUBLISHER))
    }

    fn remediation_agent(&self) -> Option<AgentName> {
        Some(AgentName::from_static(names::DIAGNOSTIC))
    }

    async fn perform(
        &self,
        ctx: &AgentContext,
        input: &AgentInput,
        _context_id: ContextId,
    ) -> Result<StageResult, AgentFailure> {
        let commands = Self::commands(ctx, input);
        let planned: Vec<String> = commands.iter().map(ToString::to_string).collect();

        if input.dry_run {
            info!(commands = planned.len(), "Dry-run: checks planned, not run");
            return Ok(StageResult::ready(json!({
                "dryRun": true,
                "planned": planned,
                "results": [],
            }))
            .with_notes(format!("{} check(s) planned", planned.len())));
        }

        let cwd = ctx.workspace.root().to_path_buf();
        let mut results: Vec<Value> = Vec::new();
        for command in &commands {
            let output = ctx.runner.run(command, &cwd).await?;
            let passed = output.success();
            info!(command = %command, status = ?output.status, passed, "Check finished");
            results.push(json!({
                "command": command.to_string(),
                "status": output.status,
                "passed": passed,
            }));

            if !passed {
                let stderr = tail(&output.stderr, STDERR_TAIL_LINES);
                warn!(command = %command, "Check failed");
                let status = output
                    .status
                    .map_or_else(|| "a signal".to_string(), |code| format!("status {code}"));
                let message = if stderr.is_empty() {
                    format!("`{command}` exited with {status}")
                } else {
                    format!("`{command}` exited with {status}: {stderr}")
                };
                return Ok(StageResult::blocked(
                    vec![message],
                    json!({
                        "dryRun": false,
                        "planned": planned,
                        "results": results,
                        "failedCommand": command.to_string(),
                        "stderr": stderr,
                    }),
                )
                .with_notes(format!("`{command}` failed")));
            }
        }

        Ok(StageResult::ready(json!({
            "dryRun": false,
            "planned": planned,
            "results": results,
        }))
        .with_notes(format!("{} check(s) passed", results.len())))
    }
}

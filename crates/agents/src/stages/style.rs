//! Style conformance checks for generated components.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use pipeline::{AgentName, BlockName, ContextId, Finding, FindingSeverity, Stage};
use regex::Regex;
use serde_json::json;
use tracing::info;

use super::{component_path, names, read_source, target_files};
use crate::{Agent, AgentContext, AgentFailure, AgentInput, StageResult};

static INLINE_STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"style=\{\{").expect("static pattern"));
static DEFAULT_EXPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*export\s+default\b").expect("static pattern"));
static HEX_COLOUR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#(?:[0-9a-fA-F]{6}|[0-9a-fA-F]{3})\b").expect("static pattern")
});

pub const RULE_INLINE_STYLE: &str = "inline-style";
pub const RULE_DEFAULT_EXPORT: &str = "default-export";
pub const RULE_HARDCODED_COLOUR: &str = "hardcoded-colour";
pub const RULE_MISSING_CLASSNAME: &str = "missing-classname";

/// Checks one component source.
pub fn check_component(file: &str, content: &str) -> Vec<Finding> {
    let mut findings = Vec::new();

    let inline = INLINE_STYLE.find_iter(content).count();
    if inline > 0 {
        findings.push(Finding::new(
            file,
            RULE_INLINE_STYLE,
            FindingSeverity::Blocking,
            format!("{inline} inline style attribute(s); use className"),
        ));
    }
    if DEFAULT_EXPORT.is_match(content) {
        findings.push(Finding::new(
            file,
            RULE_DEFAULT_EXPORT,
            FindingSeverity::Blocking,
            "Components must use a named export, not `export default`",
        ));
    }

    let colours: BTreeSet<&str> = HEX_COLOUR.find_iter(content).map(|m| m.as_str()).collect();
    if !colours.is_empty() {
        findings.push(Finding::new(
            file,
            RULE_HARDCODED_COLOUR,
            FindingSeverity::Warning,
            format!(
                "Hard-coded colour(s): {}",
                colours.into_iter().collect::<Vec<_>>().join(", ")
            ),
        ));
    }
    if !content.contains("className") {
        findings.push(Finding::new(
            file,
            RULE_MISSING_CLASSNAME,
            FindingSeverity::Warning,
            "Component sets no className",
        ));
    }

    findings
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StyleAgent;

#[async_trait]
impl Agent for StyleAgent {
    fn name(&self) -> AgentName {
        AgentName::from_static(names::STYLE)
    }

    fn stage(&self) -> Stage {
        Stage::Style
    }

    fn next_agent(&self) -> Option<AgentName> {
        Some(AgentName::from_static(names::TESTER))
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
        let derived = manifest
            .blocks
            .iter()
            .filter_map(BlockName::new)
            .map(|block| component_path(&ctx.settings, &block));
        let files = target_files(
            input.handover.as_ref(),
            &ctx.settings.component_dir,
            ".tsx",
            derived,
        );

        let mut findings = Vec::new();
        let mut checked = Vec::new();
        let mut skipped = Vec::new();
        for file in &files {
            match read_source(ctx, file, input).await? {
                Some(content) => {
                    findings.extend(check_component(file, &content));
                    checked.push(file.clone());
                }
                None => skipped.push(file.clone()),
            }
        }

        let blocking: Vec<String> = findings
            .iter()
            .filter(|f| f.is_blocking())
            .map(ToString::to_string)
            .collect();
        info!(
            checked = checked.len(),
            findings = findings.len(),
            blocking = blocking.len(),
            "Style check finished"
        );

        let report = json!({
            "checked": checked,
            "skipped": skipped,
            "findings": findings,
        });
        if blocking.is_empty() {
            Ok(StageResult::ready(report)
                .with_files(checked.clone())
                .with_notes(format!("{} component(s) pass style checks", checked.len())))
        } else {
            let count = blocking.len();
            Ok(StageResult::blocked(blocking, report)
                .with_files(checked)
                .with_notes(format!("{count} blocking style issue(s)")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::component_template;

    #[test]
    fn template_component_is_clean() {
        let block = BlockName::new("pricingBlock").unwrap();
        assert!(check_component("c.tsx", &component_template(&block)).is_empty());
    }

    #[test]
    fn inline_styles_and_default_export_block() {
        let source = r##"export default function Promo() {
  return <div style={{ color: '#ff0000' }}>Hi</div>
}
"##;
        let findings = check_component("Promo.tsx", source);
        let rules: Vec<_> = findings.iter().map(|f| f.rule.as_str()).collect();
        assert_eq!(
            rules,
            vec![
                RULE_INLINE_STYLE,
                RULE_DEFAULT_EXPORT,
                RULE_HARDCODED_COLOUR,
                RULE_MISSING_CLASSNAME
            ]
        );
        assert_eq!(findings.iter().filter(|f| f.is_blocking()).count(), 2);
        assert!(findings[2].message.contains("#ff0000"));
    }

    #[test]
    fn colours_alone_are_warnings() {
        let source = "export function A() { return <p className=\"a\" data-c=\"#fff\" /> }";
        let findings = check_component("A.tsx", source);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, FindingSeverity::Warning);
    }

    #[test]
    fn repeated_colours_are_listed_once() {
        let source = "export function A() { return <p className=\"a\" data-a=\"#fff\" data-b=\"#000\" data-c=\"#fff\" /> }";
        let findings = check_component("A.tsx", source);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].message, "Hard-coded colour(s): #000, #fff");
    }
}

//! Static review of generated schema sources.

use std::sync::LazyLock;

use async_trait::async_trait;
use pipeline::{AgentName, BlockName, ContextId, FileChange, Finding, FindingSeverity, Stage};
use regex::{Captures, Regex};
use serde_json::{json, Map, Value};
use tracing::info;

use super::{apply_changes, names, read_source, schema_path, target_files};
use crate::{Agent, AgentContext, AgentFailure, AgentInput, StageResult};

static DEFAULT_EXPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*export\s+default\b").expect("static pattern"));
static DEFAULT_EXPORT_DEFINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s+default\s+defineType\(").expect("static pattern")
});
static DEFAULT_EXPORT_IDENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*export\s+default\s+(\w+)\s*;?[ \t]*\n?").expect("static pattern")
});
static FIELD_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"type:\s*['"]([A-Za-z]+)['"]"#).expect("static pattern"));
static FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)defineField\(\{(.*?)\}\)").expect("static pattern"));
static TITLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"name:\s*['"]title['"]"#).expect("static pattern"));
static TYPE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^([ \t]*)type:\s*(['"]\w+['"]),?[ \t]*$"#).expect("static pattern")
});
static SCHEMA_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"name:\s*['"](\w+)['"]"#).expect("static pattern"));

pub const RULE_DEFAULT_EXPORT: &str = "default-export";
pub const RULE_DISALLOWED_TYPE: &str = "disallowed-field-type";
pub const RULE_MISSING_DEFINE_TYPE: &str = "missing-define-type";
pub const RULE_MISSING_VALIDATION: &str = "missing-validation";

/// Runs every schema check over `content`.
pub fn review_schema(file: &str, content: &str, disallowed_types: &[String]) -> Vec<Finding> {
    let mut findings = Vec::new();

    if DEFAULT_EXPORT.is_match(content) {
        findings.push(Finding::new(
            file,
            RULE_DEFAULT_EXPORT,
            FindingSeverity::Blocking,
            "Schemas must use a named export, not `export default`",
        ));
    }

    for capture in FIELD_TYPE.captures_iter(content) {
        let field_type = &capture[1];
        if disallowed_types.iter().any(|t| t == field_type) {
            findings.push(Finding::new(
                file,
                RULE_DISALLOWED_TYPE,
                FindingSeverity::Blocking,
                format!("Field type '{field_type}' is not allowed"),
            ));
        }
    }

    if !content.contains("defineType(") {
        findings.push(Finding::new(
            file,
            RULE_MISSING_DEFINE_TYPE,
            FindingSeverity::Blocking,
            "Schema is not declared with defineType",
        ));
    }

    let unvalidated_titles = FIELD
        .captures_iter(content)
        .filter(|c| TITLE_NAME.is_match(&c[1]) && !c[1].contains("validation:"))
        .count();
    for _ in 0..unvalidated_titles {
        findings.push(Finding::new(
            file,
            RULE_MISSING_VALIDATION,
            FindingSeverity::Warning,
            "`title` field has no validation rule",
        ));
    }

    findings
}

/// Rewrites default exports into named exports and adds a required rule to
/// unvalidated `title` fields. Returns the new text and the rules it fixed.
pub fn autofix_schema(content: &str, fallback_name: &str) -> (String, Vec<&'static str>) {
    let mut fixed = content.to_string();
    let mut applied = Vec::new();

    if DEFAULT_EXPORT.is_match(&fixed) {
        let name = SCHEMA_NAME
            .captures(&fixed)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| fallback_name.to_string());
        if DEFAULT_EXPORT_DEFINE.is_match(&fixed) {
            fixed = DEFAULT_EXPORT_DEFINE
                .replace_all(&fixed, format!("${{1}}export const {name} = defineType("))
                .into_owned();
        } else if let Some(ident) = DEFAULT_EXPORT_IDENT
            .captures(&fixed)
            .map(|c| c[1].to_string())
        {
            fixed = DEFAULT_EXPORT_IDENT.replace_all(&fixed, "").into_owned();
            let pattern = format!(r"(?m)^([ \t]*)const\s+{}\b", regex::escape(&ident));
            if let Ok(declaration) = Regex::new(&pattern) {
                fixed = declaration
                    .replace(&fixed, format!("${{1}}export const {ident}"))
                    .into_owned();
            }
        }
        if !DEFAULT_EXPORT.is_match(&fixed) {
            applied.push(RULE_DEFAULT_EXPORT);
        }
    }

    let mut added_validation = false;
    let with_validation = FIELD
        .replace_all(&fixed, |c: &Captures| {
            let body = &c[1];
            if !TITLE_NAME.is_match(body)
                || body.contains("validation:")
                || !TYPE_LINE.is_match(body)
            {
                return c[0].to_string();
            }
            added_validation = true;
            let body = TYPE_LINE.replace(
                body,
                "${1}type: ${2},\n${1}validation: (Rule) => Rule.required(),",
            );
            format!("defineField({{{body}}})")
        })
        .into_owned();
    if added_validation {
        fixed = with_validation;
        applied.push(RULE_MISSING_VALIDATION);
    }

    (fixed, applied)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReviewerAgent;

#[async_trait]
impl Agent for ReviewerAgent {
    fn name(&self) -> AgentName {
        AgentName::from_static(names::REVIEWER)
    }

    fn stage(&self) -> Stage {
        Stage::Review
    }

    fn next_agent(&self) -> Option<AgentName> {
        Some(AgentName::from_static(names::STYLE))
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
        let settings = &ctx.settings;
        let manifest = ctx.manifests.load(context_id).await?;
        let derived = manifest
            .blocks
            .iter()
            .filter_map(BlockName::new)
            .map(|block| schema_path(settings, &block));
        let files = target_files(input.handover.as_ref(), &settings.schema_dir, ".ts", derived);
        let auto_fix = input
            .config_bool("autoFix")
            .unwrap_or(settings.reviewer.auto_fix);

        let mut findings: Vec<Finding> = Vec::new();
        let mut skipped: Vec<String> = Vec::new();
        let mut fixes = Map::new();
        let mut changes = Vec::new();

        for file in &files {
            let Some(content) = read_source(ctx, file, input).await? else {
                skipped.push(file.clone());
                continue;
            };
            let mut file_findings =
                review_schema(file, &content, &settings.reviewer.disallowed_field_types);

            if auto_fix && !file_findings.is_empty() {
                let stem = file
                    .rsplit('/')
                    .next()
                    .and_then(|name| name.strip_suffix(".ts"))
                    .unwrap_or("schema");
                let (fixed, applied) = autofix_schema(&content, stem);
                if !applied.is_empty() {
                    file_findings =
                        review_schema(file, &fixed, &settings.reviewer.disallowed_field_types);
                    changes.push(FileChange::write(file, fixed));
                    fixes.insert(file.clone(), json!(applied));
                }
            }
            findings.extend(file_findings);
        }

        let results = apply_changes(ctx, &changes, input.dry_run).await?;
        let blocking: Vec<String> = findings
            .iter()
            .filter(|f| f.is_blocking())
            .map(ToString::to_string)
            .collect();

        info!(
            reviewed = files.len() - skipped.len(),
            findings = findings.len(),
            blocking = blocking.len(),
            "Schema review finished"
        );

        let report = json!({
            "reviewed": files.len() - skipped.len(),
            "skipped": skipped,
            "findings": findings,
            "autoFix": auto_fix,
            "fixes": Value::Object(fixes),
            "changes": results,
        });
        let files_touched = changes.iter().map(|c| c.file().to_string()).collect();

        if blocking.is_empty() {
            Ok(StageResult::ready(report)
                .with_files(files_touched)
                .with_notes(format!("{} schema(s) reviewed", files.len() - skipped.len())))
        } else {
            let count = blocking.len();
            Ok(StageResult::blocked(blocking, report)
                .with_files(files_touched)
                .with_notes(format!("{count} blocking schema issue(s)")))
        }
    }
}

//! Dead-file cleanup.
//!
//! Three detectors feed one candidate list: an external unused-export scanner
//! (ts-prune output format), empty files, and test files whose subject no
//! longer exists. Candidates are filtered by risk tolerance and exclude
//! globs, then file-level candidates are deleted through the workspace.
//! Unused exports are reported only; removing a symbol is an edit, not a
//! deletion.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use glob::Pattern;
use pipeline::{
    AgentName, CommandSpec, ContextId, FileChange, RiskLevel, RiskTolerance, Stage, WorkspaceFile,
};
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use super::{apply_changes, names};
use crate::{Agent, AgentContext, AgentFailure, AgentInput, StageResult};

static UNUSED_EXPORT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?):(\d+) - (\S+)(.*)$").expect("static pattern"));
static TEST_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+)\.(?:test|spec)\.(?:tsx?|jsx?)$").expect("static pattern")
});

const SOURCE_EXTENSIONS: [&str; 4] = ["ts", "tsx", "js", "jsx"];

/// Files at or below this size are read to check for whitespace-only content.
const SMALL_FILE_BYTES: u64 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidateKind {
    UnusedExport,
    EmptyFile,
    OrphanedTest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupCandidate {
    pub file: String,
    pub kind: CandidateKind,
    pub risk: RiskLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

impl CleanupCandidate {
    fn file_level(file: impl Into<String>, kind: CandidateKind, risk: RiskLevel) -> Self {
        Self {
            file: file.into(),
            kind,
            risk,
            symbol: None,
        }
    }

    /// Whether acting on the candidate means deleting its file.
    pub fn deletes_file(&self) -> bool {
        self.kind != CandidateKind::UnusedExport
    }
}

/// Parses unused-export scanner output (`path:line - symbol`). Exports that
/// are used inside their own module are not candidates.
pub fn parse_unused_exports(output: &str) -> Vec<CleanupCandidate> {
    output
        .lines()
        .filter_map(|line| UNUSED_EXPORT_LINE.captures(line.trim()))
        .filter(|c| !c[4].contains("(used in module)"))
        .map(|c| CleanupCandidate {
            file: c[1].trim_start_matches("./").trim_start_matches('/').to_string(),
            kind: CandidateKind::UnusedExport,
            risk: RiskLevel::High,
            symbol: Some(c[3].to_string()),
        })
        .collect()
}

/// Test files whose subject (`x.test.ts` → `x.ts`/`x.tsx`/...) is absent.
pub fn orphaned_tests(files: &[WorkspaceFile]) -> Vec<CleanupCandidate> {
    let paths: BTreeSet<&str> = files.iter().map(|f| f.path.as_str()).collect();
    files
        .iter()
        .filter_map(|f| {
            let base = TEST_FILE.captures(&f.path)?.get(1)?.as_str().to_string();
            let has_subject = SOURCE_EXTENSIONS
                .iter()
                .any(|ext| paths.contains(format!("{base}.{ext}").as_str()));
            (!has_subject).then(|| {
                CleanupCandidate::file_level(&f.path, CandidateKind::OrphanedTest, RiskLevel::Medium)
            })
        })
        .collect()
}

fn compile_excludes(patterns: &[String]) -> Result<Vec<Pattern>, AgentFailure> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p)
                .map_err(|e| AgentFailure::InvalidInput(format!("Invalid exclude glob '{p}': {e}")))
        })
        .collect()
}

/// Keeps candidates the tolerance accepts and no exclude glob matches.
pub fn filter_candidates(
    candidates: Vec<CleanupCandidate>,
    tolerance: RiskTolerance,
    excludes: &[Pattern],
) -> (Vec<CleanupCandidate>, Vec<CleanupCandidate>) {
    candidates
        .into_iter()
        .partition(|c| tolerance.accepts(c.risk) && !excludes.iter().any(|p| p.matches(&c.file)))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CleanupAgent;

impl CleanupAgent {
    async fn unused_exports(
        ctx: &AgentContext,
        notes: &mut Vec<String>,
    ) -> Vec<CleanupCandidate> {
        let Some(command) = ctx
            .settings
            .cleanup
            .unused_exports_command
            .as_deref()
            .and_then(CommandSpec::parse)
        else {
            return Vec::new();
        };
        match ctx.runner.run(&command, ctx.workspace.root()).await {
            Ok(output) => parse_unused_exports(&output.stdout),
            Err(e) => {
                warn!(command = %command, error = %e, "Unused-export scan skipped");
                notes.push(format!("unused-export scan skipped: {e}"));
                Vec::new()
            }
        }
    }

    async fn empty_files(
        ctx: &AgentContext,
        files: &[WorkspaceFile],
    ) -> Result<Vec<CleanupCandidate>, AgentFailure> {
        let mut empty = Vec::new();
        for file in files.iter().filter(|f| f.len <= SMALL_FILE_BYTES) {
            let blank = if file.len == 0 {
                true
            } else {
                ctx.workspace
                    .read_file(&file.path)
                    .await?
                    .is_some_and(|content| content.trim().is_empty())
            };
            if blank {
                empty.push(CleanupCandidate::file_level(
                    &file.path,
                    CandidateKind::EmptyFile,
                    RiskLevel::Low,
                ));
            }
        }
        Ok(empty)
    }
}

#[async_trait]
impl Agent for CleanupAgent {
    fn name(&self) -> AgentName {
        AgentName::from_static(names::CLEANUP)
    }

    fn stage(&self) -> Stage {
        Stage::Cleanup
    }

    fn next_agent(&self) -> Option<AgentName> {
        None
    }

    async fn perform(
        &self,
        ctx: &AgentContext,
        input: &AgentInput,
        _context_id: ContextId,
    ) -> Result<StageResult, AgentFailure> {
        let settings = &ctx.settings.cleanup;
        let tolerance = match input.config_str("riskTolerance") {
            Some(text) => text.parse::<RiskTolerance>().map_err(AgentFailure::InvalidInput)?,
            None => settings.risk_tolerance,
        };
        let mut exclude = settings.exclude.clone();
        exclude.extend(input.config_strings("exclude"));
        let excludes = compile_excludes(&exclude)?;

        let mut files = Vec::new();
        for dir in &settings.scan_dirs {
            files.extend(ctx.workspace.list_files(dir).await?);
        }

        let mut notes = Vec::new();
        let mut candidates = Self::unused_exports(ctx, &mut notes).await;
        candidates.extend(Self::empty_files(ctx, &files).await?);
        candidates.extend(orphaned_tests(&files));

        let (kept, filtered) = filter_candidates(candidates, tolerance, &excludes);
        let deletions: Vec<FileChange> = kept
            .iter()
            .filter(|c| c.deletes_file())
            .map(|c| c.file.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(FileChange::delete)
            .collect();
        let results = apply_changes(ctx, &deletions, input.dry_run).await?;

        info!(
            scanned = files.len(),
            kept = kept.len(),
            filtered = filtered.len(),
            deletions = deletions.len(),
            ?tolerance,
            "Cleanup finished"
        );
        notes.insert(
            0,
            format!(
                "{} candidate(s), {} deletion(s){}",
                kept.len(),
                deletions.len(),
                if input.dry_run { " planned" } else { "" }
            ),
        );

        let report = json!({
            "dryRun": input.dry_run,
            "riskTolerance": tolerance,
            "scanned": files.len(),
            "candidates": kept,
            "filtered": filtered.len(),
            "changes": results,
        });
        Ok(StageResult::done(report)
            .with_files(deletions.iter().map(|c| c.file().to_string()).collect())
            .with_notes(notes.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str) -> WorkspaceFile {
        WorkspaceFile {
            path: path.to_string(),
            len: 10,
        }
    }

    #[test]
    fn parses_scanner_output() {
        let output = "components/blocks/Old.tsx:3 - OldBlock\n\
                      lib/util.ts:10 - helper (used in module)\n\
                      garbage line\n";
        let candidates = parse_unused_exports(output);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].file, "components/blocks/Old.tsx");
        assert_eq!(candidates[0].symbol.as_deref(), Some("OldBlock"));
        assert_eq!(candidates[0].risk, RiskLevel::High);
        assert!(!candidates[0].deletes_file());
    }

    #[test]
    fn finds_tests_without_subject() {
        let files = vec![
            file("lib/a.ts"),
            file("lib/a.test.ts"),
            file("lib/gone.spec.tsx"),
        ];
        let orphans = orphaned_tests(&files);
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].file, "lib/gone.spec.tsx");
        assert_eq!(orphans[0].risk, RiskLevel::Medium);
    }

    #[test]
    fn filtering_honours_tolerance_and_excludes() {
        let candidates = vec![
            CleanupCandidate::file_level("lib/empty.ts", CandidateKind::EmptyFile, RiskLevel::Low),
            CleanupCandidate::file_level("lib/x.test.ts", CandidateKind::OrphanedTest, RiskLevel::Medium),
            CleanupCandidate::file_level("out/empty.ts", CandidateKind::EmptyFile, RiskLevel::Low),
        ];
        let excludes = compile_excludes(&["out/**".to_string()]).unwrap();

        let (kept, filtered) =
            filter_candidates(candidates.clone(), RiskTolerance::Prudent, &excludes);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].file, "lib/empty.ts");
        assert_eq!(filtered.len(), 2);

        let (kept, _) = filter_candidates(candidates, RiskTolerance::Medium, &excludes);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn invalid_glob_is_rejected() {
        assert!(matches!(
            compile_excludes(&["[".to_string()]),
            Err(AgentFailure::InvalidInput(_))
        ));
    }
}

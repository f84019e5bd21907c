//! Prompt analysis: the build plan the rest of the chain works from.

use std::sync::LazyLock;

use async_trait::async_trait;
use pipeline::{AgentName, ContextId, Stage};
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::names;
use crate::detection::detect_blocks;
use crate::{Agent, AgentContext, AgentFailure, AgentInput, StageResult};

static PAGE_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)\b(about|[àa]\s+propos|qui\s+sommes)\b", "about"),
        (r"(?i)\b(services?|prestations?)\b", "services"),
        (r"(?i)\b(pricing|tarifs?)\b", "pricing"),
        (r"(?i)\b(blog|articles?|actualit[ée]s)\b", "blog"),
        (r"(?i)\b(contact|nous\s+contacter)\b", "contact"),
    ]
    .into_iter()
    .map(|(pattern, page)| (Regex::new(pattern).expect("static pattern"), page))
    .collect()
});

static TONE_PATTERNS: LazyLock<Vec<(Regex, Tone)>> = LazyLock::new(|| {
    [
        (r"(?i)\b(fun|playful|ludique|color[eé]e?s?|colorful)\b", Tone::Playful),
        (r"(?i)\b(minimal(ist)?|[ée]pur[ée]e?|sobre|clean)\b", Tone::Minimal),
        (r"(?i)\b(professional|professionnel(le)?|corporate|business)\b", Tone::Professional),
    ]
    .into_iter()
    .map(|(pattern, tone)| (Regex::new(pattern).expect("static pattern"), tone))
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Playful,
    Professional,
    Minimal,
    Neutral,
}

/// Pages a prompt asks for; `home` is always first.
pub fn detect_pages(prompt: &str) -> Vec<String> {
    let mut pages = vec!["home".to_string()];
    pages.extend(
        PAGE_PATTERNS
            .iter()
            .filter(|(pattern, _)| pattern.is_match(prompt))
            .map(|(_, page)| page.to_string()),
    );
    pages
}

pub fn detect_tone(prompt: &str) -> Tone {
    TONE_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(prompt))
        .map_or(Tone::Neutral, |(_, tone)| *tone)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AnalystAgent;

#[async_trait]
impl Agent for AnalystAgent {
    fn name(&self) -> AgentName {
        AgentName::from_static(names::ANALYST)
    }

    fn stage(&self) -> Stage {
        Stage::Analysis
    }

    fn next_agent(&self) -> Option<AgentName> {
        Some(AgentName::from_static(names::BUILDER))
    }

    async fn perform(
        &self,
        _ctx: &AgentContext,
        input: &AgentInput,
        _context_id: ContextId,
    ) -> Result<StageResult, AgentFailure> {
        let prompt = input.prompt_text().ok_or_else(|| {
            AgentFailure::InvalidInput(format!("{} requires a prompt", names::ANALYST))
        })?;

        let blocks = detect_blocks(prompt);
        let pages = detect_pages(prompt);
        let tone = detect_tone(prompt);
        info!(blocks = blocks.len(), pages = pages.len(), ?tone, "Plan derived");

        let plan = json!({
            "prompt": prompt,
            "blocks": blocks,
            "pages": pages,
            "tone": tone,
        });
        let notes = format!(
            "{} block(s), {} page(s), {:?} tone",
            blocks.len(),
            pages.len(),
            tone
        );
        Ok(StageResult::ready(json!({ "plan": plan }))
            .with_plan(plan)
            .with_notes(notes))
    }
}

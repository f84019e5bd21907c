//! Block-type detection from free-text prompts, and block naming helpers.
//!
//! Detection tries an ordered table of keyword patterns (first match wins),
//! then a generic `<name>Block` extraction, then falls back to `heroBlock`.
//! Prompts are commonly written in English or French.

use std::sync::LazyLock;

use pipeline::BlockName;
use regex::Regex;
use serde::Serialize;

/// Block used when nothing in the prompt names one.
pub const DEFAULT_BLOCK: &str = "heroBlock";

static BLOCK_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)\b(faq|questions?\s+fr[ée]quentes?)\b", "faqBlock"),
        (r"(?i)\b(testimonials?|t[ée]moignages?|avis\s+clients?)\b", "testimonialsBlock"),
        (r"(?i)\b(pricing|tarifs?|prix|plans?\s+tarifaires?)\b", "pricingBlock"),
        (r"(?i)\b(countdown|compte\s+[àa]\s+rebours|minuteur)\b", "countdownBlock"),
        (r"(?i)\b(gallery|galerie)\b", "galleryBlock"),
        (r"(?i)\b(contact|formulaire)\b", "contactBlock"),
        (r"(?i)\b(features?|fonctionnalit[ée]s?)\b", "featuresBlock"),
        (r"(?i)\b(cta|call\s+to\s+action|appel\s+[àa]\s+l'action)\b", "ctaBlock"),
        (r"(?i)\b(hero|banni[èe]re|banner)\b", "heroBlock"),
    ]
    .into_iter()
    .map(|(pattern, block)| (Regex::new(pattern).expect("static pattern"), block))
    .collect()
});

static GENERIC_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([a-z][A-Za-z0-9]*Block)\b").expect("static pattern"));

/// Which rule picked the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    /// Named explicitly in stage configuration.
    Config,
    /// Listed in the analysis plan carried by the incoming handover.
    Plan,
    Pattern,
    Generic,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDetection {
    pub block: BlockName,
    pub source: DetectionSource,
}

/// Picks the single block type a prompt asks for.
pub fn detect_block(prompt: &str) -> BlockDetection {
    if let Some((_, block)) = BLOCK_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(prompt))
    {
        return BlockDetection {
            block: BlockName::from_static(block),
            source: DetectionSource::Pattern,
        };
    }
    if let Some(block) = GENERIC_BLOCK
        .captures(prompt)
        .and_then(|c| c.get(1))
        .and_then(|m| BlockName::new(m.as_str()))
    {
        return BlockDetection {
            block,
            source: DetectionSource::Generic,
        };
    }
    BlockDetection {
        block: BlockName::from_static(DEFAULT_BLOCK),
        source: DetectionSource::Default,
    }
}

/// Every block type a prompt mentions, in first-mention order. Falls back to
/// [`DEFAULT_BLOCK`] when none is mentioned.
pub fn detect_blocks(prompt: &str) -> Vec<BlockName> {
    let mut found: Vec<(usize, &str)> = Vec::new();
    for (pattern, block) in BLOCK_PATTERNS.iter() {
        if let Some(m) = pattern.find(prompt) {
            found.push((m.start(), block));
        }
    }
    for capture in GENERIC_BLOCK.captures_iter(prompt) {
        if let Some(m) = capture.get(1) {
            found.push((m.start(), m.as_str()));
        }
    }
    found.sort_by_key(|(position, _)| *position);

    let mut blocks: Vec<BlockName> = Vec::new();
    for (_, name) in found {
        if let Some(block) = BlockName::new(name) {
            if !blocks.contains(&block) {
                blocks.push(block);
            }
        }
    }
    if blocks.is_empty() {
        blocks.push(BlockName::from_static(DEFAULT_BLOCK));
    }
    blocks
}

/// A configured block name, if it looks like one (`camelCase` ending in `Block`).
pub fn configured_block(name: &str) -> Option<BlockDetection> {
    GENERIC_BLOCK
        .find(name)
        .filter(|m| m.as_str() == name)
        .and_then(|_| BlockName::new(name))
        .map(|block| BlockDetection {
            block,
            source: DetectionSource::Config,
        })
}

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

/// `countdownBlock` → `CountdownBlock`.
pub fn component_name(block: &BlockName) -> String {
    let mut chars = block.as_str().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `countdownBlock` → `Countdown Block`.
pub fn display_title(block: &BlockName) -> String {
    let pascal = component_name(block);
    let mut title = String::with_capacity(pascal.len() + 4);
    for (i, c) in pascal.chars().enumerate() {
        if i > 0 && c.is_uppercase() {
            title.push(' ');
        }
        title.push(c);
    }
    title
}

/// `countdownBlock` → `countdown-block`, used as a CSS class.
pub fn kebab_name(block: &BlockName) -> String {
    let mut out = String::with_capacity(block.as_str().len() + 4);
    for c in block.as_str().chars() {
        if c.is_uppercase() {
            if !out.is_empty() {
                out.push('-');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Lower-case, dash-separated URL slug. Accented Latin letters are folded.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        let c = fold_accent(c);
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

fn fold_accent(c: char) -> char {
    match c {
        'à' | 'â' | 'ä' | 'á' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'î' | 'ï' | 'í' => 'i',
        'ô' | 'ö' | 'ó' => 'o',
        'ù' | 'û' | 'ü' | 'ú' => 'u',
        'ç' => 'c',
        other => other,
    }
}

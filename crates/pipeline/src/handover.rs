//! The handover contract exchanged between pipeline stages.
//!
//! A [`Handover`] is produced by one agent and consumed by the agent named in
//! its `nextAgent` field. It is immutable once built: fields are private and the
//! next stage constructs a fresh value rather than editing the one it received.
//!
//! Two views exist:
//!
//! - the typed [`Handover`], whose constructors enforce the status vocabulary
//!   and the "blocked carries at least one error" invariant;
//! - untyped JSON (snapshots on disk, HTTP request bodies), checked by the
//!   advisory [`validate_handover`] before being converted.
//!
//! ```text
//! (none) ──► ready ──► ready ──► … ──► done
//!              │         │
//!              └─► blocked (names a remediation agent)
//!              └─► error   (terminal for that invocation)
//! ```

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::manifest::MediaEntry;
use crate::{AgentName, ContextId, Timestamp};

/// Error used when a blocked handover is requested without a reason.
pub const DEFAULT_BLOCKED_REASON: &str = "Blocked without an explicit reason";

static UUID_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("static pattern")
});

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while constructing or decoding a [`Handover`].
#[derive(Debug, Error, PartialEq)]
pub enum HandoverError {
    /// The status string is not one of `ready`, `blocked`, `done`, `error`.
    #[error("Invalid handover status '{0}' (expected ready, blocked, done or error)")]
    InvalidStatus(String),

    /// A blocked handover was requested with an empty error list.
    #[error("A blocked handover must carry at least one error")]
    BlockedWithoutErrors,

    /// The JSON document could not be decoded into a handover.
    #[error("Malformed handover: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Whether downstream stages may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoverStatus {
    Ready,
    Blocked,
    Done,
    Error,
}

impl HandoverStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HandoverStatus::Ready => "ready",
            HandoverStatus::Blocked => "blocked",
            HandoverStatus::Done => "done",
            HandoverStatus::Error => "error",
        }
    }
}

impl FromStr for HandoverStatus {
    type Err = HandoverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready" => Ok(HandoverStatus::Ready),
            "blocked" => Ok(HandoverStatus::Blocked),
            "done" => Ok(HandoverStatus::Done),
            "error" => Ok(HandoverStatus::Error),
            other => Err(HandoverError::InvalidStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for HandoverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Label of the stage that produced a handover.
///
/// Unknown labels are preserved in [`Stage::Other`] so newer producers can talk
/// to older consumers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Stage {
    Analysis,
    Build,
    Design,
    Compat,
    Diagnostic,
    Publish,
    Cleanup,
    Pagegen,
    Review,
    Style,
    Test,
    Other(String),
}

impl Stage {
    /// Parses a stage label; never fails.
    pub fn parse(label: &str) -> Self {
        match label {
            "analysis" => Stage::Analysis,
            "build" => Stage::Build,
            "design" => Stage::Design,
            "compat" => Stage::Compat,
            "diagnostic" => Stage::Diagnostic,
            "publish" => Stage::Publish,
            "cleanup" => Stage::Cleanup,
            "pagegen" => Stage::Pagegen,
            "review" => Stage::Review,
            "style" => Stage::Style,
            "test" => Stage::Test,
            other => Stage::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Stage::Analysis => "analysis",
            Stage::Build => "build",
            Stage::Design => "design",
            Stage::Compat => "compat",
            Stage::Diagnostic => "diagnostic",
            Stage::Publish => "publish",
            Stage::Cleanup => "cleanup",
            Stage::Pagegen => "pagegen",
            Stage::Review => "review",
            Stage::Style => "style",
            Stage::Test => "test",
            Stage::Other(label) => label,
        }
    }

    /// Returns `true` if the label is part of the standard enumeration.
    pub fn is_standard(&self) -> bool {
        !matches!(self, Stage::Other(_))
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Stage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Stage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Stage::parse(&label))
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// The manifest slice carried inside a handover.
///
/// All three lists are always present, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestArtifacts {
    #[serde(default)]
    pub blocks: Vec<String>,
    #[serde(default)]
    pub pages: Vec<String>,
    #[serde(default)]
    pub media: Vec<MediaEntry>,
}

/// Structured stage output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifacts {
    /// Paths written or deleted by the stage.
    #[serde(default)]
    pub files: Vec<String>,

    /// Stage-specific free-form result.
    #[serde(default)]
    pub report: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Value>,

    #[serde(default)]
    pub pages: Vec<Value>,

    #[serde(default)]
    pub manifest: ManifestArtifacts,
}

/// Handover metadata. Unknown keys are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default = "Timestamp::now")]
    pub timestamp: Timestamp,

    #[serde(default)]
    pub notes: String,

    /// Stage execution time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            timestamp: Timestamp::now(),
            notes: String::new(),
            duration: None,
            extra: Map::new(),
        }
    }
}

/// Everything a stage contributes to a handover besides its routing fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandoverData {
    pub artifacts: Artifacts,
    pub errors: Vec<String>,
    pub notes: String,
    pub duration_ms: Option<u64>,
    pub extra_meta: Map<String, Value>,
}

impl HandoverData {
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_artifacts(mut self, artifacts: Artifacts) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

// ---------------------------------------------------------------------------
// Handover
// ---------------------------------------------------------------------------

/// The record passed from one stage to the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "HandoverRecord")]
pub struct Handover {
    context_id: ContextId,
    status: HandoverStatus,
    next_agent: Option<AgentName>,
    stage: Stage,
    artifacts: Artifacts,
    errors: Vec<String>,
    meta: Meta,
}

impl Handover {
    /// Builds a handover from loosely typed status and stage labels.
    ///
    /// Fails if `status` is outside the recognised vocabulary. An unknown
    /// `stage` only produces a warning.
    pub fn create(
        context_id: ContextId,
        status: &str,
        next_agent: Option<AgentName>,
        stage: &str,
        data: HandoverData,
    ) -> Result<Self, HandoverError> {
        let status = HandoverStatus::from_str(status)?;
        Self::new(context_id, status, next_agent, Stage::parse(stage), data)
    }

    /// Builds a handover from typed parts.
    pub fn new(
        context_id: ContextId,
        status: HandoverStatus,
        next_agent: Option<AgentName>,
        stage: Stage,
        data: HandoverData,
    ) -> Result<Self, HandoverError> {
        check_blocked_errors(status, &data.errors)?;
        Ok(Self::from_data(context_id, status, next_agent, stage, data))
    }

    /// A `ready` handover routed to `next_agent`.
    pub fn ready(
        context_id: ContextId,
        next_agent: Option<AgentName>,
        stage: Stage,
        data: HandoverData,
    ) -> Self {
        Self::from_data(context_id, HandoverStatus::Ready, next_agent, stage, data)
    }

    /// A terminal `done` handover.
    pub fn done(context_id: ContextId, stage: Stage, data: HandoverData) -> Self {
        Self::from_data(context_id, HandoverStatus::Done, None, stage, data)
    }

    /// An `error` handover; errors may be empty.
    pub fn error(
        context_id: ContextId,
        next_agent: Option<AgentName>,
        stage: Stage,
        data: HandoverData,
    ) -> Self {
        Self::from_data(context_id, HandoverStatus::Error, next_agent, stage, data)
    }

    /// A `blocked` handover. Fails if `errors` is empty.
    pub fn blocked(
        context_id: ContextId,
        next_agent: Option<AgentName>,
        stage: Stage,
        errors: Vec<String>,
        data: HandoverData,
    ) -> Result<Self, HandoverError> {
        Self::new(
            context_id,
            HandoverStatus::Blocked,
            next_agent,
            stage,
            data.with_errors(errors),
        )
    }

    /// Decodes a handover received as JSON.
    ///
    /// Structural problems reported by [`validate_handover`] are logged but do
    /// not stop decoding; only a document that cannot be represented at all
    /// (missing or invalid `contextId`/`status`, blocked without errors) fails.
    pub fn from_value(value: Value) -> Result<Self, HandoverError> {
        let report = validate_handover(&value);
        if !report.valid {
            warn!(errors = ?report.errors, "Incoming handover failed validation; continuing");
        }
        serde_json::from_value(value).map_err(|e| HandoverError::Malformed(e.to_string()))
    }

    fn from_data(
        context_id: ContextId,
        status: HandoverStatus,
        next_agent: Option<AgentName>,
        stage: Stage,
        data: HandoverData,
    ) -> Self {
        if !stage.is_standard() {
            warn!(stage = %stage, "Handover stage outside the standard enumeration");
        }
        let meta = Meta {
            timestamp: Timestamp::now(),
            notes: data.notes,
            duration: data.duration_ms,
            extra: data.extra_meta,
        };
        Self {
            context_id,
            status,
            next_agent,
            stage,
            artifacts: data.artifacts,
            errors: data.errors,
            meta,
        }
    }

    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    pub fn status(&self) -> HandoverStatus {
        self.status
    }

    pub fn next_agent(&self) -> Option<&AgentName> {
        self.next_agent.as_ref()
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn is_blocked(&self) -> bool {
        self.status == HandoverStatus::Blocked
    }
}

/// Builds a blocked handover, inserting [`DEFAULT_BLOCKED_REASON`] when no
/// error is supplied so the result always carries at least one error.
pub fn create_blocked_handover(
    context_id: ContextId,
    next_agent: Option<AgentName>,
    stage: Stage,
    mut errors: Vec<String>,
    data: HandoverData,
) -> Handover {
    if errors.is_empty() {
        errors.push(DEFAULT_BLOCKED_REASON.to_string());
    }
    Handover::from_data(
        context_id,
        HandoverStatus::Blocked,
        next_agent,
        stage,
        data.with_errors(errors),
    )
}

fn check_blocked_errors(status: HandoverStatus, errors: &[String]) -> Result<(), HandoverError> {
    if status == HandoverStatus::Blocked && errors.is_empty() {
        return Err(HandoverError::BlockedWithoutErrors);
    }
    Ok(())
}

/// Returns the handover's context id, or mints a new one for the first stage.
pub fn get_or_create_context_id(handover: Option<&Handover>) -> ContextId {
    handover
        .map(Handover::context_id)
        .unwrap_or_else(ContextId::new_random)
}

// ---------------------------------------------------------------------------
// Wire form
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HandoverRecord {
    context_id: ContextId,
    status: HandoverStatus,
    #[serde(default)]
    next_agent: Option<String>,
    stage: Stage,
    #[serde(default)]
    artifacts: Artifacts,
    #[serde(default)]
    errors: Vec<String>,
    #[serde(default)]
    meta: Meta,
}

impl TryFrom<HandoverRecord> for Handover {
    type Error = HandoverError;

    fn try_from(record: HandoverRecord) -> Result<Self, Self::Error> {
        check_blocked_errors(record.status, &record.errors)?;
        Ok(Self {
            context_id: record.context_id,
            status: record.status,
            next_agent: record.next_agent.and_then(AgentName::new),
            stage: record.stage,
            artifacts: record.artifacts,
            errors: record.errors,
            meta: record.meta,
        })
    }
}

// ---------------------------------------------------------------------------
// Advisory validation
// ---------------------------------------------------------------------------

/// Outcome of [`validate_handover`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Structural check over an untyped handover document.
///
/// Advisory: callers log the result and keep going.
pub fn validate_handover(value: &Value) -> ValidationReport {
    let mut errors = Vec::new();

    let Some(root) = value.as_object() else {
        return ValidationReport {
            valid: false,
            errors: vec!["handover is not an object".to_string()],
        };
    };

    match root.get("contextId") {
        None | Some(Value::Null) => errors.push("missing contextId".to_string()),
        Some(Value::String(id)) if UUID_SHAPE.is_match(id) => {}
        Some(other) => errors.push(format!("contextId is not a UUID: {other}")),
    }

    match root.get("status").and_then(Value::as_str) {
        None => errors.push("missing status".to_string()),
        Some(status) => {
            if let Err(e) = HandoverStatus::from_str(status) {
                errors.push(e.to_string());
            }
        }
    }

    if root.get("stage").and_then(Value::as_str).is_none() {
        errors.push("missing stage".to_string());
    }

    let artifacts = root.get("artifacts");
    if !artifacts
        .and_then(|a| a.get("files"))
        .is_some_and(Value::is_array)
    {
        errors.push("artifacts.files must be a list".to_string());
    }
    for key in ["blocks", "pages", "media"] {
        let is_list = artifacts
            .and_then(|a| a.get("manifest"))
            .and_then(|m| m.get(key))
            .is_some_and(Value::is_array);
        if !is_list {
            errors.push(format!("artifacts.manifest.{key} must be a list"));
        }
    }

    if root
        .get("meta")
        .and_then(|m| m.get("timestamp"))
        .is_none_or(Value::is_null)
    {
        errors.push("missing meta.timestamp".to_string());
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}

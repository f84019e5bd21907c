//! Shared value types for the sitegen pipeline domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values that participate in stage decisions (severity thresholds,
//! risk filtering, elapsed-time reporting).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

/// Severity level for a [`Finding`].
///
/// Used consistently by the reviewer, style and compatibility stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingSeverity {
    /// Contextual information with no impact on progression.
    Informational,
    /// Finding that should be addressed but does not block progression.
    Warning,
    /// Finding that blocks progression; the stage emits a blocked handover.
    Blocking,
}

/// A structured finding produced by a static check over generated source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Workspace-relative path of the file the finding relates to.
    pub file: String,

    /// Stable rule identifier (e.g. `"default-export"`, `"missing-validation"`).
    pub rule: String,

    /// Severity of this finding.
    pub severity: FindingSeverity,

    /// Human-readable description of the finding.
    pub message: String,
}

impl Finding {
    pub fn new(
        file: impl Into<String>,
        rule: impl Into<String>,
        severity: FindingSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            rule: rule.into(),
            severity,
            message: message.into(),
        }
    }

    /// Returns `true` if this finding blocks progression.
    pub fn is_blocking(&self) -> bool {
        self.severity == FindingSeverity::Blocking
    }
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: [{}] {}", self.file, self.rule, self.message)
    }
}

// ---------------------------------------------------------------------------
// Cleanup risk
// ---------------------------------------------------------------------------

/// How risky it is to delete a cleanup candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// How much deletion risk the cleanup stage accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTolerance {
    /// Keep only low-risk candidates.
    #[default]
    Prudent,
    /// Exclude only high-risk candidates.
    Medium,
    /// Keep every candidate.
    Aggressive,
}

impl RiskTolerance {
    /// Returns `true` if a candidate at `risk` may be deleted under this tolerance.
    pub fn accepts(self, risk: RiskLevel) -> bool {
        match self {
            RiskTolerance::Prudent => risk == RiskLevel::Low,
            RiskTolerance::Medium => risk != RiskLevel::High,
            RiskTolerance::Aggressive => true,
        }
    }
}

impl std::str::FromStr for RiskTolerance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "prudent" | "low" => Ok(RiskTolerance::Prudent),
            "medium" => Ok(RiskTolerance::Medium),
            "aggressive" | "high" => Ok(RiskTolerance::Aggressive),
            other => Err(format!("unknown risk tolerance '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly. Serialises as an RFC 3339 string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

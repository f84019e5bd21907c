//! Core orchestration domain for sitegen.
//!
//! This crate contains every domain concept shared by the pipeline: the
//! handover contract passed between stages, the cumulative run manifest, the
//! lifecycle event bus, and the port traits infrastructure crates implement.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate performs no I/O itself.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`ContextId`, `AgentName`, `BlockName`, etc.) |
//! | [`types`] | Shared value types (`Timestamp`, `Finding`, `RiskTolerance`) |
//! | [`handover`] | Handover contract: construction, decoding, advisory validation |
//! | [`manifest`] | Manifest model, merge rules, `Manifests` service, repository port |
//! | [`events`] | Event bus with bounded history and log sink |
//! | [`patterns`] | Learned fix-pattern statistics and their store port |
//! | [`ports`] | LLM, CMS, workspace, archive and subprocess port traits |
//! | [`config`] | Environment snapshot and `sitegen.toml` settings |
//! | [`progress`] | Progress events and reporters |
//! | [`errors`] | Top-level error type |

pub mod config;
pub mod errors;
pub mod events;
pub mod handover;
pub mod identifiers;
pub mod manifest;
pub mod patterns;
pub mod ports;
pub mod progress;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use config::{
    CleanupSettings, CmsConnection, EnvConfig, EnvVar, ReviewerSettings, Settings, TesterSettings,
    CMS_ENV,
};
pub use errors::SitegenError;
pub use events::{
    AgentEventStatus, BusEvent, BusStats, EventBus, EventLog, EventLogError, MemoryEventLog,
    NullEventLog, PipelineEventStatus, DEFAULT_HISTORY_CAPACITY,
};
pub use handover::{
    create_blocked_handover, get_or_create_context_id, validate_handover, Artifacts, Handover,
    HandoverData, HandoverError, HandoverStatus, ManifestArtifacts, Meta, Stage, ValidationReport,
};
pub use identifiers::{AgentName, BlockName, ContextId, DocumentId, SubscriptionId};
pub use manifest::{
    AgentContribution, InMemoryManifestRepository, Manifest, ManifestError, ManifestRepository,
    ManifestUpdate, Manifests, MediaEntry,
};
pub use patterns::{
    InMemoryPatternStore, LearnedPatterns, PatternStats, PatternStore, PatternStoreError,
};
pub use ports::{
    ArchiveError, ChangeAction, ChangeResult, CmsClient, CmsError, CommandError, CommandOutput,
    CommandRunner, CommandSpec, Completion, CompletionRequest, FileChange, HandoverArchive,
    InMemoryHandoverArchive, LlmError, LlmProvider, Workspace, WorkspaceError, WorkspaceFile,
};
pub use progress::{LogProgress, NoopProgress, ProgressEvent, ProgressReporter};
pub use types::{Finding, FindingSeverity, RiskLevel, RiskTolerance, Timestamp};

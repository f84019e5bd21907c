//! sitegen pipeline stages and orchestration.
//!
//! Every stage ("agent") implements [`Agent`] and is executed through
//! [`run_agent`], which enforces the shared contract: blocked handovers are
//! relayed without work, required environment is checked before any external
//! call, failures become failed [`AgentOutcome`]s instead of errors, and every
//! produced handover is snapshotted and announced on the event bus.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Stages sequence calls between business logic in
//! the [`pipeline`] crate and the port traits it defines (LLM, CMS, workspace,
//! subprocesses). No stage performs I/O directly.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`context`] | `AgentContext` (shared services) and `AgentInput` |
//! | [`contract`] | `Agent` trait, `StageResult`, `AgentOutcome`, `run_agent` |
//! | [`detection`] | Block-type detection from free text and naming helpers |
//! | [`templates`] | Deterministic schema/component templates |
//! | [`stages`] | The eleven stage implementations |
//! | [`registry`] | Name → agent lookup |
//! | [`orchestrator`] | Full chain and auto-generate flows |

pub mod context;
pub mod contract;
pub mod detection;
pub mod orchestrator;
pub mod registry;
pub mod stages;
pub mod templates;

pub use context::{AgentContext, AgentInput};
pub use contract::{run_agent, Agent, AgentFailure, AgentOutcome, StageResult, Verdict};
pub use detection::{detect_block, detect_blocks, BlockDetection, DetectionSource};
pub use orchestrator::{AutoGenerateRequest, ChainOptions, Orchestrator, RunReport};
pub use registry::AgentRegistry;
pub use stages::names;

//! Top-level error type for the sitegen pipeline domain.
//!
//! [`SitegenError`] covers conditions that stop a run before or between stages.
//! Component-level errors (handover decoding, manifest storage, LLM and CMS
//! calls) are defined in their respective modules; failures inside a stage
//! never surface here because agents convert them into failed outcomes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Serialize, Deserialize)]
pub enum SitegenError {
    /// Settings could not be parsed or are inconsistent.
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
    },

    /// Variables a stage needs are not set.
    ///
    /// Detected eagerly at stage entry, before any external call.
    #[error("Missing environment variables: {}", missing.join(", "))]
    MissingEnvironment {
        missing: Vec<String>,
    },

    /// A caller asked for an agent that is not registered.
    #[error("Unknown agent '{0}'")]
    UnknownAgent(String),

    /// A stage reported failure and the chain stopped there.
    ///
    /// Changes applied by earlier stages are not rolled back.
    #[error("Pipeline halted at {agent}: {reason}")]
    PipelineHalt {
        agent: String,
        reason: String,
    },
}

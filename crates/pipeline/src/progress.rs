//! Progress reporting for multi-step runs.
//!
//! The orchestrator emits a [`ProgressEvent::Progress`] before each unit of
//! work and exactly one terminal [`ProgressEvent::Complete`] or
//! [`ProgressEvent::Error`]. Reporters decide where the events go: the log
//! (CLI), a streamed HTTP response (server) or nowhere (tests).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Progress {
        current: usize,
        total: usize,
        message: String,
    },
    Complete {
        result: Value,
    },
    Error {
        error: String,
    },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Progress { .. })
    }
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Writes progress to the tracing log.
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Progress {
                current,
                total,
                message,
            } => info!(current, total, "{message}"),
            ProgressEvent::Complete { .. } => info!("Run complete"),
            ProgressEvent::Error { error } => error!(%error, "Run failed"),
        }
    }
}

//! sitegen local-machine infrastructure adapters.
//!
//! Implements the filesystem- and process-facing traits defined in the
//! [`pipeline`] crate:
//!
//! | Type | Trait | Storage |
//! |------|-------|---------|
//! | [`FsWorkspace`] | [`pipeline::Workspace`] | files under the site root |
//! | [`FsManifestRepository`] | [`pipeline::ManifestRepository`] | `out/<contextId>/manifest.json` |
//! | [`FsHandoverArchive`] | [`pipeline::HandoverArchive`] | `out/<contextId>/<agent>-handover.json` |
//! | [`FsPatternStore`] | [`pipeline::PatternStore`] | `out/learned-patterns.json` |
//! | [`FileEventLog`] | [`pipeline::EventLog`] | `out/event-bus.log` (JSON lines) |
//! | [`SystemCommandRunner`] | [`pipeline::CommandRunner`] | child processes |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** None of these types make domain decisions. There is no
//! file locking: the pipeline runs each context sequentially and serialises
//! manifest writes itself.

mod archive;
mod event_log;
mod files;
mod manifest_repo;
mod patterns;
mod process;

pub use archive::FsHandoverArchive;
pub use event_log::{FileEventLog, EVENT_LOG_FILE};
pub use files::FsWorkspace;
pub use manifest_repo::{FsManifestRepository, MANIFEST_FILE};
pub use patterns::{FsPatternStore, LEARNED_PATTERNS_FILE};
pub use process::SystemCommandRunner;

use std::path::Path;

/// Writes `contents` to `path` via a sibling temporary file and a rename, so a
/// reader never observes a half-written JSON document.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await
}

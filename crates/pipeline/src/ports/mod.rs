//! Port traits implemented by infrastructure crates.
//!
//! Agents only ever see these traits. Concrete HTTP, filesystem and subprocess
//! adapters live in the `llm`, `cms` and `local` crates and are wired together
//! by the CLI composition root.

pub mod archive;
pub mod cms;
pub mod files;
pub mod llm;
pub mod process;

pub use archive::{snapshot_key, ArchiveError, HandoverArchive, InMemoryHandoverArchive};
pub use cms::{CmsClient, CmsError};
pub use files::{ChangeAction, ChangeResult, FileChange, Workspace, WorkspaceError, WorkspaceFile};
pub use llm::{Completion, CompletionRequest, LlmError, LlmProvider};
pub use process::{CommandError, CommandOutput, CommandRunner, CommandSpec};

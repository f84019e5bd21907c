//! Child-process command runner.

use std::path::Path;

use async_trait::async_trait;
use pipeline::{CommandError, CommandOutput, CommandRunner, CommandSpec};
use tokio::process::Command;
use tracing::{debug, instrument};

/// Runs commands with `tokio::process`, capturing stdout and stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    #[instrument(skip(self), fields(command = %command))]
    async fn run(&self, command: &CommandSpec, cwd: &Path) -> Result<CommandOutput, CommandError> {
        let output = Command::new(&command.program)
            .args(&command.args)
            .current_dir(cwd)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CommandError::Spawn {
                program: command.program.clone(),
                message: e.to_string(),
            })?;

        debug!(status = ?output.status.code(), "Command finished");
        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_output_and_exit_status() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = SystemCommandRunner;

        let ok = runner
            .run(&CommandSpec::parse("echo hello").unwrap(), tmp.path())
            .await
            .unwrap();
        assert!(ok.success());
        assert_eq!(ok.stdout.trim(), "hello");

        let failed = runner
            .run(&CommandSpec::parse("false").unwrap(), tmp.path())
            .await
            .unwrap();
        assert!(!failed.success());
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let tmp = tempfile::tempdir().unwrap();
        let result = SystemCommandRunner
            .run(
                &CommandSpec::parse("definitely-not-a-real-program-xyz").unwrap(),
                tmp.path(),
            )
            .await;
        assert!(matches!(result, Err(CommandError::Spawn { .. })));
    }
}

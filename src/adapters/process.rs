//! Process Executor Adapter
//!
//! Implements the `CommandExecutor` port by spawning real processes.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::domain::ports::{CommandExecutor, CommandOutput, CommandSpec};
use crate::error::{Error, Result};

/// Runs commands with `tokio::process`, capturing stdout and stderr.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    shell: String,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self {
            shell: "/bin/sh".to_string(),
        }
    }
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn build(&self, spec: &CommandSpec) -> Command {
        let mut command = if spec.use_shell {
            let mut cmd = Command::new(&self.shell);
            cmd.arg("-c").arg(spec.render());
            cmd
        } else {
            let mut cmd = Command::new(&spec.program);
            cmd.args(&spec.args);
            cmd
        };
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    #[instrument(skip(self, spec), fields(command = %spec))]
    async fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let rendered = spec.render();

        let output = self
            .build(spec)
            .output()
            .await
            .map_err(|source| Error::ExecutionFailure {
                command: rendered.clone(),
                source,
            })?;

        let exit_code = output.status.code().unwrap_or(-1);
        let result = CommandOutput {
            command: rendered,
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if result.success() {
            debug!(exit_code, "Command finished");
        } else {
            warn!(exit_code, stderr = %result.stderr.trim(), "Command exited unsuccessfully");
        }

        Ok(result)
    }
}

/// Wraps an executor with a per-command deadline.
///
/// The inner process is killed when the deadline fires.
#[derive(Debug, Clone)]
pub struct TimeoutExecutor<E> {
    inner: E,
    timeout: Duration,
}

impl<E: CommandExecutor> TimeoutExecutor<E> {
    pub fn new(inner: E, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<E: CommandExecutor> CommandExecutor for TimeoutExecutor<E> {
    async fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        match tokio::time::timeout(self.timeout, self.inner.execute(spec)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(command = %spec, timeout_secs = self.timeout.as_secs(), "Command timed out");
                Err(Error::CommandTimeout {
                    command: spec.render(),
                    timeout_secs: self.timeout.as_secs(),
                })
            }
        }
    }
}

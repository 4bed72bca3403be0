//! SPDK RPC Adapter
//!
//! Issues SPDK control-plane verbs by invoking `scripts/rpc.py` through a
//! `CommandExecutor`. Every call is one external process.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::domain::ports::{CommandExecutor, CommandOutput, CommandSpec};
use crate::error::Result;

/// Thin client over SPDK's `rpc.py`.
#[derive(Clone)]
pub struct SpdkRpc {
    executor: Arc<dyn CommandExecutor>,
    script: PathBuf,
}

impl SpdkRpc {
    pub fn new(executor: Arc<dyn CommandExecutor>, script: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            script: script.into(),
        }
    }

    pub fn executor(&self) -> &dyn CommandExecutor {
        self.executor.as_ref()
    }

    /// Build the command for one verb.
    pub fn command<I, S>(&self, verb: &str, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = vec![verb.to_string()];
        argv.extend(args.into_iter().map(Into::into));
        CommandSpec::new(self.script.to_string_lossy(), argv)
    }

    /// Invoke one verb and capture its outcome.
    pub async fn call<I, S>(&self, verb: &str, args: I) -> Result<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command = self.command(verb, args);
        debug!(verb, command = %command, "SPDK RPC");
        self.executor.execute(&command).await
    }
}

impl std::fmt::Debug for SpdkRpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpdkRpc")
            .field("script", &self.script)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::RecordingExecutor;

    #[tokio::test]
    async fn test_call_prefixes_script_and_verb() {
        let executor = Arc::new(RecordingExecutor::new());
        let rpc = SpdkRpc::new(executor.clone(), "/opt/spdk/scripts/rpc.py");

        let output = rpc
            .call("bdev_aio_create", ["/dev/nvme0n1", "lvol0pool0"])
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(
            executor.commands(),
            vec!["/opt/spdk/scripts/rpc.py bdev_aio_create /dev/nvme0n1 lvol0pool0"]
        );
    }
}

//! Volume Backend Drivers
//!
//! Each driver turns a [`StackSpec`] into an ordered list of external
//! commands and runs them one at a time. The first non-zero exit stops the
//! sequence; already applied steps stay in place and are listed in the
//! returned [`ProvisionReport`].

pub mod lvm;
pub mod spdk;

use std::sync::Arc;

use tracing::warn;

use crate::adapters::SpdkRpc;
use crate::config::AutobenchConfig;
use crate::domain::ports::{Backend, CommandExecutor, CommandSpec, NvmetStore, VolumeBackend};
use crate::domain::report::ProvisionReport;
use crate::error::Result;
use crate::fabric::{NvmetExposer, PortAllocator, SpdkExposer};

pub use lvm::LvmBackend;
pub use spdk::SpdkBackend;

/// Run `commands` in order, recording each, until one exits non-zero.
///
/// Returns whether every command succeeded.
pub async fn run_sequence(
    executor: &dyn CommandExecutor,
    report: &mut ProvisionReport,
    commands: Vec<CommandSpec>,
) -> Result<bool> {
    for command in commands {
        let output = executor.execute(&command).await?;
        if !report.record_command(output) {
            if let Some(step) = report.steps.last() {
                warn!(
                    operation = %report.operation,
                    command = %step.description,
                    "Step failed, stopping sequence"
                );
            }
            return Ok(false);
        }
    }
    Ok(true)
}

/// Build the driver for `kind` from configuration and shared adapters.
pub fn build_backend(
    kind: Backend,
    config: &AutobenchConfig,
    executor: Arc<dyn CommandExecutor>,
    store: Arc<dyn NvmetStore>,
) -> Arc<dyn VolumeBackend> {
    match kind {
        Backend::Lvm => {
            let exposer = NvmetExposer::new(
                store,
                PortAllocator::new(config.nvmet.port_claim_attempts),
                config.nvmet.nqn_prefix.clone(),
            );
            Arc::new(LvmBackend::new(executor, exposer))
        }
        Backend::Spdk => {
            let rpc = SpdkRpc::new(executor, config.spdk.rpc_script.clone());
            let exposer = SpdkExposer::new(
                rpc.clone(),
                config.spdk.clone(),
                config.nvmet.nqn_prefix.clone(),
            );
            Arc::new(SpdkBackend::new(rpc, exposer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryNvmetStore, RecordingExecutor};
    use crate::domain::report::ReportState;

    #[tokio::test]
    async fn test_run_sequence_halts_on_failure() {
        let executor = RecordingExecutor::new();
        executor.fail_when("second", 3, "boom");
        let mut report = ProvisionReport::new("test", "target");

        let finished = run_sequence(
            &executor,
            &mut report,
            vec![
                CommandSpec::new("first", Vec::<String>::new()),
                CommandSpec::new("second", Vec::<String>::new()),
                CommandSpec::new("third", Vec::<String>::new()),
            ],
        )
        .await
        .unwrap();

        assert!(!finished);
        assert_eq!(report.state, ReportState::Failed);
        assert_eq!(executor.commands(), vec!["first", "second"]);
    }

    #[test]
    fn test_build_backend_kinds() {
        let config = AutobenchConfig::default();
        let executor: Arc<dyn CommandExecutor> = Arc::new(RecordingExecutor::new());
        let store: Arc<dyn NvmetStore> = Arc::new(InMemoryNvmetStore::new());

        let lvm = build_backend(Backend::Lvm, &config, executor.clone(), store.clone());
        let spdk = build_backend(Backend::Spdk, &config, executor, store);
        assert_eq!(lvm.kind(), Backend::Lvm);
        assert_eq!(spdk.kind(), Backend::Spdk);
    }
}

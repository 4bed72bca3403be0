//! LVM Volume Backend
//!
//! A stack is one physical volume, one volume group on it, and one logical
//! volume inside the group. The LV is exposed through the kernel NVMe target.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use super::run_sequence;
use crate::domain::ports::{
    Backend, CommandExecutor, CommandSpec, Exposure, ListenAddress, StackSpec, VolumeBackend,
    VolumeRef,
};
use crate::domain::report::ProvisionReport;
use crate::error::{Error, Result};
use crate::fabric::nqn::validate_component;
use crate::fabric::NvmetExposer;

/// `pvcreate`, `vgcreate`, `lvcreate` in that order. The size is passed to
/// `lvcreate` unchanged.
pub fn create_commands(spec: &StackSpec) -> Vec<CommandSpec> {
    vec![
        CommandSpec::new("pvcreate", [spec.disk.as_str()]),
        CommandSpec::new("vgcreate", [spec.group.as_str(), spec.disk.as_str()]),
        CommandSpec::new(
            "lvcreate",
            [
                "-n",
                spec.name.as_str(),
                spec.group.as_str(),
                "--size",
                spec.size.as_str(),
            ],
        ),
    ]
}

/// Force-remove the volume group, then wipe the physical volume label.
pub fn remove_commands(spec: &StackSpec) -> Vec<CommandSpec> {
    vec![
        CommandSpec::new("vgremove", [spec.group.as_str(), "-f", "-y"]),
        CommandSpec::new("pvremove", [spec.disk.as_str(), "-f", "-y"]),
    ]
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidName(format!("{} cannot be empty", field)));
    }
    Ok(())
}

/// LVM driver backed by the LVM2 command line tools.
pub struct LvmBackend {
    executor: Arc<dyn CommandExecutor>,
    exposer: NvmetExposer,
}

impl LvmBackend {
    pub fn new(executor: Arc<dyn CommandExecutor>, exposer: NvmetExposer) -> Self {
        Self { executor, exposer }
    }
}

#[async_trait]
impl VolumeBackend for LvmBackend {
    fn kind(&self) -> Backend {
        Backend::Lvm
    }

    #[instrument(skip(self, spec), fields(vg = %spec.group, lv = %spec.name, disk = %spec.disk))]
    async fn create_stack(&self, spec: &StackSpec) -> Result<ProvisionReport> {
        validate_component("volume group", &spec.group)?;
        validate_component("logical volume", &spec.name)?;
        require("disk", &spec.disk)?;
        require("size", &spec.size)?;

        let mut report = ProvisionReport::new("create-lvm-stack", spec.volume().to_string());
        if run_sequence(self.executor.as_ref(), &mut report, create_commands(spec)).await? {
            info!("LVM stack created");
        }
        Ok(report.complete())
    }

    #[instrument(skip(self, spec), fields(vg = %spec.group, disk = %spec.disk))]
    async fn remove_stack(&self, spec: &StackSpec) -> Result<ProvisionReport> {
        validate_component("volume group", &spec.group)?;
        require("disk", &spec.disk)?;

        let mut report = ProvisionReport::new("remove-lvm-stack", spec.group.as_str());
        if run_sequence(self.executor.as_ref(), &mut report, remove_commands(spec)).await? {
            info!("LVM stack removed");
        }
        Ok(report.complete())
    }

    async fn expose(&self, volume: &VolumeRef, listen: ListenAddress) -> Result<Exposure> {
        self.exposer.expose(volume, listen).await
    }

    async fn withdraw(&self, volume: &VolumeRef) -> Result<ProvisionReport> {
        self.exposer.withdraw(volume).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryNvmetStore, RecordingExecutor};
    use crate::config::DEFAULT_NQN_PREFIX;
    use crate::domain::report::ReportState;
    use crate::fabric::PortAllocator;
    use assert_matches::assert_matches;

    fn setup() -> (Arc<RecordingExecutor>, LvmBackend) {
        let executor = Arc::new(RecordingExecutor::new());
        let store = Arc::new(InMemoryNvmetStore::new());
        let exposer = NvmetExposer::new(store, PortAllocator::default(), DEFAULT_NQN_PREFIX);
        (executor.clone(), LvmBackend::new(executor, exposer))
    }

    #[test]
    fn test_create_commands() {
        let spec = StackSpec::lvm("lv0", "vg0", "/dev/loop0", "1G");
        let rendered: Vec<_> = create_commands(&spec).iter().map(|c| c.render()).collect();
        assert_eq!(
            rendered,
            vec![
                "pvcreate /dev/loop0",
                "vgcreate vg0 /dev/loop0",
                "lvcreate -n lv0 vg0 --size 1G",
            ]
        );
    }

    #[tokio::test]
    async fn test_create_stack_runs_in_order() {
        let (executor, backend) = setup();
        let spec = StackSpec::lvm("lv0", "vg0", "/dev/loop0", "1G");

        let report = backend.create_stack(&spec).await.unwrap();
        assert!(report.is_success());
        assert_eq!(
            executor.commands(),
            vec![
                "pvcreate /dev/loop0",
                "vgcreate vg0 /dev/loop0",
                "lvcreate -n lv0 vg0 --size 1G",
            ]
        );
    }

    #[tokio::test]
    async fn test_create_stack_stops_at_failure() {
        let (executor, backend) = setup();
        executor.fail_when("vgcreate", 5, "  Device /dev/loop0 excluded by a filter.\n");
        let spec = StackSpec::lvm("lv0", "vg0", "/dev/loop0", "1G");

        let report = backend.create_stack(&spec).await.unwrap();
        assert_eq!(report.state, ReportState::Failed);
        assert_eq!(executor.commands().len(), 2);

        assert_matches!(
            report.ensure_success(),
            Err(Error::ExternalCommandNonZeroExit { exit_code: 5, stderr, .. })
                if stderr == "Device /dev/loop0 excluded by a filter."
        );
    }

    #[tokio::test]
    async fn test_remove_stack() {
        let (executor, backend) = setup();
        let report = backend
            .remove_stack(&StackSpec::lvm_group("vg0", "/dev/loop0"))
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(
            executor.commands(),
            vec!["vgremove vg0 -f -y", "pvremove /dev/loop0 -f -y"]
        );
    }

    #[tokio::test]
    async fn test_invalid_spec_runs_nothing() {
        let (executor, backend) = setup();

        assert_matches!(
            backend
                .create_stack(&StackSpec::lvm("lv0", "vg0", "", "1G"))
                .await,
            Err(Error::InvalidName(_))
        );
        assert_matches!(
            backend
                .create_stack(&StackSpec::lvm("lv/0", "vg0", "/dev/loop0", "1G"))
                .await,
            Err(Error::InvalidName(_))
        );
        assert!(executor.commands().is_empty());
    }
}

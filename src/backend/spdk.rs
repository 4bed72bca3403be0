//! SPDK Volume Backend
//!
//! A stack is an AIO bdev over the raw disk, an lvol store on that bdev and
//! one lvol in the store. All verbs go through `rpc.py`.

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::adapters::SpdkRpc;
use crate::domain::ports::{
    Backend, CommandSpec, Exposure, ListenAddress, StackSpec, VolumeBackend, VolumeRef,
};
use crate::domain::report::ProvisionReport;
use crate::error::{Error, Result};
use crate::fabric::nqn::validate_component;
use crate::fabric::SpdkExposer;
use crate::size;

/// Name of the AIO bdev that carries the lvol store: lvol name + pool name.
pub fn bdev_name(spec: &StackSpec) -> String {
    format!("{}{}", spec.name, spec.group)
}

/// AIO bdev, lvol store, lvol. The size is converted to MiB first.
pub fn create_commands(rpc: &SpdkRpc, spec: &StackSpec) -> Result<Vec<CommandSpec>> {
    let mebibytes = size::parse(&spec.size)?;
    let bdev = bdev_name(spec);

    Ok(vec![
        rpc.command("bdev_aio_create", [spec.disk.clone(), bdev.clone()]),
        rpc.command("bdev_lvol_create_lvstore", [bdev, spec.group.clone()]),
        rpc.command(
            "bdev_lvol_create",
            [
                spec.name.clone(),
                mebibytes.to_string(),
                "-l".to_string(),
                spec.group.clone(),
            ],
        ),
    ])
}

/// Reverse of [`create_commands`]: lvol, lvol store, AIO bdev.
///
/// rpc.py resolves an lvol by its `<pool>/<lvol>` alias and an lvol store by
/// name only through `-l`, so the bare names are never passed on their own.
pub fn remove_commands(rpc: &SpdkRpc, spec: &StackSpec) -> Vec<CommandSpec> {
    vec![
        rpc.command("bdev_lvol_delete", [spec.volume().bdev_alias()]),
        rpc.command("bdev_lvol_delete_lvstore", ["-l".to_string(), spec.group.clone()]),
        rpc.command("bdev_aio_delete", [bdev_name(spec)]),
    ]
}

/// SPDK lvol driver.
#[derive(Debug, Clone)]
pub struct SpdkBackend {
    rpc: SpdkRpc,
    exposer: SpdkExposer,
}

impl SpdkBackend {
    pub fn new(rpc: SpdkRpc, exposer: SpdkExposer) -> Self {
        Self { rpc, exposer }
    }
}

#[async_trait]
impl VolumeBackend for SpdkBackend {
    fn kind(&self) -> Backend {
        Backend::Spdk
    }

    #[instrument(skip(self, spec), fields(pool = %spec.group, lvol = %spec.name, disk = %spec.disk))]
    async fn create_stack(&self, spec: &StackSpec) -> Result<ProvisionReport> {
        validate_component("pool", &spec.group)?;
        validate_component("lvol", &spec.name)?;
        if spec.disk.trim().is_empty() {
            return Err(Error::InvalidName("disk cannot be empty".to_string()));
        }
        let commands = create_commands(&self.rpc, spec)?;

        let mut report = ProvisionReport::new("create-spdk-stack", spec.volume().to_string());
        if super::run_sequence(self.rpc.executor(), &mut report, commands).await? {
            info!("SPDK stack created");
        }
        Ok(report.complete())
    }

    #[instrument(skip(self, spec), fields(pool = %spec.group, lvol = %spec.name))]
    async fn remove_stack(&self, spec: &StackSpec) -> Result<ProvisionReport> {
        validate_component("pool", &spec.group)?;
        validate_component("lvol", &spec.name)?;

        let mut report = ProvisionReport::new("remove-spdk-stack", spec.volume().to_string());
        let commands = remove_commands(&self.rpc, spec);
        if super::run_sequence(self.rpc.executor(), &mut report, commands).await? {
            info!("SPDK stack removed");
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

//! SPDK NVMe-oF Exposure
//!
//! SPDK owns its own target; exposure is four RPC verbs. Listeners are
//! addressed by IP and service port, so no port id is allocated here.

use tracing::{info, instrument, warn};

use super::nqn::volume_nqn;
use crate::adapters::SpdkRpc;
use crate::config::SpdkConfig;
use crate::domain::ports::{CommandOutput, Exposure, ListenAddress, Nqn, VolumeRef};
use crate::domain::report::ProvisionReport;
use crate::error::Result;

/// Issues the nvmf RPC verbs for SPDK-backed volumes.
#[derive(Debug, Clone)]
pub struct SpdkExposer {
    rpc: SpdkRpc,
    config: SpdkConfig,
    nqn_prefix: String,
}

impl SpdkExposer {
    pub fn new(rpc: SpdkRpc, config: SpdkConfig, nqn_prefix: impl Into<String>) -> Self {
        Self {
            rpc,
            config,
            nqn_prefix: nqn_prefix.into(),
        }
    }

    pub fn nqn_for(&self, volume: &VolumeRef) -> Result<Nqn> {
        volume_nqn(&self.nqn_prefix, volume)
    }

    /// Create the TCP transport. An existing transport is accepted.
    pub async fn ensure_transport(&self, report: &mut ProvisionReport) -> Result<bool> {
        let transport = &self.config.transport;
        let output = self
            .rpc
            .call(
                "nvmf_create_transport",
                [
                    "-tTCP".to_string(),
                    "-u".to_string(),
                    transport.io_unit_size.to_string(),
                    "-m".to_string(),
                    transport.max_qpairs_per_ctrlr.to_string(),
                    "-c".to_string(),
                    transport.in_capsule_data_size.to_string(),
                ],
            )
            .await?;

        if !output.success() && transport_exists(&output) {
            warn!(command = %output.command, "TCP transport already exists");
            report.record_tolerated(output);
            return Ok(true);
        }
        Ok(report.record_command(output))
    }

    /// Expose `volume` at `listen`. Stops at the first failing verb.
    #[instrument(skip(self), fields(volume = %volume, listen = %listen))]
    pub async fn expose(&self, volume: &VolumeRef, listen: ListenAddress) -> Result<Exposure> {
        let nqn = self.nqn_for(volume)?;
        let mut report = ProvisionReport::new("expose", nqn.as_str());

        let finished = self.ensure_transport(&mut report).await?
            && self.expose_steps(&nqn, volume, listen, &mut report).await?;

        if finished {
            info!(nqn = %nqn, "Volume exposed through SPDK");
        }

        Ok(Exposure {
            nqn,
            port_id: None,
            listen,
            report: report.complete(),
        })
    }

    async fn expose_steps(
        &self,
        nqn: &Nqn,
        volume: &VolumeRef,
        listen: ListenAddress,
        report: &mut ProvisionReport,
    ) -> Result<bool> {
        let steps: [(&str, Vec<String>); 3] = [
            (
                "nvmf_create_subsystem",
                vec![
                    nqn.to_string(),
                    "-a".into(),
                    "-s".into(),
                    self.config.serial_number.clone(),
                    "-d".into(),
                    self.config.model_number.clone(),
                ],
            ),
            (
                "nvmf_subsystem_add_ns",
                vec![nqn.to_string(), volume.bdev_alias()],
            ),
            (
                "nvmf_subsystem_add_listener",
                vec![
                    nqn.to_string(),
                    "-t".into(),
                    "tcp".into(),
                    "-a".into(),
                    listen.ip.to_string(),
                    "-s".into(),
                    listen.service_port.to_string(),
                ],
            ),
        ];

        for (verb, args) in steps {
            let output = self.rpc.call(verb, args).await?;
            if !report.record_command(output) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Delete the subsystem; SPDK drops its namespace and listeners with it.
    #[instrument(skip(self), fields(volume = %volume))]
    pub async fn withdraw(&self, volume: &VolumeRef) -> Result<ProvisionReport> {
        let nqn = self.nqn_for(volume)?;
        let mut report = ProvisionReport::new("withdraw", nqn.as_str());

        let output = self.rpc.call("nvmf_delete_subsystem", [nqn.as_str()]).await?;
        if report.record_command(output) {
            info!(nqn = %nqn, "Volume withdrawn from SPDK");
        }
        Ok(report.complete())
    }
}

fn transport_exists(output: &CommandOutput) -> bool {
    let needle = "already exists";
    output.stderr.contains(needle) || output.stdout.contains(needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::RecordingExecutor;
    use crate::config::DEFAULT_NQN_PREFIX;
    use crate::domain::ports::Backend;
    use crate::domain::report::ReportState;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    const RPC: &str = "/opt/spdk/scripts/rpc.py";

    fn setup() -> (Arc<RecordingExecutor>, SpdkExposer) {
        let executor = Arc::new(RecordingExecutor::new());
        let rpc = SpdkRpc::new(executor.clone(), RPC);
        let exposer = SpdkExposer::new(rpc, SpdkConfig::default(), DEFAULT_NQN_PREFIX);
        (executor, exposer)
    }

    fn listen() -> ListenAddress {
        ListenAddress::new(Ipv4Addr::new(10, 0, 0, 5), 4420)
    }

    #[tokio::test]
    async fn test_expose_issues_verbs_in_order() {
        let (executor, exposer) = setup();
        let volume = VolumeRef::new(Backend::Spdk, "pool0", "lvol0");

        let exposure = exposer.expose(&volume, listen()).await.unwrap();
        let nqn = "nqn.2022-06.autobench.spdk:pool0.lvol0";

        assert_eq!(exposure.nqn.as_str(), nqn);
        assert_eq!(exposure.port_id, None);
        assert!(exposure.report.is_success());
        assert_eq!(
            executor.commands(),
            vec![
                format!("{RPC} nvmf_create_transport -tTCP -u 16384 -m 8 -c 8192"),
                format!("{RPC} nvmf_create_subsystem {nqn} -a -s SPDK00000000000001 -d autobench"),
                format!("{RPC} nvmf_subsystem_add_ns {nqn} pool0/lvol0"),
                format!("{RPC} nvmf_subsystem_add_listener {nqn} -t tcp -a 10.0.0.5 -s 4420"),
            ]
        );
    }

    #[tokio::test]
    async fn test_existing_transport_is_tolerated() {
        let (executor, exposer) = setup();
        executor.fail_when(
            "nvmf_create_transport",
            1,
            "Transport type 'TCP' already exists",
        );

        let exposure = exposer
            .expose(&VolumeRef::new(Backend::Spdk, "pool0", "lvol0"), listen())
            .await
            .unwrap();

        assert!(exposure.report.is_success());
        assert!(exposure.report.steps[0].tolerated);
        assert_eq!(executor.commands().len(), 4);
    }

    #[tokio::test]
    async fn test_failure_stops_sequence() {
        let (executor, exposer) = setup();
        executor.fail_when("nvmf_subsystem_add_ns", 2, "bdev not found");

        let exposure = exposer
            .expose(&VolumeRef::new(Backend::Spdk, "pool0", "lvol0"), listen())
            .await
            .unwrap();

        assert_eq!(exposure.report.state, ReportState::Failed);
        assert_eq!(executor.commands().len(), 3);
        assert!(exposure.report.ensure_success().is_err());
    }

    #[tokio::test]
    async fn test_transport_failure_stops_sequence() {
        let (executor, exposer) = setup();
        executor.fail_when("nvmf_create_transport", 1, "no such method");

        let exposure = exposer
            .expose(&VolumeRef::new(Backend::Spdk, "pool0", "lvol0"), listen())
            .await
            .unwrap();

        assert_eq!(exposure.report.state, ReportState::Failed);
        assert_eq!(executor.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_withdraw() {
        let (executor, exposer) = setup();
        let report = exposer
            .withdraw(&VolumeRef::new(Backend::Spdk, "pool0", "lvol0"))
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(
            executor.commands(),
            vec![format!(
                "{RPC} nvmf_delete_subsystem nqn.2022-06.autobench.spdk:pool0.lvol0"
            )]
        );
    }
}

//! Provisioner
//!
//! Front door for the CLI: runs one backend operation, publishes the
//! matching event and escalates a failed step into an error.

use std::sync::Arc;

use tracing::{error, info};

use crate::domain::events::ProvisionEvent;
use crate::domain::ports::{
    Backend, EventPublisher, Exposure, ListenAddress, Nqn, StackSpec, VolumeBackend, VolumeRef,
};
use crate::domain::report::ProvisionReport;
use crate::error::Result;

#[derive(Clone)]
pub struct Provisioner {
    backend: Arc<dyn VolumeBackend>,
    events: Arc<dyn EventPublisher>,
}

impl Provisioner {
    pub fn new(backend: Arc<dyn VolumeBackend>, events: Arc<dyn EventPublisher>) -> Self {
        Self { backend, events }
    }

    pub fn kind(&self) -> Backend {
        self.backend.kind()
    }

    pub async fn create_stack(&self, spec: &StackSpec) -> Result<ProvisionReport> {
        let report = self.backend.create_stack(spec).await?;
        let report = self.settle(report).await?;
        self.events.publish(ProvisionEvent::stack_created(spec)).await?;
        Ok(report)
    }

    pub async fn remove_stack(&self, spec: &StackSpec) -> Result<ProvisionReport> {
        let report = self.backend.remove_stack(spec).await?;
        let report = self.settle(report).await?;
        self.events.publish(ProvisionEvent::stack_removed(spec)).await?;
        Ok(report)
    }

    pub async fn expose(&self, volume: &VolumeRef, listen: ListenAddress) -> Result<Exposure> {
        let mut exposure = self.backend.expose(volume, listen).await?;
        exposure.report = self.settle(exposure.report).await?;
        self.events
            .publish(ProvisionEvent::volume_exposed(
                volume.backend,
                &exposure.nqn,
                exposure.port_id,
                listen,
            ))
            .await?;
        Ok(exposure)
    }

    pub async fn withdraw(&self, volume: &VolumeRef) -> Result<ProvisionReport> {
        let report = self.backend.withdraw(volume).await?;
        let report = self.settle(report).await?;
        self.events
            .publish(ProvisionEvent::volume_withdrawn(volume.backend, &report_nqn(&report)))
            .await?;
        Ok(report)
    }

    /// Publish `StepFailed` for a failed report, then escalate it.
    async fn settle(&self, report: ProvisionReport) -> Result<ProvisionReport> {
        if let Some(output) = report.failed_step().and_then(|s| s.output.as_ref()) {
            error!(
                operation = %report.operation,
                command = %output.command,
                exit_code = output.exit_code,
                "Provisioning step failed; earlier steps were left in place"
            );
            self.events
                .publish(ProvisionEvent::step_failed(
                    report.operation.clone(),
                    output.command.clone(),
                    output.exit_code,
                ))
                .await?;
        } else {
            info!(
                operation = %report.operation,
                target = %report.target,
                steps = report.steps.len(),
                "Operation completed"
            );
        }
        report.ensure_success()
    }
}

/// Exposure reports are keyed by NQN.
fn report_nqn(report: &ProvisionReport) -> Nqn {
    Nqn(report.target.clone())
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("backend", &self.backend.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryEventCollector, InMemoryNvmetStore, RecordingExecutor};
    use crate::backend::build_backend;
    use crate::config::AutobenchConfig;
    use crate::error::Error;
    use assert_matches::assert_matches;
    use std::net::Ipv4Addr;

    fn setup(kind: Backend) -> (Arc<RecordingExecutor>, Arc<InMemoryEventCollector>, Provisioner) {
        let executor = Arc::new(RecordingExecutor::new());
        let events = Arc::new(InMemoryEventCollector::new());
        let backend = build_backend(
            kind,
            &AutobenchConfig::default(),
            executor.clone(),
            Arc::new(InMemoryNvmetStore::new()),
        );
        (executor, events.clone(), Provisioner::new(backend, events))
    }

    #[tokio::test]
    async fn test_create_publishes_event() {
        let (_, events, provisioner) = setup(Backend::Lvm);
        provisioner
            .create_stack(&StackSpec::lvm("lv0", "vg0", "/dev/loop0", "1G"))
            .await
            .unwrap();

        assert_eq!(events.events_of_type("StackCreated").len(), 1);
        assert!(events.events_of_type("StepFailed").is_empty());
    }

    #[tokio::test]
    async fn test_failed_step_escalates_and_publishes() {
        let (executor, events, provisioner) = setup(Backend::Lvm);
        executor.fail_when("pvcreate", 5, "Can't open /dev/loop0 exclusively.");

        assert_matches!(
            provisioner
                .create_stack(&StackSpec::lvm("lv0", "vg0", "/dev/loop0", "1G"))
                .await,
            Err(Error::ExternalCommandNonZeroExit { exit_code: 5, .. })
        );
        assert_eq!(events.events_of_type("StepFailed").len(), 1);
        assert!(events.events_of_type("StackCreated").is_empty());
    }

    #[tokio::test]
    async fn test_expose_and_withdraw_events() {
        let (_, events, provisioner) = setup(Backend::Lvm);
        let volume = VolumeRef::new(Backend::Lvm, "vg0", "lv0");
        let listen = ListenAddress::new(Ipv4Addr::new(10, 0, 0, 5), 4420);

        provisioner.expose(&volume, listen).await.unwrap();
        provisioner.withdraw(&volume).await.unwrap();

        let exposed = events.events_of_type("VolumeExposed");
        let withdrawn = events.events_of_type("VolumeWithdrawn");
        assert_eq!(exposed[0].nqn(), Some("nqn.2022-06.autobench.vg0.lv0"));
        assert_eq!(withdrawn[0].nqn(), Some("nqn.2022-06.autobench.vg0.lv0"));
    }
}

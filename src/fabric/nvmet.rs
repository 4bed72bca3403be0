//! Kernel NVMe Target Orchestrator
//!
//! Builds the nvmet tree that exposes a block device over NVMe-oF/TCP:
//!
//! ```text
//! subsystems/<nqn>/                    attr_allow_any_host = 1
//! subsystems/<nqn>/namespaces/1/       device_path, enable = 1
//! ports/<id>/                          addr_traddr, addr_trtype = tcp,
//!                                      addr_trsvcid, addr_adrfam = ipv4
//! ports/<id>/subsystems/<nqn>  ->  subsystems/<nqn>
//! ```
//!
//! Steps run strictly in that order. A failure leaves the earlier steps in
//! place.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use super::allocator::PortAllocator;
use super::nqn::volume_nqn;
use crate::domain::ports::{
    AttributePath, Exposure, ListenAddress, Nqn, NvmetStore, PortId, VolumeRef,
};
use crate::domain::report::ProvisionReport;
use crate::error::{Error, Result};

/// Every subsystem exposes exactly one namespace.
pub const NAMESPACE_ID: u32 = 1;

/// Drives an [`NvmetStore`] to expose and withdraw volumes.
#[derive(Clone)]
pub struct NvmetExposer {
    store: Arc<dyn NvmetStore>,
    allocator: PortAllocator,
    nqn_prefix: String,
}

impl NvmetExposer {
    pub fn new(
        store: Arc<dyn NvmetStore>,
        allocator: PortAllocator,
        nqn_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            allocator,
            nqn_prefix: nqn_prefix.into(),
        }
    }

    pub fn nqn_for(&self, volume: &VolumeRef) -> Result<Nqn> {
        volume_nqn(&self.nqn_prefix, volume)
    }

    /// Expose `volume` at `listen` and return the NQN it is reachable under.
    #[instrument(skip(self), fields(volume = %volume, listen = %listen))]
    pub async fn expose(&self, volume: &VolumeRef, listen: ListenAddress) -> Result<Exposure> {
        let nqn = self.nqn_for(volume)?;
        let mut report = ProvisionReport::new("expose", nqn.as_str());

        self.store.create_subsystem(&nqn).await?;
        report.record_action(format!("mkdir subsystems/{}", nqn));

        self.write(&mut report, AttributePath::subsystem(&nqn, "attr_allow_any_host"), "1")
            .await?;

        self.store.create_namespace(&nqn, NAMESPACE_ID).await?;
        report.record_action(format!("mkdir subsystems/{}/namespaces/{}", nqn, NAMESPACE_ID));

        self.write(
            &mut report,
            AttributePath::namespace(&nqn, NAMESPACE_ID, "device_path"),
            &volume.device_path(),
        )
        .await?;
        self.write(
            &mut report,
            AttributePath::namespace(&nqn, NAMESPACE_ID, "enable"),
            "1",
        )
        .await?;

        let port_id = self.allocator.claim(self.store.as_ref()).await?;
        report.record_action(format!("mkdir ports/{}", port_id));

        let service_port = listen.service_port.to_string();
        let ip = listen.ip.to_string();
        for (attr, value) in [
            ("addr_traddr", ip.as_str()),
            ("addr_trtype", "tcp"),
            ("addr_trsvcid", service_port.as_str()),
            ("addr_adrfam", "ipv4"),
        ] {
            self.write(&mut report, AttributePath::port(port_id, attr), value)
                .await?;
        }

        self.store.link_port_to_subsystem(port_id, &nqn).await?;
        report.record_action(format!("ln -s subsystems/{} ports/{}/subsystems/{}", nqn, port_id, nqn));

        info!(nqn = %nqn, port_id = port_id.get(), "Volume exposed over NVMe-oF/TCP");

        Ok(Exposure {
            nqn,
            port_id: Some(port_id),
            listen,
            report: report.complete(),
        })
    }

    /// Tear down an exposure made by [`NvmetExposer::expose`].
    ///
    /// Ports left advertising nothing are removed as well.
    #[instrument(skip(self), fields(volume = %volume))]
    pub async fn withdraw(&self, volume: &VolumeRef) -> Result<ProvisionReport> {
        let nqn = self.nqn_for(volume)?;
        let mut report = ProvisionReport::new("withdraw", nqn.as_str());

        let ports = self.ports_advertising(&nqn).await?;
        for port_id in &ports {
            self.store.unlink_port_from_subsystem(*port_id, &nqn).await?;
            report.record_action(format!("rm ports/{}/subsystems/{}", port_id, nqn));
        }

        // An expose that failed before the namespace step leaves a bare subsystem.
        match self
            .write(
                &mut report,
                AttributePath::namespace(&nqn, NAMESPACE_ID, "enable"),
                "0",
            )
            .await
        {
            Ok(()) => {
                self.store.remove_namespace(&nqn, NAMESPACE_ID).await?;
                report.record_action(format!(
                    "rmdir subsystems/{}/namespaces/{}",
                    nqn, NAMESPACE_ID
                ));
            }
            Err(Error::NotFound(path)) => {
                debug!(nqn = %nqn, %path, "No namespace to disable");
            }
            Err(e) => return Err(e),
        }

        self.store.remove_subsystem(&nqn).await?;
        report.record_action(format!("rmdir subsystems/{}", nqn));

        for port_id in ports {
            if self.store.port_links(port_id).await?.is_empty() {
                self.store.remove_port(port_id).await?;
                report.record_action(format!("rmdir ports/{}", port_id));
            }
        }

        info!(nqn = %nqn, "Volume withdrawn");
        Ok(report.complete())
    }

    async fn ports_advertising(&self, nqn: &Nqn) -> Result<Vec<PortId>> {
        let mut ports = Vec::new();
        for port_id in self.store.list_port_ids().await? {
            if self.store.port_links(port_id).await?.contains(nqn) {
                ports.push(port_id);
            }
        }
        Ok(ports)
    }

    async fn write(
        &self,
        report: &mut ProvisionReport,
        path: AttributePath,
        value: &str,
    ) -> Result<()> {
        self.store.write_attribute(&path, value).await?;
        report.record_action(format!("echo {} > {}", value, path));
        Ok(())
    }
}

impl std::fmt::Debug for NvmetExposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NvmetExposer")
            .field("allocator", &self.allocator)
            .field("nqn_prefix", &self.nqn_prefix)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryNvmetStore;
    use crate::config::DEFAULT_NQN_PREFIX;
    use crate::domain::ports::Backend;
    use assert_matches::assert_matches;
    use std::net::Ipv4Addr;

    fn setup() -> (Arc<InMemoryNvmetStore>, NvmetExposer) {
        let store = Arc::new(InMemoryNvmetStore::new());
        let exposer = NvmetExposer::new(store.clone(), PortAllocator::default(), DEFAULT_NQN_PREFIX);
        (store, exposer)
    }

    fn listen() -> ListenAddress {
        ListenAddress::new(Ipv4Addr::new(10, 0, 0, 5), 4420)
    }

    #[tokio::test]
    async fn test_expose_builds_tree() {
        let (store, exposer) = setup();
        let volume = VolumeRef::new(Backend::Lvm, "vg0", "lv0");

        let exposure = exposer.expose(&volume, listen()).await.unwrap();
        let nqn = exposure.nqn.clone();

        assert_eq!(nqn.as_str(), "nqn.2022-06.autobench.vg0.lv0");
        assert_eq!(exposure.port_id, Some(PortId(1)));
        assert!(exposure.report.is_success());

        assert_eq!(
            store.attribute(&AttributePath::subsystem(&nqn, "attr_allow_any_host")).as_deref(),
            Some("1")
        );
        assert_eq!(
            store.attribute(&AttributePath::namespace(&nqn, 1, "device_path")).as_deref(),
            Some("/dev/vg0/lv0")
        );
        assert_eq!(
            store.attribute(&AttributePath::namespace(&nqn, 1, "enable")).as_deref(),
            Some("1")
        );
        for (attr, value) in [
            ("addr_traddr", "10.0.0.5"),
            ("addr_trtype", "tcp"),
            ("addr_trsvcid", "4420"),
            ("addr_adrfam", "ipv4"),
        ] {
            assert_eq!(
                store.attribute(&AttributePath::port(PortId(1), attr)).as_deref(),
                Some(value)
            );
        }
        assert_eq!(store.link_count(), 1);
        assert_eq!(
            store.link_target(PortId(1), &nqn).as_deref(),
            Some("subsystems/nqn.2022-06.autobench.vg0.lv0")
        );
    }

    #[tokio::test]
    async fn test_expose_twice_fails() {
        let (store, exposer) = setup();
        let volume = VolumeRef::new(Backend::Lvm, "vg0", "lv0");

        exposer.expose(&volume, listen()).await.unwrap();
        assert_matches!(
            exposer.expose(&volume, listen()).await,
            Err(Error::SubsystemAlreadyExists { nqn }) if nqn == "nqn.2022-06.autobench.vg0.lv0"
        );
        assert_eq!(store.list_port_ids().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_second_volume_gets_next_port() {
        let (_, exposer) = setup();

        let a = exposer
            .expose(&VolumeRef::new(Backend::Lvm, "vg0", "lv0"), listen())
            .await
            .unwrap();
        let b = exposer
            .expose(&VolumeRef::new(Backend::Lvm, "vg0", "lv1"), listen())
            .await
            .unwrap();

        assert_eq!(a.port_id, Some(PortId(1)));
        assert_eq!(b.port_id, Some(PortId(2)));
    }

    #[tokio::test]
    async fn test_invalid_name_touches_nothing() {
        let (store, exposer) = setup();
        let volume = VolumeRef::new(Backend::Lvm, "vg0", "../lv0");

        assert_matches!(exposer.expose(&volume, listen()).await, Err(Error::InvalidName(_)));
        assert!(store.list_port_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_withdraw_removes_everything() {
        let (store, exposer) = setup();
        let volume = VolumeRef::new(Backend::Lvm, "vg0", "lv0");

        let exposure = exposer.expose(&volume, listen()).await.unwrap();
        let report = exposer.withdraw(&volume).await.unwrap();

        assert!(report.is_success());
        assert!(!store.has_subsystem(&exposure.nqn));
        assert!(!store.has_port(PortId(1)));
        assert_eq!(store.link_count(), 0);
    }

    #[tokio::test]
    async fn test_withdraw_keeps_shared_port() {
        let (store, exposer) = setup();
        let a = VolumeRef::new(Backend::Lvm, "vg0", "lv0");
        let b = VolumeRef::new(Backend::Lvm, "vg0", "lv1");

        exposer.expose(&a, listen()).await.unwrap();
        let nqn_b = exposer.nqn_for(&b).unwrap();
        store.create_subsystem(&nqn_b).await.unwrap();
        store.create_namespace(&nqn_b, 1).await.unwrap();
        store.link_port_to_subsystem(PortId(1), &nqn_b).await.unwrap();

        exposer.withdraw(&a).await.unwrap();
        assert!(store.has_port(PortId(1)));
        assert_eq!(store.link_count(), 1);
    }

    #[tokio::test]
    async fn test_withdraw_cleans_up_bare_subsystem() {
        let (store, exposer) = setup();
        let volume = VolumeRef::new(Backend::Lvm, "vg0", "lv0");
        let nqn = exposer.nqn_for(&volume).unwrap();
        store.create_subsystem(&nqn).await.unwrap();

        let report = exposer.withdraw(&volume).await.unwrap();
        assert!(report.is_success());
        assert!(!store.has_subsystem(&nqn));

        let exposure = exposer.expose(&volume, listen()).await.unwrap();
        assert_eq!(exposure.port_id, Some(PortId(1)));
    }

    #[tokio::test]
    async fn test_withdraw_unknown_volume() {
        let (_, exposer) = setup();
        let volume = VolumeRef::new(Backend::Lvm, "vg0", "missing");

        assert_matches!(exposer.withdraw(&volume).await, Err(Error::NotFound(_)));
    }
}

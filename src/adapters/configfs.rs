//! Configfs Store Adapter
//!
//! Implements the `NvmetStore` port on top of the kernel NVMe target tree
//! mounted at `/sys/kernel/config/nvmet`.
//!
//! ```text
//! <root>/
//! ├── subsystems/<nqn>/attr_allow_any_host
//! │                   └── namespaces/1/{device_path,enable}
//! └── ports/<id>/{addr_traddr,addr_trtype,addr_trsvcid,addr_adrfam}
//!               └── subsystems/<nqn> -> <root>/subsystems/<nqn>
//! ```
//!
//! configfs populates `namespaces/` and `ports/<id>/subsystems/` on its own.
//! Missing parents are still created so the adapter also works on an
//! ordinary directory.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, instrument, warn};

use crate::domain::ports::{AttributePath, Nqn, NvmetStore, PortId};
use crate::error::{Error, Result};

/// Filesystem-backed NVMe target tree.
#[derive(Debug, Clone)]
pub struct ConfigfsStore {
    root: PathBuf,
}

impl ConfigfsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn subsystem_dir(&self, nqn: &Nqn) -> PathBuf {
        self.root.join("subsystems").join(nqn.as_str())
    }

    fn namespace_dir(&self, nqn: &Nqn, nsid: u32) -> PathBuf {
        self.subsystem_dir(nqn)
            .join("namespaces")
            .join(nsid.to_string())
    }

    fn ports_dir(&self) -> PathBuf {
        self.root.join("ports")
    }

    fn port_dir(&self, port_id: PortId) -> PathBuf {
        self.ports_dir().join(port_id.to_string())
    }

    fn port_link(&self, port_id: PortId, nqn: &Nqn) -> PathBuf {
        self.port_dir(port_id).join("subsystems").join(nqn.as_str())
    }

    /// `mkdir` that fails if the directory is already there.
    async fn mkdir_exclusive(path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::create_dir(path).await
    }
}

#[async_trait]
impl NvmetStore for ConfigfsStore {
    async fn list_port_ids(&self) -> Result<BTreeSet<PortId>> {
        let mut ids = BTreeSet::new();
        let mut entries = match fs::read_dir(self.ports_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            match name.to_str().and_then(|n| n.parse::<u32>().ok()) {
                Some(id) => {
                    ids.insert(PortId(id));
                }
                None => warn!(entry = ?name, "Ignoring non-numeric port directory"),
            }
        }

        Ok(ids)
    }

    #[instrument(skip(self))]
    async fn create_subsystem(&self, nqn: &Nqn) -> Result<()> {
        match Self::mkdir_exclusive(&self.subsystem_dir(nqn)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(Error::SubsystemAlreadyExists {
                nqn: nqn.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    async fn create_namespace(&self, nqn: &Nqn, nsid: u32) -> Result<()> {
        if !fs::try_exists(self.subsystem_dir(nqn)).await? {
            return Err(Error::NotFound(format!("subsystem {}", nqn)));
        }
        Self::mkdir_exclusive(&self.namespace_dir(nqn, nsid)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn create_port(&self, port_id: PortId) -> Result<()> {
        match Self::mkdir_exclusive(&self.port_dir(port_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(Error::PortAlreadyExists {
                port_id: port_id.get(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    async fn link_port_to_subsystem(&self, port_id: PortId, nqn: &Nqn) -> Result<()> {
        let target = self.subsystem_dir(nqn);
        let link = self.port_link(port_id, nqn);
        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::symlink(&target, &link).await?;
        debug!(link = %link.display(), target = %target.display(), "Linked port to subsystem");
        Ok(())
    }

    async fn write_attribute(&self, path: &AttributePath, value: &str) -> Result<()> {
        let file = self.root.join(path.as_str());
        fs::write(&file, value).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::NotFound(path.to_string())
            } else {
                Error::Io(e)
            }
        })
    }

    async fn read_attribute(&self, path: &AttributePath) -> Result<String> {
        let file = self.root.join(path.as_str());
        match fs::read_to_string(&file).await {
            Ok(value) => Ok(value.trim().to_string()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::NotFound(path.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn port_links(&self, port_id: PortId) -> Result<BTreeSet<Nqn>> {
        let mut links = BTreeSet::new();
        let dir = self.port_dir(port_id).join("subsystems");
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(links),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                links.insert(Nqn(name.to_string()));
            }
        }
        Ok(links)
    }

    #[instrument(skip(self))]
    async fn unlink_port_from_subsystem(&self, port_id: PortId, nqn: &Nqn) -> Result<()> {
        fs::remove_file(self.port_link(port_id, nqn)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_namespace(&self, nqn: &Nqn, nsid: u32) -> Result<()> {
        fs::remove_dir(self.namespace_dir(nqn, nsid)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_subsystem(&self, nqn: &Nqn) -> Result<()> {
        fs::remove_dir(self.subsystem_dir(nqn)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_port(&self, port_id: PortId) -> Result<()> {
        fs::remove_dir(self.port_dir(port_id)).await?;
        Ok(())
    }
}

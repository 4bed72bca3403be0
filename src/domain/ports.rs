//! Domain Ports (Port/Adapter Pattern)
//!
//! This module defines the value objects shared across the provisioning
//! engine and the traits (ports) that infrastructure adapters implement.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                           │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                   │    │
//! │  │ CommandExecutor │ NvmetStore │ VolumeBackend │ ...  │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                      │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                   │    │
//! │  │ ProcessExecutor │ ConfigfsStore │ InMemoryNvmetStore│    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::events::ProvisionEvent;
use super::report::ProvisionReport;
use crate::error::Result;

// =============================================================================
// Value Objects
// =============================================================================

/// Volume backend flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Lvm,
    Spdk,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Lvm => write!(f, "lvm"),
            Backend::Spdk => write!(f, "spdk"),
        }
    }
}

/// Request to build or tear down one storage stack.
///
/// For LVM, `group` is the volume group; for SPDK it is the lvol store
/// (pool). It only lives for the duration of a single call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackSpec {
    pub name: String,
    pub backend: Backend,
    pub group: String,
    pub disk: String,
    pub size: String,
}

impl StackSpec {
    pub fn lvm(
        name: impl Into<String>,
        volume_group: impl Into<String>,
        disk: impl Into<String>,
        size: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            backend: Backend::Lvm,
            group: volume_group.into(),
            disk: disk.into(),
            size: size.into(),
        }
    }

    /// LVM teardown addresses the whole volume group, so no LV name or size
    /// is needed.
    pub fn lvm_group(volume_group: impl Into<String>, disk: impl Into<String>) -> Self {
        Self::lvm("", volume_group, disk, "")
    }

    pub fn spdk(
        lvol: impl Into<String>,
        pool: impl Into<String>,
        disk: impl Into<String>,
        size: impl Into<String>,
    ) -> Self {
        Self {
            name: lvol.into(),
            backend: Backend::Spdk,
            group: pool.into(),
            disk: disk.into(),
            size: size.into(),
        }
    }

    /// The volume this stack produces.
    pub fn volume(&self) -> VolumeRef {
        VolumeRef {
            backend: self.backend,
            group: self.group.clone(),
            name: self.name.clone(),
        }
    }
}

/// Reference to a provisioned volume.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct VolumeRef {
    pub backend: Backend,
    pub group: String,
    pub name: String,
}

impl VolumeRef {
    pub fn new(backend: Backend, group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            backend,
            group: group.into(),
            name: name.into(),
        }
    }

    /// Kernel block device path of an LVM logical volume.
    pub fn device_path(&self) -> String {
        format!("/dev/{}/{}", self.group, self.name)
    }

    /// `<pool>/<lvol>` alias understood by SPDK.
    pub fn bdev_alias(&self) -> String {
        format!("{}/{}", self.group, self.name)
    }
}

impl fmt::Display for VolumeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.backend, self.group, self.name)
    }
}

/// NVMe Qualified Name of a subsystem.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Nqn(pub String);

impl Nqn {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nqn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an NVMe target port directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortId(pub u32);

impl PortId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// TCP listener a subsystem is advertised on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ListenAddress {
    pub ip: Ipv4Addr,
    pub service_port: u16,
}

impl ListenAddress {
    pub fn new(ip: Ipv4Addr, service_port: u16) -> Self {
        Self { ip, service_port }
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.service_port)
    }
}

/// Result of exposing a volume over NVMe-oF.
#[derive(Debug, Clone, Serialize)]
pub struct Exposure {
    pub nqn: Nqn,
    /// Allocated kernel target port; SPDK manages its own listeners.
    pub port_id: Option<PortId>,
    pub listen: ListenAddress,
    pub report: ProvisionReport,
}

// =============================================================================
// Command Execution Port
// =============================================================================

/// An external command to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Run through `sh -c` instead of exec'ing the program directly.
    pub use_shell: bool,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            use_shell: false,
        }
    }

    pub fn shell(script: impl Into<String>) -> Self {
        Self {
            program: script.into(),
            args: Vec::new(),
            use_shell: true,
        }
    }

    /// Human readable command line.
    pub fn render(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Captured outcome of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub command: String,
    /// Exit status; `-1` when the process was killed by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Port for running external commands.
///
/// Implementations must not fail on a non-zero exit; only an inability to
/// launch the process is an error.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &CommandSpec) -> Result<CommandOutput>;
}

// =============================================================================
// NVMe Target Tree Port
// =============================================================================

/// Path of an attribute file, relative to the nvmet root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AttributePath(String);

impl AttributePath {
    pub fn subsystem(nqn: &Nqn, attr: &str) -> Self {
        Self(format!("subsystems/{}/{}", nqn, attr))
    }

    pub fn namespace(nqn: &Nqn, nsid: u32, attr: &str) -> Self {
        Self(format!("subsystems/{}/namespaces/{}/{}", nqn, nsid, attr))
    }

    pub fn port(port_id: PortId, attr: &str) -> Self {
        Self(format!("ports/{}/{}", port_id, attr))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory holding the attribute.
    pub fn parent(&self) -> &str {
        self.0.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capability interface over the NVMe target configuration tree.
///
/// The tree is external shared state: every read must reflect its current
/// contents, never an in-process cache.
#[async_trait]
pub trait NvmetStore: Send + Sync {
    /// Ids of every port directory currently present.
    async fn list_port_ids(&self) -> Result<BTreeSet<PortId>>;

    /// Create the subsystem directory; fails with `SubsystemAlreadyExists`.
    async fn create_subsystem(&self, nqn: &Nqn) -> Result<()>;

    /// Create a namespace directory under an existing subsystem.
    async fn create_namespace(&self, nqn: &Nqn, nsid: u32) -> Result<()>;

    /// Create a port directory; fails with `PortAlreadyExists`.
    async fn create_port(&self, port_id: PortId) -> Result<()>;

    /// Symlink the subsystem into the port's advertised set.
    async fn link_port_to_subsystem(&self, port_id: PortId, nqn: &Nqn) -> Result<()>;

    /// Write a single attribute value.
    async fn write_attribute(&self, path: &AttributePath, value: &str) -> Result<()>;

    /// Read a single attribute value, trimmed.
    async fn read_attribute(&self, path: &AttributePath) -> Result<String>;

    /// Subsystems advertised by a port.
    async fn port_links(&self, port_id: PortId) -> Result<BTreeSet<Nqn>>;

    async fn unlink_port_from_subsystem(&self, port_id: PortId, nqn: &Nqn) -> Result<()>;

    async fn remove_namespace(&self, nqn: &Nqn, nsid: u32) -> Result<()>;

    async fn remove_subsystem(&self, nqn: &Nqn) -> Result<()>;

    async fn remove_port(&self, port_id: PortId) -> Result<()>;
}

// =============================================================================
// Volume Backend Port
// =============================================================================

/// Strategy interface shared by the LVM and SPDK stacks.
///
/// Every operation is fail-forward: a failing step stops the sequence and
/// the steps already applied stay in place.
#[async_trait]
pub trait VolumeBackend: Send + Sync {
    fn kind(&self) -> Backend;

    async fn create_stack(&self, spec: &StackSpec) -> Result<ProvisionReport>;

    async fn remove_stack(&self, spec: &StackSpec) -> Result<ProvisionReport>;

    async fn expose(&self, volume: &VolumeRef, listen: ListenAddress) -> Result<Exposure>;

    /// Undo an exposure made by [`VolumeBackend::expose`].
    async fn withdraw(&self, volume: &VolumeRef) -> Result<ProvisionReport>;
}

// =============================================================================
// Event Publisher Port
// =============================================================================

/// Port for publishing provisioning events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: ProvisionEvent) -> Result<()>;

    async fn publish_all(&self, events: Vec<ProvisionEvent>) -> Result<()> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

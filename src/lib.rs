//! autobench - Storage Performance Benchmarking Tool
//!
//! Provisions block storage (LVM logical volumes or SPDK lvols), exposes it
//! over NVMe-oF/TCP and benchmarks the result with fio.
//!
//! # Architecture
//!
//! ```text
//! CLI ─▶ Provisioner ─▶ VolumeBackend (LVM | SPDK) ─▶ CommandExecutor
//!                              │
//!                              ▼
//!                     Fabric exposure
//!          NvmetExposer (configfs)  │  SpdkExposer (rpc.py)
//!                 │
//!                 ▼
//!           PortAllocator
//! ```
//!
//! Every provisioning sequence is fail-forward: the first failing step stops
//! it and nothing already applied is undone. The returned
//! [`domain::ProvisionReport`] lists what ran.
//!
//! # Modules
//!
//! - [`adapters`] - Infrastructure adapters implementing domain ports
//! - [`backend`] - LVM and SPDK volume drivers
//! - [`bench`] - fio runner and result aggregation
//! - [`config`] - Configuration file and defaults
//! - [`domain`] - Value objects, ports, reports and events
//! - [`error`] - Error types
//! - [`fabric`] - NQN naming, port allocation and NVMe-oF exposure
//! - [`provisioner`] - Event-publishing front door used by the CLI
//! - [`size`] - Capacity string parser

pub mod adapters;
pub mod backend;
pub mod bench;
pub mod config;
pub mod domain;
pub mod error;
pub mod fabric;
pub mod provisioner;
pub mod size;

pub use config::AutobenchConfig;
pub use error::{Error, Result};
pub use provisioner::Provisioner;

//! NVMe-oF Fabric Exposure
//!
//! Turns a provisioned volume into a network-reachable NVMe namespace.
//!
//! - [`nqn`]: deterministic subsystem naming
//! - [`allocator`]: port id assignment against the live target tree
//! - [`nvmet`]: kernel target (configfs) orchestration, used for LVM volumes
//! - [`spdk`]: SPDK nvmf RPC verbs, used for SPDK lvols

pub mod allocator;
pub mod nqn;
pub mod nvmet;
pub mod spdk;

mod proptest;

pub use allocator::{allocate_next_port, PortAllocator};
pub use nqn::volume_nqn;
pub use nvmet::NvmetExposer;
pub use spdk::SpdkExposer;

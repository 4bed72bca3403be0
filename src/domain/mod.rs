//! Domain Layer
//!
//! Value objects, ports, reports and events of the provisioning engine.
//!
//! - **Ports** (`ports.rs`) - Trait abstractions for external dependencies
//! - **Reports** (`report.rs`) - Step-by-step outcome of each operation
//! - **Events** (`events.rs`) - Provisioning events for the audit trail
//!
//! # Usage
//!
//! ```ignore
//! use autobench::domain::{StackSpec, VolumeBackend};
//!
//! async fn provision<B: VolumeBackend>(backend: &B) -> autobench::Result<()> {
//!     let spec = StackSpec::lvm("lv0", "vg0", "/dev/loop0", "1G");
//!     backend.create_stack(&spec).await?.ensure_success()?;
//!     Ok(())
//! }
//! ```

pub mod events;
pub mod ports;
pub mod report;

pub use events::ProvisionEvent;
pub use ports::{
    AttributePath, Backend, CommandExecutor, CommandOutput, CommandSpec, EventPublisher,
    Exposure, ListenAddress, Nqn, NvmetStore, PortId, StackSpec, VolumeBackend, VolumeRef,
};
pub use report::{ProvisionReport, ProvisionStep, ReportState};

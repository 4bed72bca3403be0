//! Infrastructure Adapters
//!
//! Adapter implementations for the domain ports, following the
//! Port/Adapter (Hexagonal) architecture pattern.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                             │
//! │  CommandExecutor │ NvmetStore │ EventPublisher                  │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                      │
//! │  ProcessExecutor │ TimeoutExecutor │ SpdkRpc                    │
//! │  ConfigfsStore │ InMemoryNvmetStore │ RecordingExecutor         │
//! │  LoggingEventPublisher │ InMemoryEventCollector                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod configfs;
mod event_publisher;
mod memory;
mod process;
mod spdk_rpc;

pub use configfs::ConfigfsStore;
pub use event_publisher::{InMemoryEventCollector, LoggingEventPublisher};
pub use memory::{InMemoryNvmetStore, RecordingExecutor};
pub use process::{ProcessExecutor, TimeoutExecutor};
pub use spdk_rpc::SpdkRpc;

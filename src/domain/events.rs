//! Provisioning Events
//!
//! Immutable records of things that happened to a storage stack. They are
//! published after each driver operation and form the operator-facing audit
//! trail of a benchmarking session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ports::{Backend, ListenAddress, Nqn, PortId, StackSpec};

/// Event representing a significant occurrence in a provisioning session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProvisionEvent {
    // =========================================================================
    // Stack Events
    // =========================================================================
    /// A stack was fully created.
    StackCreated {
        backend: Backend,
        group: String,
        name: String,
        disk: String,
        timestamp: DateTime<Utc>,
    },

    /// A stack was removed.
    StackRemoved {
        backend: Backend,
        group: String,
        timestamp: DateTime<Utc>,
    },

    /// A step failed; earlier steps were left in place.
    StepFailed {
        operation: String,
        command: String,
        exit_code: i32,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Fabric Events
    // =========================================================================
    /// A volume became reachable over NVMe-oF.
    VolumeExposed {
        backend: Backend,
        nqn: String,
        port_id: Option<u32>,
        listen: String,
        timestamp: DateTime<Utc>,
    },

    /// An exposure was torn down.
    VolumeWithdrawn {
        backend: Backend,
        nqn: String,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Benchmark Events
    // =========================================================================
    /// A load-generator run finished for one device.
    BenchmarkCompleted {
        device: String,
        read_iops_mean: f64,
        write_iops_mean: f64,
        timestamp: DateTime<Utc>,
    },
}

impl ProvisionEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ProvisionEvent::StackCreated { timestamp, .. } => *timestamp,
            ProvisionEvent::StackRemoved { timestamp, .. } => *timestamp,
            ProvisionEvent::StepFailed { timestamp, .. } => *timestamp,
            ProvisionEvent::VolumeExposed { timestamp, .. } => *timestamp,
            ProvisionEvent::VolumeWithdrawn { timestamp, .. } => *timestamp,
            ProvisionEvent::BenchmarkCompleted { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            ProvisionEvent::StackCreated { .. } => "StackCreated",
            ProvisionEvent::StackRemoved { .. } => "StackRemoved",
            ProvisionEvent::StepFailed { .. } => "StepFailed",
            ProvisionEvent::VolumeExposed { .. } => "VolumeExposed",
            ProvisionEvent::VolumeWithdrawn { .. } => "VolumeWithdrawn",
            ProvisionEvent::BenchmarkCompleted { .. } => "BenchmarkCompleted",
        }
    }

    /// Get the NQN if applicable.
    pub fn nqn(&self) -> Option<&str> {
        match self {
            ProvisionEvent::VolumeExposed { nqn, .. } => Some(nqn),
            ProvisionEvent::VolumeWithdrawn { nqn, .. } => Some(nqn),
            _ => None,
        }
    }
}

// =============================================================================
// Event Constructors
// =============================================================================

impl ProvisionEvent {
    pub fn stack_created(spec: &StackSpec) -> Self {
        ProvisionEvent::StackCreated {
            backend: spec.backend,
            group: spec.group.clone(),
            name: spec.name.clone(),
            disk: spec.disk.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn stack_removed(spec: &StackSpec) -> Self {
        ProvisionEvent::StackRemoved {
            backend: spec.backend,
            group: spec.group.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn step_failed(
        operation: impl Into<String>,
        command: impl Into<String>,
        exit_code: i32,
    ) -> Self {
        ProvisionEvent::StepFailed {
            operation: operation.into(),
            command: command.into(),
            exit_code,
            timestamp: Utc::now(),
        }
    }

    pub fn volume_exposed(
        backend: Backend,
        nqn: &Nqn,
        port_id: Option<PortId>,
        listen: ListenAddress,
    ) -> Self {
        ProvisionEvent::VolumeExposed {
            backend,
            nqn: nqn.to_string(),
            port_id: port_id.map(|p| p.get()),
            listen: listen.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn volume_withdrawn(backend: Backend, nqn: &Nqn) -> Self {
        ProvisionEvent::VolumeWithdrawn {
            backend,
            nqn: nqn.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn benchmark_completed(
        device: impl Into<String>,
        read_iops_mean: f64,
        write_iops_mean: f64,
    ) -> Self {
        ProvisionEvent::BenchmarkCompleted {
            device: device.into(),
            read_iops_mean,
            write_iops_mean,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_event_type_names() {
        let spec = StackSpec::lvm("lv0", "vg0", "/dev/loop0", "1G");
        assert_eq!(ProvisionEvent::stack_created(&spec).event_type(), "StackCreated");
        assert_eq!(ProvisionEvent::stack_removed(&spec).event_type(), "StackRemoved");
        assert_eq!(
            ProvisionEvent::step_failed("create-lvm-stack", "pvcreate /dev/loop0", 5).event_type(),
            "StepFailed"
        );
    }

    #[test]
    fn test_exposed_event_serialization() {
        let nqn = Nqn("nqn.2022-06.autobench.vg0.lv0".into());
        let listen = ListenAddress::new(Ipv4Addr::new(10, 0, 0, 5), 4420);
        let event = ProvisionEvent::volume_exposed(Backend::Lvm, &nqn, Some(PortId(1)), listen);

        assert_eq!(event.nqn(), Some("nqn.2022-06.autobench.vg0.lv0"));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "VolumeExposed");
        assert_eq!(json["backend"], "lvm");
        assert_eq!(json["port_id"], 1);
        assert_eq!(json["listen"], "10.0.0.5:4420");
    }
}

//! Event Publisher Adapters
//!
//! `LoggingEventPublisher` turns each provisioning event into one structured
//! log line with the event's own fields, so a session can be followed with
//! `--log-json` alone. `InMemoryEventCollector` keeps events for assertions.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::events::ProvisionEvent;
use crate::domain::ports::EventPublisher;
use crate::error::Result;

/// Publishes events to the tracing subscriber.
///
/// Failed steps are logged at `warn`, everything else at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventPublisher;

impl LoggingEventPublisher {
    pub fn new() -> Self {
        Self
    }

    fn log(event: &ProvisionEvent) {
        let kind = event.event_type();
        match event {
            ProvisionEvent::StackCreated {
                backend,
                group,
                name,
                disk,
                ..
            } => info!(event = kind, %backend, %group, %name, %disk, "Stack created"),
            ProvisionEvent::StackRemoved { backend, group, .. } => {
                info!(event = kind, %backend, %group, "Stack removed")
            }
            ProvisionEvent::StepFailed {
                operation,
                command,
                exit_code,
                ..
            } => warn!(
                event = kind,
                %operation,
                %command,
                exit_code,
                "Step failed, earlier steps left in place"
            ),
            ProvisionEvent::VolumeExposed {
                backend,
                nqn,
                port_id,
                listen,
                ..
            } => info!(
                event = kind,
                %backend,
                %nqn,
                port_id = ?port_id,
                %listen,
                "Volume exposed"
            ),
            ProvisionEvent::VolumeWithdrawn { backend, nqn, .. } => {
                info!(event = kind, %backend, %nqn, "Volume withdrawn")
            }
            ProvisionEvent::BenchmarkCompleted {
                device,
                read_iops_mean,
                write_iops_mean,
                ..
            } => info!(
                event = kind,
                %device,
                read_iops_mean,
                write_iops_mean,
                "Benchmark completed"
            ),
        }
    }
}

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish(&self, event: ProvisionEvent) -> Result<()> {
        Self::log(&event);
        Ok(())
    }
}

/// In-memory event collector for testing.
#[derive(Debug, Default)]
pub struct InMemoryEventCollector {
    events: parking_lot::RwLock<Vec<ProvisionEvent>>,
}

impl InMemoryEventCollector {
    /// Create a new in-memory event collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected events.
    pub fn events(&self) -> Vec<ProvisionEvent> {
        self.events.read().clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Get events of a specific type.
    pub fn events_of_type(&self, event_type: &str) -> Vec<ProvisionEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventCollector {
    async fn publish(&self, event: ProvisionEvent) -> Result<()> {
        self.events.write().push(event);
        Ok(())
    }

    async fn publish_all(&self, events: Vec<ProvisionEvent>) -> Result<()> {
        self.events.write().extend(events);
        Ok(())
    }
}

//! Provisioning Reports
//!
//! Every driver operation records the steps it executed, in order, together
//! with their captured outcome. A report stops at the first failing step;
//! nothing is rolled back, so the report is also the operator's checklist for
//! manual cleanup.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ports::CommandOutput;
use crate::error::{Error, Result};

/// State of a provisioning operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReportState {
    InProgress,
    Completed,
    Failed,
}

impl std::fmt::Display for ReportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportState::InProgress => write!(f, "InProgress"),
            ReportState::Completed => write!(f, "Completed"),
            ReportState::Failed => write!(f, "Failed"),
        }
    }
}

/// One executed step.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionStep {
    pub description: String,
    /// Captured output for command steps; `None` for target-tree writes.
    pub output: Option<CommandOutput>,
    /// The step failed but the failure was accepted (e.g. "already exists").
    pub tolerated: bool,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ProvisionStep {
    pub fn failed(&self) -> bool {
        !self.tolerated && self.output.as_ref().is_some_and(|o| !o.success())
    }
}

/// Ordered log of a create/remove/expose/withdraw operation.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub operation: String,
    pub target: String,
    pub state: ReportState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<ProvisionStep>,
}

impl ProvisionReport {
    pub fn new(operation: impl Into<String>, target: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            operation: operation.into(),
            target: target.into(),
            state: ReportState::InProgress,
            started_at: now,
            finished_at: now,
            steps: Vec::new(),
        }
    }

    /// Record a command step. Returns whether the sequence may continue.
    pub fn record_command(&mut self, output: CommandOutput) -> bool {
        let ok = output.success();
        let description = output.command.clone();
        self.push(description, Some(output), false);
        if !ok {
            self.state = ReportState::Failed;
        }
        ok
    }

    /// Record a command whose failure is acceptable.
    pub fn record_tolerated(&mut self, output: CommandOutput) {
        let tolerated = !output.success();
        let description = output.command.clone();
        self.push(description, Some(output), tolerated);
    }

    /// Record a target-tree action that succeeded.
    pub fn record_action(&mut self, description: impl Into<String>) {
        self.push(description.into(), None, false);
    }

    /// Mark the operation as finished, unless a step already failed.
    pub fn complete(mut self) -> Self {
        if self.state == ReportState::InProgress {
            self.state = ReportState::Completed;
        }
        self.finished_at = Utc::now();
        self
    }

    pub fn is_success(&self) -> bool {
        self.state == ReportState::Completed
    }

    /// The step that stopped the sequence, if any.
    pub fn failed_step(&self) -> Option<&ProvisionStep> {
        self.steps.iter().find(|s| s.failed())
    }

    /// Commands that ran, rendered, in order.
    pub fn commands(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|s| s.output.as_ref().map(|o| o.command.as_str()))
            .collect()
    }

    /// Escalate a failed step into `ExternalCommandNonZeroExit`.
    pub fn ensure_success(self) -> Result<Self> {
        match self.failed_step().and_then(|s| s.output.as_ref()) {
            Some(output) => Err(Error::ExternalCommandNonZeroExit {
                command: output.command.clone(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            }),
            None => Ok(self),
        }
    }

    fn push(&mut self, description: String, output: Option<CommandOutput>, tolerated: bool) {
        let now = Utc::now();
        let last = self.steps.last().map(|s| s.timestamp).unwrap_or(self.started_at);
        let duration_ms = (now - last).num_milliseconds().max(0) as u64;

        self.steps.push(ProvisionStep {
            description,
            output,
            tolerated,
            timestamp: now,
            duration_ms,
        });
        self.finished_at = now;
    }
}

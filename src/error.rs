//! Error types for Autobench

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while provisioning, exposing or benchmarking a stack
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    // =========================================================================
    // Size Parsing Errors
    // =========================================================================
    /// Size string is not `<digits><unit>`
    #[error("Malformed size '{input}': {reason}")]
    MalformedSize { input: String, reason: String },

    /// Size unit is not one of the supported binary units
    #[error("Unsupported size unit '{unit}' in '{input}' (supported: Gi, Ti)")]
    UnsupportedUnit { input: String, unit: String },

    // =========================================================================
    // Command Execution Errors
    // =========================================================================
    /// The process could not be launched at all
    #[error("Failed to execute '{command}': {source}")]
    ExecutionFailure {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran but exited unsuccessfully
    #[error("Command '{command}' exited with status {exit_code}: {stderr}")]
    ExternalCommandNonZeroExit {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// The process did not finish within the configured deadline
    #[error("Command '{command}' timed out after {timeout_secs}s")]
    CommandTimeout { command: String, timeout_secs: u64 },

    // =========================================================================
    // Fabric Errors
    // =========================================================================
    /// A subsystem with this NQN is already present in the target tree
    #[error("NVMe subsystem already exists: {nqn}")]
    SubsystemAlreadyExists { nqn: String },

    /// Every port id tried was taken by a concurrent writer
    #[error("Port allocation conflict: no free port id after {attempts} attempts starting at {first}")]
    PortAllocationConflict { first: u32, attempts: u32 },

    /// A port directory with this id already exists
    #[error("NVMe target port already exists: {port_id}")]
    PortAlreadyExists { port_id: u32 },

    /// A name that ends up in an NQN or configfs path is unsafe
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Entry missing from the target tree
    #[error("Not found in target tree: {0}")]
    NotFound(String),

    // =========================================================================
    // Benchmark Errors
    // =========================================================================
    /// Load generator output did not match the expected JSON contract
    #[error("Malformed benchmark report: {0}")]
    MalformedReport(String),
}

impl Error {
    /// Returns true if the error describes a duplicate exposure
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Error::SubsystemAlreadyExists { .. } | Error::PortAlreadyExists { .. }
        )
    }
}

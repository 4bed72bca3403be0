//! Configuration
//!
//! Defaults mirror a stock Linux NVMe target and a local SPDK checkout. A
//! YAML file can override any subset of fields; CLI flags are applied on top
//! by the binary.
//!
//! ```yaml
//! nvmet:
//!   root: /sys/kernel/config/nvmet
//! spdk:
//!   rpc_script: /opt/spdk/scripts/rpc.py
//!   transport:
//!     io_unit_size: 16384
//! executor:
//!   command_timeout_secs: 300
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default NQN prefix for every exposed subsystem.
pub const DEFAULT_NQN_PREFIX: &str = "nqn.2022-06.autobench";

/// Default mount point of the kernel NVMe target configfs tree.
pub const DEFAULT_NVMET_ROOT: &str = "/sys/kernel/config/nvmet";

// =============================================================================
// Top-level Configuration
// =============================================================================

/// Complete Autobench configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutobenchConfig {
    pub nvmet: NvmetConfig,
    pub spdk: SpdkConfig,
    pub executor: ExecutorConfig,
    pub fio: FioConfig,
}

impl AutobenchConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&raw)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.nvmet.root.as_os_str().is_empty() {
            return Err(Error::Config("nvmet.root must not be empty".into()));
        }
        if self.nvmet.nqn_prefix.trim().is_empty() {
            return Err(Error::Config("nvmet.nqn_prefix must not be empty".into()));
        }
        if self.nvmet.port_claim_attempts == 0 {
            return Err(Error::Config(
                "nvmet.port_claim_attempts must be at least 1".into(),
            ));
        }
        if self.spdk.rpc_script.as_os_str().is_empty() {
            return Err(Error::Config("spdk.rpc_script must not be empty".into()));
        }
        if self.executor.command_timeout_secs == Some(0) {
            return Err(Error::Config(
                "executor.command_timeout_secs must be positive when set".into(),
            ));
        }
        if self.fio.binary.trim().is_empty() {
            return Err(Error::Config("fio.binary must not be empty".into()));
        }
        Ok(())
    }
}

// =============================================================================
// Kernel NVMe Target
// =============================================================================

/// Kernel NVMe target (configfs) settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NvmetConfig {
    /// Root of the nvmet configfs tree
    pub root: PathBuf,

    /// Prefix of generated NQNs
    pub nqn_prefix: String,

    /// How many consecutive port ids to try before giving up
    pub port_claim_attempts: u32,
}

impl Default for NvmetConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_NVMET_ROOT),
            nqn_prefix: DEFAULT_NQN_PREFIX.to_string(),
            port_claim_attempts: 16,
        }
    }
}

// =============================================================================
// SPDK
// =============================================================================

/// SPDK control-plane settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpdkConfig {
    /// Path to SPDK's `scripts/rpc.py`
    pub rpc_script: PathBuf,

    /// Serial number given to created subsystems
    pub serial_number: String,

    /// Model number (vendor tag) given to created subsystems
    pub model_number: String,

    /// TCP transport parameters
    pub transport: TransportConfig,
}

impl Default for SpdkConfig {
    fn default() -> Self {
        Self {
            rpc_script: PathBuf::from("/usr/local/share/spdk/scripts/rpc.py"),
            serial_number: "SPDK00000000000001".to_string(),
            model_number: "autobench".to_string(),
            transport: TransportConfig::default(),
        }
    }
}

/// `nvmf_create_transport` parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// `-u`: I/O unit size in bytes
    pub io_unit_size: u32,

    /// `-m`: max queue pairs per controller
    pub max_qpairs_per_ctrlr: u32,

    /// `-c`: in-capsule data size in bytes
    pub in_capsule_data_size: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            io_unit_size: 16384,
            max_qpairs_per_ctrlr: 8,
            in_capsule_data_size: 8192,
        }
    }
}

// =============================================================================
// Command Executor
// =============================================================================

/// External command settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Per-command deadline; unset means wait forever
    pub command_timeout_secs: Option<u64>,
}

impl ExecutorConfig {
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

// =============================================================================
// Load Generator
// =============================================================================

/// fio job settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FioConfig {
    pub binary: String,
    /// Runtime in seconds
    pub runtime: String,
    pub block_size: String,
    pub io_pattern: String,
    /// Amount of data per job
    pub size: String,
    pub iodepth: u32,
    pub numjobs: u32,
    pub ioengine: String,
}

impl Default for FioConfig {
    fn default() -> Self {
        Self {
            binary: "fio".to_string(),
            runtime: "20".to_string(),
            block_size: "512".to_string(),
            io_pattern: "randrw".to_string(),
            size: "800MB".to_string(),
            iodepth: 64,
            numjobs: 4,
            ioengine: "libaio".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AutobenchConfig::default();
        config.validate().unwrap();
        assert_eq!(config.nvmet.root, PathBuf::from("/sys/kernel/config/nvmet"));
        assert_eq!(config.nvmet.nqn_prefix, "nqn.2022-06.autobench");
        assert_eq!(config.spdk.transport.io_unit_size, 16384);
        assert_eq!(config.spdk.transport.max_qpairs_per_ctrlr, 8);
        assert_eq!(config.spdk.transport.in_capsule_data_size, 8192);
        assert_eq!(config.executor.command_timeout(), None);
        assert_eq!(config.fio.iodepth, 64);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = AutobenchConfig::from_yaml(
            "spdk:\n  rpc_script: /opt/spdk/scripts/rpc.py\nexecutor:\n  command_timeout_secs: 30\n",
        )
        .unwrap();

        assert_eq!(config.spdk.rpc_script, PathBuf::from("/opt/spdk/scripts/rpc.py"));
        assert_eq!(config.spdk.model_number, "autobench");
        assert_eq!(config.executor.command_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.nvmet, NvmetConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert_matches!(
            AutobenchConfig::from_yaml("nvmet:\n  port_claim_attempts: 0\n"),
            Err(Error::Config(_))
        );
        assert_matches!(
            AutobenchConfig::from_yaml("executor:\n  command_timeout_secs: 0\n"),
            Err(Error::Config(_))
        );
        assert_matches!(
            AutobenchConfig::from_yaml("nvmet: [1, 2"),
            Err(Error::Yaml(_))
        );
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fio:\n  runtime: \"60\"\n  numjobs: 8").unwrap();

        let config = AutobenchConfig::from_file(file.path()).unwrap();
        assert_eq!(config.fio.runtime, "60");
        assert_eq!(config.fio.numjobs, 8);
        assert_eq!(config.fio.block_size, "512");

        assert_matches!(
            AutobenchConfig::from_file("/nonexistent/autobench.yaml"),
            Err(Error::Config(_))
        );
    }
}

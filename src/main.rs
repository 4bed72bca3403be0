//! autobench
//!
//! Storage performance benchmarking tool: builds LVM or SPDK volumes,
//! exposes them over NVMe-oF/TCP and runs fio against block devices.
//!
//! ```text
//! create-*-stack ─▶ expose-*-stack ─▶ (initiator connects) ─▶ run-performance-test
//! unexpose-*-stack ─▶ remove-*-stack
//! ```

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use autobench::adapters::{
    ConfigfsStore, InMemoryNvmetStore, LoggingEventPublisher, ProcessExecutor, RecordingExecutor,
    TimeoutExecutor,
};
use autobench::backend::build_backend;
use autobench::bench::FioRunner;
use autobench::domain::{
    Backend, CommandExecutor, EventPublisher, Exposure, ListenAddress, NvmetStore,
    ProvisionReport, StackSpec, VolumeRef,
};
use autobench::{AutobenchConfig, Provisioner};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Storage Performance Benchmarking Tool
#[derive(Parser, Debug)]
#[command(name = "autobench", author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "AUTOBENCH_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Root of the nvmet configfs tree
    #[arg(long, env = "NVMET_ROOT", global = true)]
    nvmet_root: Option<PathBuf>,

    /// Path to SPDK's scripts/rpc.py
    #[arg(long, env = "SPDK_RPC_SCRIPT", global = true)]
    rpc_script: Option<PathBuf>,

    /// Per-command deadline in seconds
    #[arg(long, env = "COMMAND_TIMEOUT_SECS", global = true)]
    command_timeout_secs: Option<u64>,

    /// Record commands and target-tree changes instead of applying them
    #[arg(long, env = "DRY_RUN", global = true)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create PV, VG and LV on a disk
    CreateLvmStack {
        /// Name of the LVM LV
        #[arg(short, long)]
        name: String,
        /// Name of the LVM VG
        #[arg(short = 'v', long)]
        volume_group: String,
        /// Device path of disk to be used
        #[arg(short, long)]
        disk: String,
        /// Size of the LV, passed to lvcreate as-is
        #[arg(short, long)]
        size: String,
    },

    /// Remove a VG and wipe its PV
    RemoveLvmStack {
        #[arg(short = 'v', long)]
        volume_group: String,
        /// Device path of disk to be wiped
        #[arg(short, long)]
        disk: String,
    },

    /// Expose an LV through the kernel NVMe target
    ExposeLvmStack {
        #[arg(short = 'v', long)]
        volume_group: String,
        #[arg(short = 'n', long)]
        lv_name: String,
        /// Target's IP address
        #[arg(short, long)]
        ip_addr: Ipv4Addr,
        /// Target's service port
        #[arg(short, long, default_value_t = 4420)]
        service_port: u16,
    },

    /// Withdraw an LV from the kernel NVMe target
    UnexposeLvmStack {
        #[arg(short = 'v', long)]
        volume_group: String,
        #[arg(short = 'n', long)]
        lv_name: String,
    },

    /// Create AIO bdev, lvol store and lvol on a disk
    CreateSpdkStack {
        /// Name of the lvol
        #[arg(short = 'n', long)]
        lvol_name: String,
        /// Name of the lvol store
        #[arg(short, long)]
        pool: String,
        #[arg(short, long)]
        disk: String,
        /// Size of the lvol (Gi or Ti)
        #[arg(short, long)]
        size: String,
    },

    /// Delete lvol, lvol store and AIO bdev
    RemoveSpdkStack {
        #[arg(short = 'n', long)]
        lvol_name: String,
        #[arg(short, long)]
        pool: String,
    },

    /// Expose an lvol through the SPDK NVMe-oF target
    ExposeSpdkStack {
        #[arg(short = 'n', long)]
        lvol_name: String,
        #[arg(short, long)]
        pool: String,
        #[arg(short, long)]
        ip_addr: Ipv4Addr,
        #[arg(short, long, default_value_t = 4420)]
        service_port: u16,
    },

    /// Delete the SPDK subsystem of an lvol
    UnexposeSpdkStack {
        #[arg(short = 'n', long)]
        lvol_name: String,
        #[arg(short, long)]
        pool: String,
    },

    /// Run fio against one or more block devices
    RunPerformanceTest {
        /// Device paths to run fio on
        #[arg(short, long = "dev-paths", required = true)]
        dev_paths: Vec<String>,
        /// Runtime in seconds
        #[arg(short, long)]
        runtime: Option<String>,
        #[arg(short, long)]
        block_size: Option<String>,
        /// fio --rw pattern
        #[arg(long)]
        io_pattern: Option<String>,
        /// Amount of data per job
        #[arg(short, long)]
        size: Option<String>,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = load_config(&args)?;
    info!(dry_run = args.dry_run, "Storage Performance Benchmarking Tool");

    let (executor, store) = build_adapters(&args, &config);
    let events: Arc<dyn EventPublisher> = Arc::new(LoggingEventPublisher::new());

    let provisioner = |kind: Backend| {
        Provisioner::new(
            build_backend(kind, &config, executor.clone(), store.clone()),
            events.clone(),
        )
    };

    match args.command {
        Command::CreateLvmStack {
            name,
            volume_group,
            disk,
            size,
        } => {
            let spec = StackSpec::lvm(name, volume_group, disk, size);
            let report = provisioner(Backend::Lvm)
                .create_stack(&spec)
                .await
                .with_context(|| format!("failed to create LVM stack {}", spec.volume()))?;
            print_report(&report);
        }
        Command::RemoveLvmStack { volume_group, disk } => {
            let spec = StackSpec::lvm_group(volume_group, disk);
            let report = provisioner(Backend::Lvm)
                .remove_stack(&spec)
                .await
                .with_context(|| format!("failed to remove volume group {}", spec.group))?;
            print_report(&report);
        }
        Command::ExposeLvmStack {
            volume_group,
            lv_name,
            ip_addr,
            service_port,
        } => {
            let volume = VolumeRef::new(Backend::Lvm, volume_group, lv_name);
            let exposure = provisioner(Backend::Lvm)
                .expose(&volume, ListenAddress::new(ip_addr, service_port))
                .await
                .map_err(|e| expose_error(&volume, e))?;
            print_exposure(&exposure);
        }
        Command::UnexposeLvmStack {
            volume_group,
            lv_name,
        } => {
            let volume = VolumeRef::new(Backend::Lvm, volume_group, lv_name);
            let report = provisioner(Backend::Lvm)
                .withdraw(&volume)
                .await
                .with_context(|| format!("failed to withdraw {}", volume))?;
            print_report(&report);
        }
        Command::CreateSpdkStack {
            lvol_name,
            pool,
            disk,
            size,
        } => {
            let spec = StackSpec::spdk(lvol_name, pool, disk, size);
            let report = provisioner(Backend::Spdk)
                .create_stack(&spec)
                .await
                .with_context(|| format!("failed to create SPDK stack {}", spec.volume()))?;
            print_report(&report);
        }
        Command::RemoveSpdkStack { lvol_name, pool } => {
            let spec = StackSpec::spdk(lvol_name, pool, "", "");
            let report = provisioner(Backend::Spdk)
                .remove_stack(&spec)
                .await
                .with_context(|| format!("failed to remove SPDK stack {}", spec.volume()))?;
            print_report(&report);
        }
        Command::ExposeSpdkStack {
            lvol_name,
            pool,
            ip_addr,
            service_port,
        } => {
            let volume = VolumeRef::new(Backend::Spdk, pool, lvol_name);
            let exposure = provisioner(Backend::Spdk)
                .expose(&volume, ListenAddress::new(ip_addr, service_port))
                .await
                .map_err(|e| expose_error(&volume, e))?;
            print_exposure(&exposure);
        }
        Command::UnexposeSpdkStack { lvol_name, pool } => {
            let volume = VolumeRef::new(Backend::Spdk, pool, lvol_name);
            let report = provisioner(Backend::Spdk)
                .withdraw(&volume)
                .await
                .with_context(|| format!("failed to withdraw {}", volume))?;
            print_report(&report);
        }
        Command::RunPerformanceTest {
            dev_paths,
            runtime,
            block_size,
            io_pattern,
            size,
            output,
        } => {
            let mut fio = config.fio.clone();
            if let Some(runtime) = runtime {
                fio.runtime = runtime;
            }
            if let Some(block_size) = block_size {
                fio.block_size = block_size;
            }
            if let Some(io_pattern) = io_pattern {
                fio.io_pattern = io_pattern;
            }
            if let Some(size) = size {
                fio.size = size;
            }

            let runner = FioRunner::new(executor.clone(), fio);
            if args.dry_run {
                // Nothing would produce fio JSON to aggregate.
                for command in runner.plan(&dev_paths) {
                    println!("{}", command.render());
                }
                return Ok(());
            }
            let results = runner
                .run_all(&dev_paths, events.as_ref())
                .await
                .context("performance test failed")?;

            match output {
                OutputFormat::Json => println!("{}", results.to_json()?),
                OutputFormat::Table => print!("{}", results.render_table()),
            }
        }
    }

    Ok(())
}

// =============================================================================
// Setup
// =============================================================================

fn load_config(args: &Args) -> anyhow::Result<AutobenchConfig> {
    let mut config = match &args.config {
        Some(path) => AutobenchConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => AutobenchConfig::default(),
    };

    if let Some(root) = &args.nvmet_root {
        config.nvmet.root = root.clone();
    }
    if let Some(script) = &args.rpc_script {
        config.spdk.rpc_script = script.clone();
    }
    if let Some(secs) = args.command_timeout_secs {
        config.executor.command_timeout_secs = Some(secs);
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn build_adapters(
    args: &Args,
    config: &AutobenchConfig,
) -> (Arc<dyn CommandExecutor>, Arc<dyn NvmetStore>) {
    if args.dry_run {
        return (
            Arc::new(RecordingExecutor::new()),
            Arc::new(InMemoryNvmetStore::new()),
        );
    }

    let executor: Arc<dyn CommandExecutor> = match config.executor.command_timeout() {
        Some(timeout) => Arc::new(TimeoutExecutor::new(ProcessExecutor::new(), timeout)),
        None => Arc::new(ProcessExecutor::new()),
    };
    (executor, Arc::new(ConfigfsStore::new(config.nvmet.root.clone())))
}

fn expose_error(volume: &VolumeRef, err: autobench::Error) -> anyhow::Error {
    let hint = if err.is_already_exists() {
        format!(" (run unexpose-{}-stack first)", volume.backend)
    } else {
        String::new()
    };
    anyhow::Error::new(err).context(format!("failed to expose {}{}", volume, hint))
}

// =============================================================================
// Output
// =============================================================================

fn print_report(report: &ProvisionReport) {
    for step in &report.steps {
        match &step.output {
            Some(output) if !output.stdout.trim().is_empty() => {
                println!("{}\n{}", step.description, output.stdout.trim_end())
            }
            _ => println!("{}", step.description),
        }
    }
}

fn print_exposure(exposure: &Exposure) {
    print_report(&exposure.report);
    if let Some(port_id) = exposure.port_id {
        println!("Port: {}", port_id);
    }
    println!("NQN: {}", exposure.nqn);
}

// =============================================================================
// Logging
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

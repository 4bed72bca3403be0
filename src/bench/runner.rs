//! Performance Test Runner
//!
//! Runs one fio job per device, sequentially, and feeds the parsed results
//! into a [`ResultAggregator`].

use std::sync::Arc;

use tracing::{info, instrument};

use super::aggregator::ResultAggregator;
use super::fio::BenchmarkResult;
use crate::config::FioConfig;
use crate::domain::events::ProvisionEvent;
use crate::domain::ports::{CommandExecutor, CommandSpec, EventPublisher};
use crate::error::{Error, Result};

pub const JOB_NAME: &str = "iops-test-job";

/// Drives fio through a [`CommandExecutor`].
#[derive(Clone)]
pub struct FioRunner {
    executor: Arc<dyn CommandExecutor>,
    config: FioConfig,
}

impl FioRunner {
    pub fn new(executor: Arc<dyn CommandExecutor>, config: FioConfig) -> Self {
        Self { executor, config }
    }

    /// fio invocation for one device.
    pub fn command(&self, device: &str) -> CommandSpec {
        let c = &self.config;
        CommandSpec::new(
            c.binary.as_str(),
            [
                format!("--filename={}", device),
                format!("--size={}", c.size),
                "--direct=1".to_string(),
                format!("--rw={}", c.io_pattern),
                format!("--bs={}", c.block_size),
                format!("--ioengine={}", c.ioengine),
                format!("--iodepth={}", c.iodepth),
                format!("--runtime={}", c.runtime),
                format!("--numjobs={}", c.numjobs),
                "--time_based".to_string(),
                "--group_reporting".to_string(),
                format!("--name={}", JOB_NAME),
                "--eta-newline=1".to_string(),
                "--output-format=json".to_string(),
            ],
        )
    }

    /// Invocations `run_all` would make, without running them.
    pub fn plan(&self, devices: &[String]) -> Vec<CommandSpec> {
        devices.iter().map(|d| self.command(d)).collect()
    }

    /// Benchmark a single device.
    #[instrument(skip(self))]
    pub async fn run(&self, device: &str) -> Result<BenchmarkResult> {
        let output = self.executor.execute(&self.command(device)).await?;
        if !output.success() {
            return Err(Error::ExternalCommandNonZeroExit {
                command: output.command,
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        let result = BenchmarkResult::from_fio_json(&output.stdout, device)?;
        info!(
            device = %result.device,
            read_iops = result.read.iops_mean,
            write_iops = result.write.iops_mean,
            "fio run finished"
        );
        Ok(result)
    }

    /// Benchmark every device in order. The first failure aborts the batch.
    pub async fn run_all(
        &self,
        devices: &[String],
        events: &dyn EventPublisher,
    ) -> Result<ResultAggregator> {
        let mut aggregator = ResultAggregator::new();
        for device in devices {
            let result = self.run(device).await?;
            events
                .publish(ProvisionEvent::benchmark_completed(
                    result.device.clone(),
                    result.read.iops_mean,
                    result.write.iops_mean,
                ))
                .await?;
            aggregator.add(&result);
        }
        Ok(aggregator)
    }
}

impl std::fmt::Debug for FioRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FioRunner")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryEventCollector, RecordingExecutor};
    use crate::bench::fio::tests::SAMPLE;
    use assert_matches::assert_matches;

    fn runner(executor: Arc<RecordingExecutor>) -> FioRunner {
        FioRunner::new(executor, FioConfig::default())
    }

    #[test]
    fn test_default_command_line() {
        let runner = runner(Arc::new(RecordingExecutor::new()));
        assert_eq!(
            runner.command("/dev/nvme1n1").render(),
            "fio --filename=/dev/nvme1n1 --size=800MB --direct=1 --rw=randrw --bs=512 \
             --ioengine=libaio --iodepth=64 --runtime=20 --numjobs=4 --time_based \
             --group_reporting --name=iops-test-job --eta-newline=1 --output-format=json"
        );
    }

    #[test]
    fn test_plan_runs_nothing() {
        let executor = Arc::new(RecordingExecutor::new());
        let devices = vec!["/dev/nvme1n1".to_string(), "/dev/nvme2n1".to_string()];

        let plan = runner(executor.clone()).plan(&devices);

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[1].args[0], "--filename=/dev/nvme2n1");
        assert!(executor.commands().is_empty());
    }

    #[tokio::test]
    async fn test_run_all_aggregates_and_publishes() {
        let executor = Arc::new(RecordingExecutor::new());
        executor.stdout_when("--filename=", SAMPLE);
        let events = InMemoryEventCollector::new();

        let agg = runner(executor.clone())
            .run_all(&["/dev/nvme1n1".to_string(), "/dev/nvme1n1".to_string()], &events)
            .await
            .unwrap();

        assert_eq!(agg.device("nvme1n1").unwrap().runs, 2);
        assert_eq!(events.events_of_type("BenchmarkCompleted").len(), 2);
        assert_eq!(executor.commands().len(), 2);
    }

    #[tokio::test]
    async fn test_fio_failure_escalates() {
        let executor = Arc::new(RecordingExecutor::new());
        executor.fail_when("fio", 1, "fio: failed to open /dev/missing\n");

        assert_matches!(
            runner(executor).run("/dev/missing").await,
            Err(Error::ExternalCommandNonZeroExit { exit_code: 1, stderr, .. })
                if stderr == "fio: failed to open /dev/missing"
        );
    }
}

//! fio JSON Result Contract
//!
//! Only the fields the aggregator needs are modelled; everything else in
//! fio's `--output-format=json` report is ignored.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// `{min, max, mean}` of one latency phase, in nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub max: f64,
    #[serde(default)]
    pub mean: f64,
}

/// Read or write side of a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectionStats {
    #[serde(default)]
    pub iops_min: f64,
    #[serde(default)]
    pub iops_max: f64,
    #[serde(default)]
    pub iops_mean: f64,
    /// Submission latency
    #[serde(default)]
    pub slat_ns: LatencyStats,
    /// Completion latency
    #[serde(default)]
    pub clat_ns: LatencyStats,
    /// Total latency
    #[serde(default)]
    pub lat_ns: LatencyStats,
}

#[derive(Debug, Deserialize)]
struct FioJob {
    #[serde(default)]
    read: DirectionStats,
    #[serde(default)]
    write: DirectionStats,
}

#[derive(Debug, Deserialize)]
struct DiskUtil {
    name: String,
}

#[derive(Debug, Deserialize)]
struct FioReport {
    #[serde(default)]
    jobs: Vec<FioJob>,
    #[serde(default)]
    disk_util: Vec<DiskUtil>,
}

/// Benchmark outcome for one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkResult {
    /// Display name, from `disk_util[0].name`
    pub device: String,
    pub read: DirectionStats,
    pub write: DirectionStats,
}

impl BenchmarkResult {
    /// Parse a fio JSON report.
    ///
    /// `fallback_device` names the result when fio reports no disk
    /// utilisation, which happens for files and some virtual devices.
    pub fn from_fio_json(json: &str, fallback_device: &str) -> Result<Self> {
        let report: FioReport = serde_json::from_str(json)
            .map_err(|e| Error::MalformedReport(format!("invalid fio JSON: {}", e)))?;

        let job = report
            .jobs
            .into_iter()
            .next()
            .ok_or_else(|| Error::MalformedReport("fio report has no jobs".to_string()))?;

        let device = report
            .disk_util
            .into_iter()
            .next()
            .map(|d| d.name)
            .unwrap_or_else(|| fallback_device.to_string());

        Ok(Self {
            device,
            read: job.read,
            write: job.write,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_matches::assert_matches;

    pub(crate) const SAMPLE: &str = r#"{
        "fio version": "fio-3.28",
        "jobs": [{
            "jobname": "iops-test-job",
            "read": {
                "io_bytes": 1048576,
                "iops_min": 1200, "iops_max": 5100, "iops_mean": 4020.5,
                "slat_ns": {"min": 1500, "max": 90000, "mean": 3100.2},
                "clat_ns": {"min": 40000, "max": 800000, "mean": 61000.7,
                            "percentile": {"99.000000": 120000}},
                "lat_ns": {"min": 42000, "max": 810000, "mean": 64100.9}
            },
            "write": {
                "iops_min": 1100, "iops_max": 5000, "iops_mean": 4011.0,
                "slat_ns": {"min": 1600, "max": 95000, "mean": 3200.0},
                "clat_ns": {"min": 41000, "max": 820000, "mean": 62000.0},
                "lat_ns": {"min": 43000, "max": 830000, "mean": 65200.0}
            }
        }],
        "disk_util": [{"name": "nvme1n1", "read_ios": 100, "util": 99.1}]
    }"#;

    #[test]
    fn test_parse_sample() {
        let result = BenchmarkResult::from_fio_json(SAMPLE, "/dev/nvme1n1").unwrap();

        assert_eq!(result.device, "nvme1n1");
        assert_eq!(result.read.iops_mean, 4020.5);
        assert_eq!(result.read.iops_min, 1200.0);
        assert_eq!(result.read.clat_ns.mean, 61000.7);
        assert_eq!(result.write.iops_max, 5000.0);
        assert_eq!(result.write.lat_ns.max, 830000.0);
    }

    #[test]
    fn test_missing_disk_util_uses_fallback() {
        let json = r#"{"jobs": [{"read": {"iops_mean": 10}}]}"#;
        let result = BenchmarkResult::from_fio_json(json, "/dev/vg0/lv0").unwrap();

        assert_eq!(result.device, "/dev/vg0/lv0");
        assert_eq!(result.read.iops_mean, 10.0);
        assert_eq!(result.write, DirectionStats::default());
    }

    #[test]
    fn test_malformed_reports() {
        assert_matches!(
            BenchmarkResult::from_fio_json(r#"{"jobs": []}"#, "x"),
            Err(Error::MalformedReport(_))
        );
        assert_matches!(
            BenchmarkResult::from_fio_json("fio: failed to open file", "x"),
            Err(Error::MalformedReport(_))
        );
    }
}

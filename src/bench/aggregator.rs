//! Benchmark Result Aggregation
//!
//! Collects one [`BenchmarkResult`] per device run into per-device series
//! of min/max/mean values for IOPS and each latency phase. Devices are keyed
//! by their fio display name.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use super::fio::{BenchmarkResult, DirectionStats, LatencyStats};
use crate::error::Result;

/// Parallel `min`/`max`/`mean` series, one entry per run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Series {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
    pub mean: Vec<f64>,
}

impl Series {
    fn push(&mut self, min: f64, max: f64, mean: f64) {
        self.min.push(min);
        self.max.push(max);
        self.mean.push(mean);
    }

    fn push_latency(&mut self, stats: &LatencyStats) {
        self.push(stats.min, stats.max, stats.mean);
    }

    /// Average of the recorded means.
    pub fn average_mean(&self) -> Option<f64> {
        if self.mean.is_empty() {
            None
        } else {
            Some(self.mean.iter().sum::<f64>() / self.mean.len() as f64)
        }
    }
}

/// Series for one I/O direction.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DirectionSeries {
    pub iops: Series,
    pub slat_ns: Series,
    pub clat_ns: Series,
    pub lat_ns: Series,
}

impl DirectionSeries {
    fn push(&mut self, stats: &DirectionStats) {
        self.iops.push(stats.iops_min, stats.iops_max, stats.iops_mean);
        self.slat_ns.push_latency(&stats.slat_ns);
        self.clat_ns.push_latency(&stats.clat_ns);
        self.lat_ns.push_latency(&stats.lat_ns);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceSeries {
    pub runs: usize,
    pub read: DirectionSeries,
    pub write: DirectionSeries,
}

/// Accumulates results across devices and runs.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ResultAggregator {
    devices: BTreeMap<String, DeviceSeries>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, result: &BenchmarkResult) {
        let series = self.devices.entry(result.device.clone()).or_default();
        series.runs += 1;
        series.read.push(&result.read);
        series.write.push(&result.write);
    }

    pub fn device(&self, name: &str) -> Option<&DeviceSeries> {
        self.devices.get(name)
    }

    pub fn devices(&self) -> impl Iterator<Item = (&str, &DeviceSeries)> {
        self.devices.iter().map(|(name, series)| (name.as_str(), series))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Plain-text summary, one row per device.
    pub fn render_table(&self) -> String {
        let mut out = format!(
            "{:<24} {:>5} {:>12} {:>12} {:>14} {:>14}\n",
            "DEVICE", "RUNS", "READ IOPS", "WRITE IOPS", "READ LAT(us)", "WRITE LAT(us)"
        );
        for (name, series) in &self.devices {
            let cell = |v: Option<f64>, scale: f64| {
                v.map(|v| format!("{:.1}", v / scale))
                    .unwrap_or_else(|| "-".to_string())
            };
            let _ = writeln!(
                out,
                "{:<24} {:>5} {:>12} {:>12} {:>14} {:>14}",
                name,
                series.runs,
                cell(series.read.iops.average_mean(), 1.0),
                cell(series.write.iops.average_mean(), 1.0),
                cell(series.read.lat_ns.average_mean(), 1000.0),
                cell(series.write.lat_ns.average_mean(), 1000.0),
            );
        }
        out
    }
}

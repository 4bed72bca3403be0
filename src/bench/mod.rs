//! Benchmarking
//!
//! fio is treated as an external collaborator; this module only knows its
//! command line and the JSON fields it reports.

pub mod aggregator;
pub mod fio;
pub mod runner;

pub use aggregator::{DeviceSeries, DirectionSeries, ResultAggregator, Series};
pub use fio::{BenchmarkResult, DirectionStats, LatencyStats};
pub use runner::FioRunner;

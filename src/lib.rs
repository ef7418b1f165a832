//! Benchmark analysis toolkit for 1-D k-means backends.
//!
//! The crate synthesises reproducible clustered datasets, ingests the run logs
//! (or CSV result files) produced by external serial, thread-parallel,
//! process-parallel and accelerator implementations, derives speedup,
//! throughput and efficiency against a baseline, and checks that every backend
//! converged to the same objective value.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

pub mod config;
pub mod dataset;
pub mod harness;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod report;
pub mod verify;
pub mod vocabulary;

pub use config::BenchConfig;
pub use dataset::{
    generate, load_series, CentroidInit, Dataset, DatasetCatalog, DatasetFiles, DatasetPreset,
    SynthesisConfig,
};
pub use harness::HarnessCommand;
pub use ingest::{parse_results_csv, RunLog, RunLogParser};
pub use metrics::{aggregate, Aggregation, Baseline, BaselinePolicy, Metric, MetricSet};
pub use model::{Backend, BackendKind, ConfigKey, DatasetSize, RunRecord};
pub use report::{ChartKind, ChartPoint, ChartSink, CsvChartSink, Report};
pub use verify::{verify, verify_by_dataset, Verification, DEFAULT_TOLERANCE};
pub use vocabulary::MarkerVocabulary;

/// Error type used by operations in this crate.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("required input is missing: {}", .0.display())]
    InputMissing(PathBuf),
    #[error("test harness failed with {status}:\n{output}")]
    Subprocess { status: ExitStatus, output: String },
    #[error("test harness could not be started: {0}")]
    SubprocessSpawn(#[source] std::io::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    ParseFloat(#[from] std::num::ParseFloatError),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    Regex(#[from] regex::Error),
}

/// Convenient alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, BenchError>;

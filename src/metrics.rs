//! Speedup, throughput and efficiency relative to a per-dataset baseline.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dataset::DatasetCatalog;
use crate::ingest::RunLog;
use crate::model::{Backend, ConfigKey, DatasetSize, RunRecord};
use crate::{BenchError, Result};

/// A derived value, or an explicit marker when it cannot be computed
/// (missing or zero time, unknown degree).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Metric {
    Value(f64),
    Undefined,
}

impl Metric {
    /// `numerator / denominator`, undefined unless both are present and the
    /// quotient is finite.
    pub fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Self {
        match (numerator, denominator) {
            (Some(num), Some(den)) if den != 0.0 => {
                let value = num / den;
                if value.is_finite() {
                    Metric::Value(value)
                } else {
                    Metric::Undefined
                }
            }
            _ => Metric::Undefined,
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Metric::Value(v) => Some(v),
            Metric::Undefined => None,
        }
    }

    pub fn is_defined(self) -> bool {
        matches!(self, Metric::Value(_))
    }
}

impl fmt::Display for Metric {
    /// Forwards precision to the inner value; prints `N/A` when undefined.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Value(v) => fmt::Display::fmt(v, f),
            Metric::Undefined => f.pad("N/A"),
        }
    }
}

/// Comparative metrics of one configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    /// Baseline time divided by this configuration's time.
    pub speedup: Metric,
    /// Points processed per millisecond; the run's own point count wins over the preset.
    pub throughput: Metric,
    /// Speedup divided by the parallelism degree.
    pub efficiency: Metric,
}

impl MetricSet {
    fn compute(
        key: &ConfigKey,
        record: &RunRecord,
        baseline_ms: Option<f64>,
        n_points: Option<usize>,
    ) -> Self {
        let speedup = Metric::ratio(baseline_ms, record.time_ms);
        let points = record.n_points.or(n_points);
        let throughput = Metric::ratio(points.map(|n| n as f64), record.time_ms);
        let efficiency = match key.parallelism() {
            Some(degree) => Metric::ratio(speedup.value(), Some(f64::from(degree))),
            None => Metric::Undefined,
        };
        Self {
            speedup,
            throughput,
            efficiency,
        }
    }
}

/// How the reference run of each dataset is chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BaselinePolicy {
    /// The record whose backend label matches, e.g. `serial`.
    FixedLabel(String),
    /// The record with the smallest known parallelism degree.
    MinParallelism,
    /// Externally measured times, for runs whose log holds no baseline.
    Reference(BTreeMap<DatasetSize, f64>),
}

impl Default for BaselinePolicy {
    fn default() -> Self {
        BaselinePolicy::FixedLabel(Backend::Serial.to_string())
    }
}

impl FromStr for BaselinePolicy {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "min-parallelism" | "minimum" | "min" => Ok(BaselinePolicy::MinParallelism),
            other => {
                let backend: Backend = other.parse()?;
                Ok(BaselinePolicy::FixedLabel(backend.to_string()))
            }
        }
    }
}

impl fmt::Display for BaselinePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaselinePolicy::FixedLabel(label) => write!(f, "label '{label}'"),
            BaselinePolicy::MinParallelism => f.write_str("minimum parallelism"),
            BaselinePolicy::Reference(_) => f.write_str("reference times"),
        }
    }
}

/// Where a dataset's baseline time came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Baseline {
    /// A parsed record.
    Record { key: ConfigKey, time_ms: Option<f64> },
    /// A time supplied outside the log.
    Reference { time_ms: f64 },
}

impl Baseline {
    pub fn time_ms(&self) -> Option<f64> {
        match self {
            Baseline::Record { time_ms, .. } => *time_ms,
            Baseline::Reference { time_ms } => Some(*time_ms),
        }
    }

    pub fn key(&self) -> Option<ConfigKey> {
        match self {
            Baseline::Record { key, .. } => Some(*key),
            Baseline::Reference { .. } => None,
        }
    }
}

impl BaselinePolicy {
    /// Pick the baseline for one dataset, if any.
    pub fn resolve(&self, log: &RunLog, size: DatasetSize) -> Option<Baseline> {
        let as_baseline = |(key, record): (&ConfigKey, &RunRecord)| Baseline::Record {
            key: *key,
            time_ms: record.time_ms,
        };
        match self {
            BaselinePolicy::FixedLabel(label) => log
                .for_dataset(size)
                .find(|(key, _)| key.backend.to_string().eq_ignore_ascii_case(label.trim()))
                .map(as_baseline),
            BaselinePolicy::MinParallelism => log
                .for_dataset(size)
                .filter_map(|entry| entry.0.parallelism().map(|degree| (degree, entry)))
                .min_by_key(|(degree, _)| *degree)
                .map(|(_, entry)| as_baseline(entry)),
            BaselinePolicy::Reference(times) => times
                .get(&size)
                .map(|&time_ms| Baseline::Reference { time_ms }),
        }
    }
}

/// Metrics for every configuration plus the baseline bookkeeping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    pub metrics: BTreeMap<ConfigKey, MetricSet>,
    pub baselines: BTreeMap<DatasetSize, Baseline>,
    /// Datasets for which the policy found no baseline; their metrics are undefined.
    pub unresolved: BTreeSet<DatasetSize>,
}

impl Aggregation {
    pub fn get(&self, key: &ConfigKey) -> Option<&MetricSet> {
        self.metrics.get(key)
    }

    pub fn baseline(&self, size: DatasetSize) -> Option<&Baseline> {
        self.baselines.get(&size)
    }

    pub fn is_unresolved(&self, size: DatasetSize) -> bool {
        self.unresolved.contains(&size)
    }

    /// Configuration with the highest defined speedup for a dataset.
    pub fn best(&self, size: DatasetSize) -> Option<(ConfigKey, f64)> {
        self.metrics
            .iter()
            .filter(|(key, _)| key.dataset == size)
            .filter_map(|(key, set)| set.speedup.value().map(|v| (*key, v)))
            .fold(None, |best: Option<(ConfigKey, f64)>, candidate| match best {
                Some(current) if current.1 >= candidate.1 => Some(current),
                _ => Some(candidate),
            })
    }
}

/// Compute metrics for every record whose dataset has a resolvable baseline.
pub fn aggregate(log: &RunLog, policy: &BaselinePolicy, catalog: &DatasetCatalog) -> Aggregation {
    let mut aggregation = Aggregation::default();

    for size in log.datasets() {
        let Some(baseline) = policy.resolve(log, size) else {
            tracing::warn!(dataset = %size, %policy, "no baseline resolved; metrics undefined");
            aggregation.unresolved.insert(size);
            continue;
        };
        if baseline.time_ms().is_none() {
            tracing::warn!(dataset = %size, "baseline has no elapsed time; speedups undefined");
        }

        let n_points = catalog.n_points(size);
        for (key, record) in log.for_dataset(size) {
            let set = MetricSet::compute(key, record, baseline.time_ms(), n_points);
            aggregation.metrics.insert(*key, set);
        }
        aggregation.baselines.insert(size, baseline);
    }

    tracing::info!(
        configurations = aggregation.metrics.len(),
        unresolved = aggregation.unresolved.len(),
        "aggregated metrics"
    );
    aggregation
}

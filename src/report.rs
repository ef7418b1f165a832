//! Text tables and chart data for an analysis run.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use prettytable::{format, row, Table};
use serde::Serialize;

use crate::dataset::DatasetCatalog;
use crate::ingest::RunLog;
use crate::metrics::{Aggregation, Baseline, Metric};
use crate::model::{DatasetSize, RunRecord};
use crate::verify::Verification;
use crate::Result;

/// Which chart a data point belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Time,
    Speedup,
    Throughput,
    Iterations,
}

/// One `(x, y, label)` tuple for an external chart renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub chart: ChartKind,
    pub x: f64,
    pub y: f64,
    pub label: String,
}

/// Destination for chart data.
pub trait ChartSink {
    fn emit(&mut self, family: &str, points: &[ChartPoint]) -> Result<()>;
}

/// Writes chart data to `performance_analysis_<family>.csv` inside `dir`.
#[derive(Debug, Clone)]
pub struct CsvChartSink {
    dir: PathBuf,
}

impl CsvChartSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, family: &str) -> PathBuf {
        self.dir.join(format!("performance_analysis_{family}.csv"))
    }
}

impl ChartSink for CsvChartSink {
    fn emit(&mut self, family: &str, points: &[ChartPoint]) -> Result<()> {
        let path = self.path_for(family);
        let mut writer = csv::Writer::from_path(&path)?;
        for point in points {
            writer.serialize(point)?;
        }
        writer.flush()?;
        tracing::info!(path = ?path, points = points.len(), "wrote chart data");
        Ok(())
    }
}

/// Read-only view over the results of one analysis run.
pub struct Report<'a> {
    title: String,
    log: &'a RunLog,
    aggregation: &'a Aggregation,
    verifications: &'a BTreeMap<DatasetSize, Verification>,
    catalog: &'a DatasetCatalog,
}

impl<'a> Report<'a> {
    pub fn new(
        title: impl Into<String>,
        log: &'a RunLog,
        aggregation: &'a Aggregation,
        verifications: &'a BTreeMap<DatasetSize, Verification>,
        catalog: &'a DatasetCatalog,
    ) -> Self {
        Self {
            title: title.into(),
            log,
            aggregation,
            verifications,
            catalog,
        }
    }

    /// Deterministic plain-text summary.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let rule = "=".repeat(80);
        let _ = writeln!(out, "{rule}\n{}\n{rule}", self.title);

        if self.log.is_empty() {
            let _ = writeln!(out, "\nNo benchmark results were recognised in the input.");
            return out;
        }

        for size in self.log.datasets() {
            let _ = writeln!(out, "\n{}", self.dataset_heading(size));
            let _ = write!(out, "{}", self.dataset_table(size));
            self.write_baseline(&mut out, size);
            if let Some((key, speedup)) = self.aggregation.best(size) {
                let _ = writeln!(out, "Best configuration: {} ({speedup:.2}x)", key.backend);
            }
            if let Some(verification) = self.verifications.get(&size) {
                write_verification(&mut out, verification);
            }
        }
        out
    }

    fn dataset_heading(&self, size: DatasetSize) -> String {
        match self.catalog.preset(size) {
            Some(preset) => format!(
                "Dataset {size} (N={}, K={})",
                preset.n_points, preset.n_clusters
            ),
            None => format!("Dataset {size}"),
        }
    }

    fn dataset_table(&self, size: DatasetSize) -> String {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
        table.set_titles(row![
            "Backend",
            "Degree",
            "Time (ms)",
            "Speedup",
            "Throughput (points/ms)",
            "Efficiency",
            "SSE",
            "Iterations"
        ]);
        for (key, record) in self.log.for_dataset(size) {
            let metrics = self.aggregation.get(key);
            let speedup = metrics.map_or(Metric::Undefined, |m| m.speedup);
            let throughput = metrics.map_or(Metric::Undefined, |m| m.throughput);
            let efficiency = metrics.map_or(Metric::Undefined, |m| m.efficiency);
            table.add_row(row![
                key.backend.kind().label(),
                key.parallelism().map_or_else(|| "-".to_string(), |d| d.to_string()),
                optional(record.time_ms, 3),
                with_unit(speedup, 2, "x"),
                format!("{throughput:.2}"),
                percent(efficiency),
                optional(record.sse, 6),
                iterations(record)
            ]);
        }
        table.to_string()
    }

    fn write_baseline(&self, out: &mut String, size: DatasetSize) {
        if self.aggregation.is_unresolved(size) {
            let _ = writeln!(
                out,
                "WARNING: no baseline for this dataset; derived metrics are undefined"
            );
            return;
        }
        match self.aggregation.baseline(size) {
            Some(Baseline::Record { key, time_ms }) => {
                let _ = writeln!(out, "Baseline: {} ({} ms)", key.backend, optional(*time_ms, 3));
            }
            Some(Baseline::Reference { time_ms }) => {
                let _ = writeln!(out, "Baseline: reference time ({time_ms:.3} ms)");
            }
            None => {}
        }
    }

    /// Chart tuples: parallel backends against their degree (one series per
    /// dataset and family, plus the ideal linear speedup), the remaining
    /// backends against dataset size. Iteration counts are charted alongside.
    pub fn chart_points(&self) -> Vec<ChartPoint> {
        let mut points = Vec::new();
        let mut degrees = BTreeSet::new();

        for (key, record) in self.log {
            let metrics = self.aggregation.get(key);
            let (x, label) = match key.parallelism() {
                Some(degree) => {
                    degrees.insert(degree);
                    (
                        f64::from(degree),
                        format!("{} {}", key.dataset, key.backend.kind().label()),
                    )
                }
                None => match record.n_points.or(self.catalog.n_points(key.dataset)) {
                    Some(n) => (n as f64, key.backend.to_string()),
                    None => continue,
                },
            };
            let mut push = |chart, y: Option<f64>| {
                if let Some(y) = y {
                    points.push(ChartPoint {
                        chart,
                        x,
                        y,
                        label: label.clone(),
                    });
                }
            };
            push(ChartKind::Time, record.time_ms);
            push(ChartKind::Speedup, metrics.and_then(|m| m.speedup.value()));
            push(ChartKind::Throughput, metrics.and_then(|m| m.throughput.value()));
            push(ChartKind::Iterations, record.iterations.map(|n| n as f64));
        }

        points.extend(degrees.into_iter().map(|degree| ChartPoint {
            chart: ChartKind::Speedup,
            x: f64::from(degree),
            y: f64::from(degree),
            label: "ideal".to_string(),
        }));
        points
    }
}

fn write_verification(out: &mut String, verification: &Verification) {
    if verification.samples == 0 {
        let _ = writeln!(out, "Correctness: no SSE values to compare");
        return;
    }
    let _ = writeln!(
        out,
        "Correctness: mean SSE {:.6}, std {:.6e} over {} run(s)",
        verification.mean_sse, verification.std_sse, verification.samples
    );
    if verification.consistent {
        let _ = writeln!(out, "  OK: all backends converge to the same result");
    } else {
        let _ = writeln!(
            out,
            "  WARNING: SSE spread exceeds tolerance {:e}; at least one backend diverges",
            verification.tolerance
        );
    }
}

fn optional(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{v:.precision$}"))
}

fn with_unit(metric: Metric, precision: usize, unit: &str) -> String {
    match metric.value() {
        Some(v) => format!("{v:.precision$}{unit}"),
        None => "N/A".to_string(),
    }
}

fn percent(metric: Metric) -> String {
    match metric.value() {
        Some(v) => format!("{:.1}%", v * 100.0),
        None => "N/A".to_string(),
    }
}

fn iterations(record: &RunRecord) -> String {
    record
        .iterations
        .map_or_else(|| "N/A".to_string(), |n| n.to_string())
}

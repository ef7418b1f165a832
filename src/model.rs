//! Identity and measurement types shared by ingestion, metrics and reporting.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{BenchError, Result};

/// Size class of a benchmark dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DatasetSize {
    Small,
    Medium,
    Large,
}

impl DatasetSize {
    pub const ALL: [DatasetSize; 3] = [DatasetSize::Small, DatasetSize::Medium, DatasetSize::Large];

    /// Canonical lowercase label.
    pub fn label(self) -> &'static str {
        match self {
            DatasetSize::Small => "small",
            DatasetSize::Medium => "medium",
            DatasetSize::Large => "large",
        }
    }
}

impl fmt::Display for DatasetSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DatasetSize {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "small" | "pequeno" => Ok(Self::Small),
            "medium" | "medio" | "médio" => Ok(Self::Medium),
            "large" | "grande" => Ok(Self::Large),
            other => Err(BenchError::InvalidConfig(format!(
                "unknown dataset size '{other}'"
            ))),
        }
    }
}

/// Backend family without a parallelism degree attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Serial,
    ThreadParallel,
    ProcessParallel,
    Accelerator,
}

impl BackendKind {
    /// Attach a degree. Parallel kinds require one; the others ignore it.
    pub fn with_degree(self, degree: Option<u32>) -> Option<Backend> {
        match (self, degree) {
            (BackendKind::Serial, _) => Some(Backend::Serial),
            (BackendKind::Accelerator, _) => Some(Backend::Accelerator),
            (BackendKind::ThreadParallel, Some(n)) => Some(Backend::ThreadParallel(n)),
            (BackendKind::ProcessParallel, Some(n)) => Some(Backend::ProcessParallel(n)),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BackendKind::Serial => "serial",
            BackendKind::ThreadParallel => "thread-parallel",
            BackendKind::ProcessParallel => "process-parallel",
            BackendKind::Accelerator => "accelerator",
        }
    }
}

/// One backend configuration under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Backend {
    Serial,
    ThreadParallel(u32),
    ProcessParallel(u32),
    Accelerator,
}

impl Backend {
    pub fn kind(self) -> BackendKind {
        match self {
            Backend::Serial => BackendKind::Serial,
            Backend::ThreadParallel(_) => BackendKind::ThreadParallel,
            Backend::ProcessParallel(_) => BackendKind::ProcessParallel,
            Backend::Accelerator => BackendKind::Accelerator,
        }
    }

    /// Thread or process count; `None` for serial and accelerator runs.
    pub fn parallelism(self) -> Option<u32> {
        match self {
            Backend::ThreadParallel(n) | Backend::ProcessParallel(n) => Some(n),
            Backend::Serial | Backend::Accelerator => None,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parallelism() {
            Some(n) => write!(f, "{}-{n}", self.kind().label()),
            None => f.write_str(self.kind().label()),
        }
    }
}

impl FromStr for Backend {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim().to_lowercase();
        match raw.as_str() {
            "serial" => return Ok(Backend::Serial),
            "accelerator" => return Ok(Backend::Accelerator),
            _ => {}
        }
        let parsed = raw.rsplit_once('-').and_then(|(family, degree)| {
            let degree: u32 = degree.parse().ok()?;
            match family {
                "thread-parallel" => Some(Backend::ThreadParallel(degree)),
                "process-parallel" => Some(Backend::ProcessParallel(degree)),
                _ => None,
            }
        });
        parsed.ok_or_else(|| BenchError::InvalidConfig(format!("unknown backend label '{s}'")))
    }
}

impl TryFrom<String> for Backend {
    type Error = BenchError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Backend> for String {
    fn from(value: Backend) -> Self {
        value.to_string()
    }
}

/// Composite identity of one benchmark run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConfigKey {
    pub dataset: DatasetSize,
    pub backend: Backend,
}

impl ConfigKey {
    pub fn new(dataset: DatasetSize, backend: Backend) -> Self {
        Self { dataset, backend }
    }

    pub fn parallelism(&self) -> Option<u32> {
        self.backend.parallelism()
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dataset, self.backend)
    }
}

/// Measurements reported by a single backend run. Any field may be missing
/// when the log was truncated or the harness skipped a line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Iterations until convergence.
    pub iterations: Option<u64>,
    /// Sum of squared errors of the converged assignment.
    pub sse: Option<f64>,
    /// Wall-clock time in milliseconds.
    pub time_ms: Option<f64>,
    /// Point count the run reported, when it differs from or refines the preset.
    #[serde(default)]
    pub n_points: Option<usize>,
}

impl RunRecord {
    pub fn new(iterations: u64, sse: f64, time_ms: f64) -> Self {
        Self {
            iterations: Some(iterations),
            sse: Some(sse),
            time_ms: Some(time_ms),
            n_points: None,
        }
    }

    pub fn with_points(mut self, n_points: usize) -> Self {
        self.n_points = Some(n_points);
        self
    }

    pub fn is_complete(&self) -> bool {
        self.iterations.is_some() && self.sse.is_some() && self.time_ms.is_some()
    }

    /// Set the iteration count unless one is already present. Returns whether the value was taken.
    pub fn fill_iterations(&mut self, value: u64) -> bool {
        fill_once(&mut self.iterations, value)
    }

    pub fn fill_sse(&mut self, value: f64) -> bool {
        fill_once(&mut self.sse, value)
    }

    pub fn fill_time_ms(&mut self, value: f64) -> bool {
        fill_once(&mut self.time_ms, value)
    }

    pub fn fill_points(&mut self, value: usize) -> bool {
        fill_once(&mut self.n_points, value)
    }
}

fn fill_once<T>(slot: &mut Option<T>, value: T) -> bool {
    if slot.is_some() {
        return false;
    }
    *slot = Some(value);
    true
}

//! Text fragments that drive the run-log state machine.
//!
//! Harness output has changed shape several times (Portuguese and English
//! banners, one metric per line or all three on one line), so every marker
//! and metric pattern is data. [`MarkerVocabulary`] is the serialisable form
//! and [`RuleSet`] the compiled one.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::{Backend, BackendKind, DatasetSize};
use crate::{BenchError, Result};

/// Pattern announcing a dataset section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMarker {
    pub pattern: String,
    pub size: DatasetSize,
}

/// Pattern announcing a backend configuration. Parallel kinds read their
/// degree from capture group 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendMarker {
    pub pattern: String,
    pub kind: BackendKind,
}

/// Serialisable marker and metric vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerVocabulary {
    pub datasets: Vec<DatasetMarker>,
    pub backends: Vec<BackendMarker>,
    /// Iteration count, capture group 1.
    pub iterations: String,
    /// Final SSE, capture group 1.
    pub sse: String,
    /// Elapsed milliseconds, capture group 1.
    pub time_ms: String,
    /// Backend assumed right after a dataset marker, for logs that never
    /// print a configuration line (the serial harness).
    #[serde(default)]
    pub implicit_backend: Option<Backend>,
    /// Patterns for the `version` column of structured result files,
    /// matched against the lowercased value.
    #[serde(default = "default_versions")]
    pub versions: Vec<BackendMarker>,
}

fn marker(pattern: &str, kind: BackendKind) -> BackendMarker {
    BackendMarker {
        pattern: pattern.to_string(),
        kind,
    }
}

fn default_versions() -> Vec<BackendMarker> {
    vec![
        marker(r"^serial$", BackendKind::Serial),
        marker(r"^(?:openmp|omp|threads?)[_-]?(\d+)$", BackendKind::ThreadParallel),
        marker(r"^(?:mpi|procs?|processes)[_-]?(\d+)$", BackendKind::ProcessParallel),
        marker(r"^(?:cuda|gpu)", BackendKind::Accelerator),
    ]
}

impl Default for MarkerVocabulary {
    fn default() -> Self {
        let dataset = |pattern: &str, size| DatasetMarker {
            pattern: pattern.to_string(),
            size,
        };
        Self {
            datasets: vec![
                dataset(r"\bPEQUENO\b", DatasetSize::Small),
                dataset(r"\bM[ÉE]DIO\b", DatasetSize::Medium),
                dataset(r"\bGRANDE\b", DatasetSize::Large),
                dataset(r"\bSMALL\b", DatasetSize::Small),
                dataset(r"\bMEDIUM\b", DatasetSize::Medium),
                dataset(r"\bLARGE\b", DatasetSize::Large),
            ],
            backends: vec![
                marker(r"(?i)(\d+)\s+threads?\b", BackendKind::ThreadParallel),
                marker(r"(?i)(\d+)\s+process(?:o|os|es)?\b", BackendKind::ProcessParallel),
                marker(r"\b(?:SERIAL|Serial)\b", BackendKind::Serial),
                marker(r"\b(?:CUDA|GPU)\b", BackendKind::Accelerator),
            ],
            iterations: r"(?i)\bitera(?:ções|coes|tions)\s*:\s*(\d+)".to_string(),
            sse: r"(?i)\bSSE(?:\s+final)?\s*:\s*([0-9]+(?:\.[0-9]*)?(?:[eE][-+]?[0-9]+)?)"
                .to_string(),
            time_ms: r"(?i)\b(?:tempo|time)\s*:\s*([0-9]+(?:\.[0-9]*)?)\s*ms\b".to_string(),
            implicit_backend: None,
            versions: default_versions(),
        }
    }
}

impl MarkerVocabulary {
    /// A `serial` analysis family implies the serial backend unless one is
    /// already set. Returns whether the default was applied.
    pub fn apply_family_default(&mut self, family: &str) -> bool {
        if self.implicit_backend.is_some() || !family.trim().eq_ignore_ascii_case("serial") {
            return false;
        }
        self.implicit_backend = Some(Backend::Serial);
        true
    }

    /// Compile every pattern, failing on the first invalid one.
    pub fn compile(&self) -> Result<RuleSet> {
        let mut rules = Vec::with_capacity(self.datasets.len() + self.backends.len() + 3);
        for marker in &self.datasets {
            rules.push(Rule::Dataset(Regex::new(&marker.pattern)?, marker.size));
        }
        for marker in &self.backends {
            rules.push(Rule::Configuration(backend_regex(marker)?, marker.kind));
        }
        for (pattern, field) in [
            (&self.iterations, MetricField::Iterations),
            (&self.sse, MetricField::Sse),
            (&self.time_ms, MetricField::TimeMs),
        ] {
            let regex = Regex::new(pattern)?;
            if regex.captures_len() < 2 {
                return Err(BenchError::InvalidConfig(format!(
                    "{field} pattern '{pattern}' needs a capture group for the value"
                )));
            }
            rules.push(Rule::Metric(regex, field));
        }

        let versions = self
            .versions
            .iter()
            .map(|marker| Ok((backend_regex(marker)?, marker.kind)))
            .collect::<Result<Vec<_>>>()?;

        Ok(RuleSet {
            rules,
            versions,
            implicit_backend: self.implicit_backend,
        })
    }
}

fn backend_regex(marker: &BackendMarker) -> Result<Regex> {
    let regex = Regex::new(&marker.pattern)?;
    let needs_degree = matches!(
        marker.kind,
        BackendKind::ThreadParallel | BackendKind::ProcessParallel
    );
    if needs_degree && regex.captures_len() < 2 {
        return Err(BenchError::InvalidConfig(format!(
            "{} marker '{}' needs a capture group for the degree",
            marker.kind.label(),
            marker.pattern
        )));
    }
    Ok(regex)
}

/// Measurement carried by a metric line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricField {
    Iterations,
    Sse,
    TimeMs,
}

impl std::fmt::Display for MetricField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MetricField::Iterations => "iterations",
            MetricField::Sse => "sse",
            MetricField::TimeMs => "time_ms",
        })
    }
}

/// What a single line says, in rule order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal<'t> {
    Dataset(DatasetSize),
    Configuration(Backend),
    Metric(MetricField, &'t str),
}

#[derive(Debug, Clone)]
enum Rule {
    Dataset(Regex, DatasetSize),
    Configuration(Regex, BackendKind),
    Metric(Regex, MetricField),
}

/// Compiled vocabulary: an ordered list of `(pattern, signal)` rules.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
    versions: Vec<(Regex, BackendKind)>,
    implicit_backend: Option<Backend>,
}

impl RuleSet {
    pub fn implicit_backend(&self) -> Option<Backend> {
        self.implicit_backend
    }

    /// Classify one line. At most one dataset marker and one configuration
    /// marker are reported (the first rule of each kind that matches), and
    /// at most one value per metric field.
    pub fn scan<'t>(&self, line: &'t str) -> Vec<Signal<'t>> {
        let mut signals = Vec::new();
        let mut seen_dataset = false;
        let mut seen_config = false;
        for rule in &self.rules {
            match rule {
                Rule::Dataset(regex, size) if !seen_dataset => {
                    if regex.is_match(line) {
                        seen_dataset = true;
                        signals.push(Signal::Dataset(*size));
                    }
                }
                Rule::Configuration(regex, kind) if !seen_config => {
                    if let Some(backend) = match_backend(regex, *kind, line) {
                        seen_config = true;
                        signals.push(Signal::Configuration(backend));
                    }
                }
                Rule::Metric(regex, field) => {
                    let already = signals
                        .iter()
                        .any(|signal| matches!(signal, Signal::Metric(f, _) if f == field));
                    if already {
                        continue;
                    }
                    if let Some(value) = regex.captures(line).and_then(|caps| caps.get(1)) {
                        signals.push(Signal::Metric(*field, value.as_str()));
                    }
                }
                _ => {}
            }
        }
        signals
    }

    /// Map a `version` column value from a structured result file.
    pub fn backend_for_version(&self, version: &str) -> Option<Backend> {
        let version = version.trim().to_lowercase();
        self.versions
            .iter()
            .find_map(|(regex, kind)| match_backend(regex, *kind, &version))
    }
}

fn match_backend(regex: &Regex, kind: BackendKind, text: &str) -> Option<Backend> {
    let caps = regex.captures(text)?;
    let degree = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
    kind.with_degree(degree)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> RuleSet {
        MarkerVocabulary::default().compile().expect("default vocabulary compiles")
    }

    #[test]
    fn recognises_dataset_banners() {
        let rules = rules();
        assert_eq!(
            rules.scan("=== Testando Dataset PEQUENO (N=10000, K=4) ==="),
            vec![Signal::Dataset(DatasetSize::Small)]
        );
        assert_eq!(
            rules.scan("Dataset MÉDIO"),
            vec![Signal::Dataset(DatasetSize::Medium)]
        );
        assert_eq!(
            rules.scan("Dataset GRANDE"),
            vec![Signal::Dataset(DatasetSize::Large)]
        );
    }

    #[test]
    fn recognises_configuration_lines() {
        let rules = rules();
        assert_eq!(
            rules.scan("--- OpenMP (4 threads) ---"),
            vec![Signal::Configuration(Backend::ThreadParallel(4))]
        );
        assert_eq!(
            rules.scan("MPI com 8 processos"),
            vec![Signal::Configuration(Backend::ProcessParallel(8))]
        );
        assert_eq!(
            rules.scan(">> SERIAL"),
            vec![Signal::Configuration(Backend::Serial)]
        );
        assert_eq!(
            rules.scan("Executando versão CUDA"),
            vec![Signal::Configuration(Backend::Accelerator)]
        );
        assert!(rules.scan("Processos: 4").is_empty());
    }

    #[test]
    fn reads_every_metric_on_a_combined_line() {
        let signals = rules().scan("Iterações: 23 | SSE final: 1234.567890 | Tempo: 40.6 ms");
        assert_eq!(
            signals,
            vec![
                Signal::Metric(MetricField::Iterations, "23"),
                Signal::Metric(MetricField::Sse, "1234.567890"),
                Signal::Metric(MetricField::TimeMs, "40.6"),
            ]
        );
    }

    #[test]
    fn decorative_lines_produce_nothing() {
        let rules = rules();
        for line in ["", "=========", "K-means 1D (MPI)", "N=10000 K=4 max_iter=50 eps=1e-04"] {
            assert!(rules.scan(line).is_empty(), "unexpected signal for {line:?}");
        }
    }

    #[test]
    fn parallel_marker_without_group_is_rejected() {
        let mut vocabulary = MarkerVocabulary::default();
        vocabulary.backends[0].pattern = r"threads".to_string();
        assert!(matches!(
            vocabulary.compile(),
            Err(BenchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn invalid_regex_surfaces_as_error() {
        let vocabulary = MarkerVocabulary {
            sse: "SSE: ([0-9".to_string(),
            ..MarkerVocabulary::default()
        };
        assert!(matches!(vocabulary.compile(), Err(BenchError::Regex(_))));
    }

    #[test]
    fn serial_family_sets_implicit_backend() {
        let mut vocabulary = MarkerVocabulary::default();
        assert!(vocabulary.apply_family_default("Serial"));
        assert_eq!(vocabulary.implicit_backend, Some(Backend::Serial));

        let mut openmp = MarkerVocabulary::default();
        assert!(!openmp.apply_family_default("openmp"));
        assert_eq!(openmp.implicit_backend, None);

        let mut explicit = MarkerVocabulary {
            implicit_backend: Some(Backend::Accelerator),
            ..MarkerVocabulary::default()
        };
        assert!(!explicit.apply_family_default("serial"));
        assert_eq!(explicit.implicit_backend, Some(Backend::Accelerator));

        let mut banner_only = MarkerVocabulary::default();
        banner_only.apply_family_default("serial");
        let rules = banner_only.compile().unwrap();
        assert_eq!(rules.implicit_backend(), Some(Backend::Serial));
    }

    #[test]
    fn version_column_maps_to_backends() {
        let rules = rules();
        assert_eq!(rules.backend_for_version("serial"), Some(Backend::Serial));
        assert_eq!(
            rules.backend_for_version("OpenMP_8"),
            Some(Backend::ThreadParallel(8))
        );
        assert_eq!(
            rules.backend_for_version("mpi_4"),
            Some(Backend::ProcessParallel(4))
        );
        assert_eq!(rules.backend_for_version("cuda"), Some(Backend::Accelerator));
        assert_eq!(rules.backend_for_version("openmp"), None);
    }
}

//! Turn harness output into per-configuration [`RunRecord`]s.
//!
//! Free-form logs go through [`RunLogParser`], a line-oriented state machine
//! driven by the compiled [`MarkerVocabulary`]. Structured result files go
//! through [`parse_results_csv`]. Both produce a [`RunLog`].

use std::collections::btree_map::{self, BTreeMap};
use std::io;
use std::path::Path;

use csv::ReaderBuilder;
use serde::Deserialize;

use crate::dataset::DatasetCatalog;
use crate::model::{Backend, ConfigKey, DatasetSize, RunRecord};
use crate::vocabulary::{MarkerVocabulary, MetricField, RuleSet, Signal};
use crate::{BenchError, Result};

/// Parsed records keyed by configuration, in deterministic order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunLog {
    records: BTreeMap<ConfigKey, RunRecord>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &ConfigKey) -> Option<&RunRecord> {
        self.records.get(key)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, ConfigKey, RunRecord> {
        self.records.iter()
    }

    /// Record slot for `key`, created empty on first use.
    pub fn entry(&mut self, key: ConfigKey) -> &mut RunRecord {
        self.records.entry(key).or_default()
    }

    /// Dataset sizes present, ascending.
    pub fn datasets(&self) -> Vec<DatasetSize> {
        let mut sizes: Vec<DatasetSize> = self.records.keys().map(|key| key.dataset).collect();
        sizes.dedup();
        sizes
    }

    /// Every record belonging to one dataset, in backend order.
    pub fn for_dataset(
        &self,
        size: DatasetSize,
    ) -> impl Iterator<Item = (&ConfigKey, &RunRecord)> + '_ {
        self.records.iter().filter(move |(key, _)| key.dataset == size)
    }

    /// Keys missing at least one of iterations, SSE or time.
    pub fn incomplete(&self) -> Vec<ConfigKey> {
        self.records
            .iter()
            .filter(|(_, record)| !record.is_complete())
            .map(|(key, _)| *key)
            .collect()
    }
}

impl FromIterator<(ConfigKey, RunRecord)> for RunLog {
    fn from_iter<T: IntoIterator<Item = (ConfigKey, RunRecord)>>(iter: T) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a RunLog {
    type Item = (&'a ConfigKey, &'a RunRecord);
    type IntoIter = btree_map::Iter<'a, ConfigKey, RunRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Position of the parser within the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// No dataset marker seen yet.
    NoDataset,
    /// A configuration arrived before any dataset; it applies to the first one.
    Pending(Backend),
    /// Inside a dataset section, no configuration active.
    DatasetOnly(DatasetSize),
    /// Metrics land in the record for this key.
    Active(ConfigKey),
}

impl ParseState {
    /// A dataset marker switches the section and carries the current
    /// configuration over. Without one, the implicit backend applies.
    fn on_dataset(self, size: DatasetSize, implicit: Option<Backend>) -> Self {
        let carried = match self {
            ParseState::Active(key) => Some(key.backend),
            ParseState::Pending(backend) => Some(backend),
            ParseState::NoDataset | ParseState::DatasetOnly(_) => implicit,
        };
        match carried {
            Some(backend) => ParseState::Active(ConfigKey::new(size, backend)),
            None => ParseState::DatasetOnly(size),
        }
    }

    fn on_configuration(self, backend: Backend) -> Self {
        match self {
            ParseState::NoDataset | ParseState::Pending(_) => ParseState::Pending(backend),
            ParseState::DatasetOnly(size) => ParseState::Active(ConfigKey::new(size, backend)),
            ParseState::Active(key) => ParseState::Active(ConfigKey::new(key.dataset, backend)),
        }
    }

    pub fn active_key(self) -> Option<ConfigKey> {
        match self {
            ParseState::Active(key) => Some(key),
            _ => None,
        }
    }
}

/// Line-oriented parser for free-form harness output.
#[derive(Debug, Clone)]
pub struct RunLogParser {
    rules: RuleSet,
}

impl RunLogParser {
    pub fn new(vocabulary: &MarkerVocabulary) -> Result<Self> {
        Ok(Self {
            rules: vocabulary.compile()?,
        })
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Parse a whole log. Never fails: unknown lines are inert, metric lines
    /// outside a configuration are dropped, and empty input gives an empty log.
    /// Records are registered by configuration markers and by metrics, so a
    /// carried-over configuration with no output in a section leaves no record.
    pub fn parse(&self, raw_text: &str) -> RunLog {
        let mut log = RunLog::new();
        let mut state = ParseState::NoDataset;

        for (line_no, line) in raw_text.lines().enumerate() {
            for signal in self.rules.scan(line) {
                match signal {
                    Signal::Dataset(size) => {
                        state = state.on_dataset(size, self.rules.implicit_backend());
                        tracing::debug!(line = line_no + 1, dataset = %size, "dataset marker");
                    }
                    Signal::Configuration(backend) => {
                        state = state.on_configuration(backend);
                        match state.active_key() {
                            Some(key) => {
                                log.entry(key);
                                tracing::debug!(line = line_no + 1, %key, "configuration marker");
                            }
                            None => tracing::debug!(
                                line = line_no + 1,
                                %backend,
                                "configuration marker before any dataset; pending"
                            ),
                        }
                    }
                    Signal::Metric(field, raw) => {
                        let Some(key) = state.active_key() else {
                            tracing::debug!(
                                line = line_no + 1,
                                %field,
                                "metric outside an active configuration; dropped"
                            );
                            continue;
                        };
                        apply_metric(log.entry(key), key, field, raw, line_no + 1);
                    }
                }
            }
        }

        tracing::info!(
            configurations = log.len(),
            incomplete = log.incomplete().len(),
            "parsed run log"
        );
        log
    }
}

fn apply_metric(
    record: &mut RunRecord,
    key: ConfigKey,
    field: MetricField,
    raw: &str,
    line: usize,
) {
    let taken = match field {
        MetricField::Iterations => match raw.parse::<u64>() {
            Ok(value) => record.fill_iterations(value),
            Err(err) => return warn_unparsable(key, field, raw, line, &err),
        },
        MetricField::Sse => match raw.parse::<f64>() {
            Ok(value) => record.fill_sse(value),
            Err(err) => return warn_unparsable(key, field, raw, line, &err),
        },
        MetricField::TimeMs => match raw.parse::<f64>() {
            Ok(value) => record.fill_time_ms(value),
            Err(err) => return warn_unparsable(key, field, raw, line, &err),
        },
    };
    if !taken {
        tracing::debug!(line, %key, %field, "duplicate metric ignored");
    }
}

fn warn_unparsable(
    key: ConfigKey,
    field: MetricField,
    raw: &str,
    line: usize,
    err: &dyn std::fmt::Display,
) {
    tracing::warn!(line, %key, %field, value = raw, error = %err, "unparsable metric value");
}

#[derive(Debug, Deserialize)]
struct ResultRow {
    version: String,
    #[serde(rename = "N")]
    n: usize,
    #[serde(rename = "K")]
    k: usize,
    iterations: Option<u64>,
    sse: Option<f64>,
    time_ms: Option<f64>,
}

/// Read a structured result file (`version,N,K,iterations,sse,time_ms`).
///
/// `version` selects the backend through the vocabulary; unknown versions are
/// skipped. `N` selects the dataset through the catalog, falling back to the
/// nearest preset, and is kept on the record for throughput.
pub fn parse_results_csv<R: io::Read>(
    reader: R,
    rules: &RuleSet,
    catalog: &DatasetCatalog,
) -> Result<RunLog> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut log = RunLog::new();

    for (idx, row) in rdr.deserialize::<ResultRow>().enumerate() {
        let row = row?;
        let Some(backend) = rules.backend_for_version(&row.version) else {
            tracing::warn!(row = idx + 1, version = %row.version, "unknown version; row skipped");
            continue;
        };
        let dataset = match catalog.size_for_points(row.n) {
            Some(size) => {
                if let Some(preset) = catalog.preset(size) {
                    if preset.n_clusters != row.k {
                        tracing::warn!(
                            row = idx + 1,
                            k = row.k,
                            expected = preset.n_clusters,
                            "cluster count differs from the dataset preset"
                        );
                    }
                }
                size
            }
            None => match catalog.nearest_size(row.n) {
                Some(size) => {
                    tracing::info!(
                        row = idx + 1,
                        n = row.n,
                        dataset = %size,
                        "N matches no preset; using nearest"
                    );
                    size
                }
                None => {
                    tracing::warn!(row = idx + 1, n = row.n, "no dataset preset; row skipped");
                    continue;
                }
            },
        };

        let record = log.entry(ConfigKey::new(dataset, backend));
        if !record.fill_points(row.n) && record.n_points != Some(row.n) {
            tracing::warn!(row = idx + 1, n = row.n, "conflicting N for a configuration");
        }
        if let Some(value) = row.iterations {
            record.fill_iterations(value);
        }
        if let Some(value) = row.sse {
            record.fill_sse(value);
        }
        if let Some(value) = row.time_ms {
            record.fill_time_ms(value);
        }
    }

    tracing::info!(configurations = log.len(), "parsed result file");
    Ok(log)
}

/// Open and parse a structured result file.
pub fn read_results_file<P: AsRef<Path>>(
    path: P,
    rules: &RuleSet,
    catalog: &DatasetCatalog,
) -> Result<RunLog> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(BenchError::InputMissing(path.to_path_buf()));
    }
    parse_results_csv(std::fs::File::open(path)?, rules, catalog)
}

/// Read a stored log file and parse it.
pub fn read_log_file<P: AsRef<Path>>(path: P, parser: &RunLogParser) -> Result<RunLog> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(BenchError::InputMissing(path.to_path_buf()));
    }
    Ok(parser.parse(&std::fs::read_to_string(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPENMP_LOG: &str = "\
========================================
Testando Dataset PEQUENO (N=10000, K=4)
========================================

--- OpenMP (4 threads) ---
K-means 1D (OpenMP)
Iterações: 12
SSE final: 3.450000
Tempo: 1.800 ms

--- OpenMP (8 threads) ---
Iterações: 12
SSE final: 3.450001
Tempo: 2.600 ms
";

    const MPI_LOG: &str = "\
>>> Dataset MÉDIO
MPI com 2 processos
K-means 1D (MPI)
Processos: 2
N=100000 K=8 max_iter=50 eps=1.000000e-04
Iterações: 23 | SSE final: 5120.118000 | Tempo: 52.3 ms

MPI com 4 processos
Iterações: 23 | SSE final: 5120.118000 | Tempo: 40.6 ms
";

    fn parser() -> RunLogParser {
        RunLogParser::new(&MarkerVocabulary::default()).unwrap()
    }

    #[test]
    fn thread_parallel_section_yields_complete_record() {
        let log = parser().parse(OPENMP_LOG);
        let key = ConfigKey::new(DatasetSize::Small, Backend::ThreadParallel(4));
        assert_eq!(log.get(&key), Some(&RunRecord::new(12, 3.45, 1.8)));
        assert_eq!(key.parallelism(), Some(4));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn combined_metric_lines_fill_all_fields() {
        let log = parser().parse(MPI_LOG);
        let key = ConfigKey::new(DatasetSize::Medium, Backend::ProcessParallel(4));
        assert_eq!(log.get(&key), Some(&RunRecord::new(23, 5120.118, 40.6)));
        assert!(log.incomplete().is_empty());
    }

    #[test]
    fn first_occurrence_wins_on_repeated_text() {
        let echoed = OPENMP_LOG
            .replace("Tempo: 1.800 ms", "Tempo: 1.800 ms\nTempo: 9.999 ms")
            .replace("SSE final: 3.450000", "SSE final: 3.450000\nSSE final: 7.0");
        let twice = format!("{echoed}{OPENMP_LOG}");
        let log = parser().parse(&twice);
        assert_eq!(log, parser().parse(OPENMP_LOG));
    }

    #[test]
    fn metrics_before_markers_are_dropped() {
        let text = "Tempo: 5.0 ms\nDataset GRANDE\nSSE final: 1.0\n\
                    --- OpenMP (2 threads) ---\nTempo: 3.0 ms\n";
        let log = parser().parse(text);
        let key = ConfigKey::new(DatasetSize::Large, Backend::ThreadParallel(2));
        let record = log.get(&key).expect("record registered");
        assert_eq!(record.time_ms, Some(3.0));
        assert_eq!(record.sse, None);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn dataset_marker_carries_configuration_into_next_section() {
        let text = "\
Dataset PEQUENO
4 threads
Tempo: 1.0 ms
Dataset GRANDE
Tempo: 2.0 ms
8 threads
Tempo: 3.0 ms
";
        let log = parser().parse(text);
        let time = |backend| {
            log.get(&ConfigKey::new(DatasetSize::Large, backend))
                .and_then(|r| r.time_ms)
        };
        assert_eq!(
            log.get(&ConfigKey::new(DatasetSize::Small, Backend::ThreadParallel(4)))
                .and_then(|r| r.time_ms),
            Some(1.0)
        );
        assert_eq!(time(Backend::ThreadParallel(4)), Some(2.0));
        assert_eq!(time(Backend::ThreadParallel(8)), Some(3.0));
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn configuration_printed_once_applies_to_every_dataset() {
        let text = "\
MPI com 4 processos
Testando Dataset PEQUENO
Iterações: 12 | SSE final: 3.45 | Tempo: 1.8 ms
Testando Dataset MÉDIO
Iterações: 23 | SSE final: 5120.118 | Tempo: 40.6 ms
";
        let log = parser().parse(text);
        assert_eq!(log.len(), 2);
        assert_eq!(
            log.get(&ConfigKey::new(DatasetSize::Small, Backend::ProcessParallel(4))),
            Some(&RunRecord::new(12, 3.45, 1.8))
        );
        assert_eq!(
            log.get(&ConfigKey::new(DatasetSize::Medium, Backend::ProcessParallel(4))),
            Some(&RunRecord::new(23, 5120.118, 40.6))
        );
    }

    #[test]
    fn carried_configuration_without_output_leaves_no_record() {
        let text = "\
Dataset PEQUENO
--- OpenMP (16 threads) ---
Tempo: 1.0 ms
Dataset GRANDE
--- SERIAL ---
Tempo: 9.0 ms
";
        let log = parser().parse(text);
        assert!(log
            .get(&ConfigKey::new(DatasetSize::Large, Backend::ThreadParallel(16)))
            .is_none());
        assert_eq!(
            log.get(&ConfigKey::new(DatasetSize::Large, Backend::Serial))
                .and_then(|r| r.time_ms),
            Some(9.0)
        );
    }

    #[test]
    fn configuration_without_metrics_is_a_partial_record() {
        let log = parser().parse("Dataset PEQUENO\n>> SERIAL\nIterações: 7\n");
        let key = ConfigKey::new(DatasetSize::Small, Backend::Serial);
        let record = log.get(&key).unwrap();
        assert_eq!(record.iterations, Some(7));
        assert!(!record.is_complete());
        assert_eq!(log.incomplete(), vec![key]);
    }

    #[test]
    fn empty_input_gives_empty_log() {
        assert!(parser().parse("").is_empty());
        assert!(parser().parse("\n\n=====\nbanner\n").is_empty());
    }

    #[test]
    fn implicit_backend_covers_serial_logs() {
        let vocabulary = MarkerVocabulary {
            implicit_backend: Some(Backend::Serial),
            ..MarkerVocabulary::default()
        };
        let parser = RunLogParser::new(&vocabulary).unwrap();
        let text = "Testando Dataset MÉDIO\nIterações: 30\nSSE final: 10.5\nTempo: 96.2 ms\n";
        let log = parser.parse(text);
        assert_eq!(
            log.get(&ConfigKey::new(DatasetSize::Medium, Backend::Serial)),
            Some(&RunRecord::new(30, 10.5, 96.2))
        );
    }

    #[test]
    fn structured_results_map_to_config_keys() {
        let csv_text = "\
version,N,K,iterations,sse,time_ms
serial,100000,8,23,5120.118,96.2
openmp_4,100000,8,23,5120.118,40.6
cuda,100000,8,23,5120.119,
fortran,100000,8,1,1.0,1.0
serial,100000,8,99,1.0,1.0
";
        let rules = MarkerVocabulary::default().compile().unwrap();
        let log =
            parse_results_csv(csv_text.as_bytes(), &rules, &DatasetCatalog::default()).unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(
            log.get(&ConfigKey::new(DatasetSize::Medium, Backend::Serial)),
            Some(&RunRecord::new(23, 5120.118, 96.2).with_points(100_000))
        );
        let cuda = log
            .get(&ConfigKey::new(DatasetSize::Medium, Backend::Accelerator))
            .unwrap();
        assert_eq!(cuda.time_ms, None);
        assert_eq!(cuda.sse, Some(5120.119));
    }

    #[test]
    fn custom_point_counts_keep_their_rows() {
        let csv_text = "\
version,N,K,iterations,sse,time_ms
serial,50000,4,20,10.0,30.0
cuda,50000,4,20,10.0,3.0
";
        let rules = MarkerVocabulary::default().compile().unwrap();
        let log =
            parse_results_csv(csv_text.as_bytes(), &rules, &DatasetCatalog::default()).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(
            log.get(&ConfigKey::new(DatasetSize::Medium, Backend::Accelerator)),
            Some(&RunRecord::new(20, 10.0, 3.0).with_points(50_000))
        );
    }

    #[test]
    fn missing_result_file_is_input_missing() {
        let rules = MarkerVocabulary::default().compile().unwrap();
        let err = read_results_file("does/not/exist.csv", &rules, &DatasetCatalog::default())
            .unwrap_err();
        assert!(matches!(err, BenchError::InputMissing(_)));
    }
}

//! Reproducible synthetic 1-D datasets for the external k-means backends.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Terminator, WriterBuilder};
use ndarray::Array1;
use ndarray_rand::rand_distr::{Distribution, Normal, Uniform};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::model::DatasetSize;
use crate::{BenchError, Result};

/// How the initial centroid file is produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", tag = "strategy")]
pub enum CentroidInit {
    /// Uniform draws over the observed `[min, max]` of the generated points.
    #[default]
    UniformRange,
    /// The true cluster centres shifted by a constant offset.
    OffsetFromCenters { offset: f64 },
}

/// Tunable constants of the synthetic generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Interval over which cluster centres are spaced linearly.
    pub center_range: (f64, f64),
    /// Standard deviation of every cluster.
    pub cluster_std: f64,
    /// Initial centroid strategy.
    #[serde(default)]
    pub centroid_init: CentroidInit,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            center_range: (-10.0, 10.0),
            cluster_std: 0.8,
            centroid_init: CentroidInit::default(),
        }
    }
}

impl SynthesisConfig {
    pub fn validate(&self) -> Result<()> {
        let (lo, hi) = self.center_range;
        if !lo.is_finite() || !hi.is_finite() || lo > hi {
            return Err(BenchError::InvalidConfig(format!(
                "center_range must be a finite, ordered interval (got {lo}..{hi})"
            )));
        }
        if !self.cluster_std.is_finite() || self.cluster_std <= 0.0 {
            return Err(BenchError::InvalidConfig(
                "cluster_std must be positive".into(),
            ));
        }
        if let CentroidInit::OffsetFromCenters { offset } = self.centroid_init {
            if !offset.is_finite() {
                return Err(BenchError::InvalidConfig(
                    "centroid offset must be finite".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Generated points plus the initial centroids handed to every backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Shuffled sample values.
    pub points: Array1<f64>,
    /// Initial centroids, one per cluster.
    pub centroids: Array1<f64>,
    pub n_clusters: usize,
    pub seed: u64,
}

impl Dataset {
    pub fn n_points(&self) -> usize {
        self.points.len()
    }

    /// Persist points and centroids, one value per line with six decimals.
    pub fn write(&self, files: &DatasetFiles) -> Result<()> {
        write_series(&files.points, self.points.iter().copied())?;
        write_series(&files.centroids, self.centroids.iter().copied())?;
        tracing::info!(
            points = ?files.points,
            centroids = ?files.centroids,
            n = self.n_points(),
            k = self.n_clusters,
            "wrote dataset files"
        );
        Ok(())
    }
}

/// Number of samples drawn for each cluster. The remainder of
/// `n_points / n_clusters` goes to the leading clusters.
pub fn cluster_sizes(n_points: usize, n_clusters: usize) -> Vec<usize> {
    if n_clusters == 0 {
        return Vec::new();
    }
    let base = n_points / n_clusters;
    let remainder = n_points % n_clusters;
    (0..n_clusters)
        .map(|i| base + usize::from(i < remainder))
        .collect()
}

/// Cluster centres spaced linearly over `range`, endpoints included.
pub fn cluster_centers(n_clusters: usize, range: (f64, f64)) -> Vec<f64> {
    let (lo, hi) = range;
    match n_clusters {
        0 => Vec::new(),
        1 => vec![lo],
        k => {
            let step = (hi - lo) / (k - 1) as f64;
            (0..k).map(|i| lo + step * i as f64).collect()
        }
    }
}

/// Generate a clustered 1-D dataset. Identical arguments always yield
/// identical point and centroid sequences.
pub fn generate(
    n_points: usize,
    n_clusters: usize,
    seed: u64,
    config: &SynthesisConfig,
) -> Result<Dataset> {
    if n_points == 0 {
        return Err(BenchError::InvalidConfig(
            "n_points must be greater than zero".into(),
        ));
    }
    if n_clusters == 0 {
        return Err(BenchError::InvalidConfig(
            "n_clusters must be greater than zero".into(),
        ));
    }
    config.validate()?;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let centers = cluster_centers(n_clusters, config.center_range);

    let mut data = Vec::with_capacity(n_points);
    for (&center, count) in centers.iter().zip(cluster_sizes(n_points, n_clusters)) {
        let normal = Normal::new(center, config.cluster_std)
            .map_err(|err| BenchError::InvalidConfig(format!("cluster distribution: {err}")))?;
        data.extend(normal.sample_iter(&mut rng).take(count));
    }
    data.shuffle(&mut rng);

    let centroids = match config.centroid_init {
        CentroidInit::UniformRange => {
            let (min, max) = data
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                });
            let uniform = Uniform::new_inclusive(min, max);
            (0..n_clusters).map(|_| uniform.sample(&mut rng)).collect()
        }
        CentroidInit::OffsetFromCenters { offset } => {
            centers.iter().map(|center| center + offset).collect()
        }
    };

    tracing::debug!(n_points, n_clusters, seed, "synthesised dataset");
    Ok(Dataset {
        points: Array1::from_vec(data),
        centroids: Array1::from_vec(centroids),
        n_clusters,
        seed,
    })
}

fn write_series<P: AsRef<Path>>(path: P, values: impl Iterator<Item = f64>) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .terminator(Terminator::Any(b'\n'))
        .from_path(path)?;
    for value in values {
        writer.write_record([format!("{value:.6}")])?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a one-value-per-line file produced by [`Dataset::write`].
pub fn load_series<P: AsRef<Path>>(path: P) -> Result<Vec<f64>> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(BenchError::InputMissing(path.to_path_buf()));
    }
    let mut rdr = ReaderBuilder::new().has_headers(false).from_path(path)?;
    let mut values = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        let field = record.get(0).map(str::trim).unwrap_or_default();
        if field.is_empty() {
            return Err(BenchError::InvalidData(format!(
                "{}: empty value on line {}",
                path.display(),
                line + 1
            )));
        }
        values.push(field.parse()?);
    }
    Ok(values)
}

/// Location of the points/centroids pair for one dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetFiles {
    pub points: PathBuf,
    pub centroids: PathBuf,
}

impl DatasetFiles {
    /// `dados_<label>.csv` and `centroides_<label>.csv` inside `dir`.
    pub fn for_label<P: AsRef<Path>>(dir: P, label: &str) -> Self {
        let dir = dir.as_ref();
        Self {
            points: dir.join(format!("dados_{label}.csv")),
            centroids: dir.join(format!("centroides_{label}.csv")),
        }
    }

    /// Fail with [`BenchError::InputMissing`] unless both files exist.
    pub fn ensure_present(&self) -> Result<()> {
        for path in [&self.points, &self.centroids] {
            if !path.is_file() {
                return Err(BenchError::InputMissing(path.clone()));
            }
        }
        Ok(())
    }

    /// Load both files and check the centroid count against `expected_k`.
    pub fn load(&self, expected_k: usize) -> Result<(Vec<f64>, Vec<f64>)> {
        self.ensure_present()?;
        let points = load_series(&self.points)?;
        let centroids = load_series(&self.centroids)?;
        if centroids.len() != expected_k {
            return Err(BenchError::InvalidData(format!(
                "{} holds {} centroids, expected {expected_k}",
                self.centroids.display(),
                centroids.len()
            )));
        }
        Ok((points, centroids))
    }
}

/// Shape and file label of one dataset size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetPreset {
    pub n_points: usize,
    pub n_clusters: usize,
    /// Suffix used in the dataset file names.
    pub file_label: String,
}

/// Presets for every [`DatasetSize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetCatalog {
    presets: BTreeMap<DatasetSize, DatasetPreset>,
}

impl Default for DatasetCatalog {
    fn default() -> Self {
        let preset = |n_points, n_clusters, label: &str| DatasetPreset {
            n_points,
            n_clusters,
            file_label: label.to_string(),
        };
        Self {
            presets: BTreeMap::from([
                (DatasetSize::Small, preset(10_000, 4, "pequeno")),
                (DatasetSize::Medium, preset(100_000, 8, "medio")),
                (DatasetSize::Large, preset(1_000_000, 16, "grande")),
            ]),
        }
    }
}

impl DatasetCatalog {
    pub fn new(presets: BTreeMap<DatasetSize, DatasetPreset>) -> Self {
        Self { presets }
    }

    pub fn preset(&self, size: DatasetSize) -> Option<&DatasetPreset> {
        self.presets.get(&size)
    }

    pub fn n_points(&self, size: DatasetSize) -> Option<usize> {
        self.preset(size).map(|preset| preset.n_points)
    }

    /// Size class whose preset has exactly `n_points` points.
    pub fn size_for_points(&self, n_points: usize) -> Option<DatasetSize> {
        self.presets
            .iter()
            .find(|(_, preset)| preset.n_points == n_points)
            .map(|(&size, _)| size)
    }

    /// Size class whose preset point count is closest to `n_points` on a
    /// log scale. Exact matches win; ties go to the smaller class.
    pub fn nearest_size(&self, n_points: usize) -> Option<DatasetSize> {
        if n_points == 0 {
            return None;
        }
        let target = (n_points as f64).ln();
        self.presets
            .iter()
            .filter(|(_, preset)| preset.n_points > 0)
            .map(|(&size, preset)| (size, ((preset.n_points as f64).ln() - target).abs()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(size, _)| size)
    }

    pub fn iter(&self) -> impl Iterator<Item = (DatasetSize, &DatasetPreset)> {
        self.presets.iter().map(|(&size, preset)| (size, preset))
    }

    pub fn files<P: AsRef<Path>>(&self, dir: P, size: DatasetSize) -> Option<DatasetFiles> {
        self.preset(size)
            .map(|preset| DatasetFiles::for_label(dir, &preset.file_label))
    }

    pub fn validate(&self) -> Result<()> {
        for (size, preset) in self.iter() {
            if preset.n_points == 0 || preset.n_clusters == 0 {
                return Err(BenchError::InvalidConfig(format!(
                    "dataset preset '{size}' needs positive n_points and n_clusters"
                )));
            }
            if preset.file_label.trim().is_empty() {
                return Err(BenchError::InvalidConfig(format!(
                    "dataset preset '{size}' has an empty file label"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_dataset_has_requested_shape() {
        let dataset = generate(1_003, 7, 9, &SynthesisConfig::default()).expect("generation");
        assert_eq!(dataset.n_points(), 1_003);
        assert_eq!(dataset.centroids.len(), 7);
        assert_eq!(dataset.n_clusters, 7);
    }

    #[test]
    fn remainder_goes_to_leading_clusters() {
        let sizes = cluster_sizes(10, 4);
        assert_eq!(sizes, vec![3, 3, 2, 2]);
        for (n, k) in [(10_000, 3), (7, 7), (5, 8), (1_000_001, 16)] {
            assert_eq!(cluster_sizes(n, k).iter().sum::<usize>(), n);
        }
    }

    #[test]
    fn identical_seed_reproduces_points() {
        let config = SynthesisConfig::default();
        let first = generate(10_000, 4, 42, &config).unwrap();
        let second = generate(10_000, 4, 42, &config).unwrap();
        let first_bits: Vec<u64> = first.points.iter().map(|v| v.to_bits()).collect();
        let second_bits: Vec<u64> = second.points.iter().map(|v| v.to_bits()).collect();
        assert_eq!(first_bits, second_bits);
        assert_eq!(first.centroids, second.centroids);

        let other = generate(10_000, 4, 43, &config).unwrap();
        assert_ne!(first.points, other.points);
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let config = SynthesisConfig::default();
        assert!(matches!(
            generate(0, 4, 1, &config),
            Err(BenchError::InvalidConfig(_))
        ));
        assert!(matches!(
            generate(100, 0, 1, &config),
            Err(BenchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn centers_span_configured_range() {
        assert_eq!(cluster_centers(3, (-10.0, 10.0)), vec![-10.0, 0.0, 10.0]);
        assert_eq!(cluster_centers(1, (10.0, 100.0)), vec![10.0]);
    }

    #[test]
    fn uniform_centroids_stay_within_data_range() {
        let dataset = generate(500, 5, 3, &SynthesisConfig::default()).unwrap();
        let min = dataset.points.iter().copied().fold(f64::INFINITY, f64::min);
        let max = dataset.points.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert!(dataset.centroids.iter().all(|&c| (min..=max).contains(&c)));
    }

    #[test]
    fn offset_centroids_follow_true_centers() {
        let config = SynthesisConfig {
            center_range: (10.0, 100.0),
            centroid_init: CentroidInit::OffsetFromCenters { offset: 1.5 },
            ..SynthesisConfig::default()
        };
        let dataset = generate(40, 4, 1, &config).unwrap();
        assert_eq!(dataset.centroids.to_vec(), vec![11.5, 41.5, 71.5, 101.5]);
    }

    #[test]
    fn written_files_load_back_with_six_decimals() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = generate(250, 4, 42, &SynthesisConfig::default()).unwrap();
        let files = DatasetFiles::for_label(dir.path(), "pequeno");
        dataset.write(&files).unwrap();

        let text = std::fs::read_to_string(&files.points).unwrap();
        assert_eq!(text.lines().count(), 250);
        assert!(text
            .lines()
            .all(|line| line.split('.').nth(1).map(str::len) == Some(6)));

        let (points, centroids) = files.load(4).unwrap();
        assert_eq!(points.len(), 250);
        assert_eq!(centroids.len(), 4);
        assert!((points[0] - dataset.points[0]).abs() < 1e-6);
        assert!(matches!(files.load(5), Err(BenchError::InvalidData(_))));
    }

    #[test]
    fn missing_files_report_input_missing() {
        let dir = tempfile::tempdir().unwrap();
        let files = DatasetFiles::for_label(dir.path(), "grande");
        match files.ensure_present() {
            Err(BenchError::InputMissing(path)) => assert_eq!(path, files.points),
            other => panic!("expected InputMissing, got {other:?}"),
        }
    }

    #[test]
    fn catalog_maps_point_counts_to_sizes() {
        let catalog = DatasetCatalog::default();
        assert_eq!(catalog.size_for_points(100_000), Some(DatasetSize::Medium));
        assert_eq!(catalog.size_for_points(12), None);
        assert_eq!(catalog.n_points(DatasetSize::Large), Some(1_000_000));
        catalog.validate().unwrap();
    }

    #[test]
    fn unknown_point_counts_fall_back_to_nearest_preset() {
        let catalog = DatasetCatalog::default();
        assert_eq!(catalog.nearest_size(10_000), Some(DatasetSize::Small));
        assert_eq!(catalog.nearest_size(50_000), Some(DatasetSize::Medium));
        assert_eq!(catalog.nearest_size(12), Some(DatasetSize::Small));
        assert_eq!(catalog.nearest_size(5_000_000), Some(DatasetSize::Large));
        assert_eq!(catalog.nearest_size(0), None);
        assert_eq!(DatasetCatalog::new(BTreeMap::new()).nearest_size(10), None);
    }
}

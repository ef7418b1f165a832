//! Top-level configuration, optionally loaded from a JSON file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dataset::{DatasetCatalog, SynthesisConfig};
use crate::harness::HarnessCommand;
use crate::metrics::BaselinePolicy;
use crate::verify::DEFAULT_TOLERANCE;
use crate::vocabulary::MarkerVocabulary;
use crate::{BenchError, Result};

/// Every tunable of the toolkit. Fields missing from a config file keep
/// their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Dataset presets per size class.
    pub catalog: DatasetCatalog,
    /// Synthetic generator constants.
    pub synthesis: SynthesisConfig,
    /// Seed of the synthetic generator.
    pub seed: u64,
    /// Log markers and metric patterns.
    pub vocabulary: MarkerVocabulary,
    /// Baseline selection for speedup computations.
    pub baseline: BaselinePolicy,
    /// Upper bound (exclusive) on the SSE standard deviation.
    pub tolerance: f64,
    /// External test harness.
    pub harness: HarnessCommand,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            catalog: DatasetCatalog::default(),
            synthesis: SynthesisConfig::default(),
            seed: 42,
            vocabulary: MarkerVocabulary::default(),
            baseline: BaselinePolicy::default(),
            tolerance: DEFAULT_TOLERANCE,
            harness: HarnessCommand::default(),
        }
    }
}

impl BenchConfig {
    /// Load a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(BenchError::InputMissing(path.to_path_buf()));
        }
        let config: BenchConfig = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        config.validate()?;
        tracing::debug!(path = ?path, "loaded configuration");
        Ok(config)
    }

    /// Persist as pretty JSON, e.g. to bootstrap a config file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.catalog.validate()?;
        self.synthesis.validate()?;
        self.vocabulary.compile()?;
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(BenchError::InvalidConfig(
                "tolerance must be a positive number".into(),
            ));
        }
        if let BaselinePolicy::Reference(times) = &self.baseline {
            if let Some((size, time)) = times.iter().find(|(_, t)| !(t.is_finite() && **t > 0.0)) {
                return Err(BenchError::InvalidConfig(format!(
                    "reference time for '{size}' must be positive (got {time})"
                )));
            }
        }
        if self.harness.program.trim().is_empty() {
            return Err(BenchError::InvalidConfig(
                "harness program must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Backend, DatasetSize};

    #[test]
    fn defaults_validate() {
        BenchConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.json");
        std::fs::write(
            &path,
            r#"{
                "tolerance": 0.01,
                "baseline": {"reference": {"large": 1265.2}},
                "vocabulary": {
                    "datasets": [{"pattern": "\\bTINY\\b", "size": "small"}],
                    "backends": [{"pattern": "(\\d+) workers", "kind": "process-parallel"}],
                    "iterations": "iters=(\\d+)",
                    "sse": "sse=([0-9.]+)",
                    "time_ms": "ms=([0-9.]+)",
                    "implicit_backend": "serial"
                }
            }"#,
        )
        .unwrap();

        let config = BenchConfig::load(&path).unwrap();
        assert_eq!(config.tolerance, 0.01);
        assert_eq!(config.seed, 42);
        assert_eq!(config.vocabulary.implicit_backend, Some(Backend::Serial));
        assert_eq!(config.catalog, DatasetCatalog::default());
        match &config.baseline {
            BaselinePolicy::Reference(times) => assert_eq!(times[&DatasetSize::Large], 1265.2),
            other => panic!("unexpected policy {other:?}"),
        }
    }

    #[test]
    fn round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.json");
        let config = BenchConfig {
            tolerance: 5e-4,
            baseline: BaselinePolicy::MinParallelism,
            ..BenchConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(BenchConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn non_positive_tolerance_is_rejected() {
        let config = BenchConfig {
            tolerance: 0.0,
            ..BenchConfig::default()
        };
        assert!(matches!(config.validate(), Err(BenchError::InvalidConfig(_))));
    }

    #[test]
    fn missing_file_is_input_missing() {
        assert!(matches!(
            BenchConfig::load("no/such/bench.json"),
            Err(BenchError::InputMissing(_))
        ));
    }
}

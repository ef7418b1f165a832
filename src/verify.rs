//! Cross-backend SSE consistency check.
//!
//! Every backend runs the same deterministic algorithm from the same initial
//! centroids, so their final SSE may differ only by floating-point reduction
//! order. A spread above the tolerance points at a broken backend.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::ingest::RunLog;
use crate::model::{DatasetSize, RunRecord};

/// Default upper bound (exclusive) on the SSE standard deviation.
pub const DEFAULT_TOLERANCE: f64 = 1e-3;

/// Summary of the SSE values of a group of runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Verification {
    /// Records that carried an SSE value.
    pub samples: usize,
    pub mean_sse: f64,
    /// Population standard deviation.
    pub std_sse: f64,
    pub tolerance: f64,
    pub consistent: bool,
}

/// Mean and standard deviation of `sse` over the records that have one.
pub fn verify<'a, I>(records: I, tolerance: f64) -> Verification
where
    I: IntoIterator<Item = &'a RunRecord>,
{
    let sses: Vec<f64> = records.into_iter().filter_map(|record| record.sse).collect();
    if sses.is_empty() {
        return Verification {
            samples: 0,
            mean_sse: 0.0,
            std_sse: 0.0,
            tolerance,
            consistent: true,
        };
    }

    // Deviations are taken from the first sample so identical inputs give an
    // exact zero spread regardless of summation rounding.
    let n = sses.len() as f64;
    let pivot = sses[0];
    let shift = sses.iter().map(|v| v - pivot).sum::<f64>() / n;
    let variance = sses
        .iter()
        .map(|v| {
            let diff = v - pivot - shift;
            diff * diff
        })
        .sum::<f64>()
        / n;
    let std = variance.sqrt();

    Verification {
        samples: sses.len(),
        mean_sse: pivot + shift,
        std_sse: std,
        tolerance,
        consistent: std < tolerance,
    }
}

/// Verify each dataset's backends separately.
pub fn verify_by_dataset(log: &RunLog, tolerance: f64) -> BTreeMap<DatasetSize, Verification> {
    log.datasets()
        .into_iter()
        .map(|size| {
            let verification = verify(log.for_dataset(size).map(|(_, record)| record), tolerance);
            if !verification.consistent {
                tracing::warn!(
                    dataset = %size,
                    std_sse = verification.std_sse,
                    tolerance,
                    "SSE diverges across backends"
                );
            }
            (size, verification)
        })
        .collect()
}

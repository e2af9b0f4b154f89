//! Forecast outputs of one inference cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One written forecast grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastOutput {
    pub lead_minutes: f64,
    pub valid_time: DateTime<Utc>,
    pub path: PathBuf,
}

/// All K outputs of one cycle. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSet {
    /// Timestamp of the last observed frame in the window
    pub base_time: DateTime<Utc>,
    pub output_dir: PathBuf,
    pub outputs: Vec<ForecastOutput>,
}

impl ForecastSet {
    pub fn lead_minutes(&self) -> Vec<f64> {
        self.outputs.iter().map(|o| o.lead_minutes).collect()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// Lead time `k` (0-based) for a given spacing.
pub fn lead_minutes_for_step(step: usize, spacing_minutes: f64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let n = (step + 1) as f64;
    n * spacing_minutes
}

/// `base + lead`, rounded to the nearest second.
pub fn valid_time(base: DateTime<Utc>, lead_minutes: f64) -> DateTime<Utc> {
    #[allow(clippy::cast_possible_truncation)]
    let secs = (lead_minutes * 60.0).round() as i64;
    base + chrono::Duration::seconds(secs)
}

//! Fold generation for time-ordered data.
//!
//! Two strategies are supported:
//! - Expanding-origin temporal split: fixed fold count, newest test window first
//! - Rolling window split: fixed-size training window sliding forward
//!
//! Both are pure index arithmetic over `n_samples` rows that are already in
//! chronological order. A degenerate window ends iteration instead of
//! producing a malformed fold.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("n_splits must be at least 1")]
    ZeroSplits,

    #[error("step_size must be at least 1")]
    ZeroStep,

    #[error("Unsupported split strategy: {0}")]
    UnknownStrategy(String),
}

/// A single train/test split over row positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldPlan {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

impl FoldPlan {
    /// Build a plan from two contiguous ranges.
    pub fn from_ranges(train: Range<usize>, test: Range<usize>) -> Self {
        Self {
            train_indices: train.collect(),
            test_indices: test.collect(),
        }
    }

    pub fn train_size(&self) -> usize {
        self.train_indices.len()
    }

    pub fn test_size(&self) -> usize {
        self.test_indices.len()
    }

    /// Rows strictly between the last training row and the first test row.
    pub fn gap(&self) -> Option<usize> {
        let last_train = *self.train_indices.iter().max()?;
        let first_test = *self.test_indices.iter().min()?;
        Some(first_test.saturating_sub(last_train + 1))
    }

    /// True when no training row is at or after the first test row.
    pub fn is_leak_free(&self) -> bool {
        match (self.train_indices.iter().max(), self.test_indices.iter().min()) {
            (Some(last_train), Some(first_test)) => last_train < first_test,
            _ => true,
        }
    }
}

/// Configuration for the expanding-origin temporal split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalSplitConfig {
    /// Maximum number of folds.
    pub n_splits: usize,
    /// Test window length. Defaults to `n_samples / (n_splits + 1)`.
    pub test_size: Option<usize>,
    /// Cap on training window length.
    pub max_train_size: Option<usize>,
    /// Rows excluded between training and test windows.
    pub gap: usize,
}

impl Default for TemporalSplitConfig {
    fn default() -> Self {
        Self {
            n_splits: 5,
            test_size: None,
            max_train_size: None,
            gap: 0,
        }
    }
}

impl TemporalSplitConfig {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            ..Default::default()
        }
    }

    pub fn with_test_size(mut self, test_size: usize) -> Self {
        self.test_size = Some(test_size);
        self
    }

    pub fn with_max_train_size(mut self, max_train_size: usize) -> Self {
        self.max_train_size = Some(max_train_size);
        self
    }

    pub fn with_gap(mut self, gap: usize) -> Self {
        self.gap = gap;
        self
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        if self.n_splits == 0 {
            return Err(PlanError::ZeroSplits);
        }
        Ok(())
    }

    /// Generate folds, most recent test window first.
    ///
    /// Stops early, without error, once the remaining rows cannot hold a
    /// non-empty test window and a non-empty training window.
    pub fn generate(&self, n_samples: usize) -> Result<Vec<FoldPlan>, PlanError> {
        self.validate()?;

        let test_size = self
            .test_size
            .unwrap_or(n_samples / (self.n_splits + 1));
        let mut folds = Vec::with_capacity(self.n_splits);

        for i in 0..self.n_splits {
            let Some(test_end) = i
                .checked_mul(test_size)
                .and_then(|offset| n_samples.checked_sub(offset))
            else {
                break;
            };
            let test_start = match test_end.checked_sub(test_size) {
                Some(start) if start > 0 => start,
                _ => break,
            };
            if test_end <= test_start {
                break;
            }

            let train_end = match test_start.checked_sub(self.gap) {
                Some(end) if end > 0 => end,
                _ => break,
            };
            let train_start = match self.max_train_size {
                Some(cap) => train_end.saturating_sub(cap),
                None => 0,
            };
            if train_end <= train_start {
                break;
            }

            folds.push(FoldPlan::from_ranges(
                train_start..train_end,
                test_start..test_end,
            ));
        }

        Ok(folds)
    }
}

/// Configuration for the rolling window split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollingSplitConfig {
    /// Training window length.
    pub window_size: usize,
    /// Rows advanced per fold; also the test window length.
    pub step_size: usize,
    /// First test row.
    pub min_train_size: usize,
}

impl Default for RollingSplitConfig {
    fn default() -> Self {
        Self {
            window_size: 1000,
            step_size: 1,
            min_train_size: 100,
        }
    }
}

impl RollingSplitConfig {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size,
            ..Default::default()
        }
    }

    pub fn with_step_size(mut self, step_size: usize) -> Self {
        self.step_size = step_size;
        self
    }

    pub fn with_min_train_size(mut self, min_train_size: usize) -> Self {
        self.min_train_size = min_train_size;
        self
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        if self.step_size == 0 {
            return Err(PlanError::ZeroStep);
        }
        Ok(())
    }

    /// Generate folds, oldest first.
    pub fn generate(&self, n_samples: usize) -> Result<Vec<FoldPlan>, PlanError> {
        self.validate()?;

        let mut folds = Vec::new();
        let mut start = self.min_train_size;

        while start < n_samples {
            let train_start = start.saturating_sub(self.window_size);
            let test_end = n_samples.min(start.saturating_add(self.step_size));

            if start <= train_start || test_end <= start {
                break;
            }

            folds.push(FoldPlan::from_ranges(train_start..start, start..test_end));
            start = start.saturating_add(self.step_size);
        }

        Ok(folds)
    }
}

/// Name of a split strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Temporal,
    Rolling,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Temporal => "temporal",
            Self::Rolling => "rolling",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "temporal" | "time_series" | "expanding" => Ok(Self::Temporal),
            "rolling" | "rolling_window" => Ok(Self::Rolling),
            other => Err(PlanError::UnknownStrategy(other.to_string())),
        }
    }
}

/// A configured split strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SplitStrategy {
    Temporal(TemporalSplitConfig),
    Rolling(RollingSplitConfig),
}

impl SplitStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Temporal(_) => StrategyKind::Temporal,
            Self::Rolling(_) => StrategyKind::Rolling,
        }
    }

    /// Plan folds over `n_samples` chronologically ordered rows.
    pub fn plan(&self, n_samples: usize) -> Result<Vec<FoldPlan>, PlanError> {
        match self {
            Self::Temporal(config) => config.generate(n_samples),
            Self::Rolling(config) => config.generate(n_samples),
        }
    }
}

impl From<TemporalSplitConfig> for SplitStrategy {
    fn from(config: TemporalSplitConfig) -> Self {
        Self::Temporal(config)
    }
}

impl From<RollingSplitConfig> for SplitStrategy {
    fn from(config: RollingSplitConfig) -> Self {
        Self::Rolling(config)
    }
}

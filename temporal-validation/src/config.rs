//! Engine configuration.
//!
//! Loaded from TOML; every field has a default so a partial file (or no
//! file at all) is valid.
//!
//! ```toml
//! target_accuracy = 0.7
//! parallel_folds = true
//!
//! [temporal]
//! n_splits = 5
//! gap = 2
//!
//! [comparison]
//! rolling_window_cap = 500
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metrics::DEFAULT_TARGET_ACCURACY;
use crate::tracking::{PerformanceTracker, DEFAULT_CONSISTENCY_THRESHOLD, DEFAULT_INSTABILITY_THRESHOLD};
use crate::walkforward::{
    ComparisonConfig, PlanError, RollingSplitConfig, SplitStrategy, StrategyKind,
    TemporalSplitConfig, ValidationOrchestrator,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{field} = {value} is out of range: {reason}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error(transparent)]
    Plan(#[from] PlanError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Accuracy at or above which an evaluation counts as meeting target.
    pub target_accuracy: f64,
    /// Accuracy std above which reports flag instability.
    pub instability_threshold: f64,
    /// Achievement rate below which reports flag inconsistency.
    pub consistency_threshold: f64,
    pub temporal: TemporalSplitConfig,
    pub rolling: RollingSplitConfig,
    pub comparison: ComparisonConfig,
    /// Evaluate folds on the rayon pool.
    pub parallel_folds: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_accuracy: DEFAULT_TARGET_ACCURACY,
            instability_threshold: DEFAULT_INSTABILITY_THRESHOLD,
            consistency_threshold: DEFAULT_CONSISTENCY_THRESHOLD,
            temporal: TemporalSplitConfig::default(),
            rolling: RollingSplitConfig::default(),
            comparison: ComparisonConfig::default(),
            parallel_folds: false,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.target_accuracy) {
            return Err(ConfigError::OutOfRange {
                field: "target_accuracy",
                value: self.target_accuracy,
                reason: "must be within [0, 1]",
            });
        }
        if !(self.instability_threshold >= 0.0) {
            return Err(ConfigError::OutOfRange {
                field: "instability_threshold",
                value: self.instability_threshold,
                reason: "must be non-negative",
            });
        }
        if !(0.0..=1.0).contains(&self.consistency_threshold) {
            return Err(ConfigError::OutOfRange {
                field: "consistency_threshold",
                value: self.consistency_threshold,
                reason: "must be within [0, 1]",
            });
        }
        self.temporal.validate()?;
        self.rolling.validate()?;
        if self.comparison.temporal_splits == 0 {
            return Err(PlanError::ZeroSplits.into());
        }
        if self.comparison.rolling_step_size == Some(0) {
            return Err(PlanError::ZeroStep.into());
        }
        Ok(())
    }

    /// Configured split strategy of the given kind.
    pub fn strategy(&self, kind: StrategyKind) -> SplitStrategy {
        match kind {
            StrategyKind::Temporal => self.temporal.clone().into(),
            StrategyKind::Rolling => self.rolling.clone().into(),
        }
    }

    pub fn orchestrator(&self) -> ValidationOrchestrator {
        ValidationOrchestrator::new(self.target_accuracy)
            .with_comparison(self.comparison.clone())
            .with_parallel(self.parallel_folds)
    }

    pub fn tracker(&self) -> PerformanceTracker {
        PerformanceTracker::new(self.target_accuracy)
            .with_thresholds(self.instability_threshold, self.consistency_threshold)
    }
}

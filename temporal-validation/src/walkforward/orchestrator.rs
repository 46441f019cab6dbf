//! Validation orchestration.
//!
//! Runs a model under one or both split strategies, aggregates fold metrics
//! into mean/std summaries, compares strategies and produces rule-based
//! recommendations.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use thiserror::Error;
use tracing::{info, warn};

use crate::data::{Dataset, DatasetError};
use crate::metrics::calculator::nan_as_null;
use crate::metrics::{MetricBundle, MetricsCalculator, MetricsError, DEFAULT_TARGET_ACCURACY};
use crate::model::{Model, ModelError, WeightedEnsemble};

use super::periods::{PlanError, RollingSplitConfig, SplitStrategy, StrategyKind, TemporalSplitConfig};
use super::runner::{FoldError, FoldMetrics, FoldRunner};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid split configuration: {0}")]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Fold(#[from] FoldError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),

    #[error("The {strategy} strategy produced no folds for {n_samples} rows")]
    NoFolds {
        strategy: StrategyKind,
        n_samples: usize,
    },

    #[error("No strategy produced folds for {n_samples} rows")]
    NothingToCompare { n_samples: usize },

    #[error("Need at least 2 rows to split off a validation window, got {n_samples}")]
    TooFewRows { n_samples: usize },

    #[error("Ensemble needs at least one candidate model")]
    EmptyCandidates,

    #[error("Validation fraction {0} must be strictly between 0 and 1")]
    InvalidFraction(f64),
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// One value per metric in the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricSummary {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    #[serde(with = "nan_as_null")]
    pub roc_auc: f64,
    #[serde(with = "nan_as_null")]
    pub average_precision: f64,
    pub mcc: f64,
    #[serde(with = "nan_as_null")]
    pub log_loss: f64,
}

impl MetricSummary {
    fn from_folds(folds: &[FoldMetrics], reduce: impl Fn(&[f64]) -> f64) -> Self {
        let column = |get: fn(&MetricBundle) -> f64| -> f64 {
            let values: Vec<f64> = folds.iter().map(|f| get(&f.metrics)).collect();
            reduce(&values)
        };
        Self {
            accuracy: column(|m| m.accuracy),
            precision: column(|m| m.precision),
            recall: column(|m| m.recall),
            f1_score: column(|m| m.f1_score),
            roc_auc: column(|m| m.roc_auc),
            average_precision: column(|m| m.average_precision),
            mcc: column(|m| m.mcc),
            log_loss: column(|m| m.log_loss),
        }
    }
}

/// Mean importance of one feature across folds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Aggregated outcome of one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub strategy: StrategyKind,
    pub n_folds: usize,
    pub target_accuracy: f64,
    pub mean: MetricSummary,
    /// Population standard deviation across folds.
    pub std: MetricSummary,
    /// `mean.accuracy >= target_accuracy`.
    pub target_met_overall: bool,
    /// Folds in production order.
    pub folds: Vec<FoldMetrics>,
    /// Sorted by descending importance.
    pub feature_importance: Option<Vec<FeatureImportance>>,
}

impl AggregatedResult {
    /// Aggregate folds in the order they were produced.
    ///
    /// A feature missing from an importance vector counts as 0 for that fold.
    pub fn from_folds(
        strategy: StrategyKind,
        target_accuracy: f64,
        folds: Vec<FoldMetrics>,
        importances: Option<&[Vec<f64>]>,
        feature_names: &[String],
    ) -> Self {
        let mean = MetricSummary::from_folds(&folds, |v| v.iter().mean());
        let std = MetricSummary::from_folds(&folds, |v| v.iter().population_std_dev());

        let feature_importance = importances.map(|imps| {
            let mut ranked: Vec<FeatureImportance> = feature_names
                .iter()
                .enumerate()
                .map(|(j, name)| FeatureImportance {
                    feature: name.clone(),
                    importance: imps
                        .iter()
                        .map(|imp| imp.get(j).copied().unwrap_or(0.0))
                        .mean(),
                })
                .collect();
            ranked.sort_by(|a, b| {
                b.importance
                    .partial_cmp(&a.importance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            ranked
        });

        Self {
            strategy,
            n_folds: folds.len(),
            target_accuracy,
            target_met_overall: mean.accuracy >= target_accuracy,
            mean,
            std,
            folds,
            feature_importance,
        }
    }

    /// Fraction of folds whose own accuracy met the target.
    pub fn fold_target_rate(&self) -> f64 {
        if self.folds.is_empty() {
            return 0.0;
        }
        self.folds.iter().filter(|f| f.metrics.target_met).count() as f64 / self.folds.len() as f64
    }

    /// Human-readable summary with a per-fold table.
    pub fn summary(&self) -> String {
        let mut out = String::new();

        out.push_str(&format!("=== {} VALIDATION ===\n\n", self.strategy.as_str().to_uppercase()));
        out.push_str(&format!("Folds: {}\n", self.n_folds));
        out.push_str(&format!(
            "Mean Accuracy: {:.4} (+/- {:.4})\n",
            self.mean.accuracy, self.std.accuracy
        ));
        out.push_str(&format!("Mean F1: {:.4}\n", self.mean.f1_score));
        out.push_str(&format!("Mean ROC-AUC: {:.4}\n", self.mean.roc_auc));
        out.push_str(&format!(
            "Target {:.2}: {}\n\n",
            self.target_accuracy,
            if self.target_met_overall { "MET" } else { "NOT MET" }
        ));

        out.push_str("| Fold | Train | Test | Accuracy | F1     | ROC-AUC |\n");
        out.push_str("|------|-------|------|----------|--------|---------|\n");
        for fold in &self.folds {
            out.push_str(&format!(
                "| {:>4} | {:>5} | {:>4} | {:>8.4} | {:>6.4} | {:>7.4} |\n",
                fold.fold,
                fold.train_size,
                fold.test_size,
                fold.metrics.accuracy,
                fold.metrics.f1_score,
                fold.metrics.roc_auc
            ));
        }

        if let Some(importance) = &self.feature_importance {
            out.push_str("\nTop features:\n");
            for fi in importance.iter().take(10) {
                out.push_str(&format!("  {}: {:.4}\n", fi.feature, fi.importance));
            }
        }

        out
    }
}

/// Outcome of running every strategy on the same data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub results: Vec<AggregatedResult>,
    pub best_strategy: StrategyKind,
    pub best_accuracy: f64,
    pub target_accuracy: f64,
    /// Strategies that produced no folds.
    pub skipped: Vec<StrategyKind>,
}

impl ComparisonResult {
    pub fn best(&self) -> Option<&AggregatedResult> {
        self.results.iter().find(|r| r.strategy == self.best_strategy)
    }

    pub fn get(&self, strategy: StrategyKind) -> Option<&AggregatedResult> {
        self.results.iter().find(|r| r.strategy == strategy)
    }
}

/// Defaults used by [`ValidationOrchestrator::compare_strategies`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    pub temporal_splits: usize,
    /// Rolling window is `min(rolling_window_cap, n / 3)`.
    pub rolling_window_cap: usize,
    /// Overrides the rolling default step of 1.
    pub rolling_step_size: Option<usize>,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            temporal_splits: 5,
            rolling_window_cap: 1000,
            rolling_step_size: None,
        }
    }
}

impl ComparisonConfig {
    pub fn temporal(&self) -> SplitStrategy {
        TemporalSplitConfig::new(self.temporal_splits).into()
    }

    /// Only the window depends on the data; step and first test row keep
    /// the [`RollingSplitConfig`] defaults.
    pub fn rolling(&self, n_samples: usize) -> SplitStrategy {
        let defaults = RollingSplitConfig::default();
        let window = self.rolling_window_cap.min(n_samples / 3);
        let step = self.rolling_step_size.unwrap_or(defaults.step_size);
        RollingSplitConfig::new(window)
            .with_step_size(step)
            .with_min_train_size(defaults.min_train_size)
            .into()
    }
}

/// Runs models through split strategies and aggregates the folds.
#[derive(Debug, Clone)]
pub struct ValidationOrchestrator {
    calculator: MetricsCalculator,
    comparison: ComparisonConfig,
    parallel: bool,
}

impl Default for ValidationOrchestrator {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_ACCURACY)
    }
}

impl ValidationOrchestrator {
    pub fn new(target_accuracy: f64) -> Self {
        Self {
            calculator: MetricsCalculator::new(target_accuracy),
            comparison: ComparisonConfig::default(),
            parallel: false,
        }
    }

    /// Set strategy-comparison defaults.
    pub fn with_comparison(mut self, comparison: ComparisonConfig) -> Self {
        self.comparison = comparison;
        self
    }

    /// Evaluate folds on the rayon pool.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn target_accuracy(&self) -> f64 {
        self.calculator.target_accuracy()
    }

    fn runner(&self) -> FoldRunner {
        FoldRunner::new(self.calculator).with_parallel(self.parallel)
    }

    /// Validate `model` on `dataset` under one strategy.
    ///
    /// Rows are put in chronological order first when the dataset carries
    /// ordering keys.
    pub fn run<M>(
        &self,
        dataset: &Dataset,
        model: &M,
        strategy: &SplitStrategy,
    ) -> ValidationResult<AggregatedResult>
    where
        M: Model + Send + Sync,
    {
        let ordered = dataset.chronological();
        let plans = strategy.plan(ordered.len())?;

        if plans.is_empty() {
            return Err(ValidationError::NoFolds {
                strategy: strategy.kind(),
                n_samples: ordered.len(),
            });
        }

        info!(
            "Running {} validation: {} folds over {} rows",
            strategy.kind(),
            plans.len(),
            ordered.len()
        );

        let run = self.runner().run(&plans, &ordered, model)?;
        let result = AggregatedResult::from_folds(
            strategy.kind(),
            self.target_accuracy(),
            run.folds,
            run.importances.as_deref(),
            ordered.feature_names(),
        );

        info!(
            "{} validation complete: mean accuracy {:.4} (+/- {:.4}), target {}",
            strategy.kind(),
            result.mean.accuracy,
            result.std.accuracy,
            if result.target_met_overall { "met" } else { "not met" }
        );

        Ok(result)
    }

    /// Run the temporal and rolling strategies with default settings and
    /// pick the one with the higher mean accuracy. Ties go to temporal.
    pub fn compare_strategies<M>(&self, dataset: &Dataset, model: &M) -> ValidationResult<ComparisonResult>
    where
        M: Model + Send + Sync,
    {
        let strategies = [
            self.comparison.temporal(),
            self.comparison.rolling(dataset.len()),
        ];

        let mut results: Vec<AggregatedResult> = Vec::new();
        let mut skipped = Vec::new();
        for strategy in &strategies {
            match self.run(dataset, model, strategy) {
                Ok(result) => results.push(result),
                Err(ValidationError::NoFolds { strategy, n_samples }) => {
                    warn!("Skipping {} strategy: no folds for {} rows", strategy, n_samples);
                    skipped.push(strategy);
                }
                Err(e) => return Err(e),
            }
        }

        let mut best: Option<&AggregatedResult> = None;
        for result in &results {
            if best.map_or(true, |b| result.mean.accuracy > b.mean.accuracy) {
                best = Some(result);
            }
        }
        let (best_strategy, best_accuracy) = best
            .map(|b| (b.strategy, b.mean.accuracy))
            .ok_or(ValidationError::NothingToCompare {
                n_samples: dataset.len(),
            })?;

        info!("Best strategy: {} ({:.4})", best_strategy, best_accuracy);

        Ok(ComparisonResult {
            results,
            best_strategy,
            best_accuracy,
            target_accuracy: self.target_accuracy(),
            skipped,
        })
    }

    /// Rule-based guidance for a comparison.
    pub fn recommendations(&self, comparison: &ComparisonResult) -> Vec<String> {
        let mut recs = Vec::new();

        let Some(best) = comparison.best() else {
            return recs;
        };

        recs.push(format!(
            "Use the {} validation strategy (mean accuracy {:.4} across {} folds)",
            best.strategy, best.mean.accuracy, best.n_folds
        ));

        if best.mean.accuracy < comparison.target_accuracy {
            recs.push(format!(
                "Mean accuracy {:.4} is below the {:.2} target. Consider:",
                best.mean.accuracy, comparison.target_accuracy
            ));
            recs.push("Feature engineering: add lagged, rolling-window and interaction features".to_string());
            recs.push("Hyperparameter tuning: search regularisation strength and learning rate".to_string());
            recs.push("Model architecture: try tree ensembles or a weighted ensemble of models".to_string());
            recs.push("More data: extend the history or add related series".to_string());
        }

        recs
    }

    /// Fit each candidate on the leading rows and weight it by accuracy on
    /// the trailing `validation_fraction` of the chronologically ordered data.
    ///
    /// Returns the ensemble (members fitted on the leading rows) and each
    /// candidate's validation metrics.
    pub fn build_ensemble<M: Model>(
        &self,
        dataset: &Dataset,
        candidates: Vec<M>,
        validation_fraction: f64,
    ) -> ValidationResult<(WeightedEnsemble<M>, Vec<MetricBundle>)> {
        if candidates.is_empty() {
            return Err(ValidationError::EmptyCandidates);
        }
        if !(validation_fraction > 0.0 && validation_fraction < 1.0) {
            return Err(ValidationError::InvalidFraction(validation_fraction));
        }

        let ordered = dataset.chronological();
        let n = ordered.len();
        if n < 2 {
            return Err(ValidationError::TooFewRows { n_samples: n });
        }
        let n_valid = ((n as f64 * validation_fraction).round() as usize).clamp(1, n - 1);
        let split = n - n_valid;
        let train_idx: Vec<usize> = (0..split).collect();
        let valid_idx: Vec<usize> = (split..n).collect();
        let train = ordered.select(&train_idx)?;
        let valid = ordered.select(&valid_idx)?;

        let mut members = Vec::with_capacity(candidates.len());
        let mut scores = Vec::with_capacity(candidates.len());
        for (i, candidate) in candidates.iter().enumerate() {
            let mut member = candidate.unfitted();
            member.fit(&train.features(), &train.labels())?;

            let valid_x = valid.features();
            let y_pred = member.predict(&valid_x)?;
            let y_proba = member.predict_proba(&valid_x)?;
            let bundle = self
                .calculator
                .calculate(&valid.labels(), &y_pred, Some(&y_proba))?;

            info!("Ensemble candidate {}: validation accuracy {:.4}", i + 1, bundle.accuracy);
            members.push(member);
            scores.push(bundle);
        }

        let weights = scores.iter().map(|b| b.accuracy).collect();
        let ensemble = WeightedEnsemble::new(members, weights)?;
        Ok((ensemble, scores))
    }
}

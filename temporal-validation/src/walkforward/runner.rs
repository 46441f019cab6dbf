//! Fold execution.
//!
//! For each planned fold: slice the dataset, take an unfitted copy of the
//! caller's model, fit on the training slice, predict on the test slice and
//! score the predictions. The caller's model is never mutated.
//!
//! A failure in any fold aborts the run; folds are never silently dropped.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::data::{Dataset, DatasetError};
use crate::metrics::{MetricBundle, MetricsCalculator, MetricsError};
use crate::model::{Model, ModelError};

use super::periods::FoldPlan;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FoldError {
    #[error("Fold {fold}: dataset error: {source}")]
    Data {
        fold: usize,
        #[source]
        source: DatasetError,
    },

    #[error("Fold {fold}: model fit failed: {source}")]
    Fit {
        fold: usize,
        #[source]
        source: ModelError,
    },

    #[error("Fold {fold}: prediction failed: {source}")]
    Predict {
        fold: usize,
        #[source]
        source: ModelError,
    },

    #[error("Fold {fold}: scoring failed: {source}")]
    Metrics {
        fold: usize,
        #[source]
        source: MetricsError,
    },

    #[error("Fold {fold}: model returned {found} feature importances, expected {expected}")]
    ImportanceLength {
        fold: usize,
        expected: usize,
        found: usize,
    },
}

/// Outcome of one fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldMetrics {
    /// 1-based position in production order.
    pub fold: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub metrics: MetricBundle,
}

/// All folds of one run plus any captured feature importances.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FoldRun {
    pub folds: Vec<FoldMetrics>,
    /// One vector per fold, present only if the model reported importances
    /// for every fold.
    pub importances: Option<Vec<Vec<f64>>>,
}

/// Drives a model through a list of fold plans.
#[derive(Debug, Clone, Copy)]
pub struct FoldRunner {
    calculator: MetricsCalculator,
    parallel: bool,
}

impl FoldRunner {
    pub fn new(calculator: MetricsCalculator) -> Self {
        Self {
            calculator,
            parallel: false,
        }
    }

    /// Evaluate folds on the rayon pool. Each fold still gets its own model
    /// copy and results keep plan order.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Run every fold in plan order.
    pub fn run<M>(&self, plans: &[FoldPlan], dataset: &Dataset, model: &M) -> Result<FoldRun, FoldError>
    where
        M: Model + Send + Sync,
    {
        let outcomes: Vec<(FoldMetrics, Option<Vec<f64>>)> = if self.parallel {
            plans
                .par_iter()
                .enumerate()
                .map(|(i, plan)| self.run_fold(i + 1, plan, dataset, model))
                .collect::<Result<_, _>>()?
        } else {
            plans
                .iter()
                .enumerate()
                .map(|(i, plan)| self.run_fold(i + 1, plan, dataset, model))
                .collect::<Result<_, _>>()?
        };

        let mut folds = Vec::with_capacity(outcomes.len());
        let mut importances = Vec::with_capacity(outcomes.len());
        let mut complete = true;
        for (fold, imp) in outcomes {
            folds.push(fold);
            match imp {
                Some(imp) => importances.push(imp),
                None => complete = false,
            }
        }

        Ok(FoldRun {
            folds,
            importances: (complete && !importances.is_empty()).then_some(importances),
        })
    }

    /// Fit and score a single fold.
    pub fn run_fold<M: Model>(
        &self,
        fold: usize,
        plan: &FoldPlan,
        dataset: &Dataset,
        model: &M,
    ) -> Result<(FoldMetrics, Option<Vec<f64>>), FoldError> {
        let train = dataset
            .select(&plan.train_indices)
            .map_err(|source| FoldError::Data { fold, source })?;
        let test = dataset
            .select(&plan.test_indices)
            .map_err(|source| FoldError::Data { fold, source })?;

        debug!(
            "Fold {}: train {} rows, test {} rows",
            fold,
            train.len(),
            test.len()
        );

        let mut fold_model = model.unfitted();
        fold_model
            .fit(&train.features(), &train.labels())
            .map_err(|source| FoldError::Fit { fold, source })?;

        let test_x = test.features();
        let y_pred = fold_model
            .predict(&test_x)
            .map_err(|source| FoldError::Predict { fold, source })?;
        let y_proba = fold_model
            .predict_proba(&test_x)
            .map_err(|source| FoldError::Predict { fold, source })?;

        let metrics = self
            .calculator
            .calculate(&test.labels(), &y_pred, Some(&y_proba))
            .map_err(|source| FoldError::Metrics { fold, source })?;

        let importances = match fold_model.feature_importances() {
            Some(imp) if imp.len() != dataset.n_features() => {
                return Err(FoldError::ImportanceLength {
                    fold,
                    expected: dataset.n_features(),
                    found: imp.len(),
                })
            }
            other => other,
        };

        debug!(
            "Fold {}: accuracy {:.4}, roc_auc {:.4}",
            fold, metrics.accuracy, metrics.roc_auc
        );

        Ok((
            FoldMetrics {
                fold,
                train_size: train.len(),
                test_size: test.len(),
                metrics,
            },
            importances,
        ))
    }
}

//! Trainable model contract and adapters.
//!
//! The engine drives any type implementing [`Model`]. Adapters provided here:
//! - [`LogisticRegression`]: gradient-descent baseline
//! - [`Pipeline`]: per-fold scaling and feature selection around an inner model
//! - [`WeightedEnsemble`]: validation-weighted average of member probabilities

pub mod ensemble;
pub mod logistic;
pub mod pipeline;

pub use ensemble::WeightedEnsemble;
pub use logistic::{LogisticRegression, LogisticRegressionConfig};
pub use pipeline::{Pipeline, PipelineConfig};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Model has not been fitted")]
    NotFitted,

    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("Expected {expected} features, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Training failed: {0}")]
    Training(String),
}

pub type ModelResult<T> = Result<T, ModelError>;

/// Capability set required from a trainable binary classifier.
///
/// Features are row vectors aligned with the dataset's feature order;
/// labels are 0 or 1.
pub trait Model: Clone {
    /// Fresh, unfitted instance with the same configuration.
    ///
    /// The default is a deep copy; adapters that can drop their fitted
    /// state cheaply should override it.
    fn unfitted(&self) -> Self {
        self.clone()
    }

    fn fit(&mut self, features: &[Vec<f64>], labels: &[u8]) -> ModelResult<()>;

    /// Hard 0/1 predictions.
    fn predict(&self, features: &[Vec<f64>]) -> ModelResult<Vec<u8>>;

    /// Probability of the positive class, in [0, 1].
    fn predict_proba(&self, features: &[Vec<f64>]) -> ModelResult<Vec<f64>>;

    /// Per-feature importance after fitting, aligned to feature order.
    fn feature_importances(&self) -> Option<Vec<f64>> {
        None
    }
}

/// Check that every row has `expected` columns.
pub(crate) fn check_width(features: &[Vec<f64>], expected: usize) -> ModelResult<()> {
    match features.iter().find(|row| row.len() != expected) {
        Some(row) => Err(ModelError::DimensionMismatch {
            expected,
            found: row.len(),
        }),
        None => Ok(()),
    }
}

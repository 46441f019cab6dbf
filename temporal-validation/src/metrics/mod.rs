//! Classification metrics module.
//!
//! Provides the per-evaluation metric bundle:
//! - Accuracy, precision, recall, F1
//! - ROC-AUC, average precision, log loss
//! - Matthews correlation coefficient
//! - Confusion matrix and per-class report

pub mod calculator;

pub use calculator::{
    ClassMetrics, ClassificationReport, ConfusionMatrix, MetricBundle, MetricsCalculator,
    MetricsError, DEFAULT_TARGET_ACCURACY,
};

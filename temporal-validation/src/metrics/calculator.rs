//! Classification metrics calculator.
//!
//! Computes a fixed bundle of binary classification metrics from true
//! labels, hard predictions and, optionally, positive-class probabilities.
//!
//! Rate metrics (precision, recall, F1) resolve zero denominators to 0.0.
//! Probability metrics (ROC-AUC, average precision, log loss) are NaN when
//! undefined, e.g. when `y_true` contains a single class.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default accuracy threshold for `target_met`.
pub const DEFAULT_TARGET_ACCURACY: f64 = 0.65;

/// Probabilities are clipped to `[EPS, 1 - EPS]` for log loss.
const LOG_LOSS_EPS: f64 = 1e-15;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricsError {
    #[error("Length mismatch: y_true has {y_true} values, {other} has {found}")]
    LengthMismatch {
        y_true: usize,
        other: &'static str,
        found: usize,
    },

    #[error("Label {label} at position {index} is not 0 or 1")]
    InvalidLabel { index: usize, label: u8 },

    #[error("Probability {value} at position {index} is outside [0, 1]")]
    InvalidProbability { index: usize, value: f64 },
}

/// Serialize non-finite floats as `null` and read `null` back as NaN.
pub(crate) mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

/// 2x2 confusion matrix for labels {0, 1}.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negatives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub true_positives: u64,
}

impl ConfusionMatrix {
    pub fn from_labels(y_true: &[u8], y_pred: &[u8]) -> Self {
        let mut cm = Self::default();
        for (&t, &p) in y_true.iter().zip(y_pred) {
            match (t, p) {
                (0, 0) => cm.true_negatives += 1,
                (0, _) => cm.false_positives += 1,
                (_, 0) => cm.false_negatives += 1,
                _ => cm.true_positives += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> u64 {
        self.true_negatives + self.false_positives + self.false_negatives + self.true_positives
    }

    /// Rows are true labels, columns predicted labels.
    pub fn as_matrix(&self) -> [[u64; 2]; 2] {
        [
            [self.true_negatives, self.false_positives],
            [self.false_negatives, self.true_positives],
        ]
    }
}

/// Precision, recall and F1 for one class or one average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: u64,
}

/// Per-class breakdown plus macro and support-weighted averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    pub fn from_confusion(cm: &ConfusionMatrix) -> Self {
        let negative = class_metrics(
            "0",
            cm.true_negatives,
            cm.false_negatives,
            cm.false_positives,
        );
        let positive = class_metrics(
            "1",
            cm.true_positives,
            cm.false_positives,
            cm.false_negatives,
        );

        let support = negative.support + positive.support;
        let macro_avg = ClassMetrics {
            label: "macro avg".to_string(),
            precision: (negative.precision + positive.precision) / 2.0,
            recall: (negative.recall + positive.recall) / 2.0,
            f1_score: (negative.f1_score + positive.f1_score) / 2.0,
            support,
        };

        let weight = |a: f64, b: f64| {
            if support == 0 {
                0.0
            } else {
                (a * negative.support as f64 + b * positive.support as f64) / support as f64
            }
        };
        let weighted_avg = ClassMetrics {
            label: "weighted avg".to_string(),
            precision: weight(negative.precision, positive.precision),
            recall: weight(negative.recall, positive.recall),
            f1_score: weight(negative.f1_score, positive.f1_score),
            support,
        };

        Self {
            classes: vec![negative, positive],
            macro_avg,
            weighted_avg,
        }
    }
}

/// Metrics for one class given its true positives and the off-diagonal counts.
fn class_metrics(label: &str, hits: u64, false_alarms: u64, misses: u64) -> ClassMetrics {
    let precision = safe_ratio(hits, hits + false_alarms);
    let recall = safe_ratio(hits, hits + misses);
    ClassMetrics {
        label: label.to_string(),
        precision,
        recall,
        f1_score: f1(precision, recall),
        support: hits + misses,
    }
}

/// Complete metric bundle for one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricBundle {
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
    pub confusion_matrix: ConfusionMatrix,
    pub classification_report: ClassificationReport,
    pub timestamp: DateTime<Utc>,
    pub model_version: Option<String>,
    pub dataset_size: Option<usize>,
    pub target_accuracy: f64,
    /// `accuracy >= target_accuracy`, fixed when the bundle is computed.
    pub target_met: bool,
}

impl MetricBundle {
    /// Tag the bundle with a model version. `target_met` is unchanged.
    pub fn with_model_version(mut self, version: &str) -> Self {
        self.model_version = Some(version.to_string());
        self
    }

    pub fn summary(&self) -> String {
        format!(
            "Classification Metrics\n\
             ======================\n\
             \n\
             Accuracy:          {:.4} (target {:.2}, {})\n\
             Precision:         {:.4}\n\
             Recall:            {:.4}\n\
             F1 Score:          {:.4}\n\
             ROC-AUC:           {:.4}\n\
             Average Precision: {:.4}\n\
             MCC:               {:.4}\n\
             Log Loss:          {:.4}\n\
             \n\
             Confusion Matrix (rows = true, cols = predicted):\n\
             \x20 [{:>6} {:>6}]\n\
             \x20 [{:>6} {:>6}]",
            self.accuracy,
            self.target_accuracy,
            if self.target_met { "met" } else { "not met" },
            self.precision,
            self.recall,
            self.f1_score,
            self.roc_auc,
            self.average_precision,
            self.mcc,
            self.log_loss,
            self.confusion_matrix.true_negatives,
            self.confusion_matrix.false_positives,
            self.confusion_matrix.false_negatives,
            self.confusion_matrix.true_positives,
        )
    }
}

/// Metrics calculator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsCalculator {
    target_accuracy: f64,
}

impl Default for MetricsCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_ACCURACY)
    }
}

impl MetricsCalculator {
    pub fn new(target_accuracy: f64) -> Self {
        Self { target_accuracy }
    }

    pub fn target_accuracy(&self) -> f64 {
        self.target_accuracy
    }

    /// Calculate the full bundle.
    ///
    /// Without `y_proba`, ROC-AUC and average precision score the hard
    /// predictions and log loss is NaN.
    pub fn calculate(
        &self,
        y_true: &[u8],
        y_pred: &[u8],
        y_proba: Option<&[f64]>,
    ) -> Result<MetricBundle, MetricsError> {
        Self::check_inputs(y_true, y_pred, y_proba)?;

        let cm = ConfusionMatrix::from_labels(y_true, y_pred);
        let accuracy = safe_ratio(cm.true_negatives + cm.true_positives, cm.total());
        let precision = safe_ratio(cm.true_positives, cm.true_positives + cm.false_positives);
        let recall = safe_ratio(cm.true_positives, cm.true_positives + cm.false_negatives);

        let (roc_auc, average_precision, log_loss) = match y_proba {
            Some(proba) => (
                Self::roc_auc(y_true, proba),
                Self::average_precision(y_true, proba),
                Self::log_loss(y_true, proba),
            ),
            None => {
                let scores: Vec<f64> = y_pred.iter().map(|&p| p as f64).collect();
                (
                    Self::roc_auc(y_true, &scores),
                    Self::average_precision(y_true, &scores),
                    f64::NAN,
                )
            }
        };

        Ok(MetricBundle {
            accuracy,
            precision,
            recall,
            f1_score: f1(precision, recall),
            roc_auc,
            average_precision,
            mcc: Self::mcc(&cm),
            log_loss,
            confusion_matrix: cm,
            classification_report: ClassificationReport::from_confusion(&cm),
            timestamp: Utc::now(),
            model_version: None,
            dataset_size: Some(y_true.len()),
            target_accuracy: self.target_accuracy,
            target_met: accuracy >= self.target_accuracy,
        })
    }

    fn check_inputs(
        y_true: &[u8],
        y_pred: &[u8],
        y_proba: Option<&[f64]>,
    ) -> Result<(), MetricsError> {
        if y_pred.len() != y_true.len() {
            return Err(MetricsError::LengthMismatch {
                y_true: y_true.len(),
                other: "y_pred",
                found: y_pred.len(),
            });
        }
        if let Some(proba) = y_proba {
            if proba.len() != y_true.len() {
                return Err(MetricsError::LengthMismatch {
                    y_true: y_true.len(),
                    other: "y_proba",
                    found: proba.len(),
                });
            }
            if let Some((index, &value)) = proba
                .iter()
                .enumerate()
                .find(|(_, p)| !(0.0..=1.0).contains(*p))
            {
                return Err(MetricsError::InvalidProbability { index, value });
            }
        }
        if let Some((index, &label)) = y_true
            .iter()
            .chain(y_pred)
            .enumerate()
            .find(|(_, l)| **l > 1)
        {
            return Err(MetricsError::InvalidLabel {
                index: index % y_true.len().max(1),
                label,
            });
        }
        Ok(())
    }

    /// Matthews correlation coefficient; 0 when any marginal is empty.
    fn mcc(cm: &ConfusionMatrix) -> f64 {
        let tp = cm.true_positives as f64;
        let tn = cm.true_negatives as f64;
        let fp = cm.false_positives as f64;
        let fn_ = cm.false_negatives as f64;

        let denom = ((tp + fp) * (tp + fn_) * (tn + fp) * (tn + fn_)).sqrt();
        if denom == 0.0 {
            return 0.0;
        }
        (tp * tn - fp * fn_) / denom
    }

    /// Area under the ROC curve via the rank-sum statistic, ties averaged.
    fn roc_auc(y_true: &[u8], scores: &[f64]) -> f64 {
        let n_pos = y_true.iter().filter(|&&y| y == 1).count() as f64;
        let n_neg = y_true.len() as f64 - n_pos;
        if n_pos == 0.0 || n_neg == 0.0 {
            return f64::NAN;
        }

        let ranks = average_ranks(scores);
        let pos_rank_sum: f64 = ranks
            .iter()
            .zip(y_true)
            .filter(|(_, y)| **y == 1)
            .map(|(r, _)| r)
            .sum();

        (pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg)
    }

    /// Step-wise average precision over distinct score thresholds.
    fn average_precision(y_true: &[u8], scores: &[f64]) -> f64 {
        let n_pos = y_true.iter().filter(|&&y| y == 1).count();
        if n_pos == 0 {
            return f64::NAN;
        }

        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));

        let (mut tp, mut fp) = (0usize, 0usize);
        let mut prev_recall = 0.0;
        let mut ap = 0.0;
        let mut i = 0;

        while i < order.len() {
            let threshold = scores[order[i]];
            // Consume the whole tie group at this threshold
            while i < order.len() && scores[order[i]] == threshold {
                if y_true[order[i]] == 1 {
                    tp += 1;
                } else {
                    fp += 1;
                }
                i += 1;
            }
            let precision = tp as f64 / (tp + fp) as f64;
            let recall = tp as f64 / n_pos as f64;
            ap += (recall - prev_recall) * precision;
            prev_recall = recall;
        }

        ap
    }

    /// Mean negative log-likelihood; NaN for empty or single-class labels.
    fn log_loss(y_true: &[u8], proba: &[f64]) -> f64 {
        let n_pos = y_true.iter().filter(|&&y| y == 1).count();
        if y_true.is_empty() || n_pos == 0 || n_pos == y_true.len() {
            return f64::NAN;
        }

        let total: f64 = y_true
            .iter()
            .zip(proba)
            .map(|(&y, &p)| {
                let p = p.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS);
                if y == 1 {
                    -p.ln()
                } else {
                    -(1.0 - p).ln()
                }
            })
            .sum();

        total / y_true.len() as f64
    }
}

fn safe_ratio(num: u64, denom: u64) -> f64 {
    if denom == 0 {
        0.0
    } else {
        num as f64 / denom as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// 1-based ranks with ties assigned their average rank.
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABELS: [u8; 8] = [0, 0, 1, 1, 0, 1, 1, 0];

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_perfect_predictions() {
        let proba: Vec<f64> = LABELS.iter().map(|&y| y as f64).collect();
        let m = MetricsCalculator::default()
            .calculate(&LABELS, &LABELS, Some(&proba))
            .unwrap();

        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.precision, 1.0);
        assert_eq!(m.recall, 1.0);
        assert_eq!(m.f1_score, 1.0);
        assert_eq!(m.roc_auc, 1.0);
        assert_eq!(m.average_precision, 1.0);
        assert_eq!(m.mcc, 1.0);
        assert!(m.log_loss < 1e-10);
        assert!(m.target_met);
        assert_eq!(m.dataset_size, Some(8));
    }

    #[test]
    fn test_target_boundary_is_inclusive() {
        // 13 of 20 correct = 0.65
        let y_true = vec![1u8; 20];
        let mut y_pred = vec![1u8; 13];
        y_pred.extend(vec![0u8; 7]);
        let m = MetricsCalculator::new(0.65)
            .calculate(&y_true, &y_pred, None)
            .unwrap();
        assert!(close(m.accuracy, 0.65));
        assert!(m.target_met);

        let m = MetricsCalculator::new(0.66)
            .calculate(&y_true, &y_pred, None)
            .unwrap();
        assert!(!m.target_met);
    }

    #[test]
    fn test_known_confusion() {
        let y_true = [1, 1, 1, 0, 0, 0, 0, 1];
        let y_pred = [1, 0, 1, 1, 0, 0, 0, 1];
        let m = MetricsCalculator::default()
            .calculate(&y_true, &y_pred, None)
            .unwrap();

        assert_eq!(m.confusion_matrix.as_matrix(), [[3, 1], [1, 3]]);
        assert!(close(m.accuracy, 0.75));
        assert!(close(m.precision, 0.75));
        assert!(close(m.recall, 0.75));
        assert!(close(m.mcc, 0.5));
        // Hard predictions used as scores
        assert!(close(m.roc_auc, 0.75));
        assert!(m.log_loss.is_nan());

        let report = &m.classification_report;
        assert_eq!(report.classes[0].support, 4);
        assert_eq!(report.classes[1].support, 4);
        assert!(close(report.macro_avg.f1_score, 0.75));
    }

    #[test]
    fn test_zero_division_defaults() {
        // No positive predictions and no positive labels
        let m = MetricsCalculator::default()
            .calculate(&[0, 0, 0], &[0, 0, 0], None)
            .unwrap();
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1_score, 0.0);
        assert_eq!(m.mcc, 0.0);
        assert!(m.roc_auc.is_nan());
        assert!(m.average_precision.is_nan());
    }

    #[test]
    fn test_empty_inputs() {
        let m = MetricsCalculator::default().calculate(&[], &[], None).unwrap();
        assert_eq!(m.accuracy, 0.0);
        assert_eq!(m.f1_score, 0.0);
        assert!(!m.target_met);
        assert!(m.roc_auc.is_nan());
    }

    #[test]
    fn test_roc_auc_with_ties() {
        let y_true = [0, 0, 1, 1];
        let proba = [0.1, 0.4, 0.35, 0.8];
        let m = MetricsCalculator::default()
            .calculate(&y_true, &[0, 0, 0, 1], Some(&proba))
            .unwrap();
        assert!(close(m.roc_auc, 0.75));
        // Thresholds 0.8, 0.4, 0.35, 0.1: AP = 0.5 * 1 + 0.5 * 2/3
        assert!(close(m.average_precision, 0.5 + 1.0 / 3.0));

        let tied = [0.5, 0.5, 0.5, 0.5];
        let m = MetricsCalculator::default()
            .calculate(&y_true, &[0, 0, 1, 1], Some(&tied))
            .unwrap();
        assert!(close(m.roc_auc, 0.5));
        assert!(close(m.average_precision, 0.5));
    }

    #[test]
    fn test_log_loss_value() {
        let m = MetricsCalculator::default()
            .calculate(&[1, 0], &[1, 0], Some(&[0.8, 0.4]))
            .unwrap();
        let expected = -(0.8f64.ln() + 0.6f64.ln()) / 2.0;
        assert!(close(m.log_loss, expected));

        // Single class is undefined
        let m = MetricsCalculator::default()
            .calculate(&[1, 1], &[1, 1], Some(&[0.8, 0.4]))
            .unwrap();
        assert!(m.log_loss.is_nan());
    }

    #[test]
    fn test_input_errors() {
        let calc = MetricsCalculator::default();
        assert!(matches!(
            calc.calculate(&[0, 1], &[0], None),
            Err(MetricsError::LengthMismatch { other: "y_pred", .. })
        ));
        assert!(matches!(
            calc.calculate(&[0, 1], &[0, 1], Some(&[0.2])),
            Err(MetricsError::LengthMismatch { other: "y_proba", .. })
        ));
        assert_eq!(
            calc.calculate(&[0, 1], &[0, 1], Some(&[0.2, 1.5])),
            Err(MetricsError::InvalidProbability { index: 1, value: 1.5 })
        );
        assert_eq!(
            calc.calculate(&[0, 2], &[0, 1], None),
            Err(MetricsError::InvalidLabel { index: 1, label: 2 })
        );
        assert!(matches!(
            calc.calculate(&[0, 1], &[0, 1], Some(&[0.2, f64::NAN])),
            Err(MetricsError::InvalidProbability { index: 1, .. })
        ));
    }

    #[test]
    fn test_model_version_keeps_target_flag() {
        let m = MetricsCalculator::new(0.9)
            .calculate(&[1, 0], &[1, 1], None)
            .unwrap()
            .with_model_version("v2");
        assert_eq!(m.model_version.as_deref(), Some("v2"));
        assert!(!m.target_met);
    }

    #[test]
    fn test_nan_serializes_as_null() {
        let m = MetricsCalculator::default()
            .calculate(&[0, 1], &[0, 1], None)
            .unwrap();
        let json = serde_json::to_value(&m).unwrap();
        assert!(json["log_loss"].is_null());
        assert_eq!(json["accuracy"], 1.0);

        let back: MetricBundle = serde_json::from_value(json).unwrap();
        assert!(back.log_loss.is_nan());
        assert_eq!(back.accuracy, 1.0);
    }

    #[test]
    fn test_average_ranks() {
        assert_eq!(average_ranks(&[3.0, 1.0, 3.0, 2.0]), vec![3.5, 1.0, 3.5, 2.0]);
    }
}

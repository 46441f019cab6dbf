//! Exportable performance report.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use thiserror::Error;

use crate::metrics::MetricBundle;

use super::tracker::TrendEntry;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Report serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_evaluations: usize,
    /// Version filter the report was built with.
    pub model_version: Option<String>,
    pub target_accuracy: f64,
    pub report_timestamp: DateTime<Utc>,
}

/// Accuracy statistics over every matching evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub mean_accuracy: f64,
    pub std_accuracy: f64,
    pub max_accuracy: f64,
    pub min_accuracy: f64,
    pub target_achievement_rate: f64,
}

impl AggregateStats {
    pub(crate) fn from_entries(entries: &[&TrendEntry]) -> Self {
        let accuracies: Vec<f64> = entries.iter().map(|e| e.accuracy).collect();
        let hits = entries.iter().filter(|e| e.target_met).count();
        Self {
            mean_accuracy: accuracies.iter().mean(),
            std_accuracy: accuracies.iter().population_std_dev(),
            max_accuracy: accuracies.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            min_accuracy: accuracies.iter().copied().fold(f64::INFINITY, f64::min),
            target_achievement_rate: hits as f64 / entries.len().max(1) as f64,
        }
    }
}

/// Snapshot of tracked performance, as written by `PerformanceTracker::export`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub summary: ReportSummary,
    pub latest_performance: Option<MetricBundle>,
    pub aggregate_stats: AggregateStats,
    /// Keyed by `"{model_version}_{dataset_name}"`.
    pub performance_trends: BTreeMap<String, Vec<TrendEntry>>,
    pub recommendations: Vec<String>,
}

impl PerformanceReport {
    pub fn to_json(&self) -> Result<String, TrackerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, TrackerError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write as pretty JSON.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), TrackerError> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?).map_err(|source| TrackerError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read a report written by [`PerformanceReport::write`].
    pub fn import(path: impl AsRef<Path>) -> Result<Self, TrackerError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| TrackerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn summary_text(&self) -> String {
        let mut out = String::new();

        out.push_str("=== PERFORMANCE REPORT ===\n\n");
        out.push_str(&format!(
            "Model version: {}\n",
            self.summary.model_version.as_deref().unwrap_or("all")
        ));
        out.push_str(&format!("Evaluations: {}\n", self.summary.total_evaluations));
        out.push_str(&format!("Target accuracy: {:.2}\n", self.summary.target_accuracy));
        out.push_str(&format!(
            "Generated: {}\n\n",
            self.summary.report_timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        ));

        let stats = &self.aggregate_stats;
        out.push_str(&format!(
            "Accuracy: mean {:.4}, std {:.4}, min {:.4}, max {:.4}\n",
            stats.mean_accuracy, stats.std_accuracy, stats.min_accuracy, stats.max_accuracy
        ));
        out.push_str(&format!(
            "Target achievement rate: {:.1}%\n",
            stats.target_achievement_rate * 100.0
        ));

        out.push_str("\nSeries:\n");
        for (key, entries) in &self.performance_trends {
            if let Some(last) = entries.last() {
                out.push_str(&format!(
                    "  {}: {} evaluations, latest accuracy {:.4}\n",
                    key,
                    entries.len(),
                    last.accuracy
                ));
            }
        }

        if !self.recommendations.is_empty() {
            out.push_str("\nRecommendations:\n");
            for rec in &self.recommendations {
                out.push_str(&format!("  - {}\n", rec));
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsCalculator;
    use crate::tracking::PerformanceTracker;

    fn tracker() -> PerformanceTracker {
        let calc = MetricsCalculator::default();
        let tracker = PerformanceTracker::default();
        // Single-class truth leaves ROC-AUC and log loss NaN
        let degenerate = calc.calculate(&[1, 1, 1], &[1, 0, 1], Some(&[0.9, 0.3, 0.8])).unwrap();
        let normal = calc.calculate(&[0, 1, 1, 0], &[0, 1, 1, 0], None).unwrap();
        tracker.record(degenerate, "v1", "daily");
        tracker.record(normal, "v1", "weekly");
        tracker
    }

    #[test]
    fn test_json_uses_null_for_undefined_metrics() {
        let report = tracker().report(None).unwrap();
        let json = report.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        let first = &value["performance_trends"]["v1_daily"][0];
        assert!(first["roc_auc"].is_null());
        assert_eq!(first["dataset_name"], "daily");
        assert!(value["latest_performance"]["log_loss"].is_null());
        assert_eq!(value["summary"]["total_evaluations"], 2);
        assert!(value["aggregate_stats"]["mean_accuracy"].is_f64());
    }

    #[test]
    fn test_json_round_trip() {
        let report = tracker().report(Some("v1")).unwrap();
        let back = PerformanceReport::from_json(&report.to_json().unwrap()).unwrap();

        assert_eq!(back.summary.total_evaluations, report.summary.total_evaluations);
        assert_eq!(back.summary.report_timestamp, report.summary.report_timestamp);
        assert!(
            (back.aggregate_stats.mean_accuracy - report.aggregate_stats.mean_accuracy).abs() < 1e-12
        );
        assert!(back.performance_trends["v1_daily"][0].roc_auc.is_nan());
        assert_eq!(back.recommendations, report.recommendations);
    }

    #[test]
    fn test_import_missing_file() {
        let err = PerformanceReport::import("/nonexistent/report.json").unwrap_err();
        assert!(matches!(err, TrackerError::Io { .. }));
    }

    #[test]
    fn test_summary_text() {
        let text = tracker().report(None).unwrap().summary_text();
        assert!(text.contains("Model version: all"));
        assert!(text.contains("v1_weekly: 1 evaluations"));
    }
}

//! Performance tracker.
//!
//! Append-only history of evaluation results keyed by
//! `(model_version, dataset_name)`, with derived trend and report views.
//! All state sits behind one lock so `record` can be called from
//! concurrent evaluation jobs without losing entries.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::{info, warn};

use crate::metrics::calculator::nan_as_null;
use crate::metrics::{MetricBundle, DEFAULT_TARGET_ACCURACY};

use super::report::{AggregateStats, PerformanceReport, ReportSummary, TrackerError};

/// Accuracy standard deviation above which a report flags instability.
pub const DEFAULT_INSTABILITY_THRESHOLD: f64 = 0.05;

/// Target achievement rate below which a report flags inconsistency.
pub const DEFAULT_CONSISTENCY_THRESHOLD: f64 = 0.8;

/// Identifies one trend series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HistoryKey {
    pub model_version: String,
    pub dataset_name: String,
}

impl HistoryKey {
    pub fn new(model_version: impl Into<String>, dataset_name: impl Into<String>) -> Self {
        Self {
            model_version: model_version.into(),
            dataset_name: dataset_name.into(),
        }
    }

    /// Composite key used in exported reports.
    pub fn export_key(&self) -> String {
        format!("{}_{}", self.model_version, self.dataset_name)
    }
}

impl fmt::Display for HistoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.model_version, self.dataset_name)
    }
}

/// One recorded evaluation in a trend series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendEntry {
    pub timestamp: DateTime<Utc>,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    #[serde(with = "nan_as_null")]
    pub roc_auc: f64,
    pub target_met: bool,
    pub model_version: String,
    pub dataset_name: String,
}

impl TrendEntry {
    fn from_bundle(bundle: &MetricBundle, key: &HistoryKey) -> Self {
        Self {
            timestamp: bundle.timestamp,
            accuracy: bundle.accuracy,
            precision: bundle.precision,
            recall: bundle.recall,
            f1_score: bundle.f1_score,
            roc_auc: bundle.roc_auc,
            target_met: bundle.target_met,
            model_version: key.model_version.clone(),
            dataset_name: key.dataset_name.clone(),
        }
    }

    pub fn key(&self) -> HistoryKey {
        HistoryKey::new(self.model_version.clone(), self.dataset_name.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Declining,
}

impl TrendDirection {
    /// Improving only if the latest accuracy is strictly above the first.
    pub fn between(first: f64, latest: f64) -> Self {
        if latest > first {
            Self::Improving
        } else {
            Self::Declining
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Declining => "declining",
        }
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived view of one trend series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub model_version: String,
    pub dataset_name: String,
    pub n_evaluations: usize,
    pub latest_accuracy: f64,
    pub best_accuracy: f64,
    pub worst_accuracy: f64,
    pub accuracy_trend: TrendDirection,
    pub target_achievement_rate: f64,
    /// Trailing run of target hits, counted back from the latest entry.
    pub consecutive_target_hits: usize,
    /// Population standard deviation of accuracy.
    pub performance_stability: f64,
    pub first_timestamp: DateTime<Utc>,
    pub last_timestamp: DateTime<Utc>,
}

impl TrendSummary {
    /// `None` for an empty series.
    pub fn from_entries(key: &HistoryKey, entries: &[TrendEntry]) -> Option<Self> {
        let first = entries.first()?;
        let latest = entries.last()?;

        let accuracies: Vec<f64> = entries.iter().map(|e| e.accuracy).collect();
        let best = accuracies.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let worst = accuracies.iter().copied().fold(f64::INFINITY, f64::min);
        let hits = entries.iter().filter(|e| e.target_met).count();
        let consecutive = entries.iter().rev().take_while(|e| e.target_met).count();

        Some(Self {
            model_version: key.model_version.clone(),
            dataset_name: key.dataset_name.clone(),
            n_evaluations: entries.len(),
            latest_accuracy: latest.accuracy,
            best_accuracy: best,
            worst_accuracy: worst,
            accuracy_trend: TrendDirection::between(first.accuracy, latest.accuracy),
            target_achievement_rate: hits as f64 / entries.len() as f64,
            consecutive_target_hits: consecutive,
            performance_stability: accuracies.iter().population_std_dev(),
            first_timestamp: first.timestamp,
            last_timestamp: latest.timestamp,
        })
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    trends: BTreeMap<HistoryKey, Vec<TrendEntry>>,
    latest: Option<MetricBundle>,
    latest_by_version: HashMap<String, MetricBundle>,
}

/// Thread-safe performance history.
#[derive(Debug)]
pub struct PerformanceTracker {
    target_accuracy: f64,
    instability_threshold: f64,
    consistency_threshold: f64,
    state: RwLock<TrackerState>,
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_ACCURACY)
    }
}

impl PerformanceTracker {
    pub fn new(target_accuracy: f64) -> Self {
        Self {
            target_accuracy,
            instability_threshold: DEFAULT_INSTABILITY_THRESHOLD,
            consistency_threshold: DEFAULT_CONSISTENCY_THRESHOLD,
            state: RwLock::new(TrackerState::default()),
        }
    }

    /// Override the report thresholds.
    pub fn with_thresholds(mut self, instability: f64, consistency: f64) -> Self {
        self.instability_threshold = instability;
        self.consistency_threshold = consistency;
        self
    }

    pub fn target_accuracy(&self) -> f64 {
        self.target_accuracy
    }

    /// Rebuild a tracker from an exported report.
    pub fn restore(report: &PerformanceReport, target_accuracy: f64) -> Self {
        let tracker = Self::new(target_accuracy);
        {
            let mut state = tracker.state.write();
            for entries in report.performance_trends.values() {
                for entry in entries {
                    state.trends.entry(entry.key()).or_default().push(entry.clone());
                }
            }
            if let Some(bundle) = &report.latest_performance {
                if let Some(version) = &bundle.model_version {
                    state.latest_by_version.insert(version.clone(), bundle.clone());
                }
                state.latest = Some(bundle.clone());
            }
        }
        tracker
    }

    /// Append an evaluation to the `(model_version, dataset_name)` series.
    pub fn record(&self, bundle: MetricBundle, model_version: &str, dataset_name: &str) -> TrendEntry {
        let key = HistoryKey::new(model_version, dataset_name);
        let bundle = bundle.with_model_version(model_version);
        let entry = TrendEntry::from_bundle(&bundle, &key);

        let mut state = self.state.write();
        let series = state.trends.entry(key).or_default();
        series.push(entry.clone());
        let n = series.len();
        state.latest_by_version.insert(model_version.to_string(), bundle.clone());
        state.latest = Some(bundle);
        drop(state);

        info!(
            "Recorded evaluation #{} for {}/{}: accuracy {:.4}",
            n, model_version, dataset_name, entry.accuracy
        );
        entry
    }

    /// Number of recorded evaluations across all series.
    pub fn len(&self) -> usize {
        self.state.read().trends.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recorded series keys.
    pub fn keys(&self) -> Vec<HistoryKey> {
        self.state.read().trends.keys().cloned().collect()
    }

    /// Raw entries of one series, oldest first.
    pub fn history(&self, model_version: &str, dataset_name: &str) -> Vec<TrendEntry> {
        self.state
            .read()
            .trends
            .get(&HistoryKey::new(model_version, dataset_name))
            .cloned()
            .unwrap_or_default()
    }

    /// Trend view of one series; `None` if nothing was recorded for it.
    pub fn trend(&self, model_version: &str, dataset_name: &str) -> Option<TrendSummary> {
        let key = HistoryKey::new(model_version, dataset_name);
        let state = self.state.read();
        TrendSummary::from_entries(&key, state.trends.get(&key)?)
    }

    /// Report over one model version (all datasets) or everything.
    ///
    /// `None` when no evaluations match.
    pub fn report(&self, model_version: Option<&str>) -> Option<PerformanceReport> {
        let state = self.state.read();

        let series: Vec<(&HistoryKey, &Vec<TrendEntry>)> = state
            .trends
            .iter()
            .filter(|(key, _)| model_version.map_or(true, |v| key.model_version == v))
            .collect();

        let entries: Vec<&TrendEntry> = series.iter().flat_map(|(_, e)| e.iter()).collect();
        if entries.is_empty() {
            return None;
        }
        let total_evaluations = entries.len();
        let aggregate_stats = AggregateStats::from_entries(&entries);

        // Distinct keys can share an export key ("v1_a"/"b" and "v1"/"a_b"),
        // so colliding series are merged in timestamp order.
        let mut performance_trends: BTreeMap<String, Vec<TrendEntry>> = BTreeMap::new();
        for (key, entries) in &series {
            performance_trends
                .entry(key.export_key())
                .or_default()
                .extend(entries.iter().cloned());
        }
        for merged in performance_trends.values_mut() {
            merged.sort_by_key(|e| e.timestamp);
        }

        let latest_performance = match model_version {
            Some(v) => state.latest_by_version.get(v).cloned(),
            None => state.latest.clone(),
        };
        drop(state);

        let recommendations = self.recommendations(latest_performance.as_ref(), &aggregate_stats);

        Some(PerformanceReport {
            summary: ReportSummary {
                total_evaluations,
                model_version: model_version.map(str::to_string),
                target_accuracy: self.target_accuracy,
                report_timestamp: Utc::now(),
            },
            latest_performance,
            aggregate_stats,
            performance_trends,
            recommendations,
        })
    }

    fn recommendations(&self, latest: Option<&MetricBundle>, stats: &AggregateStats) -> Vec<String> {
        let mut recs = Vec::new();
        let latest_accuracy = latest.map_or(stats.mean_accuracy, |b| b.accuracy);
        let latest_met = latest_accuracy >= self.target_accuracy;

        if !latest_met {
            recs.push(format!(
                "Accuracy {:.4} is {:.4} below the {:.2} target; tune hyperparameters or revisit features",
                latest_accuracy,
                self.target_accuracy - latest_accuracy,
                self.target_accuracy
            ));
        }

        if stats.std_accuracy > self.instability_threshold {
            recs.push(format!(
                "Accuracy is unstable (std {:.4} > {:.2}); consider stronger regularization or more training data",
                stats.std_accuracy, self.instability_threshold
            ));
        }

        if stats.target_achievement_rate < self.consistency_threshold {
            recs.push(format!(
                "Target met in only {:.1}% of evaluations; performance is inconsistent",
                stats.target_achievement_rate * 100.0
            ));
        } else if latest_met {
            recs.push(
                "Target consistently met; consider promoting to production or starting an A/B test"
                    .to_string(),
            );
        }

        recs
    }

    /// Write the report as pretty JSON and return it.
    ///
    /// Writes nothing and returns `None` when no evaluations match.
    pub fn export(
        &self,
        path: impl AsRef<Path>,
        model_version: Option<&str>,
    ) -> Result<Option<PerformanceReport>, TrackerError> {
        let path = path.as_ref();
        let Some(report) = self.report(model_version) else {
            warn!("No evaluations to export to {}", path.display());
            return Ok(None);
        };
        report.write(path)?;
        info!(
            "Exported {} evaluations to {}",
            report.summary.total_evaluations,
            path.display()
        );
        Ok(Some(report))
    }

    /// Drop all recorded history.
    pub fn reset(&self) {
        let mut state = self.state.write();
        *state = TrackerState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsCalculator;
    use std::sync::Arc;
    use std::thread;

    fn bundle(accuracy: f64) -> MetricBundle {
        let mut b = MetricsCalculator::default()
            .calculate(&[0, 1, 1, 0], &[0, 1, 0, 0], Some(&[0.2, 0.8, 0.4, 0.1]))
            .unwrap();
        b.accuracy = accuracy;
        b.target_met = accuracy >= b.target_accuracy;
        b
    }

    fn bundle_met(met: bool) -> MetricBundle {
        bundle(if met { 0.7 } else { 0.6 })
    }

    #[test]
    fn test_trend_missing_key_is_none() {
        let tracker = PerformanceTracker::default();
        assert!(tracker.trend("v1", "daily").is_none());
        assert!(tracker.report(None).is_none());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_equal_accuracies_classify_as_declining() {
        let tracker = PerformanceTracker::default();
        tracker.record(bundle(0.70), "v1", "daily");
        tracker.record(bundle(0.70), "v1", "daily");

        let trend = tracker.trend("v1", "daily").unwrap();
        assert_eq!(trend.accuracy_trend, TrendDirection::Declining);
        assert_eq!(trend.performance_stability, 0.0);
    }

    #[test]
    fn test_improving_trend() {
        let tracker = PerformanceTracker::default();
        tracker.record(bundle(0.60), "v1", "daily");
        tracker.record(bundle(0.72), "v1", "daily");
        tracker.record(bundle(0.66), "v1", "daily");

        let trend = tracker.trend("v1", "daily").unwrap();
        assert_eq!(trend.accuracy_trend, TrendDirection::Improving);
        assert_eq!(trend.latest_accuracy, 0.66);
        assert_eq!(trend.best_accuracy, 0.72);
        assert_eq!(trend.worst_accuracy, 0.60);
        assert_eq!(trend.n_evaluations, 3);
        assert!(trend.first_timestamp <= trend.last_timestamp);
    }

    #[test]
    fn test_consecutive_target_hits() {
        let tracker = PerformanceTracker::default();
        for met in [true, true, false, true, true, true] {
            tracker.record(bundle_met(met), "v1", "daily");
        }
        let trend = tracker.trend("v1", "daily").unwrap();
        assert_eq!(trend.consecutive_target_hits, 3);
        assert!((trend.target_achievement_rate - 5.0 / 6.0).abs() < 1e-12);

        tracker.record(bundle_met(false), "v1", "daily");
        assert_eq!(tracker.trend("v1", "daily").unwrap().consecutive_target_hits, 0);
    }

    #[test]
    fn test_inclusive_achievement_rate() {
        let tracker = PerformanceTracker::new(0.65);
        for acc in [0.65, 0.70, 0.68, 0.75] {
            tracker.record(bundle(acc), "v1", "daily");
        }
        let trend = tracker.trend("v1", "daily").unwrap();
        assert_eq!(trend.target_achievement_rate, 1.0);

        let report = tracker.report(Some("v1")).unwrap();
        assert_eq!(report.aggregate_stats.target_achievement_rate, 1.0);
        assert_eq!(report.aggregate_stats.max_accuracy, 0.75);
        assert_eq!(report.aggregate_stats.min_accuracy, 0.65);
        assert!((report.aggregate_stats.mean_accuracy - 0.695).abs() < 1e-12);
    }

    #[test]
    fn test_series_are_keyed_by_version_and_dataset() {
        let tracker = PerformanceTracker::default();
        tracker.record(bundle(0.70), "v1", "daily");
        tracker.record(bundle(0.72), "v1", "weekly");
        tracker.record(bundle(0.50), "v2", "daily");

        assert_eq!(tracker.len(), 3);
        assert_eq!(tracker.keys().len(), 3);
        assert_eq!(tracker.history("v1", "daily").len(), 1);

        let v1 = tracker.report(Some("v1")).unwrap();
        assert_eq!(v1.summary.total_evaluations, 2);
        assert_eq!(v1.summary.model_version.as_deref(), Some("v1"));
        assert!(v1.performance_trends.contains_key("v1_daily"));
        assert!(v1.performance_trends.contains_key("v1_weekly"));
        assert!(!v1.performance_trends.contains_key("v2_daily"));
        // Latest bundle for v1, tagged with its version
        let latest = v1.latest_performance.unwrap();
        assert_eq!(latest.accuracy, 0.72);
        assert_eq!(latest.model_version.as_deref(), Some("v1"));

        let all = tracker.report(None).unwrap();
        assert_eq!(all.summary.total_evaluations, 3);
        assert_eq!(all.latest_performance.unwrap().accuracy, 0.50);

        assert!(tracker.report(Some("v3")).is_none());
    }

    #[test]
    fn test_colliding_export_keys_are_merged() {
        let tracker = PerformanceTracker::default();
        tracker.record(bundle(0.60), "v1_a", "b");
        tracker.record(bundle(0.70), "v1", "a_b");
        tracker.record(bundle(0.80), "v1", "a_b");

        let report = tracker.report(None).unwrap();
        assert_eq!(report.summary.total_evaluations, tracker.len());
        assert!((report.aggregate_stats.mean_accuracy - 0.70).abs() < 1e-12);
        assert_eq!(report.performance_trends.len(), 1);
        let merged = &report.performance_trends["v1_a_b"];
        assert_eq!(merged.len(), 3);
        assert!(merged.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        // Entries keep their own key, so restore splits them again
        let restored = PerformanceTracker::restore(&report, 0.65);
        assert_eq!(restored.history("v1_a", "b").len(), 1);
        assert_eq!(restored.history("v1", "a_b").len(), 2);
    }

    #[test]
    fn test_report_recommendations() {
        let tracker = PerformanceTracker::default();
        tracker.record(bundle(0.50), "v1", "daily");
        tracker.record(bundle(0.70), "v1", "daily");
        tracker.record(bundle(0.55), "v1", "daily");

        let recs = tracker.report(None).unwrap().recommendations;
        assert!(recs[0].contains("0.1000 below the 0.65 target"));
        assert!(recs.iter().any(|r| r.contains("unstable")));
        assert!(recs.iter().any(|r| r.contains("33.3%")));
        assert!(!recs.iter().any(|r| r.contains("production")));

        let steady = PerformanceTracker::default();
        for acc in [0.70, 0.71, 0.70] {
            steady.record(bundle(acc), "v1", "daily");
        }
        let recs = steady.report(None).unwrap().recommendations;
        assert_eq!(recs.len(), 1);
        assert!(recs[0].contains("production"));
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let tracker = Arc::new(PerformanceTracker::default());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    for i in 0..25 {
                        let dataset = if i % 2 == 0 { "even" } else { "odd" };
                        tracker.record(bundle(0.7), &format!("v{}", t % 2), dataset);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tracker.len(), 200);
        assert_eq!(tracker.keys().len(), 4);
        assert_eq!(tracker.history("v0", "even").len(), 4 * 13);
    }

    #[test]
    fn test_reset_and_restore() {
        let tracker = PerformanceTracker::default();
        tracker.record(bundle(0.70), "v1", "daily");
        tracker.record(bundle(0.60), "v1", "weekly");

        let report = tracker.report(None).unwrap();
        let restored = PerformanceTracker::restore(&report, 0.65);
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.history("v1", "weekly"), tracker.history("v1", "weekly"));
        assert_eq!(
            restored.report(None).unwrap().latest_performance,
            report.latest_performance
        );

        tracker.reset();
        assert!(tracker.is_empty());
        assert!(tracker.trend("v1", "daily").is_none());
    }
}

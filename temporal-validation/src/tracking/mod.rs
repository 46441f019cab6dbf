//! Performance history and reports.

pub mod report;
pub mod tracker;

pub use report::{AggregateStats, PerformanceReport, ReportSummary, TrackerError};
pub use tracker::{
    HistoryKey, PerformanceTracker, TrendDirection, TrendEntry, TrendSummary,
    DEFAULT_CONSISTENCY_THRESHOLD, DEFAULT_INSTABILITY_THRESHOLD,
};

pub mod config;
pub mod data;
pub mod metrics;
pub mod model;
pub mod tracking;
pub mod walkforward;

// Re-export commonly used types
pub use config::{ConfigError, EngineConfig};
pub use data::{Dataset, DatasetLoader, OrderKey, Record};
pub use metrics::{MetricBundle, MetricsCalculator};
pub use model::{LogisticRegression, Model, Pipeline, PipelineConfig, WeightedEnsemble};
pub use tracking::{PerformanceReport, PerformanceTracker, TrendDirection, TrendSummary};
pub use walkforward::{
    AggregatedResult, ComparisonResult, FoldPlan, RollingSplitConfig, SplitStrategy, StrategyKind,
    TemporalSplitConfig, ValidationError, ValidationOrchestrator,
};

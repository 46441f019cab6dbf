//! Walk-forward validation.
//!
//! - [`periods`]: fold plans for the temporal and rolling strategies
//! - [`runner`]: per-fold fit, predict and score
//! - [`orchestrator`]: aggregation, strategy comparison, ensembles

pub mod orchestrator;
pub mod periods;
pub mod runner;

pub use orchestrator::{
    AggregatedResult, ComparisonConfig, ComparisonResult, FeatureImportance, MetricSummary,
    ValidationError, ValidationOrchestrator, ValidationResult,
};
pub use periods::{
    FoldPlan, PlanError, RollingSplitConfig, SplitStrategy, StrategyKind, TemporalSplitConfig,
};
pub use runner::{FoldError, FoldMetrics, FoldRun, FoldRunner};

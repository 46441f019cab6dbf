//! Temporal validation CLI.
//!
//! # Usage
//!
//! ```bash
//! # Expanding-origin validation of a CSV with a date column
//! temporal-validation validate --data data/signals.csv --label target --order-by date
//!
//! # Rolling window with explicit sizes, exporting the tracked report
//! temporal-validation validate --data data/signals.parquet --label target \
//!     --strategy rolling --window 250 --step 20 --export results/report.json
//!
//! # Run both strategies and print recommendations
//! temporal-validation compare --data data/signals.csv --label target --config engine.toml
//!
//! # Print a previously exported report
//! temporal-validation report --input results/report.json
//! ```

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};

use temporal_validation::walkforward::{AggregatedResult, FoldMetrics};
use temporal_validation::{
    Dataset, DatasetLoader, EngineConfig, LogisticRegression, PerformanceReport,
    PerformanceTracker, Pipeline, PipelineConfig, StrategyKind,
};

const SEPARATOR: &str = "============================================================";

#[derive(Parser)]
#[command(name = "temporal-validation")]
#[command(about = "Time-aware validation and performance tracking for binary classifiers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a model under one split strategy
    Validate {
        #[command(flatten)]
        input: InputArgs,

        /// Split strategy: temporal or rolling
        #[arg(long, default_value = "temporal")]
        strategy: String,

        #[command(flatten)]
        split: SplitArgs,
    },

    /// Run both strategies and recommend one
    Compare {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Print an exported performance report
    Report {
        /// Path to a report written with --export
        #[arg(short, long)]
        input: PathBuf,

        /// Print raw JSON instead of the summary
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct InputArgs {
    /// CSV or Parquet file
    #[arg(short, long)]
    data: PathBuf,

    /// Binary label column
    #[arg(short, long, default_value = "label")]
    label: String,

    /// Chronological ordering column (date or integer)
    #[arg(long)]
    order_by: Option<String>,

    /// Comma-separated feature columns (default: all other columns)
    #[arg(long)]
    features: Option<String>,

    /// Engine configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model version recorded in the tracker
    #[arg(long, default_value = "v1")]
    model_version: String,

    /// Dataset name recorded in the tracker (default: file stem)
    #[arg(long)]
    dataset_name: Option<String>,

    /// Standardize features per fold
    #[arg(long)]
    standardize: bool,

    /// Keep the k features most correlated with the label, per fold
    #[arg(long)]
    top_k: Option<usize>,

    /// Write the tracked performance report here (JSON)
    #[arg(long)]
    export: Option<PathBuf>,

    /// Append one JSON line per run to this file
    #[arg(long)]
    audit_log: Option<PathBuf>,
}

/// Overrides for the configured split strategies.
#[derive(Args)]
struct SplitArgs {
    /// Temporal: number of folds
    #[arg(long)]
    splits: Option<usize>,

    /// Temporal: test window length
    #[arg(long)]
    test_size: Option<usize>,

    /// Temporal: rows skipped between train and test
    #[arg(long)]
    gap: Option<usize>,

    /// Temporal: cap on training window length
    #[arg(long)]
    max_train_size: Option<usize>,

    /// Rolling: training window length
    #[arg(long)]
    window: Option<usize>,

    /// Rolling: rows advanced per fold
    #[arg(long)]
    step: Option<usize>,

    /// Rolling: first test row
    #[arg(long)]
    min_train: Option<usize>,
}

impl SplitArgs {
    fn apply(&self, config: &mut EngineConfig) {
        let temporal = &mut config.temporal;
        if let Some(n) = self.splits {
            temporal.n_splits = n;
        }
        if self.test_size.is_some() {
            temporal.test_size = self.test_size;
        }
        if let Some(gap) = self.gap {
            temporal.gap = gap;
        }
        if self.max_train_size.is_some() {
            temporal.max_train_size = self.max_train_size;
        }

        let rolling = &mut config.rolling;
        if let Some(window) = self.window {
            rolling.window_size = window;
        }
        if let Some(step) = self.step {
            rolling.step_size = step;
        }
        if let Some(min_train) = self.min_train {
            rolling.min_train_size = min_train;
        }
    }
}

impl InputArgs {
    fn load_config(&self) -> Result<EngineConfig> {
        match &self.config {
            Some(path) => EngineConfig::from_toml_file(path)
                .with_context(|| format!("Failed to load config {}", path.display())),
            None => Ok(EngineConfig::default()),
        }
    }

    fn load_dataset(&self) -> Result<Dataset> {
        let mut loader = DatasetLoader::new(&self.data, &self.label);
        if let Some(column) = &self.order_by {
            loader = loader.with_order_column(column);
        }
        if let Some(features) = &self.features {
            let columns = features.split(',').map(|s| s.trim().to_string()).collect();
            loader = loader.with_feature_columns(columns);
        }
        loader
            .load()
            .with_context(|| format!("Failed to load dataset {}", self.data.display()))
    }

    fn dataset_name(&self) -> String {
        self.dataset_name.clone().unwrap_or_else(|| {
            self.data
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "dataset".to_string())
        })
    }

    fn model(&self) -> Pipeline<LogisticRegression> {
        Pipeline::new(
            PipelineConfig {
                standardize: self.standardize,
                top_k: self.top_k,
            },
            LogisticRegression::default(),
        )
    }
}

/// Folds oldest test window first.
fn chronological_folds(result: &AggregatedResult) -> Vec<&FoldMetrics> {
    match result.strategy {
        StrategyKind::Temporal => result.folds.iter().rev().collect(),
        StrategyKind::Rolling => result.folds.iter().collect(),
    }
}

/// Record every fold of `result` in time order.
fn track(tracker: &PerformanceTracker, result: &AggregatedResult, input: &InputArgs) {
    let dataset_name = input.dataset_name();
    for fold in chronological_folds(result) {
        tracker.record(fold.metrics.clone(), &input.model_version, &dataset_name);
    }
}

fn export(tracker: &PerformanceTracker, input: &InputArgs) -> Result<()> {
    let Some(path) = &input.export else {
        return Ok(());
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    if let Some(report) = tracker
        .export(path, Some(input.model_version.as_str()))
        .with_context(|| format!("Failed to export report to {}", path.display()))?
    {
        println!(
            "\nExported {} evaluations to {}",
            report.summary.total_evaluations,
            path.display()
        );
    }
    Ok(())
}

/// Best-effort JSONL audit trail. Failures are logged, never returned.
fn audit(path: Option<&Path>, record: serde_json::Value) {
    let Some(path) = path else {
        return;
    };
    let result = (|| -> Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", serde_json::to_string(&record)?)?;
        Ok(())
    })();
    if let Err(e) = result {
        warn!("Failed to append audit record to {}: {}", path.display(), e);
    }
}

fn cmd_validate(input: InputArgs, strategy: String, split: SplitArgs) -> Result<()> {
    let mut config = input.load_config()?;
    split.apply(&mut config);
    config.validate().context("Invalid split settings")?;

    let kind: StrategyKind = strategy.parse()?;
    let dataset = input.load_dataset()?;

    println!("{}", SEPARATOR);
    println!("Temporal Validation");
    println!("{}", SEPARATOR);
    println!("  Data: {}", input.data.display());
    println!("  Rows: {}", dataset.len());
    println!("  Features: {}", dataset.n_features());
    println!("  Strategy: {}", kind);
    println!();

    let result = config
        .orchestrator()
        .run(&dataset, &input.model(), &config.strategy(kind))
        .with_context(|| format!("{} validation failed", kind))?;

    println!("{}", result.summary());

    let tracker = config.tracker();
    track(&tracker, &result, &input);
    export(&tracker, &input)?;

    audit(
        input.audit_log.as_deref(),
        json!({
            "timestamp": Utc::now().to_rfc3339(),
            "command": "validate",
            "data": input.data.display().to_string(),
            "model_version": input.model_version,
            "strategy": kind,
            "n_folds": result.n_folds,
            "mean_accuracy": result.mean.accuracy,
            "std_accuracy": result.std.accuracy,
            "target_met": result.target_met_overall,
        }),
    );

    println!("{}", SEPARATOR);
    Ok(())
}

fn cmd_compare(input: InputArgs) -> Result<()> {
    let config = input.load_config()?;
    let dataset = input.load_dataset()?;
    let orchestrator = config.orchestrator();

    println!("{}", SEPARATOR);
    println!("Strategy Comparison");
    println!("{}", SEPARATOR);
    println!("  Data: {}", input.data.display());
    println!("  Rows: {}", dataset.len());
    println!();

    let comparison = orchestrator
        .compare_strategies(&dataset, &input.model())
        .context("Strategy comparison failed")?;

    for result in &comparison.results {
        println!("{}", result.summary());
    }
    for skipped in &comparison.skipped {
        println!("{} strategy skipped: not enough rows for a single fold\n", skipped);
    }

    println!("Recommendations:");
    for rec in orchestrator.recommendations(&comparison) {
        println!("  - {}", rec);
    }

    let tracker = config.tracker();
    if let Some(best) = comparison.best() {
        track(&tracker, best, &input);
    }
    export(&tracker, &input)?;

    audit(
        input.audit_log.as_deref(),
        json!({
            "timestamp": Utc::now().to_rfc3339(),
            "command": "compare",
            "data": input.data.display().to_string(),
            "model_version": input.model_version,
            "best_strategy": comparison.best_strategy,
            "best_accuracy": comparison.best_accuracy,
        }),
    );

    println!("{}", SEPARATOR);
    Ok(())
}

fn cmd_report(input: PathBuf, raw: bool) -> Result<()> {
    let report = PerformanceReport::import(&input)
        .with_context(|| format!("Failed to read report {}", input.display()))?;
    info!(
        "Loaded report with {} evaluations from {}",
        report.summary.total_evaluations,
        input.display()
    );

    if raw {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", report.summary_text());
    }
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("temporal_validation=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate {
            input,
            strategy,
            split,
        } => cmd_validate(input, strategy, split)?,
        Commands::Compare { input } => cmd_compare(input)?,
        Commands::Report { input, json } => cmd_report(input, json)?,
    }

    Ok(())
}

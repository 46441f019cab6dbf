//! End-to-end validation runs over files on disk.

use std::io::Write;

use assert_approx_eq::assert_approx_eq;
use chrono::{Duration, NaiveDate};

use temporal_validation::walkforward::FoldError;
use temporal_validation::{
    Dataset, DatasetLoader, EngineConfig, LogisticRegression, Model, Pipeline, PipelineConfig,
    SplitStrategy, StrategyKind, TemporalSplitConfig, ValidationError, ValidationOrchestrator,
};

/// `n` daily rows, written newest first so ordering must come from the date column.
fn write_daily_csv(n: i64) -> tempfile::NamedTempFile {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let mut body = String::from("date,momentum,noise,target\n");
    for i in (0..n).rev() {
        let date = start + Duration::days(i);
        let label = i % 2 == 0;
        let momentum = if label { 1.0 } else { -1.0 };
        let noise = (i * 7 % 11) as f64 / 11.0;
        body.push_str(&format!("{},{},{},{}\n", date, momentum, noise, u8::from(label)));
    }

    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    file.write_all(body.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn load(file: &tempfile::NamedTempFile) -> Dataset {
    DatasetLoader::new(file.path(), "target")
        .with_order_column("date")
        .load()
        .unwrap()
}

#[test]
fn temporal_split_over_loaded_csv() {
    let file = write_daily_csv(100);
    let dataset = load(&file);
    assert_eq!(dataset.len(), 100);
    assert_eq!(dataset.n_features(), 2);

    let strategy: SplitStrategy = TemporalSplitConfig::new(3).with_test_size(10).into();
    let result = ValidationOrchestrator::default()
        .run(&dataset, &LogisticRegression::default(), &strategy)
        .unwrap();

    assert_eq!(result.strategy, StrategyKind::Temporal);
    assert_eq!(result.n_folds, 3);
    let sizes: Vec<(usize, usize, usize)> = result
        .folds
        .iter()
        .map(|f| (f.fold, f.train_size, f.test_size))
        .collect();
    assert_eq!(sizes, vec![(1, 90, 10), (2, 80, 10), (3, 70, 10)]);

    assert_approx_eq!(result.mean.accuracy, 1.0);
    assert_approx_eq!(result.std.accuracy, 0.0);
    assert!(result.target_met_overall);

    let importance = result.feature_importance.unwrap();
    assert_eq!(importance[0].feature, "momentum");
}

#[test]
fn parallel_folds_match_sequential() {
    let file = write_daily_csv(100);
    let dataset = load(&file);
    let model = Pipeline::new(
        PipelineConfig {
            standardize: true,
            top_k: Some(1),
        },
        LogisticRegression::default(),
    );
    let strategy: SplitStrategy = TemporalSplitConfig::new(4).into();

    let sequential = ValidationOrchestrator::default()
        .run(&dataset, &model, &strategy)
        .unwrap();
    let parallel = ValidationOrchestrator::default()
        .with_parallel(true)
        .run(&dataset, &model, &strategy)
        .unwrap();

    assert_eq!(sequential.n_folds, parallel.n_folds);
    for (a, b) in sequential.folds.iter().zip(&parallel.folds) {
        assert_eq!(a.fold, b.fold);
        assert_eq!(a.train_size, b.train_size);
        assert_approx_eq!(a.metrics.accuracy, b.metrics.accuracy);
    }
    // Selection drops the noise column in every fold
    let importance = parallel.feature_importance.unwrap();
    assert_eq!(importance[1].feature, "noise");
    assert_approx_eq!(importance[1].importance, 0.0);
}

#[test]
fn configured_comparison() {
    let file = write_daily_csv(150);
    let dataset = load(&file);
    let config = EngineConfig::from_toml_str(
        r#"
        target_accuracy = 0.9

        [comparison]
        temporal_splits = 4
        rolling_step_size = 11
        "#,
    )
    .unwrap();
    let orchestrator = config.orchestrator();

    let comparison = orchestrator
        .compare_strategies(&dataset, &LogisticRegression::default())
        .unwrap();
    assert_eq!(comparison.results.len(), 2);
    assert_eq!(comparison.get(StrategyKind::Temporal).unwrap().n_folds, 4);

    // window = 150 / 3 = 50, first test row 100, steps of 11
    let rolling = comparison.get(StrategyKind::Rolling).unwrap();
    assert_eq!(rolling.n_folds, 5);
    assert!(rolling.folds.iter().all(|f| f.train_size == 50));
    assert_eq!(rolling.folds[4].test_size, 6);

    assert_eq!(comparison.best_strategy, StrategyKind::Temporal);
    let recs = orchestrator.recommendations(&comparison);
    assert!(recs[0].starts_with("Use the temporal validation strategy"));
}

#[test]
fn default_comparison_skips_rolling_on_short_history() {
    // Rolling tests start at row 100, so 100 rows leave it without folds
    let file = write_daily_csv(100);
    let dataset = load(&file);

    let comparison = ValidationOrchestrator::default()
        .compare_strategies(&dataset, &LogisticRegression::default())
        .unwrap();
    assert_eq!(comparison.results.len(), 1);
    assert_eq!(comparison.skipped, vec![StrategyKind::Rolling]);
    assert_eq!(comparison.best_strategy, StrategyKind::Temporal);
}

#[test]
fn fold_failure_aborts_run() {
    #[derive(Debug, Clone)]
    struct NeedsHistory;

    impl Model for NeedsHistory {
        fn fit(
            &mut self,
            features: &[Vec<f64>],
            _: &[u8],
        ) -> temporal_validation::model::ModelResult<()> {
            if features.len() < 85 {
                return Err(temporal_validation::model::ModelError::Training(
                    "not enough history".to_string(),
                ));
            }
            Ok(())
        }

        fn predict(&self, features: &[Vec<f64>]) -> temporal_validation::model::ModelResult<Vec<u8>> {
            Ok(vec![1; features.len()])
        }

        fn predict_proba(
            &self,
            features: &[Vec<f64>],
        ) -> temporal_validation::model::ModelResult<Vec<f64>> {
            Ok(vec![0.5; features.len()])
        }
    }

    let file = write_daily_csv(100);
    let dataset = load(&file);
    let strategy: SplitStrategy = TemporalSplitConfig::new(3).with_test_size(10).into();

    let err = ValidationOrchestrator::default()
        .run(&dataset, &NeedsHistory, &strategy)
        .unwrap_err();
    assert!(matches!(
        err,
        ValidationError::Fold(FoldError::Fit { fold: 2, .. })
    ));
}

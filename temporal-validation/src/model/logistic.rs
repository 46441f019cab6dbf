//! Logistic regression baseline.
//!
//! Batch gradient descent on the L2-penalised log loss. Small and
//! deterministic; intended as a reference adapter and for smoke runs,
//! not as a tuned production model.

use serde::{Deserialize, Serialize};

use super::{check_width, Model, ModelError, ModelResult};

/// Training configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticRegressionConfig {
    pub learning_rate: f64,
    pub epochs: usize,
    /// L2 penalty on weights (not on the bias).
    pub l2: f64,
    /// Probability at or above which the positive class is predicted.
    pub threshold: f64,
}

impl Default for LogisticRegressionConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            epochs: 300,
            l2: 1e-4,
            threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Fitted {
    weights: Vec<f64>,
    bias: f64,
}

/// Binary logistic regression.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LogisticRegression {
    config: LogisticRegressionConfig,
    fitted: Option<Fitted>,
}

impl LogisticRegression {
    pub fn new(config: LogisticRegressionConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    pub fn config(&self) -> &LogisticRegressionConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Learned weights, if fitted.
    pub fn coefficients(&self) -> Option<&[f64]> {
        self.fitted.as_ref().map(|f| f.weights.as_slice())
    }

    fn fitted(&self) -> ModelResult<&Fitted> {
        self.fitted.as_ref().ok_or(ModelError::NotFitted)
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl Model for LogisticRegression {
    fn unfitted(&self) -> Self {
        Self::new(self.config.clone())
    }

    fn fit(&mut self, features: &[Vec<f64>], labels: &[u8]) -> ModelResult<()> {
        if features.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if features.len() != labels.len() {
            return Err(ModelError::Training(format!(
                "{} rows but {} labels",
                features.len(),
                labels.len()
            )));
        }
        let width = features[0].len();
        check_width(features, width)?;

        let n = features.len() as f64;
        let mut weights = vec![0.0; width];
        let mut bias = 0.0;

        for _ in 0..self.config.epochs {
            let mut grad_w = vec![0.0; width];
            let mut grad_b = 0.0;

            for (row, &label) in features.iter().zip(labels) {
                let z = row.iter().zip(&weights).map(|(x, w)| x * w).sum::<f64>() + bias;
                let err = sigmoid(z) - label as f64;
                for (g, x) in grad_w.iter_mut().zip(row) {
                    *g += err * x;
                }
                grad_b += err;
            }

            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= self.config.learning_rate * (g / n + self.config.l2 * *w);
            }
            bias -= self.config.learning_rate * grad_b / n;
        }

        if weights.iter().any(|w| !w.is_finite()) || !bias.is_finite() {
            return Err(ModelError::Training(
                "weights diverged; lower the learning rate or scale features".to_string(),
            ));
        }

        self.fitted = Some(Fitted { weights, bias });
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> ModelResult<Vec<u8>> {
        let threshold = self.config.threshold;
        Ok(self
            .predict_proba(features)?
            .into_iter()
            .map(|p| u8::from(p >= threshold))
            .collect())
    }

    fn predict_proba(&self, features: &[Vec<f64>]) -> ModelResult<Vec<f64>> {
        let fitted = self.fitted()?;
        check_width(features, fitted.weights.len())?;

        Ok(features
            .iter()
            .map(|row| {
                let z = row
                    .iter()
                    .zip(&fitted.weights)
                    .map(|(x, w)| x * w)
                    .sum::<f64>()
                    + fitted.bias;
                sigmoid(z)
            })
            .collect())
    }

    /// Absolute coefficient magnitudes.
    fn feature_importances(&self) -> Option<Vec<f64>> {
        self.fitted
            .as_ref()
            .map(|f| f.weights.iter().map(|w| w.abs()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> (Vec<Vec<f64>>, Vec<u8>) {
        let rows = vec![
            vec![-2.0, 0.1],
            vec![-1.5, -0.2],
            vec![-1.0, 0.3],
            vec![1.0, -0.1],
            vec![1.5, 0.2],
            vec![2.0, 0.0],
        ];
        (rows, vec![0, 0, 0, 1, 1, 1])
    }

    #[test]
    fn test_fits_separable_data() {
        let (rows, labels) = separable();
        let mut model = LogisticRegression::default();
        model.fit(&rows, &labels).unwrap();

        assert_eq!(model.predict(&rows).unwrap(), labels);
        let proba = model.predict_proba(&[vec![3.0, 0.0]]).unwrap();
        assert!(proba[0] > 0.9);

        let imp = model.feature_importances().unwrap();
        assert!(imp[0] > imp[1]);
    }

    #[test]
    fn test_unfitted_drops_state() {
        let (rows, labels) = separable();
        let mut model = LogisticRegression::default();
        model.fit(&rows, &labels).unwrap();

        let fresh = model.unfitted();
        assert!(!fresh.is_fitted());
        assert_eq!(fresh.config(), model.config());
        assert!(model.is_fitted());
    }

    #[test]
    fn test_errors() {
        let mut model = LogisticRegression::default();
        assert_eq!(model.predict(&[vec![1.0]]), Err(ModelError::NotFitted));
        assert_eq!(model.fit(&[], &[]), Err(ModelError::EmptyTrainingSet));

        let (rows, labels) = separable();
        model.fit(&rows, &labels).unwrap();
        assert_eq!(
            model.predict_proba(&[vec![1.0]]),
            Err(ModelError::DimensionMismatch {
                expected: 2,
                found: 1
            })
        );
    }
}

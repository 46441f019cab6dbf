//! Fitted preprocessing steps.
//!
//! Each step is fitted on a training slice and returns a plain parameter
//! object that is passed explicitly into later `transform` calls. Nothing is
//! cached between fits.

use serde::{Deserialize, Serialize};

/// Standardization to zero mean and unit variance.
pub struct StandardScaler;

/// Column means and standard deviations learned by [`StandardScaler::fit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerParams {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl StandardScaler {
    /// Learn per-column mean and population standard deviation.
    ///
    /// Zero-variance columns get a standard deviation of 1 so they pass
    /// through centred but unscaled.
    pub fn fit(rows: &[Vec<f64>]) -> ScalerParams {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        if rows.is_empty() {
            return ScalerParams {
                means: vec![0.0; width],
                stds: vec![1.0; width],
            };
        }

        let n = rows.len() as f64;
        let mut means = vec![0.0; width];
        for row in rows {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        means.iter_mut().for_each(|m| *m /= n);

        let mut stds = vec![0.0; width];
        for row in rows {
            for ((s, v), m) in stds.iter_mut().zip(row).zip(&means) {
                *s += (v - m).powi(2);
            }
        }
        for s in stds.iter_mut() {
            *s = (*s / n).sqrt();
            if *s == 0.0 || !s.is_finite() {
                *s = 1.0;
            }
        }

        ScalerParams { means, stds }
    }
}

impl ScalerParams {
    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter()
            .map(|row| {
                row.iter()
                    .zip(self.means.iter().zip(&self.stds))
                    .map(|(v, (m, s))| (v - m) / s)
                    .collect()
            })
            .collect()
    }
}

/// Univariate feature selection by absolute Pearson correlation with the label.
pub struct KBestSelector;

/// Column indices kept by [`KBestSelector::fit`], in original feature order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSelection {
    pub selected: Vec<usize>,
    pub scores: Vec<f64>,
    pub n_features_in: usize,
}

impl KBestSelector {
    /// Keep the `k` highest-scoring features.
    ///
    /// A `k` larger than the number of available features is capped to it.
    pub fn fit(rows: &[Vec<f64>], labels: &[u8], k: usize) -> FeatureSelection {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        let k = k.min(width);
        let y: Vec<f64> = labels.iter().map(|&l| l as f64).collect();

        let scores: Vec<f64> = (0..width)
            .map(|j| {
                let col: Vec<f64> = rows.iter().map(|r| r[j]).collect();
                pearson(&col, &y).abs()
            })
            .collect();

        let mut order: Vec<usize> = (0..width).collect();
        // Highest score first, lower index wins ties
        order.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });
        let mut selected: Vec<usize> = order.into_iter().take(k).collect();
        selected.sort_unstable();

        FeatureSelection {
            selected,
            scores,
            n_features_in: width,
        }
    }
}

impl FeatureSelection {
    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter()
            .map(|row| self.selected.iter().map(|&j| row[j]).collect())
            .collect()
    }

    /// Scatter values for the selected columns back into full feature order.
    /// Unselected positions are zero.
    pub fn expand(&self, values: &[f64]) -> Vec<f64> {
        let mut full = vec![0.0; self.n_features_in];
        for (&j, &v) in self.selected.iter().zip(values) {
            full[j] = v;
        }
        full
    }
}

/// Pearson correlation; 0 when either side has no variance.
fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    if x.is_empty() {
        return 0.0;
    }
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;

    let (mut cov, mut vx, mut vy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        cov += (a - mx) * (b - my);
        vx += (a - mx).powi(2);
        vy += (b - my).powi(2);
    }

    let denom = (vx * vy).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        0.0
    } else {
        cov / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaler_fit_transform() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let params = StandardScaler::fit(&rows);
        assert_eq!(params.means, vec![2.0, 5.0]);
        // Constant column keeps std 1
        assert_eq!(params.stds, vec![1.0, 1.0]);

        let out = params.transform(&[vec![3.0, 6.0]]);
        assert_eq!(out, vec![vec![1.0, 1.0]]);
    }

    #[test]
    fn test_scaler_empty() {
        let params = StandardScaler::fit(&[]);
        assert!(params.means.is_empty());
    }

    #[test]
    fn test_kbest_picks_correlated_feature() {
        let rows = vec![
            vec![0.3, 0.0, 9.0],
            vec![0.1, 1.0, 9.0],
            vec![0.2, 0.0, 9.0],
            vec![0.0, 1.0, 9.0],
        ];
        let labels = vec![0, 1, 0, 1];
        let sel = KBestSelector::fit(&rows, &labels, 1);
        assert_eq!(sel.selected, vec![1]);
        assert_eq!(sel.transform(&rows)[1], vec![1.0]);
        assert_eq!(sel.expand(&[0.5]), vec![0.0, 0.5, 0.0]);
    }

    #[test]
    fn test_kbest_caps_k() {
        let rows = vec![vec![1.0, 2.0], vec![2.0, 1.0]];
        let sel = KBestSelector::fit(&rows, &[0, 1], 10);
        assert_eq!(sel.selected, vec![0, 1]);
    }

    #[test]
    fn test_pearson_degenerate() {
        assert_eq!(pearson(&[1.0, 1.0], &[0.0, 1.0]), 0.0);
        assert!((pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]) - 1.0).abs() < 1e-12);
    }
}

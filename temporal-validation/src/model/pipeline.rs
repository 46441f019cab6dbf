//! Per-fold preprocessing pipeline.
//!
//! Wraps an inner model so that scaling and feature selection are fitted on
//! each fold's training slice only. The fitted parameter objects live on the
//! pipeline instance and are dropped by [`Model::unfitted`].

use serde::{Deserialize, Serialize};

use crate::data::{FeatureSelection, KBestSelector, ScalerParams, StandardScaler};

use super::{Model, ModelError, ModelResult};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Standardize features before the inner model.
    pub standardize: bool,
    /// Keep only the `k` features most correlated with the label.
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline<M> {
    config: PipelineConfig,
    inner: M,
    selection: Option<FeatureSelection>,
    scaler: Option<ScalerParams>,
    fitted: bool,
}

impl<M: Model> Pipeline<M> {
    pub fn new(config: PipelineConfig, inner: M) -> Self {
        Self {
            config,
            inner,
            selection: None,
            scaler: None,
            fitted: false,
        }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    pub fn selection(&self) -> Option<&FeatureSelection> {
        self.selection.as_ref()
    }

    pub fn scaler(&self) -> Option<&ScalerParams> {
        self.scaler.as_ref()
    }

    /// Rows must be as wide as the rows seen by `fit`.
    fn transform(&self, features: &[Vec<f64>]) -> ModelResult<Vec<Vec<f64>>> {
        let selected = match &self.selection {
            Some(sel) => {
                super::check_width(features, sel.n_features_in)?;
                sel.transform(features)
            }
            None => features.to_vec(),
        };
        Ok(match &self.scaler {
            Some(params) => {
                super::check_width(&selected, params.means.len())?;
                params.transform(&selected)
            }
            None => selected,
        })
    }
}

impl<M: Model> Model for Pipeline<M> {
    fn unfitted(&self) -> Self {
        Self::new(self.config.clone(), self.inner.unfitted())
    }

    fn fit(&mut self, features: &[Vec<f64>], labels: &[u8]) -> ModelResult<()> {
        if features.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        super::check_width(features, features[0].len())?;

        self.selection = self
            .config
            .top_k
            .map(|k| KBestSelector::fit(features, labels, k));
        let selected = match &self.selection {
            Some(sel) => sel.transform(features),
            None => features.to_vec(),
        };

        self.scaler = self
            .config
            .standardize
            .then(|| StandardScaler::fit(&selected));
        let prepared = match &self.scaler {
            Some(params) => params.transform(&selected),
            None => selected,
        };

        self.inner.fit(&prepared, labels)?;
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> ModelResult<Vec<u8>> {
        if !self.fitted {
            return Err(ModelError::NotFitted);
        }
        self.inner.predict(&self.transform(features)?)
    }

    fn predict_proba(&self, features: &[Vec<f64>]) -> ModelResult<Vec<f64>> {
        if !self.fitted {
            return Err(ModelError::NotFitted);
        }
        self.inner.predict_proba(&self.transform(features)?)
    }

    /// Inner importances mapped back to the full input feature order.
    fn feature_importances(&self) -> Option<Vec<f64>> {
        let inner = self.inner.feature_importances()?;
        Some(match &self.selection {
            Some(sel) => sel.expand(&inner),
            None => inner,
        })
    }
}

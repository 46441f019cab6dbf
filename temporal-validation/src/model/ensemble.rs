//! Validation-weighted ensemble.
//!
//! Member probabilities are averaged with fixed weights, normally each
//! member's accuracy on a held-out validation window (see
//! `ValidationOrchestrator::build_ensemble`).

use super::{Model, ModelError, ModelResult};

#[derive(Debug, Clone, PartialEq)]
pub struct WeightedEnsemble<M> {
    members: Vec<M>,
    weights: Vec<f64>,
    threshold: f64,
}

impl<M: Model> WeightedEnsemble<M> {
    /// Build from members and raw weights. Weights are normalised to sum to 1;
    /// if they sum to zero (or are missing) every member gets an equal share.
    pub fn new(members: Vec<M>, weights: Vec<f64>) -> ModelResult<Self> {
        if members.is_empty() {
            return Err(ModelError::Training("ensemble has no members".to_string()));
        }
        if weights.len() != members.len() {
            return Err(ModelError::Training(format!(
                "{} members but {} weights",
                members.len(),
                weights.len()
            )));
        }

        let clean: Vec<f64> = weights
            .iter()
            .map(|w| if w.is_finite() && *w > 0.0 { *w } else { 0.0 })
            .collect();
        let total: f64 = clean.iter().sum();
        let weights = if total > 0.0 {
            clean.iter().map(|w| w / total).collect()
        } else {
            vec![1.0 / members.len() as f64; members.len()]
        };

        Ok(Self {
            members,
            weights,
            threshold: 0.5,
        })
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn members(&self) -> &[M] {
        &self.members
    }
}

impl<M: Model> Model for WeightedEnsemble<M> {
    /// Unfitted members, same weights.
    fn unfitted(&self) -> Self {
        Self {
            members: self.members.iter().map(Model::unfitted).collect(),
            weights: self.weights.clone(),
            threshold: self.threshold,
        }
    }

    fn fit(&mut self, features: &[Vec<f64>], labels: &[u8]) -> ModelResult<()> {
        for member in &mut self.members {
            member.fit(features, labels)?;
        }
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> ModelResult<Vec<u8>> {
        Ok(self
            .predict_proba(features)?
            .into_iter()
            .map(|p| u8::from(p >= self.threshold))
            .collect())
    }

    fn predict_proba(&self, features: &[Vec<f64>]) -> ModelResult<Vec<f64>> {
        let mut blended = vec![0.0; features.len()];
        for (member, &weight) in self.members.iter().zip(&self.weights) {
            let proba = member.predict_proba(features)?;
            for (b, p) in blended.iter_mut().zip(proba) {
                *b += weight * p;
            }
        }
        Ok(blended.into_iter().map(|p| p.clamp(0.0, 1.0)).collect())
    }

    /// Weighted mean of member importances; `None` if any member has none.
    fn feature_importances(&self) -> Option<Vec<f64>> {
        let mut combined: Option<Vec<f64>> = None;
        for (member, &weight) in self.members.iter().zip(&self.weights) {
            let imp = member.feature_importances()?;
            let acc = combined.get_or_insert_with(|| vec![0.0; imp.len()]);
            if acc.len() != imp.len() {
                return None;
            }
            for (a, v) in acc.iter_mut().zip(imp) {
                *a += weight * v;
            }
        }
        combined
    }
}

//! AdaBoost (Adaptive Boosting) implementation
//!
//! SAMME boosting of weighted decision stumps, multiclass. Raising
//! `n_estimators` and refitting continues boosting from the sample weights
//! implied by the stumps already in the ensemble.

use super::decision_tree::{DecisionTreeClassifier, TreeConfig};
use super::models::{
    check_features, check_xy, encode_labels, labels_from_scores, softmax_rows, unique_classes,
    Classifier,
};
use crate::error::{Result, RunboardError};
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// AdaBoost configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaBoostConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    /// Depth of each weak learner
    pub max_depth: usize,
    pub random_state: Option<u64>,
}

impl Default for AdaBoostConfig {
    fn default() -> Self {
        Self {
            n_estimators: 50,
            learning_rate: 1.0,
            max_depth: 1,
            random_state: None,
        }
    }
}

/// AdaBoost Classifier (SAMME variant)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaBoostClassifier {
    pub config: AdaBoostConfig,
    stumps: Vec<DecisionTreeClassifier>,
    alphas: Vec<f64>,
    classes: Vec<f64>,
    n_features: usize,
    /// Set once a learner fits perfectly; no further learners are added
    converged: bool,
}

impl AdaBoostClassifier {
    pub fn new(config: AdaBoostConfig) -> Self {
        Self {
            config,
            stumps: Vec::new(),
            alphas: Vec::new(),
            classes: Vec::new(),
            n_features: 0,
            converged: false,
        }
    }

    /// Number of weak learners in the ensemble
    pub fn n_learners(&self) -> usize {
        self.stumps.len()
    }

    /// Target learner count for the next `fit`
    pub fn set_n_estimators(&mut self, n: usize) {
        self.config.n_estimators = n;
    }

    fn misses(stump: &DecisionTreeClassifier, x: &Array2<f64>, y: &Array1<f64>) -> Result<Vec<bool>> {
        let pred = stump.predict(x)?;
        Ok(pred.iter().zip(y.iter()).map(|(p, t)| p != t).collect())
    }

    /// Sample weights after applying every learner boost in order
    fn replay_weights(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<Vec<f64>> {
        let n = y.len();
        let mut weights = vec![1.0 / n as f64; n];
        for (stump, &alpha) in self.stumps.iter().zip(&self.alphas) {
            let misses = Self::misses(stump, x, y)?;
            boost_weights(&mut weights, &misses, alpha);
        }
        Ok(weights)
    }

    /// Sum of alpha-weighted one-hot votes, normalized by total alpha
    fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut votes = Array2::zeros((x.nrows(), self.classes.len()));
        for (stump, &alpha) in self.stumps.iter().zip(&self.alphas) {
            let pred = stump.predict_proba(x)?;
            for (i, row) in pred.rows().into_iter().enumerate() {
                let mut best = 0;
                for (k, &p) in row.iter().enumerate() {
                    if p > row[best] {
                        best = k;
                    }
                }
                votes[[i, best]] += alpha;
            }
        }
        let total: f64 = self.alphas.iter().sum();
        if total > 0.0 {
            votes /= total;
        }
        Ok(votes)
    }
}

fn boost_weights(weights: &mut [f64], misses: &[bool], alpha: f64) {
    for (w, &miss) in weights.iter_mut().zip(misses) {
        if miss {
            *w *= alpha.exp();
        }
    }
    let sum: f64 = weights.iter().sum();
    if sum > 0.0 {
        weights.iter_mut().for_each(|w| *w /= sum);
    }
}

impl Classifier for AdaBoostClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        let classes = unique_classes(y);
        if classes.len() < 2 {
            return Err(RunboardError::TrainingError(
                "AdaBoost needs at least 2 classes".to_string(),
            ));
        }
        if self.config.n_estimators < self.stumps.len() {
            return Err(RunboardError::invalid_param(
                "n_estimators",
                self.config.n_estimators,
                format!("must be >= {} learners already fitted", self.stumps.len()),
            ));
        }
        if self.stumps.is_empty() || classes != self.classes || x.ncols() != self.n_features {
            self.stumps.clear();
            self.alphas.clear();
            self.converged = false;
            self.classes = classes;
            self.n_features = x.ncols();
        }

        let codes = encode_labels(&self.classes, y)?;
        let k = self.classes.len() as f64;
        let mut weights = self.replay_weights(x, y)?;
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.random_state.unwrap_or(0));

        while !self.converged && self.stumps.len() < self.config.n_estimators {
            let mut stump = DecisionTreeClassifier::new(TreeConfig {
                max_depth: Some(self.config.max_depth),
                ..Default::default()
            });
            stump.fit_encoded(x, &codes, &weights, &self.classes, &mut rng)?;

            let misses = Self::misses(&stump, x, y)?;
            let error: f64 = weights
                .iter()
                .zip(&misses)
                .filter(|(_, miss)| **miss)
                .map(|(w, _)| *w)
                .sum();

            if error <= 0.0 {
                // perfect learner: keep it with unit weight and stop boosting
                self.stumps.push(stump);
                self.alphas.push(1.0);
                self.converged = true;
                break;
            }
            if error >= 1.0 - 1.0 / k {
                if self.stumps.is_empty() {
                    return Err(RunboardError::TrainingError(
                        "weak learner is no better than chance".to_string(),
                    ));
                }
                self.converged = true;
                break;
            }

            let alpha = self.config.learning_rate * (((1.0 - error) / error).ln() + (k - 1.0).ln());
            boost_weights(&mut weights, &misses, alpha);
            self.stumps.push(stump);
            self.alphas.push(alpha);
        }
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.stumps.is_empty() {
            return Err(RunboardError::ModelNotFitted);
        }
        check_features(self.n_features, x)?;
        let decision = self.decision_function(x)?;
        Ok(labels_from_scores(&self.classes, &decision))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.stumps.is_empty() {
            return Err(RunboardError::ModelNotFitted);
        }
        check_features(self.n_features, x)?;
        let k = self.classes.len() as f64;
        let decision = self.decision_function(x)? / (k - 1.0).max(1.0);
        Ok(softmax_rows(&decision))
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn bands() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((30, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 4) as f64 });
        let y: Array1<f64> = (0..30).map(|i| (i / 10) as f64).collect();
        (x, y)
    }

    #[test]
    fn test_adaboost_multiclass() {
        let (x, y) = bands();
        let mut model = AdaBoostClassifier::new(AdaBoostConfig {
            n_estimators: 20,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();

        let acc = model.score(&x, &y).unwrap();
        assert!(acc >= 0.9, "accuracy too low: {}", acc);
        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.ncols(), 3);
    }

    #[test]
    fn test_growth_adds_learners() {
        let (x, y) = bands();
        let mut model = AdaBoostClassifier::new(AdaBoostConfig {
            n_estimators: 2,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();
        let before = model.n_learners();

        model.set_n_estimators(6);
        model.fit(&x, &y).unwrap();
        assert!(model.n_learners() >= before);
        assert!(model.n_learners() <= 6);
    }

    #[test]
    fn test_perfect_stump_converges() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut model = AdaBoostClassifier::new(AdaBoostConfig::default());
        model.fit(&x, &y).unwrap();
        assert_eq!(model.n_learners(), 1);
        assert_eq!(model.predict(&x).unwrap(), y);
    }
}

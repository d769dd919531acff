//! Gradient Boosting implementation
//!
//! Log-loss gradient boosted regression trees for classification. Binary
//! problems grow one tree per stage on the log-odds; multiclass problems
//! grow one tree per class per stage on softmax scores. Stages accumulate
//! across `fit` calls when `n_estimators` is raised.

use super::decision_tree::RegressionTree;
use super::models::{
    check_features, check_xy, encode_labels, labels_from_scores, softmax_rows, unique_classes,
    Classifier,
};
use crate::error::{Result, RunboardError};
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Gradient Boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Number of boosting stages
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples to split a node
    pub min_samples_split: usize,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Row subsample ratio for each stage
    pub subsample: f64,
    /// Random seed
    pub random_state: Option<u64>,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
            subsample: 1.0,
            random_state: None,
        }
    }
}

/// Gradient Boosting Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    pub config: GradientBoostingConfig,
    /// One entry per stage, each holding one tree per score column
    stages: Vec<Vec<RegressionTree>>,
    init_scores: Vec<f64>,
    classes: Vec<f64>,
    n_features: usize,
    base_seed: Option<u64>,
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            stages: Vec::new(),
            init_scores: Vec::new(),
            classes: Vec::new(),
            n_features: 0,
            base_seed: None,
        }
    }

    /// Number of boosting stages fitted so far
    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }

    /// Target stage count for the next `fit`
    pub fn set_n_estimators(&mut self, n: usize) {
        self.config.n_estimators = n;
    }

    fn n_score_columns(&self) -> usize {
        if self.classes.len() == 2 {
            1
        } else {
            self.classes.len()
        }
    }

    /// Raw scores: init plus shrunken sum of stage predictions
    fn raw_scores(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let k = self.n_score_columns();
        let mut raw = Array2::zeros((x.nrows(), k));
        for (j, &init) in self.init_scores.iter().enumerate() {
            raw.column_mut(j).fill(init);
        }
        for stage in &self.stages {
            for (j, tree) in stage.iter().enumerate() {
                let pred = tree.predict(x)?;
                raw.column_mut(j).scaled_add(self.config.learning_rate, &pred);
            }
        }
        Ok(raw)
    }

    fn initial_scores(codes: &[usize], n_classes: usize) -> Vec<f64> {
        let n = codes.len() as f64;
        let mut prior = vec![0.0; n_classes];
        for &c in codes {
            prior[c] += 1.0 / n;
        }
        let eps = f64::EPSILON;
        if n_classes == 2 {
            let p = prior[1].clamp(eps, 1.0 - eps);
            vec![(p / (1.0 - p)).ln()]
        } else {
            prior.iter().map(|p| p.max(eps).ln()).collect()
        }
    }

    fn stage_rows(&self, n: usize, stage: usize, seed: u64) -> Vec<usize> {
        if self.config.subsample >= 1.0 {
            return (0..n).collect();
        }
        let size = ((n as f64) * self.config.subsample).ceil().max(1.0) as usize;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed.wrapping_add(stage as u64));
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rng);
        indices.truncate(size);
        indices.sort_unstable();
        indices
    }
}

impl Classifier for GradientBoostingClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        let classes = unique_classes(y);
        if classes.len() < 2 {
            return Err(RunboardError::TrainingError(
                "gradient boosting needs at least 2 classes".to_string(),
            ));
        }
        if self.config.n_estimators < self.stages.len() {
            return Err(RunboardError::invalid_param(
                "n_estimators",
                self.config.n_estimators,
                format!("must be >= {} stages already fitted", self.stages.len()),
            ));
        }

        let codes = encode_labels(&classes, y)?;
        if self.stages.is_empty() || classes != self.classes || x.ncols() != self.n_features {
            self.stages.clear();
            self.init_scores = Self::initial_scores(&codes, classes.len());
            self.classes = classes;
            self.n_features = x.ncols();
        }

        let seed = *self
            .base_seed
            .get_or_insert_with(|| self.config.random_state.unwrap_or_else(rand::random));
        let n_classes = self.classes.len();
        let k = self.n_score_columns();
        let mut raw = self.raw_scores(x)?;

        while self.stages.len() < self.config.n_estimators {
            let rows = self.stage_rows(x.nrows(), self.stages.len(), seed);
            let mut stage = Vec::with_capacity(k);

            if k == 1 {
                let p: Vec<f64> = raw.column(0).iter().map(|&v| sigmoid(v)).collect();
                let residual: Vec<f64> = codes
                    .iter()
                    .zip(&p)
                    .map(|(&c, &pi)| c as f64 - pi)
                    .collect();
                let denominator: Vec<f64> = p.iter().map(|&pi| pi * (1.0 - pi)).collect();

                let mut tree = RegressionTree::new(
                    self.config.max_depth,
                    self.config.min_samples_split,
                    self.config.min_samples_leaf,
                );
                tree.fit(x, &residual, &denominator, rows, 1.0)?;
                stage.push(tree);
            } else {
                let proba = softmax_rows(&raw);
                let scale = (n_classes as f64 - 1.0) / n_classes as f64;
                for j in 0..k {
                    let residual: Vec<f64> = codes
                        .iter()
                        .zip(proba.column(j))
                        .map(|(&c, &pj)| if c == j { 1.0 - pj } else { -pj })
                        .collect();
                    let denominator: Vec<f64> =
                        residual.iter().map(|r| r.abs() * (1.0 - r.abs())).collect();

                    let mut tree = RegressionTree::new(
                        self.config.max_depth,
                        self.config.min_samples_split,
                        self.config.min_samples_leaf,
                    );
                    tree.fit(x, &residual, &denominator, rows.clone(), scale)?;
                    stage.push(tree);
                }
            }

            for (j, tree) in stage.iter().enumerate() {
                let pred = tree.predict(x)?;
                raw.column_mut(j).scaled_add(self.config.learning_rate, &pred);
            }
            self.stages.push(stage);
        }
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(labels_from_scores(&self.classes, &proba))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.init_scores.is_empty() {
            return Err(RunboardError::ModelNotFitted);
        }
        check_features(self.n_features, x)?;

        let raw = self.raw_scores(x)?;
        if raw.ncols() == 1 {
            let p1 = raw.column(0).mapv(sigmoid);
            let p0 = p1.mapv(|p| 1.0 - p);
            Ok(ndarray::stack(Axis(1), &[p0.view(), p1.view()])?)
        } else {
            Ok(softmax_rows(&raw))
        }
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_classification_data(n_classes: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((90, 2), |(i, j)| {
            if j == 0 {
                i as f64 * 0.1
            } else {
                ((i * 7) % 11) as f64
            }
        });
        let y: Array1<f64> = (0..90).map(|i| (i * n_classes / 90) as f64).collect();
        (x, y)
    }

    #[test]
    fn test_binary_classifier() {
        let (x, y) = create_classification_data(2);
        let config = GradientBoostingConfig {
            n_estimators: 20,
            ..Default::default()
        };

        let mut model = GradientBoostingClassifier::new(config);
        model.fit(&x, &y).unwrap();

        let accuracy = model.score(&x, &y).unwrap();
        assert!(accuracy > 0.9, "Accuracy ({}) should be above 90%", accuracy);
        assert_eq!(model.predict_proba(&x).unwrap().ncols(), 2);
    }

    #[test]
    fn test_multiclass_classifier() {
        let (x, y) = create_classification_data(3);
        let mut model = GradientBoostingClassifier::new(GradientBoostingConfig {
            n_estimators: 15,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();

        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.ncols(), 3);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        assert!(model.score(&x, &y).unwrap() > 0.9);
    }

    #[test]
    fn test_warm_start_matches_single_fit() {
        let (x, y) = create_classification_data(3);
        let mut grown = GradientBoostingClassifier::new(GradientBoostingConfig {
            n_estimators: 5,
            ..Default::default()
        });
        grown.fit(&x, &y).unwrap();
        grown.set_n_estimators(10);
        grown.fit(&x, &y).unwrap();
        assert_eq!(grown.n_stages(), 10);

        let mut once = GradientBoostingClassifier::new(GradientBoostingConfig {
            n_estimators: 10,
            ..Default::default()
        });
        once.fit(&x, &y).unwrap();

        let a = grown.predict_proba(&x).unwrap();
        let b = once.predict_proba(&x).unwrap();
        for (p, q) in a.iter().zip(b.iter()) {
            assert!((p - q).abs() < 1e-9);
        }
    }

    #[test]
    fn test_single_class_rejected() {
        let x = Array2::zeros((4, 1));
        let y = Array1::zeros(4);
        let mut model = GradientBoostingClassifier::new(GradientBoostingConfig::default());
        assert!(model.fit(&x, &y).is_err());
    }
}

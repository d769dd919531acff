//! Random Forest implementation
//!
//! Bagged CART classifiers with warm-start growth: raising `n_estimators`
//! and calling `fit` again trains only the new trees.

use super::decision_tree::{Criterion, DecisionTreeClassifier, MaxFeatures, TreeConfig};
use super::models::{
    check_features, check_xy, encode_labels, labels_from_scores, unique_classes, Classifier,
};
use crate::error::{Result, RunboardError};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Random Forest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestConfig {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub criterion: Criterion,
    pub bootstrap: bool,
    pub random_state: Option<u64>,
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            criterion: Criterion::Gini,
            bootstrap: true,
            random_state: None,
        }
    }
}

/// Random Forest classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    pub config: RandomForestConfig,
    trees: Vec<DecisionTreeClassifier>,
    classes: Vec<f64>,
    n_features: usize,
    base_seed: Option<u64>,
}

impl RandomForestClassifier {
    pub fn new(config: RandomForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            classes: Vec::new(),
            n_features: 0,
            base_seed: None,
        }
    }

    /// Number of trees grown so far
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Target tree count for the next `fit`
    pub fn set_n_estimators(&mut self, n: usize) {
        self.config.n_estimators = n;
    }

    fn tree_config(&self, seed: u64) -> TreeConfig {
        TreeConfig {
            max_depth: self.config.max_depth,
            min_samples_split: self.config.min_samples_split,
            min_samples_leaf: self.config.min_samples_leaf,
            criterion: self.config.criterion,
            max_features: self.config.max_features,
            random_state: Some(seed),
        }
    }

    /// Mean of per-tree feature importances
    pub fn feature_importances(&self) -> Option<Array1<f64>> {
        let mut total = Array1::zeros(self.n_features);
        let mut any = false;
        for imp in self.trees.iter().filter_map(|t| t.feature_importances()) {
            total = total + imp;
            any = true;
        }
        any.then(|| total / self.trees.len() as f64)
    }
}

impl Classifier for RandomForestClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        let classes = unique_classes(y);

        if self.config.n_estimators < self.trees.len() {
            return Err(RunboardError::invalid_param(
                "n_estimators",
                self.config.n_estimators,
                format!("must be >= {} trees already grown", self.trees.len()),
            ));
        }
        if self.trees.is_empty() || classes != self.classes || x.ncols() != self.n_features {
            self.trees.clear();
            self.classes = classes;
            self.n_features = x.ncols();
        }

        let base_seed = *self
            .base_seed
            .get_or_insert_with(|| self.config.random_state.unwrap_or_else(rand::random));
        let codes = encode_labels(&self.classes, y)?;
        let n_samples = x.nrows();
        let start = self.trees.len();

        let new_trees: Vec<DecisionTreeClassifier> = (start..self.config.n_estimators)
            .into_par_iter()
            .map(|t| {
                let seed = base_seed.wrapping_add(t as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let mut weights = vec![0.0; n_samples];
                if self.config.bootstrap {
                    for _ in 0..n_samples {
                        weights[rng.gen_range(0..n_samples)] += 1.0;
                    }
                } else {
                    weights.fill(1.0);
                }

                let mut tree = DecisionTreeClassifier::new(self.tree_config(seed));
                tree.fit_encoded(x, &codes, &weights, &self.classes, &mut rng)?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees.extend(new_trees);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(labels_from_scores(&self.classes, &proba))
    }

    /// Average of the trees' leaf class distributions
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(RunboardError::ModelNotFitted);
        }
        check_features(self.n_features, x)?;

        let per_tree = self
            .trees
            .par_iter()
            .map(|tree| tree.predict_proba(x))
            .collect::<Result<Vec<_>>>()?;

        let mut sum = Array2::zeros((x.nrows(), self.classes.len()));
        for proba in &per_tree {
            sum += proba;
        }
        Ok(sum / self.trees.len() as f64)
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn blobs() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [0.0, 0.1], [0.2, 0.0], [0.1, 0.3], [0.3, 0.2],
            [3.0, 3.1], [3.2, 2.9], [2.9, 3.3], [3.1, 3.0],
            [6.0, 0.1], [6.2, 0.3], [5.9, 0.0], [6.1, 0.2],
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0];
        (x, y)
    }

    #[test]
    fn test_forest_fits_blobs() {
        let (x, y) = blobs();
        let mut rf = RandomForestClassifier::new(RandomForestConfig {
            n_estimators: 25,
            random_state: Some(7),
            ..Default::default()
        });
        rf.fit(&x, &y).unwrap();

        assert_eq!(rf.n_trees(), 25);
        let acc = rf.score(&x, &y).unwrap();
        assert!(acc > 0.9, "accuracy too low: {}", acc);
    }

    #[test]
    fn test_warm_start_keeps_existing_trees() {
        let (x, y) = blobs();
        let mut rf = RandomForestClassifier::new(RandomForestConfig {
            n_estimators: 5,
            random_state: Some(1),
            ..Default::default()
        });
        rf.fit(&x, &y).unwrap();
        let first = rf.predict_proba(&x).unwrap();

        rf.set_n_estimators(10);
        rf.fit(&x, &y).unwrap();
        assert_eq!(rf.n_trees(), 10);

        let mut fresh = RandomForestClassifier::new(RandomForestConfig {
            n_estimators: 5,
            random_state: Some(1),
            ..Default::default()
        });
        fresh.fit(&x, &y).unwrap();
        assert_eq!(fresh.predict_proba(&x).unwrap(), first);
    }

    #[test]
    fn test_shrinking_estimators_rejected() {
        let (x, y) = blobs();
        let mut rf = RandomForestClassifier::new(RandomForestConfig {
            n_estimators: 4,
            ..Default::default()
        });
        rf.fit(&x, &y).unwrap();
        rf.set_n_estimators(2);
        assert!(rf.fit(&x, &y).is_err());
    }
}

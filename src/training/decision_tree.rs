//! Decision tree implementation
//!
//! CART classifier with weighted Gini/entropy splits and class-distribution
//! leaves, plus the least-squares regression tree used by gradient boosting.

use super::models::{
    check_features, check_xy, encode_labels, labels_from_scores, unique_classes, Classifier,
};
use crate::error::{Result, RunboardError};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Criterion {
    /// Gini impurity
    Gini,
    /// Shannon entropy
    Entropy,
}

impl std::str::FromStr for Criterion {
    type Err = RunboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gini" => Ok(Criterion::Gini),
            "entropy" | "log_loss" => Ok(Criterion::Entropy),
            other => Err(RunboardError::invalid_param(
                "criterion",
                other,
                "expected 'gini' or 'entropy'",
            )),
        }
    }
}

/// Number of features examined at each split
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum MaxFeatures {
    All,
    Sqrt,
    Log2,
    Fraction(f64),
    Count(usize),
}

impl MaxFeatures {
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = match *self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => (n_features as f64).sqrt() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2() as usize,
            MaxFeatures::Fraction(f) => (f * n_features as f64) as usize,
            MaxFeatures::Count(c) => c,
        };
        n.clamp(1, n_features.max(1))
    }
}

/// Tree growth parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub criterion: Criterion,
    pub max_features: MaxFeatures,
    pub random_state: Option<u64>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            criterion: Criterion::Gini,
            max_features: MaxFeatures::All,
            random_state: None,
        }
    }
}

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node holding the weighted class distribution
    Leaf {
        value: Vec<f64>,
        n_samples: usize,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

/// Training data view shared by the recursive builder
struct NodeData<'a> {
    x: &'a Array2<f64>,
    codes: &'a [usize],
    weights: &'a [f64],
    n_classes: usize,
}

/// CART decision tree classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeClassifier {
    pub config: TreeConfig,
    root: Option<TreeNode>,
    classes: Vec<f64>,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
}

impl Default for DecisionTreeClassifier {
    fn default() -> Self {
        Self::new(TreeConfig::default())
    }
}

impl DecisionTreeClassifier {
    pub fn new(config: TreeConfig) -> Self {
        Self {
            config,
            root: None,
            classes: Vec::new(),
            n_features: 0,
            feature_importances: None,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = Some(depth);
        self
    }

    /// Set criterion
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.config.criterion = criterion;
        self
    }

    /// Fit on pre-encoded labels against a fixed class list.
    ///
    /// Ensembles use this so every member shares the same probability
    /// columns even when a bootstrap sample misses a class.
    pub fn fit_encoded(
        &mut self,
        x: &Array2<f64>,
        codes: &[usize],
        weights: &[f64],
        classes: &[f64],
        rng: &mut ChaCha8Rng,
    ) -> Result<()> {
        if x.nrows() != codes.len() || codes.len() != weights.len() {
            return Err(RunboardError::ShapeError {
                expected: format!("{} labels and weights", x.nrows()),
                actual: format!("{} labels, {} weights", codes.len(), weights.len()),
            });
        }

        self.classes = classes.to_vec();
        self.n_features = x.ncols();

        let data = NodeData {
            x,
            codes,
            weights,
            n_classes: classes.len(),
        };
        let indices: Vec<usize> = (0..x.nrows()).filter(|&i| weights[i] > 0.0).collect();
        if indices.is_empty() {
            return Err(RunboardError::TrainingError(
                "no samples with positive weight".to_string(),
            ));
        }

        let mut importances = vec![0.0; x.ncols()];
        let root = self.build_tree(&data, indices, 0, &mut importances, rng);

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }
        self.feature_importances = Some(Array1::from_vec(importances));
        self.root = Some(root);
        Ok(())
    }

    fn build_tree(
        &self,
        data: &NodeData<'_>,
        indices: Vec<usize>,
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let distribution = class_weights(data, &indices);
        let total_weight: f64 = distribution.iter().sum();
        let impurity = self.impurity(&distribution, total_weight);

        let should_stop = n_samples < self.config.min_samples_split
            || n_samples < 2 * self.config.min_samples_leaf
            || self.config.max_depth.map_or(false, |d| depth >= d)
            || impurity <= 1e-12;

        if should_stop {
            return leaf(distribution, total_weight, n_samples);
        }

        let n_try = self.config.max_features.resolve(data.x.ncols());
        let mut features: Vec<usize> = (0..data.x.ncols()).collect();
        if n_try < features.len() {
            features.shuffle(rng);
            features.truncate(n_try);
            features.sort_unstable();
        }

        let best = features
            .par_iter()
            .filter_map(|&f| self.best_split_for_feature(data, &indices, f, &distribution, impurity))
            .reduce_with(|a, b| {
                if b.2 > a.2 || (b.2 == a.2 && b.0 < a.0) {
                    b
                } else {
                    a
                }
            });

        let Some((feature_idx, threshold, gain)) = best else {
            return leaf(distribution, total_weight, n_samples);
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| data.x[[i, feature_idx]] <= threshold);

        importances[feature_idx] += total_weight * gain;

        let left = Box::new(self.build_tree(data, left_idx, depth + 1, importances, rng));
        let right = Box::new(self.build_tree(data, right_idx, depth + 1, importances, rng));

        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            n_samples,
            impurity,
        }
    }

    /// Sorted sweep over one feature; returns (feature, threshold, gain)
    fn best_split_for_feature(
        &self,
        data: &NodeData<'_>,
        indices: &[usize],
        feature: usize,
        parent: &[f64],
        parent_impurity: f64,
    ) -> Option<(usize, f64, f64)> {
        let mut sorted = indices.to_vec();
        sorted.sort_by(|&a, &b| data.x[[a, feature]].total_cmp(&data.x[[b, feature]]));

        let total_weight: f64 = parent.iter().sum();
        let min_leaf = self.config.min_samples_leaf;
        let mut left = vec![0.0; data.n_classes];
        let mut best: Option<(usize, f64, f64)> = None;

        for pos in 0..sorted.len() - 1 {
            let i = sorted[pos];
            left[data.codes[i]] += data.weights[i];

            let here = data.x[[i, feature]];
            let next = data.x[[sorted[pos + 1], feature]];
            if here >= next {
                continue;
            }
            let n_left = pos + 1;
            if n_left < min_leaf || sorted.len() - n_left < min_leaf {
                continue;
            }

            let w_left: f64 = left.iter().sum();
            let w_right = total_weight - w_left;
            let right: Vec<f64> = parent.iter().zip(&left).map(|(p, l)| p - l).collect();
            let child = (w_left * self.impurity(&left, w_left)
                + w_right * self.impurity(&right, w_right))
                / total_weight;
            let gain = parent_impurity - child;

            if gain > 1e-12 && best.map_or(true, |b| gain > b.2) {
                best = Some((feature, (here + next) / 2.0, gain));
            }
        }
        best
    }

    fn impurity(&self, counts: &[f64], total: f64) -> f64 {
        if total <= 0.0 {
            return 0.0;
        }
        match self.config.criterion {
            Criterion::Gini => 1.0 - counts.iter().map(|c| (c / total).powi(2)).sum::<f64>(),
            Criterion::Entropy => -counts
                .iter()
                .filter(|&&c| c > 0.0)
                .map(|c| {
                    let p = c / total;
                    p * p.log2()
                })
                .sum::<f64>(),
        }
    }

    fn leaf_for<'a>(&'a self, sample: ndarray::ArrayView1<'_, f64>) -> Option<&'a [f64]> {
        let mut node = self.root.as_ref()?;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return Some(value.as_slice()),
                TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                    node = if sample[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get tree depth
    pub fn get_depth(&self) -> usize {
        fn depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        self.root.as_ref().map_or(0, depth)
    }

    /// Get number of leaves
    pub fn get_n_leaves(&self) -> usize {
        fn count(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => count(left) + count(right),
            }
        }
        self.root.as_ref().map_or(0, count)
    }
}

fn class_weights(data: &NodeData<'_>, indices: &[usize]) -> Vec<f64> {
    let mut counts = vec![0.0; data.n_classes];
    for &i in indices {
        counts[data.codes[i]] += data.weights[i];
    }
    counts
}

fn leaf(mut distribution: Vec<f64>, total: f64, n_samples: usize) -> TreeNode {
    if total > 0.0 {
        distribution.iter_mut().for_each(|v| *v /= total);
    }
    TreeNode::Leaf {
        value: distribution,
        n_samples,
    }
}

impl Classifier for DecisionTreeClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        let classes = unique_classes(y);
        let codes = encode_labels(&classes, y)?;
        let weights = vec![1.0; y.len()];
        let mut rng = match self.config.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        self.fit_encoded(x, &codes, &weights, &classes, &mut rng)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(labels_from_scores(&self.classes, &proba))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.root.is_none() {
            return Err(RunboardError::ModelNotFitted);
        }
        check_features(self.n_features, x)?;

        let mut out = Array2::zeros((x.nrows(), self.classes.len()));
        for (i, row) in x.rows().into_iter().enumerate() {
            let value = self.leaf_for(row).ok_or(RunboardError::ModelNotFitted)?;
            for (k, &p) in value.iter().enumerate() {
                out[[i, k]] = p;
            }
        }
        Ok(out)
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }
}

/// Regression tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
enum RegressionNode {
    Leaf(f64),
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<RegressionNode>,
        right: Box<RegressionNode>,
    },
}

/// Least-squares regression tree fit to pseudo-residuals.
///
/// Leaves hold a one-step Newton value `scale * sum(residual) / sum(denominator)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    root: Option<RegressionNode>,
}

struct RegressionData<'a> {
    x: &'a Array2<f64>,
    residual: &'a [f64],
    denominator: &'a [f64],
    scale: f64,
}

impl RegressionTree {
    pub fn new(max_depth: usize, min_samples_split: usize, min_samples_leaf: usize) -> Self {
        Self {
            max_depth,
            min_samples_split,
            min_samples_leaf,
            root: None,
        }
    }

    /// Fit on the rows in `indices`
    pub fn fit(
        &mut self,
        x: &Array2<f64>,
        residual: &[f64],
        denominator: &[f64],
        indices: Vec<usize>,
        scale: f64,
    ) -> Result<()> {
        if indices.is_empty() {
            return Err(RunboardError::TrainingError("empty boosting sample".to_string()));
        }
        let data = RegressionData {
            x,
            residual,
            denominator,
            scale,
        };
        self.root = Some(self.build(&data, indices, 0));
        Ok(())
    }

    fn build(&self, data: &RegressionData<'_>, indices: Vec<usize>, depth: usize) -> RegressionNode {
        let n = indices.len();
        if depth >= self.max_depth
            || n < self.min_samples_split
            || n < 2 * self.min_samples_leaf
        {
            return RegressionNode::Leaf(self.leaf_value(data, &indices));
        }

        let best = (0..data.x.ncols())
            .into_par_iter()
            .filter_map(|f| self.best_split(data, &indices, f))
            .reduce_with(|a, b| {
                if b.2 > a.2 || (b.2 == a.2 && b.0 < a.0) {
                    b
                } else {
                    a
                }
            });

        let Some((feature_idx, threshold, _)) = best else {
            return RegressionNode::Leaf(self.leaf_value(data, &indices));
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| data.x[[i, feature_idx]] <= threshold);

        RegressionNode::Split {
            feature_idx,
            threshold,
            left: Box::new(self.build(data, left_idx, depth + 1)),
            right: Box::new(self.build(data, right_idx, depth + 1)),
        }
    }

    fn best_split(
        &self,
        data: &RegressionData<'_>,
        indices: &[usize],
        feature: usize,
    ) -> Option<(usize, f64, f64)> {
        let mut sorted = indices.to_vec();
        sorted.sort_by(|&a, &b| data.x[[a, feature]].total_cmp(&data.x[[b, feature]]));

        let n = sorted.len();
        let total: f64 = sorted.iter().map(|&i| data.residual[i]).sum();
        let parent_score = total * total / n as f64;
        let mut left_sum = 0.0;
        let mut best: Option<(usize, f64, f64)> = None;

        for pos in 0..n - 1 {
            let i = sorted[pos];
            left_sum += data.residual[i];

            let here = data.x[[i, feature]];
            let next = data.x[[sorted[pos + 1], feature]];
            if here >= next {
                continue;
            }
            let n_left = pos + 1;
            let n_right = n - n_left;
            if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                continue;
            }

            let right_sum = total - left_sum;
            let gain = left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64
                - parent_score;
            if gain > 1e-12 && best.map_or(true, |b| gain > b.2) {
                best = Some((feature, (here + next) / 2.0, gain));
            }
        }
        best
    }

    fn leaf_value(&self, data: &RegressionData<'_>, indices: &[usize]) -> f64 {
        let num: f64 = indices.iter().map(|&i| data.residual[i]).sum();
        let den: f64 = indices.iter().map(|&i| data.denominator[i]).sum();
        if den.abs() < 1e-150 {
            0.0
        } else {
            data.scale * num / den
        }
    }

    /// Predict one value per row
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(RunboardError::ModelNotFitted)?;
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                let mut node = root;
                loop {
                    match node {
                        RegressionNode::Leaf(v) => return *v,
                        RegressionNode::Split { feature_idx, threshold, left, right } => {
                            node = if row[*feature_idx] <= *threshold { left } else { right };
                        }
                    }
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier_separable() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTreeClassifier::default();
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.predict(&x).unwrap(), y);
        assert_eq!(tree.get_depth(), 1);
        assert_eq!(tree.get_n_leaves(), 2);
    }

    #[test]
    fn test_multiclass_proba_columns() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![0.0, 0.0, 1.0, 1.0, 2.0, 2.0];

        let mut tree = DecisionTreeClassifier::default();
        tree.fit(&x, &y).unwrap();

        let proba = tree.predict_proba(&x).unwrap();
        assert_eq!(proba.ncols(), 3);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
        assert_eq!(tree.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_max_depth() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0], [7.0], [8.0]];
        let y = array![0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0];

        let mut tree = DecisionTreeClassifier::default().with_max_depth(2);
        tree.fit(&x, &y).unwrap();

        assert!(tree.get_depth() <= 2);
    }

    #[test]
    fn test_feature_importances() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTreeClassifier::default().with_criterion(Criterion::Entropy);
        tree.fit(&x, &y).unwrap();

        let importances = tree.feature_importances().unwrap();
        assert!((importances[0] - 1.0).abs() < 1e-12);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn test_regression_tree_leaf_values() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let residual = [1.0, 1.0, -1.0, -1.0];
        let denominator = [1.0; 4];

        let mut tree = RegressionTree::new(1, 2, 1);
        tree.fit(&x, &residual, &denominator, (0..4).collect(), 1.0).unwrap();

        assert_eq!(tree.predict(&x).unwrap(), array![1.0, 1.0, -1.0, -1.0]);
    }

    #[test]
    fn test_max_features_resolve() {
        assert_eq!(MaxFeatures::Sqrt.resolve(16), 4);
        assert_eq!(MaxFeatures::Log2.resolve(1), 1);
        assert_eq!(MaxFeatures::All.resolve(7), 7);
    }
}

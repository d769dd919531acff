//! K-Nearest Neighbors classifier

use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::str::FromStr;

use super::models::{
    check_features, check_xy, encode_labels, labels_from_scores, unique_classes, Classifier,
};
use crate::error::{Result, RunboardError};

/// Distance metric for KNN
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum DistanceMetric {
    /// Euclidean distance (L2)
    #[default]
    Euclidean,
    /// Manhattan distance (L1)
    Manhattan,
    /// Minkowski distance with parameter p
    Minkowski(f64),
}

impl FromStr for DistanceMetric {
    type Err = RunboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "euclidean" => Ok(Self::Euclidean),
            "manhattan" => Ok(Self::Manhattan),
            "minkowski" => Ok(Self::Minkowski(2.0)),
            other => Err(RunboardError::invalid_param(
                "metric",
                other,
                "expected one of euclidean, manhattan, minkowski",
            )),
        }
    }
}

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WeightScheme {
    /// All neighbors have equal weight
    #[default]
    Uniform,
    /// Closer neighbors have more weight (inverse distance)
    Distance,
}

impl FromStr for WeightScheme {
    type Err = RunboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "uniform" => Ok(Self::Uniform),
            "distance" => Ok(Self::Distance),
            other => Err(RunboardError::invalid_param(
                "weights",
                other,
                "expected uniform or distance",
            )),
        }
    }
}

/// KNN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNConfig {
    /// Number of neighbors
    pub n_neighbors: usize,
    pub metric: DistanceMetric,
    pub weights: WeightScheme,
}

impl Default for KNNConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            metric: DistanceMetric::Euclidean,
            weights: WeightScheme::Uniform,
        }
    }
}

/// K-Nearest Neighbors Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNClassifier {
    pub config: KNNConfig,
    x_train: Option<Array2<f64>>,
    codes: Vec<usize>,
    classes: Vec<f64>,
}

impl KNNClassifier {
    pub fn new(config: KNNConfig) -> Self {
        Self {
            config,
            x_train: None,
            codes: Vec::new(),
            classes: Vec::new(),
        }
    }

    pub fn with_k(k: usize) -> Self {
        Self::new(KNNConfig {
            n_neighbors: k,
            ..Default::default()
        })
    }

    fn vote(&self, neighbors: &[Neighbor]) -> Vec<f64> {
        let mut votes = vec![0.0; self.classes.len()];
        let exact = neighbors.iter().any(|n| n.dist == 0.0);
        for n in neighbors {
            let weight = match self.config.weights {
                WeightScheme::Uniform => 1.0,
                // exact matches take all the weight
                WeightScheme::Distance if exact => {
                    if n.dist == 0.0 {
                        1.0
                    } else {
                        0.0
                    }
                }
                WeightScheme::Distance => 1.0 / n.dist,
            };
            votes[n.code] += weight;
        }
        let total: f64 = votes.iter().sum();
        if total > 0.0 {
            votes.iter_mut().for_each(|v| *v /= total);
        }
        votes
    }
}

impl Classifier for KNNClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        if self.config.n_neighbors == 0 {
            return Err(RunboardError::invalid_param("n_neighbors", 0, "must be positive"));
        }
        if self.config.n_neighbors > x.nrows() {
            return Err(RunboardError::invalid_param(
                "n_neighbors",
                self.config.n_neighbors,
                format!("exceeds the {} training samples", x.nrows()),
            ));
        }
        let classes = unique_classes(y);
        self.codes = encode_labels(&classes, y)?;
        self.classes = classes;
        self.x_train = Some(x.to_owned());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(labels_from_scores(&self.classes, &proba))
    }

    /// Fraction of (weighted) neighbor votes per class
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let x_train = self.x_train.as_ref().ok_or(RunboardError::ModelNotFitted)?;
        check_features(x_train.ncols(), x)?;

        let rows: Vec<Vec<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let point: Vec<f64> = x.row(i).to_vec();
                let neighbors = find_k_nearest(
                    &point,
                    x_train,
                    &self.codes,
                    self.config.n_neighbors,
                    self.config.metric,
                );
                self.vote(&neighbors)
            })
            .collect();

        let mut out = Array2::zeros((x.nrows(), self.classes.len()));
        for (i, row) in rows.into_iter().enumerate() {
            for (k, p) in row.into_iter().enumerate() {
                out[[i, k]] = p;
            }
        }
        Ok(out)
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }
}

/// Max-heap entry; ordered by distance, then by training index
#[derive(Debug, Clone, Copy)]
struct Neighbor {
    dist: f64,
    index: usize,
    code: usize,
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then(self.index.cmp(&other.index))
    }
}

/// k nearest neighbors using a bounded max-heap
fn find_k_nearest(
    point: &[f64],
    x_train: &Array2<f64>,
    codes: &[usize],
    k: usize,
    metric: DistanceMetric,
) -> Vec<Neighbor> {
    let mut heap = BinaryHeap::with_capacity(k + 1);
    for (index, row) in x_train.rows().into_iter().enumerate() {
        let candidate = Neighbor {
            dist: compute_distance(point, row.iter().copied(), metric),
            index,
            code: codes[index],
        };
        if heap.len() < k {
            heap.push(candidate);
        } else if heap.peek().is_some_and(|top| candidate < *top) {
            heap.pop();
            heap.push(candidate);
        }
    }
    heap.into_sorted_vec()
}

fn compute_distance(a: &[f64], b: impl Iterator<Item = f64>, metric: DistanceMetric) -> f64 {
    let diffs = a.iter().zip(b).map(|(ai, bi)| (ai - bi).abs());
    match metric {
        DistanceMetric::Euclidean => diffs.map(|d| d * d).sum::<f64>().sqrt(),
        DistanceMetric::Manhattan => diffs.sum(),
        DistanceMetric::Minkowski(p) => diffs.map(|d| d.powf(p)).sum::<f64>().powf(1.0 / p),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn create_classification_data() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [1.0, 1.0], [1.5, 2.0], [2.0, 1.5], [1.2, 1.3],
            [8.0, 8.0], [8.5, 9.0], [9.0, 8.5], [8.2, 8.3],
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_knn_classifier() {
        let (x, y) = create_classification_data();
        let mut knn = KNNClassifier::with_k(3);
        knn.fit(&x, &y).unwrap();

        let preds = knn.predict(&array![[1.1, 1.1], [8.8, 8.8]]).unwrap();
        assert_eq!(preds, array![0.0, 1.0]);
        assert_eq!(knn.score(&x, &y).unwrap(), 1.0);
    }

    #[test]
    fn test_vote_probabilities() {
        let (x, y) = create_classification_data();
        let mut knn = KNNClassifier::with_k(5);
        knn.fit(&x, &y).unwrap();

        let proba = knn.predict_proba(&array![[1.0, 1.0]]).unwrap();
        assert!((proba[[0, 0]] - 0.8).abs() < 1e-12);
        assert!((proba[[0, 1]] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_knn_exact_match() {
        let (x, y) = create_classification_data();
        let mut knn = KNNClassifier::new(KNNConfig {
            n_neighbors: 5,
            weights: WeightScheme::Distance,
            ..Default::default()
        });
        knn.fit(&x, &y).unwrap();

        let proba = knn.predict_proba(&array![[8.0, 8.0]]).unwrap();
        assert_eq!(proba[[0, 1]], 1.0);
    }

    #[test]
    fn test_distance_metrics() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        assert_eq!(compute_distance(&a, b.iter().copied(), DistanceMetric::Euclidean), 5.0);
        assert_eq!(compute_distance(&a, b.iter().copied(), DistanceMetric::Manhattan), 7.0);
    }

    #[test]
    fn test_too_many_neighbors_rejected() {
        let (x, y) = create_classification_data();
        let mut knn = KNNClassifier::with_k(20);
        assert!(matches!(
            knn.fit(&x, &y),
            Err(RunboardError::InvalidParameter { .. })
        ));
    }
}

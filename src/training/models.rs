//! Classifier trait and shared helpers

use crate::error::{Result, RunboardError};
use ndarray::{Array1, Array2, Axis};

/// Common interface of every classifier in the registry
pub trait Classifier {
    /// Train from scratch (or continue, for warm-start capable models)
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Predict class labels
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Class membership probabilities, one column per entry of [`classes`](Self::classes).
    ///
    /// Configurations that cannot produce probability estimates return
    /// `OptionalMetricUnavailable`.
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Sorted class labels seen during fit
    fn classes(&self) -> &[f64];

    /// Mean accuracy on `(x, y)`
    fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let pred = self.predict(x)?;
        Ok(super::metrics::accuracy(y, &pred))
    }
}

/// Sorted distinct labels of `y`
pub fn unique_classes(y: &Array1<f64>) -> Vec<f64> {
    let mut classes: Vec<f64> = y.to_vec();
    classes.sort_by(f64::total_cmp);
    classes.dedup();
    classes
}

/// Index of `label` in a sorted class list
pub fn class_index(classes: &[f64], label: f64) -> Option<usize> {
    classes.binary_search_by(|c| c.total_cmp(&label)).ok()
}

/// Map labels to class indices, rejecting labels outside `classes`
pub fn encode_labels(classes: &[f64], y: &Array1<f64>) -> Result<Vec<usize>> {
    y.iter()
        .map(|&label| {
            class_index(classes, label).ok_or_else(|| {
                RunboardError::TrainingError(format!("label {} not among fitted classes", label))
            })
        })
        .collect()
}

/// One-hot matrix for class indices
pub fn one_hot(codes: &[usize], n_classes: usize) -> Array2<f64> {
    let mut out = Array2::zeros((codes.len(), n_classes));
    for (i, &c) in codes.iter().enumerate() {
        out[[i, c]] = 1.0;
    }
    out
}

/// Row-wise softmax, numerically stabilized
pub fn softmax_rows(z: &Array2<f64>) -> Array2<f64> {
    let mut out = z.clone();
    for mut row in out.rows_mut() {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row /= sum;
        }
    }
    out
}

/// Scale each row to sum to 1; all-zero rows become uniform
pub fn normalize_rows(p: &mut Array2<f64>) {
    let k = p.ncols() as f64;
    for mut row in p.rows_mut() {
        let sum = row.sum();
        if sum > 0.0 {
            row /= sum;
        } else {
            row.fill(1.0 / k);
        }
    }
}

/// Column index of the row maximum (first on ties)
pub fn argmax_rows(scores: &Array2<f64>) -> Vec<usize> {
    scores
        .axis_iter(Axis(0))
        .map(|row| {
            let mut best = 0;
            for (i, &v) in row.iter().enumerate() {
                if v > row[best] {
                    best = i;
                }
            }
            best
        })
        .collect()
}

/// Predicted labels from a score/probability matrix
pub fn labels_from_scores(classes: &[f64], scores: &Array2<f64>) -> Array1<f64> {
    argmax_rows(scores).into_iter().map(|i| classes[i]).collect()
}

/// Validate that `x` and `y` agree and are non-empty
pub fn check_xy(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(RunboardError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(RunboardError::TrainingError("empty training set".to_string()));
    }
    Ok(())
}

/// Validate the feature count of a prediction matrix
pub fn check_features(expected: usize, x: &Array2<f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(RunboardError::ShapeError {
            expected: format!("{} features", expected),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}

/// Gather rows by index
pub fn gather_rows(x: &Array2<f64>, indices: &[usize]) -> Array2<f64> {
    x.select(Axis(0), indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_unique_classes_sorted() {
        let y = array![2.0, 0.0, 2.0, 1.0];
        assert_eq!(unique_classes(&y), vec![0.0, 1.0, 2.0]);
        assert_eq!(class_index(&[0.0, 1.0, 2.0], 2.0), Some(2));
        assert_eq!(class_index(&[0.0, 2.0], 1.0), None);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let z = array![[1.0, 2.0, 3.0], [1000.0, 1000.0, 1000.0]];
        let p = softmax_rows(&z);
        for row in p.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
        assert!((p[[1, 0]] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_argmax_first_on_tie() {
        let s = array![[0.5, 0.5], [0.1, 0.9]];
        assert_eq!(argmax_rows(&s), vec![0, 1]);
    }
}

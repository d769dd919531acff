//! Gaussian Naive Bayes for continuous features

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::models::{
    check_features, check_xy, encode_labels, labels_from_scores, unique_classes, Classifier,
};
use crate::error::{Result, RunboardError};

/// Gaussian Naive Bayes Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    /// Per-class feature means, (n_classes, n_features)
    means: Option<Array2<f64>>,
    /// Per-class feature variances after smoothing
    variances: Option<Array2<f64>>,
    priors: Vec<f64>,
    classes: Vec<f64>,
    /// Fraction of the largest feature variance added to every variance
    pub var_smoothing: f64,
}

impl Default for GaussianNaiveBayes {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianNaiveBayes {
    pub fn new() -> Self {
        Self {
            means: None,
            variances: None,
            priors: Vec::new(),
            classes: Vec::new(),
            var_smoothing: 1e-9,
        }
    }

    /// Set variance smoothing parameter
    pub fn with_var_smoothing(mut self, smoothing: f64) -> Self {
        self.var_smoothing = smoothing;
        self
    }

    /// Class priors in the order of `classes()`
    pub fn class_priors(&self) -> &[f64] {
        &self.priors
    }

    /// Normalized log posterior per class
    pub fn predict_log_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (means, vars) = match (&self.means, &self.variances) {
            (Some(m), Some(v)) => (m, v),
            _ => return Err(RunboardError::ModelNotFitted),
        };
        check_features(means.ncols(), x)?;

        let mut log_probs = Array2::zeros((x.nrows(), self.classes.len()));
        for (i, row) in x.rows().into_iter().enumerate() {
            for k in 0..self.classes.len() {
                let likelihood: f64 = row
                    .iter()
                    .zip(means.row(k))
                    .zip(vars.row(k))
                    .map(|((&xi, &mean), &var)| {
                        -0.5 * ((xi - mean).powi(2) / var + var.ln() + (2.0 * PI).ln())
                    })
                    .sum();
                log_probs[[i, k]] = self.priors[k].ln() + likelihood;
            }
        }

        // log-sum-exp
        for mut row in log_probs.rows_mut() {
            let max_val = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let log_sum = row.iter().map(|&v| (v - max_val).exp()).sum::<f64>().ln();
            row.mapv_inplace(|v| v - max_val - log_sum);
        }
        Ok(log_probs)
    }
}

impl Classifier for GaussianNaiveBayes {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        if self.var_smoothing < 0.0 {
            return Err(RunboardError::invalid_param(
                "var_smoothing",
                self.var_smoothing,
                "must be non-negative",
            ));
        }
        let classes = unique_classes(y);
        let codes = encode_labels(&classes, y)?;
        let n_features = x.ncols();

        let max_var = x
            .var_axis(Axis(0), 0.0)
            .iter()
            .cloned()
            .fold(0.0f64, f64::max);
        // keep variances positive even for constant data
        let epsilon = (self.var_smoothing * max_var).max(f64::MIN_POSITIVE);

        let mut means = Array2::zeros((classes.len(), n_features));
        let mut variances = Array2::zeros((classes.len(), n_features));
        let mut priors = Vec::with_capacity(classes.len());
        for k in 0..classes.len() {
            let rows: Vec<usize> = codes
                .iter()
                .enumerate()
                .filter(|(_, &c)| c == k)
                .map(|(i, _)| i)
                .collect();
            let subset = x.select(Axis(0), &rows);
            let mean = subset.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_features));
            let var = subset.var_axis(Axis(0), 0.0) + epsilon;
            means.row_mut(k).assign(&mean);
            variances.row_mut(k).assign(&var);
            priors.push(rows.len() as f64 / x.nrows() as f64);
        }

        self.means = Some(means);
        self.variances = Some(variances);
        self.priors = priors;
        self.classes = classes;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let log_probs = self.predict_log_proba(x)?;
        Ok(labels_from_scores(&self.classes, &log_probs))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(self.predict_log_proba(x)?.mapv(f64::exp))
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn create_classification_data() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [1.0, 2.0], [1.2, 1.8], [0.8, 2.2], [1.1, 2.1],
            [5.0, 6.0], [5.2, 5.8], [4.8, 6.2], [5.1, 6.1],
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_gaussian_naive_bayes() {
        let (x, y) = create_classification_data();
        let mut nb = GaussianNaiveBayes::new();
        nb.fit(&x, &y).unwrap();
        assert_eq!(nb.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_gaussian_proba() {
        let (x, y) = create_classification_data();
        let mut nb = GaussianNaiveBayes::new();
        nb.fit(&x, &y).unwrap();

        let proba = nb.predict_proba(&x).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        assert!(proba[[0, 0]] > 0.99);
    }

    #[test]
    fn test_class_priors() {
        let x = array![[0.0], [0.1], [0.2], [5.0]];
        let y = array![0.0, 0.0, 0.0, 1.0];
        let mut nb = GaussianNaiveBayes::new();
        nb.fit(&x, &y).unwrap();
        assert_eq!(nb.class_priors(), &[0.75, 0.25]);
    }

    #[test]
    fn test_constant_feature_does_not_divide_by_zero() {
        let x = array![[1.0, 0.0], [1.0, 1.0], [1.0, 5.0], [1.0, 6.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut nb = GaussianNaiveBayes::new();
        nb.fit(&x, &y).unwrap();
        let proba = nb.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|p| p.is_finite()));
    }
}

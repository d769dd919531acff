//! Linear classification models

use super::models::{
    check_features, check_xy, encode_labels, labels_from_scores, one_hot, softmax_rows,
    unique_classes, Classifier,
};
use crate::error::{Result, RunboardError};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Multinomial logistic regression with L2 penalty
///
/// Minimizes `sum(cross_entropy) + ||W||^2 / (2C)` by gradient descent with
/// a backtracking line search. The intercept is not penalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Inverse regularization strength
    pub c: f64,
    /// Maximum iterations
    pub max_iter: usize,
    /// Convergence tolerance on the gradient's largest entry
    pub tol: f64,
    /// Whether to fit intercept
    pub fit_intercept: bool,
    /// Fitted coefficients, (n_features, n_classes)
    pub coefficients: Option<Array2<f64>>,
    /// Fitted intercepts, one per class
    pub intercept: Option<Array1<f64>>,
    /// Iterations used by the last fit
    pub n_iter: usize,
    classes: Vec<f64>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            c: 1.0,
            max_iter: 100,
            tol: 1e-4,
            fit_intercept: true,
            coefficients: None,
            intercept: None,
            n_iter: 0,
            classes: Vec::new(),
        }
    }

    /// Set inverse regularization strength
    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    /// Set maximum iterations
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    fn objective(
        &self,
        x: &Array2<f64>,
        y_onehot: &Array2<f64>,
        w: &Array2<f64>,
        b: &Array1<f64>,
    ) -> (f64, Array2<f64>) {
        let proba = softmax_rows(&(x.dot(w) + b));
        let ce: f64 = proba
            .iter()
            .zip(y_onehot.iter())
            .filter(|(_, &t)| t > 0.0)
            .map(|(&p, _)| -(p.max(1e-300)).ln())
            .sum();
        let penalty = w.mapv(|v| v * v).sum() / (2.0 * self.c);
        (ce + penalty, proba)
    }
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        if self.c <= 0.0 {
            return Err(RunboardError::invalid_param("C", self.c, "must be positive"));
        }
        let classes = unique_classes(y);
        if classes.len() < 2 {
            return Err(RunboardError::TrainingError(
                "logistic regression needs at least 2 classes".to_string(),
            ));
        }
        let codes = encode_labels(&classes, y)?;
        let y_onehot = one_hot(&codes, classes.len());

        let mut w = Array2::<f64>::zeros((x.ncols(), classes.len()));
        let mut b = Array1::<f64>::zeros(classes.len());
        let (mut loss, mut proba) = self.objective(x, &y_onehot, &w, &b);
        let mut step = 1.0 / x.nrows() as f64;

        self.n_iter = 0;
        for _ in 0..self.max_iter {
            self.n_iter += 1;
            let residual = &proba - &y_onehot;
            let grad_w = x.t().dot(&residual) + &w / self.c;
            let grad_b = if self.fit_intercept {
                residual.sum_axis(Axis(0))
            } else {
                Array1::zeros(classes.len())
            };

            let grad_max = grad_w
                .iter()
                .chain(grad_b.iter())
                .fold(0.0f64, |m, g| m.max(g.abs()));
            if grad_max < self.tol {
                break;
            }
            let grad_sq = grad_w.mapv(|g| g * g).sum() + grad_b.mapv(|g| g * g).sum();

            // Armijo backtracking
            let mut accepted = false;
            for _ in 0..30 {
                let w_new = &w - &(&grad_w * step);
                let b_new = &b - &(&grad_b * step);
                let (new_loss, new_proba) = self.objective(x, &y_onehot, &w_new, &b_new);
                if new_loss <= loss - 0.5 * step * grad_sq {
                    w = w_new;
                    b = b_new;
                    loss = new_loss;
                    proba = new_proba;
                    accepted = true;
                    break;
                }
                step *= 0.5;
            }
            if !accepted {
                break;
            }
            step *= 2.0;
        }

        self.coefficients = Some(w);
        self.intercept = Some(b);
        self.classes = classes;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(labels_from_scores(&self.classes, &proba))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (w, b) = match (&self.coefficients, &self.intercept) {
            (Some(w), Some(b)) => (w, b),
            _ => return Err(RunboardError::ModelNotFitted),
        };
        check_features(w.nrows(), x)?;
        Ok(softmax_rows(&(x.dot(w) + b)))
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_logistic_binary() {
        let x = array![[-2.0], [-1.5], [-1.0], [-0.5], [0.5], [1.0], [1.5], [2.0]];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];

        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();

        assert_eq!(model.predict(&x).unwrap(), y);
        let proba = model.predict_proba(&array![[3.0]]).unwrap();
        assert!(proba[[0, 1]] > 0.9);
    }

    #[test]
    fn test_logistic_multiclass() {
        let x = array![
            [0.0, 0.0], [0.2, 0.1], [0.1, 0.2],
            [3.0, 0.0], [3.1, 0.2], [2.9, 0.1],
            [0.0, 3.0], [0.2, 3.1], [0.1, 2.9],
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0];

        let mut model = LogisticRegression::new().with_max_iter(300);
        model.fit(&x, &y).unwrap();
        assert_eq!(model.score(&x, &y).unwrap(), 1.0);

        let proba = model.predict_proba(&x).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_stronger_penalty_shrinks_coefficients() {
        let x = array![[-1.0], [-0.5], [0.5], [1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut loose = LogisticRegression::new().with_c(10.0);
        let mut tight = LogisticRegression::new().with_c(0.01);
        loose.fit(&x, &y).unwrap();
        tight.fit(&x, &y).unwrap();

        let norm = |m: &LogisticRegression| m.coefficients.as_ref().unwrap().mapv(f64::abs).sum();
        assert!(norm(&tight) < norm(&loose));
    }

    #[test]
    fn test_unfitted_errors() {
        let model = LogisticRegression::new();
        assert!(matches!(
            model.predict(&array![[1.0]]),
            Err(RunboardError::ModelNotFitted)
        ));
    }
}

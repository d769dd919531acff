//! Stochastic Gradient Descent (SGD) classifier
//!
//! Linear one-vs-rest model updated one sample at a time. `partial_fit`
//! makes a single pass over the data, so training can be driven epoch by
//! epoch.

use super::models::{
    check_features, check_xy, encode_labels, labels_from_scores, normalize_rows, unique_classes,
    Classifier,
};
use crate::error::{Result, RunboardError};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SGDLoss {
    /// Linear SVM; no probability estimates
    #[default]
    Hinge,
    /// Logistic regression
    Log,
    /// Smooth hinge with probability estimates
    ModifiedHuber,
}

impl FromStr for SGDLoss {
    type Err = RunboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hinge" => Ok(Self::Hinge),
            "log_loss" | "log" => Ok(Self::Log),
            "modified_huber" => Ok(Self::ModifiedHuber),
            other => Err(RunboardError::invalid_param(
                "loss",
                other,
                "expected one of hinge, log_loss, modified_huber",
            )),
        }
    }
}

impl SGDLoss {
    /// Loss and its derivative w.r.t. the decision value, for target `y` in {-1, 1}
    fn eval(self, p: f64, y: f64) -> (f64, f64) {
        let z = p * y;
        match self {
            Self::Hinge => {
                if z < 1.0 {
                    (1.0 - z, -y)
                } else {
                    (0.0, 0.0)
                }
            }
            Self::Log => {
                if z > 18.0 {
                    ((-z).exp(), -y * (-z).exp())
                } else if z < -18.0 {
                    (-z, -y)
                } else {
                    ((1.0 + (-z).exp()).ln(), -y / (1.0 + z.exp()))
                }
            }
            Self::ModifiedHuber => {
                if z >= 1.0 {
                    (0.0, 0.0)
                } else if z >= -1.0 {
                    ((1.0 - z) * (1.0 - z), -2.0 * y * (1.0 - z))
                } else {
                    (-4.0 * z, -4.0 * y)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LearningRateSchedule {
    Constant,
    /// 1 / (alpha * (t + t0))
    #[default]
    Optimal,
    /// eta0 / t^power_t
    InvScaling,
}

impl FromStr for LearningRateSchedule {
    type Err = RunboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "constant" => Ok(Self::Constant),
            "optimal" => Ok(Self::Optimal),
            "invscaling" => Ok(Self::InvScaling),
            other => Err(RunboardError::invalid_param(
                "learning_rate",
                other,
                "expected one of constant, optimal, invscaling",
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SGDConfig {
    pub loss: SGDLoss,
    pub learning_rate: LearningRateSchedule,
    pub eta0: f64,
    /// L2 regularization
    pub alpha: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub power_t: f64,
    pub shuffle: bool,
    pub fit_intercept: bool,
    pub random_state: Option<u64>,
}

impl Default for SGDConfig {
    fn default() -> Self {
        Self {
            loss: SGDLoss::Hinge,
            learning_rate: LearningRateSchedule::Optimal,
            eta0: 0.01,
            alpha: 0.0001,
            max_iter: 1000,
            tol: 1e-3,
            power_t: 0.5,
            shuffle: true,
            fit_intercept: true,
            random_state: None,
        }
    }
}

/// Epochs without improvement tolerated by a full `fit`
const N_ITER_NO_CHANGE: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SGDClassifier {
    pub config: SGDConfig,
    /// (n_features, n_binary_problems)
    coef: Option<Array2<f64>>,
    intercept: Option<Array1<f64>>,
    classes: Vec<f64>,
    /// Samples seen, drives the learning-rate schedule
    t: usize,
    epochs: usize,
    seed: u64,
}

impl SGDClassifier {
    pub fn new(config: SGDConfig) -> Self {
        Self {
            config,
            coef: None,
            intercept: None,
            classes: Vec::new(),
            t: 0,
            epochs: 0,
            seed: 0,
        }
    }

    /// Epochs trained so far
    pub fn n_epochs(&self) -> usize {
        self.epochs
    }

    fn learning_rate(&self) -> f64 {
        let c = &self.config;
        let t = self.t as f64 + 1.0;
        match c.learning_rate {
            LearningRateSchedule::Constant => c.eta0,
            LearningRateSchedule::Optimal => {
                let typw = (1.0 / c.alpha.sqrt()).sqrt();
                let t0 = 1.0 / (c.alpha * typw);
                1.0 / (c.alpha * (t0 + t - 1.0))
            }
            LearningRateSchedule::InvScaling => c.eta0 / t.powf(c.power_t),
        }
    }

    fn validate_params(&self) -> Result<()> {
        if self.config.alpha <= 0.0 && self.config.learning_rate == LearningRateSchedule::Optimal {
            return Err(RunboardError::invalid_param(
                "alpha",
                self.config.alpha,
                "must be positive with the optimal schedule",
            ));
        }
        if self.config.learning_rate != LearningRateSchedule::Optimal && self.config.eta0 <= 0.0 {
            return Err(RunboardError::invalid_param("eta0", self.config.eta0, "must be positive"));
        }
        Ok(())
    }

    fn initialize(&mut self, n_features: usize, classes: Vec<f64>) {
        let n_problems = if classes.len() == 2 { 1 } else { classes.len() };
        self.coef = Some(Array2::zeros((n_features, n_problems)));
        self.intercept = Some(Array1::zeros(n_problems));
        self.classes = classes;
        self.t = 0;
        self.epochs = 0;
        self.seed = self.config.random_state.unwrap_or_else(rand::random);
    }

    /// One pass of per-sample updates; returns the summed loss
    fn run_epoch(&mut self, x: &Array2<f64>, codes: &[usize]) -> Result<f64> {
        let mut order: Vec<usize> = (0..x.nrows()).collect();
        if self.config.shuffle {
            let mut rng =
                Xoshiro256PlusPlus::seed_from_u64(self.seed.wrapping_add(self.epochs as u64));
            order.shuffle(&mut rng);
        }

        let loss_fn = self.config.loss;
        let alpha = self.config.alpha;
        let fit_intercept = self.config.fit_intercept;
        let binary = self.classes.len() == 2;

        let mut total = 0.0;
        for &i in &order {
            let eta = self.learning_rate();
            let (coef, intercept) = match (self.coef.as_mut(), self.intercept.as_mut()) {
                (Some(c), Some(b)) => (c, b),
                _ => return Err(RunboardError::ModelNotFitted),
            };
            let row = x.row(i);
            for j in 0..coef.ncols() {
                let positive = if binary { codes[i] == 1 } else { codes[i] == j };
                let y = if positive { 1.0 } else { -1.0 };
                let mut w = coef.column_mut(j);
                let p = w.dot(&row) + intercept[j];
                let (loss, dloss) = loss_fn.eval(p, y);
                total += loss;

                w *= 1.0 - eta * alpha;
                if dloss != 0.0 {
                    w.scaled_add(-eta * dloss, &row);
                    if fit_intercept {
                        intercept[j] -= eta * dloss;
                    }
                }
            }
            self.t += 1;
        }
        self.epochs += 1;
        Ok(total)
    }

    /// Single epoch over `(x, y)`. The first call fixes the class set.
    pub fn partial_fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        self.validate_params()?;
        match &self.coef {
            None => {
                let classes = unique_classes(y);
                if classes.len() < 2 {
                    return Err(RunboardError::TrainingError(
                        "SGD needs at least 2 classes".to_string(),
                    ));
                }
                self.initialize(x.ncols(), classes);
            }
            Some(coef) => check_features(coef.nrows(), x)?,
        }
        let codes = encode_labels(&self.classes, y)?;
        self.run_epoch(x, &codes)?;
        Ok(())
    }

    /// Signed distance to each one-vs-rest hyperplane
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (coef, intercept) = match (&self.coef, &self.intercept) {
            (Some(c), Some(b)) => (c, b),
            _ => return Err(RunboardError::ModelNotFitted),
        };
        check_features(coef.nrows(), x)?;
        Ok(x.dot(coef) + intercept)
    }
}

impl Classifier for SGDClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        self.validate_params()?;
        let classes = unique_classes(y);
        if classes.len() < 2 {
            return Err(RunboardError::TrainingError(
                "SGD needs at least 2 classes".to_string(),
            ));
        }
        self.initialize(x.ncols(), classes);
        let codes = encode_labels(&self.classes, y)?;

        let n = x.nrows() as f64;
        let mut best = f64::INFINITY;
        let mut stalled = 0;
        for _ in 0..self.config.max_iter {
            let loss = self.run_epoch(x, &codes)?;
            if loss > best - self.config.tol * n {
                stalled += 1;
                if stalled >= N_ITER_NO_CHANGE {
                    break;
                }
            } else {
                stalled = 0;
            }
            best = best.min(loss);
        }
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let scores = self.decision_function(x)?;
        if scores.ncols() == 1 {
            Ok(scores
                .column(0)
                .iter()
                .map(|&s| if s > 0.0 { self.classes[1] } else { self.classes[0] })
                .collect())
        } else {
            Ok(labels_from_scores(&self.classes, &scores))
        }
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let link: fn(f64) -> f64 = match self.config.loss {
            SGDLoss::Hinge => {
                return Err(RunboardError::OptionalMetricUnavailable(
                    "probability estimates are not available for loss='hinge'".to_string(),
                ))
            }
            SGDLoss::Log => logistic,
            SGDLoss::ModifiedHuber => clipped_linear,
        };

        let scores = self.decision_function(x)?;
        if scores.ncols() == 1 {
            let mut proba = Array2::zeros((x.nrows(), 2));
            for (i, &d) in scores.column(0).iter().enumerate() {
                let p = link(d);
                proba[[i, 0]] = 1.0 - p;
                proba[[i, 1]] = p;
            }
            Ok(proba)
        } else {
            let mut proba = scores.mapv(link);
            normalize_rows(&mut proba);
            Ok(proba)
        }
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }
}

fn logistic(d: f64) -> f64 {
    1.0 / (1.0 + (-d).exp())
}

fn clipped_linear(d: f64) -> f64 {
    (d.clamp(-1.0, 1.0) + 1.0) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_classification_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| {
            let side = if i < 20 { -1.0 } else { 1.0 };
            side * 2.0 + ((i * 3 + j) % 5) as f64 * 0.1
        });
        let y: Array1<f64> = (0..40).map(|i| if i < 20 { 0.0 } else { 1.0 }).collect();
        (x, y)
    }

    fn seeded(loss: SGDLoss) -> SGDClassifier {
        SGDClassifier::new(SGDConfig {
            loss,
            random_state: Some(42),
            ..Default::default()
        })
    }

    #[test]
    fn test_sgd_classifier_hinge() {
        let (x, y) = make_classification_data();
        let mut model = seeded(SGDLoss::Hinge);
        model.fit(&x, &y).unwrap();
        assert!(model.score(&x, &y).unwrap() > 0.95);
    }

    #[test]
    fn test_hinge_has_no_probabilities() {
        let (x, y) = make_classification_data();
        let mut model = seeded(SGDLoss::Hinge);
        model.partial_fit(&x, &y).unwrap();
        assert!(matches!(
            model.predict_proba(&x),
            Err(RunboardError::OptionalMetricUnavailable(_))
        ));
    }

    #[test]
    fn test_sgd_predict_proba_log() {
        let (x, y) = make_classification_data();
        let mut model = seeded(SGDLoss::Log);
        model.fit(&x, &y).unwrap();
        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.ncols(), 2);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_multiclass_ovr() {
        let x = Array2::from_shape_fn((30, 1), |(i, _)| (i / 10) as f64 * 5.0 + (i % 10) as f64 * 0.1);
        let y: Array1<f64> = (0..30).map(|i| (i / 10) as f64).collect();
        let mut model = seeded(SGDLoss::ModifiedHuber);
        for _ in 0..30 {
            model.partial_fit(&x, &y).unwrap();
        }
        assert_eq!(model.n_epochs(), 30);
        assert_eq!(model.predict_proba(&x).unwrap().ncols(), 3);
    }
}

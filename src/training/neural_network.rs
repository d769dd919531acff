//! Neural Network (Multi-Layer Perceptron) implementation
//!
//! A feedforward classifier with softmax output trained by mini-batch
//! backpropagation. `partial_fit` runs exactly one epoch so callers can
//! drive training step by step.

use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::models::{
    check_features, check_xy, encode_labels, gather_rows, labels_from_scores, one_hot,
    softmax_rows, unique_classes, Classifier,
};
use crate::error::{Result, RunboardError};

/// Activation function for hidden layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Activation {
    /// Rectified Linear Unit
    #[default]
    ReLU,
    /// Logistic sigmoid
    Logistic,
    /// Hyperbolic tangent
    Tanh,
    /// Identity
    Identity,
}

impl FromStr for Activation {
    type Err = RunboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "relu" => Ok(Self::ReLU),
            "logistic" => Ok(Self::Logistic),
            "tanh" => Ok(Self::Tanh),
            "identity" => Ok(Self::Identity),
            other => Err(RunboardError::invalid_param(
                "activation",
                other,
                "expected one of relu, logistic, tanh, identity",
            )),
        }
    }
}

impl Activation {
    fn apply(self, z: &mut Array2<f64>) {
        match self {
            Self::ReLU => z.mapv_inplace(|v| v.max(0.0)),
            Self::Logistic => z.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
            Self::Tanh => z.mapv_inplace(f64::tanh),
            Self::Identity => {}
        }
    }

    /// Derivative expressed through the activation's output
    fn derivative(self, a: &Array2<f64>) -> Array2<f64> {
        match self {
            Self::ReLU => a.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Self::Logistic => a.mapv(|v| v * (1.0 - v)),
            Self::Tanh => a.mapv(|v| 1.0 - v * v),
            Self::Identity => Array2::ones(a.raw_dim()),
        }
    }
}

/// Weight update rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Solver {
    #[default]
    Adam,
    /// Plain SGD with momentum
    Sgd,
}

impl FromStr for Solver {
    type Err = RunboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "adam" => Ok(Self::Adam),
            "sgd" => Ok(Self::Sgd),
            other => Err(RunboardError::invalid_param(
                "solver",
                other,
                "expected adam or sgd",
            )),
        }
    }
}

/// Neural Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLPConfig {
    /// Hidden layer sizes
    pub hidden_layer_sizes: Vec<usize>,
    /// Activation function for hidden layers
    pub activation: Activation,
    pub solver: Solver,
    /// Initial learning rate
    pub learning_rate_init: f64,
    /// Number of epochs for a full `fit`
    pub max_iter: usize,
    /// Mini-batch size; `None` means `min(200, n_samples)`
    pub batch_size: Option<usize>,
    /// L2 regularization
    pub alpha: f64,
    /// Momentum for the SGD solver
    pub momentum: f64,
    /// Shuffle rows each epoch
    pub shuffle: bool,
    /// Loss improvement below which an epoch counts as stalled
    pub tol: f64,
    /// Stalled epochs tolerated before a full `fit` stops
    pub n_iter_no_change: usize,
    /// Random seed
    pub random_state: Option<u64>,
}

impl Default for MLPConfig {
    fn default() -> Self {
        Self {
            hidden_layer_sizes: vec![100],
            activation: Activation::ReLU,
            solver: Solver::Adam,
            learning_rate_init: 0.001,
            max_iter: 200,
            batch_size: None,
            alpha: 0.0001,
            momentum: 0.9,
            shuffle: true,
            tol: 1e-4,
            n_iter_no_change: 10,
            random_state: None,
        }
    }
}

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;

/// Multi-Layer Perceptron Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLPClassifier {
    pub config: MLPConfig,
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    // first moments for Adam, velocities for SGD
    moment_w: Vec<Array2<f64>>,
    moment_b: Vec<Array1<f64>>,
    second_w: Vec<Array2<f64>>,
    second_b: Vec<Array1<f64>>,
    updates: i32,
    epochs: usize,
    classes: Vec<f64>,
    n_features: usize,
    seed: u64,
    /// Mean training loss per epoch
    pub loss_curve: Vec<f64>,
}

impl MLPClassifier {
    pub fn new(config: MLPConfig) -> Self {
        Self {
            config,
            weights: Vec::new(),
            biases: Vec::new(),
            moment_w: Vec::new(),
            moment_b: Vec::new(),
            second_w: Vec::new(),
            second_b: Vec::new(),
            updates: 0,
            epochs: 0,
            classes: Vec::new(),
            n_features: 0,
            seed: 0,
            loss_curve: Vec::new(),
        }
    }

    /// Epochs trained so far
    pub fn n_epochs(&self) -> usize {
        self.epochs
    }

    fn is_initialized(&self) -> bool {
        !self.weights.is_empty()
    }

    fn initialize(&mut self, n_features: usize, classes: Vec<f64>) {
        self.seed = self.config.random_state.unwrap_or_else(rand::random);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.seed);

        let mut sizes = vec![n_features];
        sizes.extend(self.config.hidden_layer_sizes.iter().copied());
        sizes.push(classes.len());

        self.weights.clear();
        self.biases.clear();
        let factor = if self.config.activation == Activation::Logistic { 2.0 } else { 6.0 };
        for pair in sizes.windows(2) {
            let (fan_in, fan_out) = (pair[0], pair[1]);
            let bound = (factor / (fan_in + fan_out) as f64).sqrt();
            self.weights.push(Array2::from_shape_fn((fan_in, fan_out), |_| {
                rng.gen_range(-bound..bound)
            }));
            self.biases.push(Array1::from_shape_fn(fan_out, |_| rng.gen_range(-bound..bound)));
        }

        self.moment_w = self.weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect();
        self.moment_b = self.biases.iter().map(|b| Array1::zeros(b.len())).collect();
        self.second_w = self.moment_w.clone();
        self.second_b = self.moment_b.clone();
        self.updates = 0;
        self.epochs = 0;
        self.loss_curve.clear();
        self.classes = classes;
        self.n_features = n_features;
    }

    /// Layer outputs, input first and softmax probabilities last
    fn forward(&self, x: &Array2<f64>) -> Vec<Array2<f64>> {
        let mut activations = vec![x.clone()];
        let last = self.weights.len() - 1;
        for (layer, (w, b)) in self.weights.iter().zip(&self.biases).enumerate() {
            let mut z = activations[layer].dot(w) + b;
            if layer == last {
                z = softmax_rows(&z);
            } else {
                self.config.activation.apply(&mut z);
            }
            activations.push(z);
        }
        activations
    }

    /// One optimizer step on a mini-batch; returns the batch's summed loss
    fn train_batch(&mut self, x: &Array2<f64>, y_onehot: &Array2<f64>) -> f64 {
        let n = x.nrows() as f64;
        let activations = self.forward(x);
        let output = &activations[activations.len() - 1];

        let loss: f64 = output
            .iter()
            .zip(y_onehot.iter())
            .filter(|(_, &t)| t > 0.0)
            .map(|(&p, _)| -p.max(1e-15).ln())
            .sum();

        let layers = self.weights.len();
        let mut grads_w = Vec::with_capacity(layers);
        let mut grads_b = Vec::with_capacity(layers);
        let mut delta = (output - y_onehot) / n;
        for layer in (0..layers).rev() {
            let gw = activations[layer].t().dot(&delta) + &self.weights[layer] * (self.config.alpha / n);
            let gb = delta.sum_axis(Axis(0));
            if layer > 0 {
                delta = delta.dot(&self.weights[layer].t())
                    * self.config.activation.derivative(&activations[layer]);
            }
            grads_w.push(gw);
            grads_b.push(gb);
        }
        grads_w.reverse();
        grads_b.reverse();

        self.apply_gradients(&grads_w, &grads_b);
        loss
    }

    fn apply_gradients(&mut self, grads_w: &[Array2<f64>], grads_b: &[Array1<f64>]) {
        let lr = self.config.learning_rate_init;
        match self.config.solver {
            Solver::Adam => {
                self.updates += 1;
                let t = self.updates;
                let step = lr * (1.0 - BETA2.powi(t)).sqrt() / (1.0 - BETA1.powi(t));
                for l in 0..self.weights.len() {
                    self.moment_w[l] = &self.moment_w[l] * BETA1 + &grads_w[l] * (1.0 - BETA1);
                    self.second_w[l] =
                        &self.second_w[l] * BETA2 + &grads_w[l].mapv(|g| g * g) * (1.0 - BETA2);
                    self.moment_b[l] = &self.moment_b[l] * BETA1 + &grads_b[l] * (1.0 - BETA1);
                    self.second_b[l] =
                        &self.second_b[l] * BETA2 + &grads_b[l].mapv(|g| g * g) * (1.0 - BETA2);

                    let dw = &self.moment_w[l] / &self.second_w[l].mapv(|v| v.sqrt() + ADAM_EPS);
                    let db = &self.moment_b[l] / &self.second_b[l].mapv(|v| v.sqrt() + ADAM_EPS);
                    self.weights[l].scaled_add(-step, &dw);
                    self.biases[l].scaled_add(-step, &db);
                }
            }
            Solver::Sgd => {
                let m = self.config.momentum;
                for l in 0..self.weights.len() {
                    self.moment_w[l] = &self.moment_w[l] * m - &grads_w[l] * lr;
                    self.moment_b[l] = &self.moment_b[l] * m - &grads_b[l] * lr;
                    self.weights[l] += &self.moment_w[l];
                    self.biases[l] += &self.moment_b[l];
                }
            }
        }
    }

    /// Single pass over the data; returns mean loss
    fn run_epoch(&mut self, x: &Array2<f64>, y_onehot: &Array2<f64>) -> f64 {
        let n = x.nrows();
        let batch_size = self.config.batch_size.unwrap_or(200).clamp(1, n);

        let mut indices: Vec<usize> = (0..n).collect();
        if self.config.shuffle {
            let mut rng =
                Xoshiro256PlusPlus::seed_from_u64(self.seed.wrapping_add(self.epochs as u64 + 1));
            indices.shuffle(&mut rng);
        }

        let mut total = 0.0;
        for batch in indices.chunks(batch_size) {
            let xb = gather_rows(x, batch);
            let yb = gather_rows(y_onehot, batch);
            total += self.train_batch(&xb, &yb);
        }

        let l2: f64 = self.weights.iter().map(|w| w.mapv(|v| v * v).sum()).sum();
        let mean_loss = total / n as f64 + 0.5 * self.config.alpha * l2 / n as f64;
        self.epochs += 1;
        self.loss_curve.push(mean_loss);
        mean_loss
    }

    fn validate_params(&self) -> Result<()> {
        if self.config.learning_rate_init <= 0.0 {
            return Err(RunboardError::invalid_param(
                "learning_rate_init",
                self.config.learning_rate_init,
                "must be positive",
            ));
        }
        if self.config.hidden_layer_sizes.contains(&0) {
            return Err(RunboardError::invalid_param(
                "hidden_layer_sizes",
                format!("{:?}", self.config.hidden_layer_sizes),
                "layer sizes must be positive",
            ));
        }
        if self.config.batch_size == Some(0) {
            return Err(RunboardError::invalid_param("batch_size", 0, "must be positive"));
        }
        Ok(())
    }

    /// Train for exactly one epoch, continuing from the current weights.
    ///
    /// Classes are fixed by the first call; later calls must only contain
    /// labels from that set.
    pub fn partial_fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        self.validate_params()?;
        if !self.is_initialized() {
            let classes = unique_classes(y);
            if classes.len() < 2 {
                return Err(RunboardError::TrainingError(
                    "MLP needs at least 2 classes".to_string(),
                ));
            }
            self.initialize(x.ncols(), classes);
        } else {
            check_features(self.n_features, x)?;
        }

        let codes = encode_labels(&self.classes, y)?;
        let y_onehot = one_hot(&codes, self.classes.len());
        self.run_epoch(x, &y_onehot);
        Ok(())
    }
}

impl Classifier for MLPClassifier {
    /// Reinitialize and train for up to `max_iter` epochs
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        self.validate_params()?;
        let classes = unique_classes(y);
        if classes.len() < 2 {
            return Err(RunboardError::TrainingError(
                "MLP needs at least 2 classes".to_string(),
            ));
        }
        self.initialize(x.ncols(), classes);

        let codes = encode_labels(&self.classes, y)?;
        let y_onehot = one_hot(&codes, self.classes.len());

        let mut best = f64::INFINITY;
        let mut stalled = 0;
        for _ in 0..self.config.max_iter {
            let loss = self.run_epoch(x, &y_onehot);
            if loss > best - self.config.tol {
                stalled += 1;
                if stalled >= self.config.n_iter_no_change {
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
        let proba = self.predict_proba(x)?;
        Ok(labels_from_scores(&self.classes, &proba))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_initialized() {
            return Err(RunboardError::ModelNotFitted);
        }
        check_features(self.n_features, x)?;
        let mut activations = self.forward(x);
        activations.pop().ok_or(RunboardError::ModelNotFitted)
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_classification_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((60, 2), |(i, j)| {
            let cluster = (i / 20) as f64;
            let jitter = ((i * 13 + j * 7) % 10) as f64 * 0.05;
            if j == 0 { cluster * 2.0 + jitter } else { jitter - cluster }
        });
        let y: Array1<f64> = (0..60).map(|i| (i / 20) as f64).collect();
        (x, y)
    }

    fn small_config() -> MLPConfig {
        MLPConfig {
            hidden_layer_sizes: vec![16],
            learning_rate_init: 0.01,
            max_iter: 300,
            batch_size: Some(16),
            random_state: Some(42),
            ..Default::default()
        }
    }

    #[test]
    fn test_mlp_classifier() {
        let (x, y) = create_classification_data();
        let mut model = MLPClassifier::new(small_config());
        model.fit(&x, &y).unwrap();

        let accuracy = model.score(&x, &y).unwrap();
        assert!(accuracy > 0.9, "Accuracy ({}) should be above 90%", accuracy);

        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.ncols(), 3);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_partial_fit_counts_epochs() {
        let (x, y) = create_classification_data();
        let mut model = MLPClassifier::new(small_config());
        for _ in 0..5 {
            model.partial_fit(&x, &y).unwrap();
        }
        assert_eq!(model.n_epochs(), 5);
        assert_eq!(model.loss_curve.len(), 5);
        assert!(model.loss_curve[4] < model.loss_curve[0]);
    }

    #[test]
    fn test_partial_fit_rejects_new_label() {
        let (x, y) = create_classification_data();
        let mut model = MLPClassifier::new(small_config());
        model.partial_fit(&x, &y).unwrap();

        let y_bad = y.mapv(|v| if v == 2.0 { 5.0 } else { v });
        assert!(model.partial_fit(&x, &y_bad).is_err());
    }

    #[test]
    fn test_seeded_runs_match() {
        let (x, y) = create_classification_data();
        let mut a = MLPClassifier::new(small_config());
        let mut b = MLPClassifier::new(small_config());
        a.partial_fit(&x, &y).unwrap();
        b.partial_fit(&x, &y).unwrap();
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_activation_parse() {
        assert_eq!("tanh".parse::<Activation>().unwrap(), Activation::Tanh);
        assert!("swish".parse::<Activation>().is_err());
        assert_eq!("sgd".parse::<Solver>().unwrap(), Solver::Sgd);
    }
}

//! Support Vector Machine classifier
//!
//! Kernel SVC trained with SMO (Sequential Minimal Optimization). Multiclass
//! problems are split one-vs-rest and the binary problems are trained in
//! parallel.

use super::models::{
    check_features, check_xy, encode_labels, labels_from_scores, softmax_rows, unique_classes,
    Classifier,
};
use crate::error::{Result, RunboardError};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Beyond this many samples the kernel matrix is not materialized
const MAX_KERNEL_MATRIX_SAMPLES: usize = 10_000;

/// Kernel function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum KernelType {
    /// K(x, y) = x · y
    Linear,
    /// K(x, y) = (γ x · y + r)^d
    Poly,
    /// K(x, y) = exp(-γ ||x - y||²)
    #[default]
    Rbf,
    /// K(x, y) = tanh(γ x · y + r)
    Sigmoid,
}

impl FromStr for KernelType {
    type Err = RunboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "linear" => Ok(Self::Linear),
            "poly" => Ok(Self::Poly),
            "rbf" => Ok(Self::Rbf),
            "sigmoid" => Ok(Self::Sigmoid),
            other => Err(RunboardError::invalid_param(
                "kernel",
                other,
                "expected one of linear, poly, rbf, sigmoid",
            )),
        }
    }
}

/// Kernel coefficient
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum Gamma {
    /// 1 / (n_features * X.var())
    #[default]
    Scale,
    /// 1 / n_features
    Auto,
    Value(f64),
}

/// SVM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMConfig {
    /// Regularization parameter (C)
    pub c: f64,
    pub kernel: KernelType,
    pub degree: i32,
    pub gamma: Gamma,
    pub coef0: f64,
    /// Tolerance for the KKT check
    pub tol: f64,
    /// Maximum passes over the data per binary problem
    pub max_iter: usize,
    /// Whether `predict_proba` is enabled
    pub probability: bool,
    pub random_state: Option<u64>,
}

impl Default for SVMConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            kernel: KernelType::Rbf,
            degree: 3,
            gamma: Gamma::Scale,
            coef0: 0.0,
            tol: 1e-3,
            max_iter: 200,
            probability: false,
            random_state: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Kernel {
    kind: KernelType,
    gamma: f64,
    degree: i32,
    coef0: f64,
}

impl Kernel {
    fn eval(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self.kind {
            KernelType::Linear => a.dot(&b),
            KernelType::Poly => (self.gamma * a.dot(&b) + self.coef0).powi(self.degree),
            KernelType::Rbf => {
                let sq: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
                (-self.gamma * sq).exp()
            }
            KernelType::Sigmoid => (self.gamma * a.dot(&b) + self.coef0).tanh(),
        }
    }

    fn matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        let n = x.nrows();
        let rows: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| (0..n).map(|j| self.eval(x.row(i), x.row(j))).collect())
            .collect();
        let mut k = Array2::zeros((n, n));
        for (i, row) in rows.into_iter().enumerate() {
            for (j, v) in row.into_iter().enumerate() {
                k[[i, j]] = v;
            }
        }
        k
    }
}

/// One binary problem, positive class encoded as +1
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinarySVM {
    support_vectors: Array2<f64>,
    /// alpha_i * y_i for each support vector
    dual_coef: Array1<f64>,
    bias: f64,
}

impl BinarySVM {
    fn decision(&self, kernel: &Kernel, sample: ArrayView1<f64>) -> f64 {
        self.support_vectors
            .rows()
            .into_iter()
            .zip(self.dual_coef.iter())
            .map(|(sv, &c)| c * kernel.eval(sv, sample))
            .sum::<f64>()
            + self.bias
    }
}

/// Support Vector Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMClassifier {
    pub config: SVMConfig,
    kernel: Option<Kernel>,
    /// One entry for binary problems, one per class otherwise
    machines: Vec<BinarySVM>,
    classes: Vec<f64>,
    n_features: usize,
}

impl SVMClassifier {
    pub fn new(config: SVMConfig) -> Self {
        Self {
            config,
            kernel: None,
            machines: Vec::new(),
            classes: Vec::new(),
            n_features: 0,
        }
    }

    fn resolve_gamma(&self, x: &Array2<f64>) -> Result<f64> {
        let n_features = x.ncols() as f64;
        match self.config.gamma {
            Gamma::Scale => {
                let var = x.var(0.0);
                Ok(if var > 0.0 { 1.0 / (n_features * var) } else { 1.0 })
            }
            Gamma::Auto => Ok(1.0 / n_features),
            Gamma::Value(g) if g > 0.0 => Ok(g),
            Gamma::Value(g) => Err(RunboardError::invalid_param("gamma", g, "must be positive")),
        }
    }

    fn train_binary(
        &self,
        x: &Array2<f64>,
        k: &Array2<f64>,
        y: &Array1<f64>,
        seed: u64,
    ) -> BinarySVM {
        let n = x.nrows();
        let c = self.config.c;
        let tol = self.config.tol;
        let mut alphas = Array1::<f64>::zeros(n);
        let mut bias = 0.0;
        // decision value of every sample without the bias
        let mut f = Array1::<f64>::zeros(n);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);

        let mut quiet_passes = 0;
        let mut total_passes = 0;
        while n > 1 && quiet_passes < 5 && total_passes < self.config.max_iter {
            let mut changed = 0;
            for i in 0..n {
                let e_i = f[i] + bias - y[i];
                let violates = (y[i] * e_i < -tol && alphas[i] < c) || (y[i] * e_i > tol && alphas[i] > 0.0);
                if !violates {
                    continue;
                }
                let j = loop {
                    let j = rng.gen_range(0..n);
                    if j != i {
                        break j;
                    }
                };
                let e_j = f[j] + bias - y[j];
                let (ai_old, aj_old) = (alphas[i], alphas[j]);

                let (lo, hi) = if y[i] != y[j] {
                    ((aj_old - ai_old).max(0.0), (c + aj_old - ai_old).min(c))
                } else {
                    ((ai_old + aj_old - c).max(0.0), (ai_old + aj_old).min(c))
                };
                if (hi - lo).abs() < 1e-10 {
                    continue;
                }
                let eta = 2.0 * k[[i, j]] - k[[i, i]] - k[[j, j]];
                if eta >= 0.0 {
                    continue;
                }

                let aj = (aj_old - y[j] * (e_i - e_j) / eta).clamp(lo, hi);
                if (aj - aj_old).abs() < 1e-5 {
                    continue;
                }
                let ai = ai_old + y[i] * y[j] * (aj_old - aj);
                let (di, dj) = ((ai - ai_old) * y[i], (aj - aj_old) * y[j]);

                let b1 = bias - e_i - di * k[[i, i]] - dj * k[[i, j]];
                let b2 = bias - e_j - di * k[[i, j]] - dj * k[[j, j]];
                bias = if ai > 0.0 && ai < c {
                    b1
                } else if aj > 0.0 && aj < c {
                    b2
                } else {
                    (b1 + b2) / 2.0
                };

                alphas[i] = ai;
                alphas[j] = aj;
                f.scaled_add(di, &k.row(i));
                f.scaled_add(dj, &k.row(j));
                changed += 1;
            }
            total_passes += 1;
            quiet_passes = if changed == 0 { quiet_passes + 1 } else { 0 };
        }

        let support: Vec<usize> = (0..n).filter(|&i| alphas[i] > 1e-8).collect();
        let mut support_vectors = Array2::zeros((support.len(), x.ncols()));
        let mut dual_coef = Array1::zeros(support.len());
        for (row, &idx) in support.iter().enumerate() {
            support_vectors.row_mut(row).assign(&x.row(idx));
            dual_coef[row] = alphas[idx] * y[idx];
        }
        BinarySVM {
            support_vectors,
            dual_coef,
            bias,
        }
    }

    /// Number of support vectors across all binary problems
    pub fn n_support_vectors(&self) -> usize {
        self.machines.iter().map(|m| m.support_vectors.nrows()).sum()
    }

    /// Raw decision values, one column per binary problem
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let kernel = self.kernel.as_ref().ok_or(RunboardError::ModelNotFitted)?;
        check_features(self.n_features, x)?;
        let mut out = Array2::zeros((x.nrows(), self.machines.len()));
        for (j, machine) in self.machines.iter().enumerate() {
            for (i, sample) in x.rows().into_iter().enumerate() {
                out[[i, j]] = machine.decision(kernel, sample);
            }
        }
        Ok(out)
    }
}

impl Classifier for SVMClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        if self.config.c <= 0.0 {
            return Err(RunboardError::invalid_param("C", self.config.c, "must be positive"));
        }
        if x.nrows() > MAX_KERNEL_MATRIX_SAMPLES {
            return Err(RunboardError::TrainingError(format!(
                "dataset has {} samples, exceeding the SVM limit of {}",
                x.nrows(),
                MAX_KERNEL_MATRIX_SAMPLES
            )));
        }
        let classes = unique_classes(y);
        if classes.len() < 2 {
            return Err(RunboardError::TrainingError(
                "SVM requires at least 2 distinct classes".to_string(),
            ));
        }

        let kernel = Kernel {
            kind: self.config.kernel,
            gamma: self.resolve_gamma(x)?,
            degree: self.config.degree,
            coef0: self.config.coef0,
        };
        let gram = kernel.matrix(x);
        let codes = encode_labels(&classes, y)?;
        let seed = self.config.random_state.unwrap_or(0);

        let positives: Vec<usize> = if classes.len() == 2 { vec![1] } else { (0..classes.len()).collect() };
        let machines: Vec<BinarySVM> = positives
            .par_iter()
            .map(|&positive| {
                let y_binary: Array1<f64> = codes
                    .iter()
                    .map(|&c| if c == positive { 1.0 } else { -1.0 })
                    .collect();
                self.train_binary(x, &gram, &y_binary, seed.wrapping_add(positive as u64))
            })
            .collect();

        self.kernel = Some(kernel);
        self.machines = machines;
        self.classes = classes;
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let scores = self.decision_function(x)?;
        if scores.ncols() == 1 {
            Ok(scores
                .column(0)
                .iter()
                .map(|&s| if s >= 0.0 { self.classes[1] } else { self.classes[0] })
                .collect())
        } else {
            Ok(labels_from_scores(&self.classes, &scores))
        }
    }

    /// Softmax over decision values; binary problems use a logistic link
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.config.probability {
            return Err(RunboardError::OptionalMetricUnavailable(
                "probability estimates require probability=true".to_string(),
            ));
        }
        let scores = self.decision_function(x)?;
        if scores.ncols() == 1 {
            let mut proba = Array2::zeros((x.nrows(), 2));
            for (i, &s) in scores.column(0).iter().enumerate() {
                let p = 1.0 / (1.0 + (-s).exp());
                proba[[i, 0]] = 1.0 - p;
                proba[[i, 1]] = p;
            }
            Ok(proba)
        } else {
            Ok(softmax_rows(&scores))
        }
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn create_linear_separable_data() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [1.0, 1.0], [1.5, 1.2], [1.2, 1.8], [2.0, 1.5],
            [5.0, 5.0], [5.5, 5.2], [5.2, 5.8], [6.0, 5.5],
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_svm_classifier_linear() {
        let (x, y) = create_linear_separable_data();
        let mut svm = SVMClassifier::new(SVMConfig {
            kernel: KernelType::Linear,
            ..Default::default()
        });
        svm.fit(&x, &y).unwrap();
        assert_eq!(svm.predict(&x).unwrap(), y);
        assert!(svm.n_support_vectors() > 0);
    }

    #[test]
    fn test_svm_classifier_rbf() {
        let (x, y) = create_linear_separable_data();
        let mut svm = SVMClassifier::new(SVMConfig::default());
        svm.fit(&x, &y).unwrap();
        assert_eq!(svm.score(&x, &y).unwrap(), 1.0);
    }

    #[test]
    fn test_svm_classifier_multiclass() {
        let x = array![
            [0.0, 0.0], [0.3, 0.2], [0.1, 0.4],
            [5.0, 0.0], [5.2, 0.3], [4.9, 0.1],
            [0.0, 5.0], [0.2, 5.3], [0.4, 4.8],
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0];
        let mut svm = SVMClassifier::new(SVMConfig {
            probability: true,
            ..Default::default()
        });
        svm.fit(&x, &y).unwrap();

        assert_eq!(svm.predict(&x).unwrap(), y);
        let proba = svm.predict_proba(&x).unwrap();
        assert_eq!(proba.ncols(), 3);
    }

    #[test]
    fn test_probability_disabled() {
        let (x, y) = create_linear_separable_data();
        let mut svm = SVMClassifier::new(SVMConfig::default());
        svm.fit(&x, &y).unwrap();
        assert!(matches!(
            svm.predict_proba(&x),
            Err(RunboardError::OptionalMetricUnavailable(_))
        ));
    }
}

//! Model registry
//!
//! Fixed table of model types. Each entry carries its capability flags,
//! its default hyperparameters and a constructor that reads a merged
//! [`Hyperparams`] map into the model's native config.

mod params;

pub use params::Hyperparams;

use crate::error::{Result, RunboardError};
use crate::training::{
    AdaBoostClassifier, AdaBoostConfig, Activation, Criterion, DecisionTreeClassifier,
    DistanceMetric, Estimator, Gamma, GaussianNaiveBayes, GradientBoostingClassifier,
    GradientBoostingConfig, KNNClassifier, KNNConfig, KernelType, LearningRateSchedule,
    LogisticRegression, MLPClassifier, MLPConfig, MaxFeatures, RandomForestClassifier,
    RandomForestConfig, SGDClassifier, SGDConfig, SGDLoss, SVMClassifier, SVMConfig, Solver,
    TreeConfig, WeightScheme,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// Registered model type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    RandomForest,
    GradientBoosting,
    AdaBoost,
    #[serde(rename = "MLPClassifier")]
    Mlp,
    #[serde(rename = "SGDClassifier")]
    Sgd,
    LogisticRegression,
    #[serde(rename = "SVM")]
    Svm,
    DecisionTree,
    #[serde(rename = "KNN")]
    Knn,
    NaiveBayes,
}

/// Static capability flags, set at registration time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// Can continue training one epoch at a time
    pub supports_incremental_fit: bool,
    /// May produce class probabilities (configuration permitting)
    pub supports_probability_estimates: bool,
    /// Ensemble whose sub-estimator count can grow between fits
    pub supports_estimator_growth: bool,
}

impl Capabilities {
    const fn new(incremental: bool, proba: bool, growth: bool) -> Self {
        Self {
            supports_incremental_fit: incremental,
            supports_probability_estimates: proba,
            supports_estimator_growth: growth,
        }
    }
}

impl ModelKind {
    pub const ALL: [ModelKind; 10] = [
        ModelKind::RandomForest,
        ModelKind::GradientBoosting,
        ModelKind::AdaBoost,
        ModelKind::Mlp,
        ModelKind::Sgd,
        ModelKind::LogisticRegression,
        ModelKind::Svm,
        ModelKind::DecisionTree,
        ModelKind::Knn,
        ModelKind::NaiveBayes,
    ];

    pub fn all() -> &'static [ModelKind] {
        &Self::ALL
    }

    /// Wire identifier
    pub fn id(&self) -> &'static str {
        match self {
            ModelKind::RandomForest => "RandomForest",
            ModelKind::GradientBoosting => "GradientBoosting",
            ModelKind::AdaBoost => "AdaBoost",
            ModelKind::Mlp => "MLPClassifier",
            ModelKind::Sgd => "SGDClassifier",
            ModelKind::LogisticRegression => "LogisticRegression",
            ModelKind::Svm => "SVM",
            ModelKind::DecisionTree => "DecisionTree",
            ModelKind::Knn => "KNN",
            ModelKind::NaiveBayes => "NaiveBayes",
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            ModelKind::RandomForest | ModelKind::GradientBoosting | ModelKind::AdaBoost => {
                Capabilities::new(false, true, true)
            }
            ModelKind::Mlp | ModelKind::Sgd => Capabilities::new(true, true, false),
            ModelKind::LogisticRegression
            | ModelKind::Svm
            | ModelKind::DecisionTree
            | ModelKind::Knn
            | ModelKind::NaiveBayes => Capabilities::new(false, true, false),
        }
    }

    /// Default hyperparameters applied under the user's values
    pub fn default_params(&self) -> Hyperparams {
        let value = match self {
            ModelKind::RandomForest => json!({"n_estimators": 100, "max_depth": 10}),
            ModelKind::GradientBoosting => json!({"n_estimators": 100, "learning_rate": 0.1}),
            ModelKind::AdaBoost => json!({"n_estimators": 50, "learning_rate": 1.0}),
            ModelKind::Mlp => json!({
                "hidden_layer_sizes": [64, 32],
                "learning_rate_init": 0.001,
                "max_iter": 500,
                "batch_size": 32,
                "activation": "relu"
            }),
            ModelKind::Sgd => json!({"loss": "hinge", "alpha": 0.0001}),
            ModelKind::LogisticRegression => json!({"C": 1.0}),
            ModelKind::Svm => json!({"C": 1.0, "kernel": "rbf", "probability": true}),
            ModelKind::DecisionTree => json!({"max_depth": 10}),
            ModelKind::Knn => json!({"n_neighbors": 5, "weights": "uniform"}),
            ModelKind::NaiveBayes => json!({"var_smoothing": 1e-9}),
        };
        match value {
            Value::Object(map) => Hyperparams::from(map),
            _ => Hyperparams::new(),
        }
    }

    /// Defaults with `user` merged on top
    pub fn resolve_params(&self, user: &Hyperparams) -> Hyperparams {
        self.default_params().merged_with(user)
    }

    /// Construct an unfitted estimator from already-merged parameters
    pub fn build(&self, params: &Hyperparams) -> Result<Estimator> {
        let id = self.id();
        match self {
            ModelKind::RandomForest => {
                params.check_known(id, RANDOM_FOREST_KEYS)?;
                let d = RandomForestConfig::default();
                let config = RandomForestConfig {
                    n_estimators: params.get_usize("n_estimators")?.unwrap_or(d.n_estimators),
                    max_depth: params.get_usize("max_depth")?.or(d.max_depth),
                    min_samples_split: params
                        .get_usize("min_samples_split")?
                        .unwrap_or(d.min_samples_split),
                    min_samples_leaf: params
                        .get_usize("min_samples_leaf")?
                        .unwrap_or(d.min_samples_leaf),
                    max_features: max_features(params)?.unwrap_or(d.max_features),
                    criterion: parse_opt::<Criterion>(params, "criterion")?.unwrap_or(d.criterion),
                    bootstrap: params.get_bool("bootstrap")?.unwrap_or(d.bootstrap),
                    random_state: params.get_u64("random_state")?,
                };
                positive(id, "n_estimators", config.n_estimators)?;
                Ok(Estimator::RandomForest(RandomForestClassifier::new(config)))
            }
            ModelKind::GradientBoosting => {
                params.check_known(id, GRADIENT_BOOSTING_KEYS)?;
                let d = GradientBoostingConfig::default();
                let config = GradientBoostingConfig {
                    n_estimators: params.get_usize("n_estimators")?.unwrap_or(d.n_estimators),
                    learning_rate: params.get_f64("learning_rate")?.unwrap_or(d.learning_rate),
                    max_depth: params.get_usize("max_depth")?.unwrap_or(d.max_depth),
                    min_samples_split: params
                        .get_usize("min_samples_split")?
                        .unwrap_or(d.min_samples_split),
                    min_samples_leaf: params
                        .get_usize("min_samples_leaf")?
                        .unwrap_or(d.min_samples_leaf),
                    subsample: params.get_f64("subsample")?.unwrap_or(d.subsample),
                    random_state: params.get_u64("random_state")?,
                };
                positive(id, "n_estimators", config.n_estimators)?;
                if !(config.subsample > 0.0 && config.subsample <= 1.0) {
                    return Err(RunboardError::invalid_param(
                        "subsample",
                        config.subsample,
                        "must be in (0, 1]",
                    ));
                }
                Ok(Estimator::GradientBoosting(GradientBoostingClassifier::new(config)))
            }
            ModelKind::AdaBoost => {
                params.check_known(id, ADABOOST_KEYS)?;
                let d = AdaBoostConfig::default();
                let config = AdaBoostConfig {
                    n_estimators: params.get_usize("n_estimators")?.unwrap_or(d.n_estimators),
                    learning_rate: params.get_f64("learning_rate")?.unwrap_or(d.learning_rate),
                    max_depth: params.get_usize("max_depth")?.unwrap_or(d.max_depth),
                    random_state: params.get_u64("random_state")?,
                };
                positive(id, "n_estimators", config.n_estimators)?;
                Ok(Estimator::AdaBoost(AdaBoostClassifier::new(config)))
            }
            ModelKind::Mlp => {
                params.check_known(id, MLP_KEYS)?;
                let d = MLPConfig::default();
                let batch_size = match params.get_raw("batch_size") {
                    Some(Value::String(s)) if s == "auto" => None,
                    Some(_) => params.get_usize("batch_size")?,
                    None => d.batch_size,
                };
                let config = MLPConfig {
                    hidden_layer_sizes: params
                        .get_usize_list("hidden_layer_sizes")?
                        .unwrap_or(d.hidden_layer_sizes),
                    activation: parse_opt::<Activation>(params, "activation")?
                        .unwrap_or(d.activation),
                    solver: parse_opt::<Solver>(params, "solver")?.unwrap_or(d.solver),
                    learning_rate_init: params
                        .get_f64("learning_rate_init")?
                        .unwrap_or(d.learning_rate_init),
                    max_iter: params.get_usize("max_iter")?.unwrap_or(d.max_iter),
                    batch_size,
                    alpha: params.get_f64("alpha")?.unwrap_or(d.alpha),
                    momentum: params.get_f64("momentum")?.unwrap_or(d.momentum),
                    shuffle: params.get_bool("shuffle")?.unwrap_or(d.shuffle),
                    tol: params.get_f64("tol")?.unwrap_or(d.tol),
                    n_iter_no_change: params
                        .get_usize("n_iter_no_change")?
                        .unwrap_or(d.n_iter_no_change),
                    random_state: params.get_u64("random_state")?,
                };
                Ok(Estimator::Mlp(MLPClassifier::new(config)))
            }
            ModelKind::Sgd => {
                params.check_known(id, SGD_KEYS)?;
                let d = SGDConfig::default();
                let config = SGDConfig {
                    loss: parse_opt::<SGDLoss>(params, "loss")?.unwrap_or(d.loss),
                    learning_rate: parse_opt::<LearningRateSchedule>(params, "learning_rate")?
                        .unwrap_or(d.learning_rate),
                    eta0: params.get_f64("eta0")?.unwrap_or(d.eta0),
                    alpha: params.get_f64("alpha")?.unwrap_or(d.alpha),
                    max_iter: params.get_usize("max_iter")?.unwrap_or(d.max_iter),
                    tol: params.get_f64("tol")?.unwrap_or(d.tol),
                    power_t: params.get_f64("power_t")?.unwrap_or(d.power_t),
                    shuffle: params.get_bool("shuffle")?.unwrap_or(d.shuffle),
                    fit_intercept: params.get_bool("fit_intercept")?.unwrap_or(d.fit_intercept),
                    random_state: params.get_u64("random_state")?,
                };
                Ok(Estimator::Sgd(SGDClassifier::new(config)))
            }
            ModelKind::LogisticRegression => {
                params.check_known(id, LOGISTIC_KEYS)?;
                let mut model = LogisticRegression::new();
                if let Some(c) = params.get_f64("C")? {
                    model = model.with_c(c);
                }
                if let Some(max_iter) = params.get_usize("max_iter")? {
                    model = model.with_max_iter(max_iter);
                }
                model.tol = params.get_f64("tol")?.unwrap_or(model.tol);
                model.fit_intercept = params.get_bool("fit_intercept")?.unwrap_or(model.fit_intercept);
                Ok(Estimator::LogisticRegression(model))
            }
            ModelKind::Svm => {
                params.check_known(id, SVM_KEYS)?;
                let d = SVMConfig::default();
                let gamma = match params.get_raw("gamma") {
                    None => d.gamma,
                    Some(Value::String(s)) if s == "scale" => Gamma::Scale,
                    Some(Value::String(s)) if s == "auto" => Gamma::Auto,
                    Some(Value::Number(_)) => Gamma::Value(params.get_f64("gamma")?.unwrap_or(1.0)),
                    Some(other) => {
                        return Err(RunboardError::invalid_param(
                            "gamma",
                            other,
                            "expected 'scale', 'auto' or a number",
                        ))
                    }
                };
                let config = SVMConfig {
                    c: params.get_f64("C")?.unwrap_or(d.c),
                    kernel: parse_opt::<KernelType>(params, "kernel")?.unwrap_or(d.kernel),
                    degree: params.get_i32("degree")?.unwrap_or(d.degree),
                    gamma,
                    coef0: params.get_f64("coef0")?.unwrap_or(d.coef0),
                    tol: params.get_f64("tol")?.unwrap_or(d.tol),
                    max_iter: params.get_usize("max_iter")?.unwrap_or(d.max_iter),
                    probability: params.get_bool("probability")?.unwrap_or(d.probability),
                    random_state: params.get_u64("random_state")?,
                };
                Ok(Estimator::Svm(SVMClassifier::new(config)))
            }
            ModelKind::DecisionTree => {
                params.check_known(id, DECISION_TREE_KEYS)?;
                let d = TreeConfig::default();
                let config = TreeConfig {
                    max_depth: params.get_usize("max_depth")?.or(d.max_depth),
                    min_samples_split: params
                        .get_usize("min_samples_split")?
                        .unwrap_or(d.min_samples_split),
                    min_samples_leaf: params
                        .get_usize("min_samples_leaf")?
                        .unwrap_or(d.min_samples_leaf),
                    criterion: parse_opt::<Criterion>(params, "criterion")?.unwrap_or(d.criterion),
                    max_features: max_features(params)?.unwrap_or(d.max_features),
                    random_state: params.get_u64("random_state")?,
                };
                Ok(Estimator::DecisionTree(DecisionTreeClassifier::new(config)))
            }
            ModelKind::Knn => {
                params.check_known(id, KNN_KEYS)?;
                let d = KNNConfig::default();
                let mut metric =
                    parse_opt::<DistanceMetric>(params, "metric")?.unwrap_or(d.metric);
                if let (DistanceMetric::Minkowski(_), Some(p)) = (metric, params.get_f64("p")?) {
                    metric = DistanceMetric::Minkowski(p);
                }
                let config = KNNConfig {
                    n_neighbors: params.get_usize("n_neighbors")?.unwrap_or(d.n_neighbors),
                    metric,
                    weights: parse_opt::<WeightScheme>(params, "weights")?.unwrap_or(d.weights),
                };
                Ok(Estimator::Knn(KNNClassifier::new(config)))
            }
            ModelKind::NaiveBayes => {
                params.check_known(id, NAIVE_BAYES_KEYS)?;
                let mut model = GaussianNaiveBayes::new();
                if let Some(smoothing) = params.get_f64("var_smoothing")? {
                    model = model.with_var_smoothing(smoothing);
                }
                Ok(Estimator::NaiveBayes(model))
            }
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ModelKind {
    type Err = RunboardError;

    fn from_str(s: &str) -> Result<Self> {
        ModelKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.id() == s)
            .ok_or_else(|| RunboardError::UnknownModelType(s.to_string()))
    }
}

/// Resolve an identifier and build from defaults merged with `user`
pub fn create_model(model_type: &str, user: &Hyperparams) -> Result<(ModelKind, Estimator)> {
    let kind: ModelKind = model_type.parse()?;
    let estimator = kind.build(&kind.resolve_params(user))?;
    Ok((kind, estimator))
}

/// Registry listing entry
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub capabilities: Capabilities,
    pub defaults: Hyperparams,
}

pub fn describe(kind: ModelKind) -> ModelInfo {
    ModelInfo {
        id: kind.id(),
        capabilities: kind.capabilities(),
        defaults: kind.default_params(),
    }
}

// `warm_start` and `verbose` are accepted and ignored: the strategy controls them

const RANDOM_FOREST_KEYS: &[&str] = &[
    "n_estimators", "max_depth", "min_samples_split", "min_samples_leaf", "max_features",
    "criterion", "bootstrap", "random_state", "n_jobs", "warm_start", "verbose",
];
const GRADIENT_BOOSTING_KEYS: &[&str] = &[
    "n_estimators", "learning_rate", "max_depth", "min_samples_split", "min_samples_leaf",
    "subsample", "random_state", "warm_start", "verbose",
];
const ADABOOST_KEYS: &[&str] = &[
    "n_estimators", "learning_rate", "max_depth", "random_state", "warm_start", "verbose",
];
const MLP_KEYS: &[&str] = &[
    "hidden_layer_sizes", "activation", "solver", "alpha", "batch_size", "learning_rate_init",
    "max_iter", "momentum", "shuffle", "tol", "n_iter_no_change", "random_state",
    "warm_start", "verbose",
];
const SGD_KEYS: &[&str] = &[
    "loss", "learning_rate", "eta0", "alpha", "max_iter", "tol", "power_t", "shuffle",
    "fit_intercept", "random_state", "warm_start", "verbose",
];
const LOGISTIC_KEYS: &[&str] = &["C", "max_iter", "tol", "fit_intercept", "verbose"];
const SVM_KEYS: &[&str] = &[
    "C", "kernel", "degree", "gamma", "coef0", "tol", "max_iter", "probability",
    "random_state", "verbose",
];
const DECISION_TREE_KEYS: &[&str] = &[
    "max_depth", "min_samples_split", "min_samples_leaf", "criterion", "max_features",
    "random_state",
];
const KNN_KEYS: &[&str] = &["n_neighbors", "weights", "metric", "p", "n_jobs"];
const NAIVE_BAYES_KEYS: &[&str] = &["var_smoothing"];

fn parse_opt<T: FromStr<Err = RunboardError>>(params: &Hyperparams, key: &str) -> Result<Option<T>> {
    params.get_str(key)?.map(|s| s.parse::<T>()).transpose()
}

fn max_features(params: &Hyperparams) -> Result<Option<MaxFeatures>> {
    match params.get_raw("max_features") {
        None => Ok(None),
        Some(Value::String(s)) => match s.as_str() {
            "sqrt" => Ok(Some(MaxFeatures::Sqrt)),
            "log2" => Ok(Some(MaxFeatures::Log2)),
            other => Err(RunboardError::invalid_param(
                "max_features",
                other,
                "expected 'sqrt', 'log2' or a number",
            )),
        },
        Some(Value::Number(n)) if n.is_u64() => {
            Ok(params.get_usize("max_features")?.map(MaxFeatures::Count))
        }
        Some(Value::Number(_)) => match params.get_f64("max_features")? {
            Some(f) if f > 0.0 && f <= 1.0 => Ok(Some(MaxFeatures::Fraction(f))),
            Some(f) => Err(RunboardError::invalid_param("max_features", f, "fraction must be in (0, 1]")),
            None => Ok(None),
        },
        Some(other) => Err(RunboardError::invalid_param(
            "max_features",
            other,
            "expected 'sqrt', 'log2' or a number",
        )),
    }
}

fn positive(model: &str, name: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(RunboardError::invalid_param(
            name,
            value,
            format!("{} needs a positive value", model),
        ));
    }
    Ok(())
}

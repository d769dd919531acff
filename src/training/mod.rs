//! Model training module
//!
//! Native multiclass classifiers behind a common [`Classifier`] trait:
//! - Decision trees, Random Forests, Gradient boosting and AdaBoost
//! - Logistic regression and SGD linear models
//! - Neural networks (MLP)
//! - Support Vector Machines
//! - K-Nearest Neighbors
//! - Gaussian Naive Bayes
//!
//! [`Estimator`] dispatches over all of them; [`metrics`] holds the
//! classification scores used by the step evaluator.

mod estimator;
mod models;
pub mod adaboost;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod knn;
pub mod linear_models;
pub mod metrics;
pub mod naive_bayes;
pub mod neural_network;
pub mod random_forest;
pub mod sgd;
pub mod svm;

pub use adaboost::{AdaBoostClassifier, AdaBoostConfig};
pub use decision_tree::{Criterion, DecisionTreeClassifier, MaxFeatures, TreeConfig};
pub use estimator::Estimator;
pub use gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
pub use knn::{DistanceMetric, KNNClassifier, KNNConfig, WeightScheme};
pub use linear_models::LogisticRegression;
pub use metrics::{accuracy, log_loss, weighted_scores, WeightedScores};
pub use models::{unique_classes, Classifier};
pub use naive_bayes::GaussianNaiveBayes;
pub use neural_network::{Activation, MLPClassifier, MLPConfig, Solver};
pub use random_forest::{RandomForestClassifier, RandomForestConfig};
pub use sgd::{LearningRateSchedule, SGDClassifier, SGDConfig, SGDLoss};
pub use svm::{Gamma, KernelType, SVMClassifier, SVMConfig};

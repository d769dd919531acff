//! Enum dispatch over every registered classifier

use super::adaboost::AdaBoostClassifier;
use super::decision_tree::DecisionTreeClassifier;
use super::gradient_boosting::GradientBoostingClassifier;
use super::knn::KNNClassifier;
use super::linear_models::LogisticRegression;
use super::models::Classifier;
use super::naive_bayes::GaussianNaiveBayes;
use super::neural_network::MLPClassifier;
use super::random_forest::RandomForestClassifier;
use super::sgd::SGDClassifier;
use super::svm::SVMClassifier;
use crate::error::{Result, RunboardError};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// A constructed, possibly fitted, classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Estimator {
    RandomForest(RandomForestClassifier),
    GradientBoosting(GradientBoostingClassifier),
    AdaBoost(AdaBoostClassifier),
    Mlp(MLPClassifier),
    Sgd(SGDClassifier),
    LogisticRegression(LogisticRegression),
    Svm(SVMClassifier),
    DecisionTree(DecisionTreeClassifier),
    Knn(KNNClassifier),
    NaiveBayes(GaussianNaiveBayes),
}

impl Estimator {
    pub fn as_classifier(&self) -> &dyn Classifier {
        match self {
            Estimator::RandomForest(m) => m,
            Estimator::GradientBoosting(m) => m,
            Estimator::AdaBoost(m) => m,
            Estimator::Mlp(m) => m,
            Estimator::Sgd(m) => m,
            Estimator::LogisticRegression(m) => m,
            Estimator::Svm(m) => m,
            Estimator::DecisionTree(m) => m,
            Estimator::Knn(m) => m,
            Estimator::NaiveBayes(m) => m,
        }
    }

    pub fn as_classifier_mut(&mut self) -> &mut dyn Classifier {
        match self {
            Estimator::RandomForest(m) => m,
            Estimator::GradientBoosting(m) => m,
            Estimator::AdaBoost(m) => m,
            Estimator::Mlp(m) => m,
            Estimator::Sgd(m) => m,
            Estimator::LogisticRegression(m) => m,
            Estimator::Svm(m) => m,
            Estimator::DecisionTree(m) => m,
            Estimator::Knn(m) => m,
            Estimator::NaiveBayes(m) => m,
        }
    }

    /// Short model name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Estimator::RandomForest(_) => "RandomForest",
            Estimator::GradientBoosting(_) => "GradientBoosting",
            Estimator::AdaBoost(_) => "AdaBoost",
            Estimator::Mlp(_) => "MLPClassifier",
            Estimator::Sgd(_) => "SGDClassifier",
            Estimator::LogisticRegression(_) => "LogisticRegression",
            Estimator::Svm(_) => "SVM",
            Estimator::DecisionTree(_) => "DecisionTree",
            Estimator::Knn(_) => "KNN",
            Estimator::NaiveBayes(_) => "NaiveBayes",
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.as_classifier_mut().fit(x, y)
    }

    /// One epoch of incremental training, keeping state from previous calls
    pub fn partial_fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        match self {
            Estimator::Mlp(m) => m.partial_fit(x, y),
            Estimator::Sgd(m) => m.partial_fit(x, y),
            other => Err(RunboardError::TrainingError(format!(
                "{} does not support incremental fit",
                other.name()
            ))),
        }
    }

    /// Number of sub-estimators grown so far, for growable ensembles
    pub fn n_estimators(&self) -> Option<usize> {
        match self {
            Estimator::RandomForest(m) => Some(m.n_trees()),
            Estimator::GradientBoosting(m) => Some(m.n_stages()),
            Estimator::AdaBoost(m) => Some(m.n_learners()),
            _ => None,
        }
    }

    /// Configured sub-estimator target
    pub fn target_n_estimators(&self) -> Option<usize> {
        match self {
            Estimator::RandomForest(m) => Some(m.config.n_estimators),
            Estimator::GradientBoosting(m) => Some(m.config.n_estimators),
            Estimator::AdaBoost(m) => Some(m.config.n_estimators),
            _ => None,
        }
    }

    /// Raise the sub-estimator target; the next `fit` grows the ensemble
    pub fn set_n_estimators(&mut self, n: usize) -> Result<()> {
        match self {
            Estimator::RandomForest(m) => m.set_n_estimators(n),
            Estimator::GradientBoosting(m) => m.set_n_estimators(n),
            Estimator::AdaBoost(m) => m.set_n_estimators(n),
            other => {
                return Err(RunboardError::TrainingError(format!(
                    "{} has no growable estimator count",
                    other.name()
                )))
            }
        }
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.as_classifier().predict(x)
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.as_classifier().predict_proba(x)
    }

    pub fn classes(&self) -> &[f64] {
        self.as_classifier().classes()
    }

    pub fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        self.as_classifier().score(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::random_forest::RandomForestConfig;
    use crate::training::neural_network::MLPConfig;
    use ndarray::array;

    #[test]
    fn test_partial_fit_only_for_incremental_models() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut mlp = Estimator::Mlp(MLPClassifier::new(MLPConfig {
            random_state: Some(0),
            ..Default::default()
        }));
        mlp.partial_fit(&x, &y).unwrap();

        let mut nb = Estimator::NaiveBayes(GaussianNaiveBayes::new());
        assert!(nb.partial_fit(&x, &y).is_err());
        assert!(nb.n_estimators().is_none());
    }

    #[test]
    fn test_growth_through_dispatch() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut rf = Estimator::RandomForest(RandomForestClassifier::new(RandomForestConfig {
            n_estimators: 2,
            random_state: Some(3),
            ..Default::default()
        }));
        rf.fit(&x, &y).unwrap();
        assert_eq!(rf.n_estimators(), Some(2));

        rf.set_n_estimators(5).unwrap();
        rf.fit(&x, &y).unwrap();
        assert_eq!(rf.n_estimators(), Some(5));
        assert_eq!(rf.target_n_estimators(), Some(5));
    }
}

//! Strategy selection from static capability flags

use super::config::{OrchestratorConfig, DEFAULT_EPOCHS};
use super::ensemble::IncrementalEnsemble;
use super::iterative::Iterative;
use super::learning_curve::LearningCurve;
use super::strategy::TrainingStrategy;
use crate::error::Result;
use crate::registry::{Capabilities, Hyperparams, ModelKind};
use crate::training::Estimator;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Iterative,
    IncrementalEnsemble,
    LearningCurve,
}

impl StrategyKind {
    /// Incremental fit wins over estimator growth; everything else
    /// falls back to a learning curve
    pub fn select(capabilities: Capabilities) -> Self {
        if capabilities.supports_incremental_fit {
            StrategyKind::Iterative
        } else if capabilities.supports_estimator_growth {
            StrategyKind::IncrementalEnsemble
        } else {
            StrategyKind::LearningCurve
        }
    }

    pub fn for_model(kind: ModelKind) -> Self {
        Self::select(kind.capabilities())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Iterative => "iterative",
            StrategyKind::IncrementalEnsemble => "incremental_ensemble",
            StrategyKind::LearningCurve => "learning_curve",
        }
    }

    /// Build the strategy for one run.
    ///
    /// `user` holds only what the caller supplied: the iterative epoch
    /// count comes from the user's `max_iter`, never from the merged
    /// defaults. `model` is the estimator built from `merged`.
    pub fn build(
        &self,
        kind: ModelKind,
        user: &Hyperparams,
        merged: &Hyperparams,
        model: &Estimator,
        config: &OrchestratorConfig,
    ) -> Result<Box<dyn TrainingStrategy>> {
        let strategy: Box<dyn TrainingStrategy> = match self {
            StrategyKind::Iterative => {
                let epochs = user.get_usize("max_iter")?.unwrap_or(DEFAULT_EPOCHS);
                Box::new(Iterative::new(epochs, config.iterative_delay))
            }
            StrategyKind::IncrementalEnsemble => {
                let target = model.target_n_estimators().unwrap_or(100);
                Box::new(IncrementalEnsemble::new(target, config.step_delay))
            }
            StrategyKind::LearningCurve => {
                Box::new(LearningCurve::new(kind, merged.clone(), config.step_delay))
            }
        };
        Ok(strategy)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_table() {
        assert_eq!(StrategyKind::for_model(ModelKind::Mlp), StrategyKind::Iterative);
        assert_eq!(StrategyKind::for_model(ModelKind::Sgd), StrategyKind::Iterative);
        for kind in [ModelKind::RandomForest, ModelKind::GradientBoosting, ModelKind::AdaBoost] {
            assert_eq!(StrategyKind::for_model(kind), StrategyKind::IncrementalEnsemble);
        }
        for kind in [
            ModelKind::LogisticRegression,
            ModelKind::Svm,
            ModelKind::DecisionTree,
            ModelKind::Knn,
            ModelKind::NaiveBayes,
        ] {
            assert_eq!(StrategyKind::for_model(kind), StrategyKind::LearningCurve);
        }
    }

    #[test]
    fn test_epochs_ignore_merged_defaults() {
        let kind = ModelKind::Mlp;
        let user = Hyperparams::new();
        let merged = kind.resolve_params(&user);
        let model = kind.build(&merged).unwrap();
        let config = OrchestratorConfig::immediate();

        let strategy = StrategyKind::Iterative
            .build(kind, &user, &merged, &model, &config)
            .unwrap();
        assert_eq!(strategy.total_steps(), DEFAULT_EPOCHS);

        let user = Hyperparams::new().with("max_iter", 5);
        let strategy = StrategyKind::Iterative
            .build(kind, &user, &kind.resolve_params(&user), &model, &config)
            .unwrap();
        assert_eq!(strategy.total_steps(), 5);
    }
}

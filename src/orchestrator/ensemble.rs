//! Tree ensembles grown a slice at a time

use super::config::STEP_COUNT;
use super::strategy::{StepOutcome, TrainerState, TrainingStrategy};
use crate::error::Result;
use crate::preprocessing::Split;
use std::time::Duration;

/// Grows one persistent ensemble by `trees_per_step` sub-estimators before
/// each refit; already grown estimators are kept.
#[derive(Debug, Clone)]
pub struct IncrementalEnsemble {
    trees_per_step: usize,
    pacing: Duration,
}

impl IncrementalEnsemble {
    pub fn new(target_estimators: usize, pacing: Duration) -> Self {
        Self {
            trees_per_step: trees_per_step(target_estimators),
            pacing,
        }
    }

    pub fn trees_per_step(&self) -> usize {
        self.trees_per_step
    }
}

pub fn trees_per_step(target_estimators: usize) -> usize {
    (target_estimators / STEP_COUNT).max(1)
}

impl TrainingStrategy for IncrementalEnsemble {
    fn name(&self) -> &'static str {
        "incremental_ensemble"
    }

    fn total_steps(&self) -> usize {
        STEP_COUNT
    }

    fn step(&self, mut state: TrainerState, _step: usize, split: &Split) -> Result<StepOutcome> {
        let mut model = state.take_model()?;
        let count = state.estimator_count + self.trees_per_step;
        model.set_n_estimators(count)?;
        model.fit(&split.x_train, &split.y_train)?;

        state.model = Some(model);
        state.estimator_count = count;
        Ok(StepOutcome::Trained {
            state,
            reference_rows: split.x_train.nrows(),
        })
    }

    fn pacing(&self) -> Duration {
        self.pacing
    }
}

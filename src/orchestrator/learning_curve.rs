//! Learning curves for models without incremental training

use super::config::{MIN_SUBSET, STEP_COUNT};
use super::strategy::{StepOutcome, TrainerState, TrainingStrategy};
use crate::error::Result;
use crate::preprocessing::Split;
use crate::registry::{Hyperparams, ModelKind};
use crate::training::unique_classes;
use ndarray::s;
use std::time::Duration;

/// Fits a fresh model on a growing prefix of the training partition at
/// every step. Steps whose prefix holds a single class are skipped.
#[derive(Debug, Clone)]
pub struct LearningCurve {
    kind: ModelKind,
    params: Hyperparams,
    pacing: Duration,
}

impl LearningCurve {
    pub fn new(kind: ModelKind, params: Hyperparams, pacing: Duration) -> Self {
        Self {
            kind,
            params,
            pacing,
        }
    }
}

/// `max(10, floor(n * step / 20))`, never more than `n`
pub fn subset_size(n_train: usize, step: usize) -> usize {
    (n_train * step / STEP_COUNT).max(MIN_SUBSET).min(n_train)
}

impl TrainingStrategy for LearningCurve {
    fn name(&self) -> &'static str {
        "learning_curve"
    }

    fn total_steps(&self) -> usize {
        STEP_COUNT
    }

    fn step(&self, mut state: TrainerState, step: usize, split: &Split) -> Result<StepOutcome> {
        let size = subset_size(split.x_train.nrows(), step);
        let x_sub = split.x_train.slice(s![..size, ..]).to_owned();
        let y_sub = split.y_train.slice(s![..size]).to_owned();

        let n_classes = unique_classes(&y_sub).len();
        if n_classes < 2 {
            return Ok(StepOutcome::Skipped {
                state,
                reason: format!("subset of {} rows has {} class", size, n_classes),
            });
        }

        let mut model = self.kind.build(&self.params)?;
        model.fit(&x_sub, &y_sub)?;
        state.model = Some(model);
        Ok(StepOutcome::Trained {
            state,
            reference_rows: size,
        })
    }

    fn pacing(&self) -> Duration {
        self.pacing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subset_size() {
        assert_eq!(subset_size(1000, 1), 50);
        assert_eq!(subset_size(1000, 20), 1000);
        assert_eq!(subset_size(100, 1), 10);
        assert_eq!(subset_size(100, 3), 15);
        assert_eq!(subset_size(6, 1), 6);
    }
}

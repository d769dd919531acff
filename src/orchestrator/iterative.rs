//! Epoch-by-epoch training for incrementally fittable models

use super::strategy::{StepOutcome, TrainerState, TrainingStrategy};
use crate::error::Result;
use crate::preprocessing::Split;
use std::time::Duration;

/// One `partial_fit` pass over the full training partition per step.
/// Always runs every epoch; there is no convergence check.
#[derive(Debug, Clone)]
pub struct Iterative {
    epochs: usize,
    pacing: Duration,
}

impl Iterative {
    pub fn new(epochs: usize, pacing: Duration) -> Self {
        Self { epochs, pacing }
    }
}

impl TrainingStrategy for Iterative {
    fn name(&self) -> &'static str {
        "iterative"
    }

    fn total_steps(&self) -> usize {
        self.epochs
    }

    fn step(&self, mut state: TrainerState, _step: usize, split: &Split) -> Result<StepOutcome> {
        let mut model = state.take_model()?;
        model.partial_fit(&split.x_train, &split.y_train)?;
        state.model = Some(model);
        Ok(StepOutcome::Trained {
            state,
            reference_rows: split.x_train.nrows(),
        })
    }

    fn pacing(&self) -> Duration {
        self.pacing
    }
}

//! Step-driven training strategies and the loop that drives them

use super::evaluator::StepEvaluator;
use crate::error::{Result, RunboardError};
use crate::preprocessing::Split;
use crate::tracking::{MetricSink, RunId};
use crate::training::Estimator;
use std::time::Duration;
use tracing::{debug, warn};

/// Training state threaded from one step into the next
#[derive(Debug, Clone, Default)]
pub struct TrainerState {
    /// Model to continue from, or the last successfully trained model
    pub model: Option<Estimator>,
    /// Sub-estimators requested so far (ensemble growth)
    pub estimator_count: usize,
    /// Steps that trained and emitted metrics
    pub steps_trained: usize,
}

impl TrainerState {
    pub fn new(model: Estimator) -> Self {
        Self {
            model: Some(model),
            ..Default::default()
        }
    }

    /// Move the model out, for strategies that continue training it
    pub(crate) fn take_model(&mut self) -> Result<Estimator> {
        self.model
            .take()
            .ok_or_else(|| RunboardError::TrainingError("no model carried into step".to_string()))
    }
}

/// Result of one step
#[derive(Debug)]
pub enum StepOutcome {
    /// Model was fit; evaluate it against the first `reference_rows`
    /// rows of the training partition
    Trained {
        state: TrainerState,
        reference_rows: usize,
    },
    /// Nothing was fit and nothing is emitted for this step
    Skipped { state: TrainerState, reason: String },
}

/// One way of turning a model into a sequence of training steps
pub trait TrainingStrategy: Send {
    fn name(&self) -> &'static str;

    fn total_steps(&self) -> usize;

    /// Run 1-based step `step`
    fn step(&self, state: TrainerState, step: usize, split: &Split) -> Result<StepOutcome>;

    /// Pause after a trained step
    fn pacing(&self) -> Duration;
}

/// Drive `strategy` over all its steps starting from `model`, emitting one
/// metric bundle per trained step. Returns the final model.
pub fn run_strategy(
    strategy: &dyn TrainingStrategy,
    model: Estimator,
    split: &Split,
    evaluator: &StepEvaluator,
    run_id: RunId,
    sink: &dyn MetricSink,
) -> Result<Estimator> {
    let mut state = TrainerState::new(model);
    let total = strategy.total_steps();

    for step in 1..=total {
        match strategy.step(state, step, split)? {
            StepOutcome::Trained {
                state: next,
                reference_rows,
            } => {
                let model = next.model.as_ref().ok_or_else(|| {
                    RunboardError::TrainingError(format!("step {} returned no model", step))
                })?;
                let bundle = evaluator.evaluate_split(model, step as u64, split, reference_rows)?;
                evaluator.emit(&bundle, run_id, sink)?;
                debug!(
                    run_id,
                    step,
                    total,
                    strategy = strategy.name(),
                    test_accuracy = bundle.get("test_accuracy").unwrap_or(f64::NAN),
                    "Step complete"
                );
                state = TrainerState {
                    steps_trained: next.steps_trained + 1,
                    ..next
                };
                let pause = strategy.pacing();
                if !pause.is_zero() {
                    std::thread::sleep(pause);
                }
            }
            StepOutcome::Skipped { state: next, reason } => {
                warn!(run_id, step, strategy = strategy.name(), reason = %reason, "Step skipped");
                state = next;
            }
        }
    }

    match state.model {
        Some(model) if state.steps_trained > 0 => Ok(model),
        _ => Err(RunboardError::TrainingError(format!(
            "{} strategy finished without training a model",
            strategy.name()
        ))),
    }
}

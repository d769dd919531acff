//! Background training orchestrator
//!
//! Drives one run from a dataset file to a terminal status:
//! - [`PreprocessingPipeline`](crate::preprocessing::PreprocessingPipeline) produces the split
//! - the registry builds the model
//! - [`StrategyKind::select`] picks iterative, incremental-ensemble or
//!   learning-curve training from the model's capability flags
//! - [`StepEvaluator`] emits a metric bundle after every trained step
//! - [`train_background_task`] writes the final metrics or the failure

mod config;
mod ensemble;
mod evaluator;
mod iterative;
mod learning_curve;
mod lifecycle;
mod selector;
mod strategy;

pub use config::{OrchestratorConfig, DEFAULT_EPOCHS, MIN_SUBSET, STEP_COUNT};
pub use ensemble::{trees_per_step, IncrementalEnsemble};
pub use evaluator::{
    MetricBundle, MetricOutcome, StepEvaluator, F1_SCORE, PRECISION, RECALL, TEST_ACCURACY,
    TEST_LOSS, TRAIN_ACCURACY, TRAIN_LOSS,
};
pub use iterative::Iterative;
pub use learning_curve::{subset_size, LearningCurve};
pub use lifecycle::{train_background_task, JobSpec, FINAL_ACCURACY, VALIDATION_ACCURACY};
pub use selector::StrategyKind;
pub use strategy::{run_strategy, StepOutcome, TrainerState, TrainingStrategy};

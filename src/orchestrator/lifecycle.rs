//! Background training job from dataset to finished run

use super::config::OrchestratorConfig;
use super::evaluator::StepEvaluator;
use super::selector::StrategyKind;
use super::strategy::run_strategy;
use crate::error::{Result, RunboardError};
use crate::preprocessing::PreprocessingPipeline;
use crate::registry::{Hyperparams, ModelKind};
use crate::tracking::{MetricSink, Run, RunId, RunMetrics, RunStore};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info};

pub const FINAL_ACCURACY: &str = "final_accuracy";
pub const VALIDATION_ACCURACY: &str = "validation_accuracy";

/// What to train for one run
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub run_id: RunId,
    /// Existing CSV file; existence is checked by the caller
    pub dataset_path: PathBuf,
    pub model_type: String,
    /// User hyperparameters, before merging with defaults
    pub params: Hyperparams,
}

/// Run one training job to a terminal status.
///
/// Everything after fetching the run record sits behind a single failure
/// boundary: any error or panic marks the run failed with the failure
/// text as notes. Metric points already emitted stay in place. The
/// session is consumed and released on every exit path.
///
/// Returns `Err` only when the run record cannot be fetched or the
/// terminal status cannot be written.
pub fn train_background_task<S>(session: S, job: JobSpec, config: &OrchestratorConfig) -> Result<Run>
where
    S: RunStore + MetricSink,
{
    let run = session.fetch(job.run_id)?;
    info!(
        run_id = run.id,
        model = %job.model_type,
        dataset = %job.dataset_path.display(),
        "Training job started"
    );
    let started = Instant::now();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| execute(&session, &job, config)))
        .unwrap_or_else(|payload| Err(RunboardError::TrainingError(panic_message(payload))));

    match outcome {
        Ok(run) => {
            info!(
                run_id = run.id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                final_accuracy = run.metrics.as_ref().and_then(|m| m.get(FINAL_ACCURACY)).copied(),
                "Training job completed"
            );
            Ok(run)
        }
        Err(e) => {
            error!(run_id = job.run_id, error = %e, "Training job failed");
            session.fail(job.run_id, e.to_string())
        }
    }
}

fn execute<S>(session: &S, job: &JobSpec, config: &OrchestratorConfig) -> Result<Run>
where
    S: RunStore + MetricSink,
{
    let split = PreprocessingPipeline::new().run(&job.dataset_path)?;

    let kind: ModelKind = job.model_type.parse()?;
    let merged = kind.resolve_params(&job.params);
    let model = kind.build(&merged)?;

    let capabilities = kind.capabilities();
    let strategy_kind = StrategyKind::select(capabilities);
    let strategy = strategy_kind.build(kind, &job.params, &merged, &model, config)?;
    info!(
        run_id = job.run_id,
        model = %kind,
        strategy = %strategy_kind,
        steps = strategy.total_steps(),
        "Strategy selected"
    );

    let evaluator = StepEvaluator::new(capabilities.supports_probability_estimates);
    let model = run_strategy(strategy.as_ref(), model, &split, &evaluator, job.run_id, session)?;

    let mut metrics = RunMetrics::new();
    metrics.insert(FINAL_ACCURACY.to_string(), model.score(&split.x_test, &split.y_test)?);
    metrics.insert(VALIDATION_ACCURACY.to_string(), model.score(&split.x_val, &split.y_val)?);
    session.complete(job.run_id, metrics)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("training panicked: {}", detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{MemoryStore, NewRun, RunStatus};

    fn store_with_run() -> (MemoryStore, RunId) {
        let store = MemoryStore::new();
        let exp = store.create_experiment("lifecycle", None).unwrap();
        let run = store
            .create_run(NewRun {
                experiment_id: exp.id,
                name: "job".to_string(),
                ..Default::default()
            })
            .unwrap();
        (store, run.id)
    }

    #[test]
    fn test_missing_dataset_fails_run() {
        let (store, run_id) = store_with_run();
        let job = JobSpec {
            run_id,
            dataset_path: PathBuf::from("/nonexistent/runboard/data.csv"),
            model_type: "KNN".to_string(),
            params: Hyperparams::new(),
        };
        let run = train_background_task(store.open_session(), job, &OrchestratorConfig::immediate())
            .unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.notes.is_some_and(|n| !n.is_empty()));
        assert!(run.metrics.is_none());
        assert_eq!(store.open_sessions(), 0);
    }

    #[test]
    fn test_unknown_run_is_an_error() {
        let store = MemoryStore::new();
        let job = JobSpec {
            run_id: 42,
            dataset_path: PathBuf::from("data.csv"),
            model_type: "KNN".to_string(),
            params: Hyperparams::new(),
        };
        let result = train_background_task(store.open_session(), job, &OrchestratorConfig::immediate());
        assert!(matches!(result, Err(RunboardError::RunNotFound(42))));
        assert_eq!(store.open_sessions(), 0);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("index out of bounds");
        assert!(panic_message(payload).contains("index out of bounds"));
    }
}

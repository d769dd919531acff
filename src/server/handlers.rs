//! HTTP request handlers

use std::sync::Arc;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{error, info};

use crate::orchestrator::{train_background_task, JobSpec, StrategyKind};
use crate::registry::{describe, Hyperparams, ModelKind};
use crate::tracking::{Experiment, MemoryStore, MetricPoint, NewRun, Run, RunUpdate};

use super::error::{Result, ServerError};
use super::state::AppState;

/// Store calls run on the blocking pool
async fn with_store<T, F>(state: &AppState, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&MemoryStore) -> crate::Result<T> + Send + 'static,
{
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?
        .map_err(ServerError::from)
}

// ============================================================================
// Experiment Handlers
// ============================================================================

#[derive(Deserialize)]
pub struct ExperimentRequest {
    name: String,
    description: Option<String>,
}

pub async fn create_experiment(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExperimentRequest>,
) -> Result<Json<Experiment>> {
    let experiment = with_store(&state, move |store| {
        store.create_experiment(&request.name, request.description)
    })
    .await?;
    info!(experiment_id = experiment.id, name = %experiment.name, "Experiment created");
    Ok(Json(experiment))
}

pub async fn list_experiments(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Experiment>>> {
    let experiments = with_store(&state, |store| Ok(store.list_experiments())).await?;
    Ok(Json(experiments))
}

// ============================================================================
// Run Handlers
// ============================================================================

pub async fn create_run(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NewRun>,
) -> Result<Json<Run>> {
    Ok(Json(with_store(&state, move |store| store.create_run(request)).await?))
}

#[derive(Deserialize)]
pub struct ListQuery {
    skip: Option<usize>,
    limit: Option<usize>,
}

pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Run>>> {
    let (skip, limit) = (query.skip.unwrap_or(0), query.limit.unwrap_or(100));
    Ok(Json(with_store(&state, move |store| Ok(store.list_runs(skip, limit))).await?))
}

pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<u64>,
) -> Result<Json<Run>> {
    Ok(Json(with_store(&state, move |store| store.get_run(run_id)).await?))
}

pub async fn update_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<u64>,
    Json(update): Json<RunUpdate>,
) -> Result<Json<Run>> {
    Ok(Json(with_store(&state, move |store| store.update_run(run_id, update)).await?))
}

// ============================================================================
// Metric Handlers
// ============================================================================

#[derive(Deserialize)]
pub struct MetricRequest {
    name: String,
    value: f64,
    step: u64,
}

pub async fn log_metric(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<u64>,
    Json(request): Json<MetricRequest>,
) -> Result<Json<Value>> {
    with_store(&state, move |store| {
        store.log_metric(run_id, &request.name, request.value, request.step)
    })
    .await?;
    Ok(Json(json!({"status": "ok"})))
}

pub async fn get_run_metrics(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<u64>,
) -> Result<Json<Vec<MetricPoint>>> {
    Ok(Json(with_store(&state, move |store| store.metrics_for(run_id)).await?))
}

// ============================================================================
// Dataset Handlers
// ============================================================================

/// Save an uploaded file into the data directory
pub async fn upload_dataset(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(e.to_string()))?
    {
        let Some(raw_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| ServerError::BadRequest(e.to_string()))?;

        let file_name = AppState::dataset_name(&raw_name)?;
        let path = state.dataset_path(&file_name)?;
        tokio::fs::create_dir_all(&state.config.data_dir).await?;
        tokio::fs::write(&path, &data).await?;
        info!(file = %file_name, bytes = data.len(), "Dataset uploaded");

        return Ok(Json(json!({
            "filename": file_name,
            "filepath": path.display().to_string(),
        })));
    }

    Err(ServerError::BadRequest("No file uploaded".to_string()))
}

pub async fn list_datasets(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    Ok(Json(json!({"datasets": state.list_datasets()?})))
}

// ============================================================================
// Training Handlers
// ============================================================================

#[derive(Deserialize)]
pub struct StartJobRequest {
    experiment_id: u64,
    dataset_filename: String,
    model: String,
    #[serde(default)]
    params: Hyperparams,
}

/// Create a run and start training it in the background.
///
/// The job is not awaited; its progress is visible through the run's
/// metrics and status.
pub async fn start_job(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartJobRequest>,
) -> Result<Json<Run>> {
    let dataset = AppState::dataset_name(&request.dataset_filename)?;
    let dataset_path = state.dataset_path(&dataset)?;
    if !dataset_path.exists() {
        return Err(ServerError::NotFound("Dataset not found".to_string()));
    }

    let mut parameters = Map::new();
    parameters.insert("model".to_string(), json!(request.model));
    parameters.insert("dataset".to_string(), json!(dataset));
    for (key, value) in request.params.as_map() {
        parameters.insert(key.clone(), value.clone());
    }

    let new_run = NewRun {
        experiment_id: request.experiment_id,
        name: format!("{} on {}", request.model, dataset),
        parameters: Value::Object(parameters),
        tags: vec!["auto-web".to_string(), request.model.clone()],
    };
    let run = with_store(&state, move |store| store.create_run(new_run)).await?;

    let job = JobSpec {
        run_id: run.id,
        dataset_path,
        model_type: request.model,
        params: request.params,
    };
    let session = state.store.open_session();
    let config = state.orchestrator.clone();
    info!(run_id = run.id, model = %job.model_type, "Spawning training job");

    tokio::task::spawn_blocking(move || {
        let run_id = job.run_id;
        if let Err(e) = train_background_task(session, job, &config) {
            error!(run_id, error = %e, "Training job could not record its outcome");
        }
    });

    Ok(Json(run))
}

pub async fn clear_data(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    with_store(&state, |store| store.clear()).await?;
    info!("Tracking data cleared");
    Ok(Json(json!({"status": "cleared"})))
}

// ============================================================================
// Registry & System Handlers
// ============================================================================

pub async fn list_models() -> Json<Value> {
    let models: Vec<Value> = ModelKind::all()
        .iter()
        .map(|&kind| {
            let info = describe(kind);
            json!({
                "id": info.id,
                "strategy": StrategyKind::for_model(kind),
                "capabilities": info.capabilities,
                "defaults": info.defaults,
            })
        })
        .collect();
    Json(json!({"models": models}))
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "active_jobs": state.store.open_sessions(),
        })),
    )
}

//! In-memory tracking store and scoped sessions

use super::storage::{SnapshotWriter, StorageBackend, SNAPSHOT_INTERVAL};
use super::{
    Experiment, ExperimentId, MetricPoint, MetricSink, NewRun, Run, RunId, RunStatus, RunStore,
    RunUpdate,
};
use crate::error::{Result, RunboardError};
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Everything the store holds; also the snapshot format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreState {
    pub experiments: BTreeMap<ExperimentId, Experiment>,
    pub runs: BTreeMap<RunId, Run>,
    /// Insertion-ordered metric log
    pub metrics: Vec<MetricPoint>,
    next_experiment_id: ExperimentId,
    next_run_id: RunId,
}

struct Inner {
    state: Arc<RwLock<StoreState>>,
    open_sessions: AtomicUsize,
    snapshots: Option<SnapshotWriter>,
}

/// Shared tracking store; cloning shares the same data
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::from_parts(Arc::new(RwLock::new(StoreState::default())), None)
    }

    /// Store mirrored to `backend`, starting from its last saved state
    pub fn with_backend(backend: Box<dyn StorageBackend>) -> Result<Self> {
        Self::with_snapshot_interval(backend, SNAPSHOT_INTERVAL)
    }

    /// Like [`MemoryStore::with_backend`]; a change reaches the backend at
    /// most `interval` after it was made.
    ///
    /// Memory is the source of truth. A failed snapshot write is logged and
    /// never undoes or rejects a mutation.
    pub fn with_snapshot_interval(backend: Box<dyn StorageBackend>, interval: Duration) -> Result<Self> {
        let state = backend.load_state()?.unwrap_or_default();
        info!(
            experiments = state.experiments.len(),
            runs = state.runs.len(),
            interval_ms = interval.as_millis() as u64,
            "Loaded tracking snapshot"
        );
        let state = Arc::new(RwLock::new(state));
        let snapshots = SnapshotWriter::spawn(backend, Arc::clone(&state), interval)?;
        Ok(Self::from_parts(state, Some(snapshots)))
    }

    fn from_parts(state: Arc<RwLock<StoreState>>, snapshots: Option<SnapshotWriter>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state,
                open_sessions: AtomicUsize::new(0),
                snapshots,
            }),
        }
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let out = f(&mut self.inner.state.write())?;
        if let Some(snapshots) = &self.inner.snapshots {
            snapshots.notify();
        }
        Ok(out)
    }

    /// Write a snapshot now; a no-op without a backend
    pub fn flush(&self) -> Result<()> {
        match &self.inner.snapshots {
            Some(snapshots) => snapshots.flush(),
            None => Ok(()),
        }
    }

    /// Acquire a handle for one job; released when dropped
    pub fn open_session(&self) -> TrackingSession {
        let open = self.inner.open_sessions.fetch_add(1, Ordering::SeqCst) + 1;
        let id = Uuid::new_v4();
        debug!(session = %id, open, "Tracking session opened");
        TrackingSession {
            store: self.clone(),
            id,
        }
    }

    /// Sessions currently held by jobs
    pub fn open_sessions(&self) -> usize {
        self.inner.open_sessions.load(Ordering::SeqCst)
    }

    pub fn create_experiment(&self, name: &str, description: Option<String>) -> Result<Experiment> {
        self.mutate(|state| {
            state.next_experiment_id += 1;
            let experiment = Experiment {
                id: state.next_experiment_id,
                name: name.to_string(),
                description,
                created_at: Utc::now(),
            };
            state.experiments.insert(experiment.id, experiment.clone());
            Ok(experiment)
        })
    }

    pub fn list_experiments(&self) -> Vec<Experiment> {
        self.inner.state.read().experiments.values().cloned().collect()
    }

    pub fn get_experiment(&self, id: ExperimentId) -> Result<Experiment> {
        self.inner
            .state
            .read()
            .experiments
            .get(&id)
            .cloned()
            .ok_or(RunboardError::ExperimentNotFound(id))
    }

    /// New run in status running
    pub fn create_run(&self, new_run: NewRun) -> Result<Run> {
        self.mutate(|state| {
            if !state.experiments.contains_key(&new_run.experiment_id) {
                return Err(RunboardError::ExperimentNotFound(new_run.experiment_id));
            }
            state.next_run_id += 1;
            let run = Run {
                id: state.next_run_id,
                experiment_id: new_run.experiment_id,
                name: new_run.name,
                status: RunStatus::Running,
                parameters: new_run.parameters,
                metrics: None,
                tags: new_run.tags,
                notes: None,
                created_at: Utc::now(),
            };
            state.runs.insert(run.id, run.clone());
            Ok(run)
        })
    }

    pub fn list_runs(&self, skip: usize, limit: usize) -> Vec<Run> {
        self.inner
            .state
            .read()
            .runs
            .values()
            .skip(skip)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn get_run(&self, id: RunId) -> Result<Run> {
        self.inner
            .state
            .read()
            .runs
            .get(&id)
            .cloned()
            .ok_or(RunboardError::RunNotFound(id))
    }

    pub fn update_run(&self, id: RunId, update: RunUpdate) -> Result<Run> {
        self.mutate(|state| {
            let run = state.runs.get_mut(&id).ok_or(RunboardError::RunNotFound(id))?;
            update.check_against(run.status)?;
            if let Some(status) = update.status {
                run.status = status;
            }
            if let Some(metrics) = update.metrics {
                run.metrics = Some(metrics);
            }
            if let Some(tags) = update.tags {
                run.tags = tags;
            }
            if let Some(notes) = update.notes {
                run.notes = Some(notes);
            }
            Ok(run.clone())
        })
    }

    /// Append one metric with a fresh timestamp
    pub fn log_metric(&self, run_id: RunId, name: &str, value: f64, step: u64) -> Result<MetricPoint> {
        let point = MetricPoint::new(run_id, step, name, value);
        self.append_points(vec![point.clone()])?;
        Ok(point)
    }

    /// Metric history of a run in insertion order
    pub fn metrics_for(&self, run_id: RunId) -> Result<Vec<MetricPoint>> {
        let state = self.inner.state.read();
        if !state.runs.contains_key(&run_id) {
            return Err(RunboardError::RunNotFound(run_id));
        }
        Ok(state
            .metrics
            .iter()
            .filter(|p| p.run_id == run_id)
            .cloned()
            .collect())
    }

    /// Delete all metrics, runs and experiments. Ids keep counting up.
    pub fn clear(&self) -> Result<()> {
        self.mutate(|state| {
            state.metrics.clear();
            state.runs.clear();
            state.experiments.clear();
            Ok(())
        })
    }

    fn append_points(&self, points: Vec<MetricPoint>) -> Result<()> {
        self.mutate(|state| {
            if let Some(missing) = points.iter().find(|p| !state.runs.contains_key(&p.run_id)) {
                return Err(RunboardError::RunNotFound(missing.run_id));
            }
            state.metrics.extend(points);
            Ok(())
        })
    }
}

impl RunStore for MemoryStore {
    fn fetch(&self, run_id: RunId) -> Result<Run> {
        self.get_run(run_id)
    }

    fn update(&self, run_id: RunId, update: RunUpdate) -> Result<Run> {
        self.update_run(run_id, update)
    }
}

impl MetricSink for MemoryStore {
    fn append(&self, point: MetricPoint) -> Result<()> {
        self.append_points(vec![point])
    }

    /// All points land under one lock acquisition
    fn append_batch(&self, points: Vec<MetricPoint>) -> Result<()> {
        self.append_points(points)
    }
}

/// Store handle private to one job
pub struct TrackingSession {
    store: MemoryStore,
    id: Uuid,
}

impl TrackingSession {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl RunStore for TrackingSession {
    fn fetch(&self, run_id: RunId) -> Result<Run> {
        self.store.fetch(run_id)
    }

    fn update(&self, run_id: RunId, update: RunUpdate) -> Result<Run> {
        self.store.update(run_id, update)
    }
}

impl MetricSink for TrackingSession {
    fn append(&self, point: MetricPoint) -> Result<()> {
        self.store.append(point)
    }

    fn append_batch(&self, points: Vec<MetricPoint>) -> Result<()> {
        self.store.append_batch(points)
    }
}

impl Drop for TrackingSession {
    fn drop(&mut self) {
        let open = self.store.inner.open_sessions.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!(session = %self.id, open, "Tracking session released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{LocalStorage, RunMetrics};
    use parking_lot::Mutex;
    use serde_json::json;

    /// Loads nothing; every save fails
    struct FullDisk;

    impl StorageBackend for FullDisk {
        fn save_state(&self, _state: &StoreState) -> Result<()> {
            Err(std::io::Error::other("disk full").into())
        }

        fn load_state(&self) -> Result<Option<StoreState>> {
            Ok(None)
        }
    }

    /// Records the metric count of every saved snapshot
    #[derive(Clone, Default)]
    struct SaveLog(Arc<Mutex<Vec<usize>>>);

    impl StorageBackend for SaveLog {
        fn save_state(&self, state: &StoreState) -> Result<()> {
            self.0.lock().push(state.metrics.len());
            Ok(())
        }

        fn load_state(&self) -> Result<Option<StoreState>> {
            Ok(None)
        }
    }

    fn add_run(store: &MemoryStore) -> Run {
        let exp = store.create_experiment("demo", None).unwrap();
        store
            .create_run(NewRun {
                experiment_id: exp.id,
                name: "KNN on iris.csv".to_string(),
                ..Default::default()
            })
            .unwrap()
    }

    fn store_with_run() -> (MemoryStore, Run) {
        let store = MemoryStore::new();
        let exp = store.create_experiment("demo", None).unwrap();
        let run = store
            .create_run(NewRun {
                experiment_id: exp.id,
                name: "RandomForest on iris.csv".to_string(),
                parameters: json!({"model": "RandomForest"}),
                tags: vec!["auto-web".to_string()],
            })
            .unwrap();
        (store, run)
    }

    #[test]
    fn test_create_run_requires_experiment() {
        let store = MemoryStore::new();
        let err = store
            .create_run(NewRun {
                experiment_id: 9,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, RunboardError::ExperimentNotFound(9)));
    }

    #[test]
    fn test_terminal_status_is_final() {
        let (store, run) = store_with_run();
        assert_eq!(run.status, RunStatus::Running);

        let mut metrics = RunMetrics::new();
        metrics.insert("final_accuracy".to_string(), 0.9);
        let done = store.complete(run.id, metrics).unwrap();
        assert_eq!(done.status, RunStatus::Completed);

        assert!(matches!(
            store.fail(run.id, "late".to_string()),
            Err(RunboardError::InvalidTransition { .. })
        ));

        let mut other = RunMetrics::new();
        other.insert("final_accuracy".to_string(), 0.1);
        assert!(store.complete(run.id, other).is_err());
        let kept = store.get_run(run.id).unwrap();
        assert_eq!(kept.metrics.unwrap()["final_accuracy"], 0.9);
        assert!(kept.notes.is_none());
    }

    #[test]
    fn test_failed_snapshot_keeps_memory_authoritative() {
        let store = MemoryStore::with_snapshot_interval(Box::new(FullDisk), Duration::ZERO).unwrap();
        let run = add_run(&store);

        let mut metrics = RunMetrics::new();
        metrics.insert("final_accuracy".to_string(), 0.9);
        let done = store.complete(run.id, metrics).unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(store.get_run(run.id).unwrap().status, RunStatus::Completed);

        assert!(store.flush().is_err());
    }

    #[test]
    fn test_snapshots_coalesce_off_the_write_path() {
        let log = SaveLog::default();
        let store =
            MemoryStore::with_snapshot_interval(Box::new(log.clone()), Duration::from_secs(60)).unwrap();
        let run = add_run(&store);
        for step in 1..=50 {
            store.log_metric(run.id, "test_accuracy", 0.5, step).unwrap();
        }
        assert!(log.0.lock().is_empty(), "mutations never wait for a write");

        drop(store);
        assert_eq!(*log.0.lock(), vec![50]);
    }

    #[test]
    fn test_metrics_in_insertion_order() {
        let (store, run) = store_with_run();
        store.log_metric(run.id, "test_accuracy", 0.5, 1).unwrap();
        store
            .append_batch(vec![
                MetricPoint::new(run.id, 2, "test_accuracy", 0.6),
                MetricPoint::new(run.id, 2, "train_accuracy", 0.7),
            ])
            .unwrap();

        let history = store.metrics_for(run.id).unwrap();
        let steps: Vec<u64> = history.iter().map(|p| p.step).collect();
        assert_eq!(steps, vec![1, 2, 2]);
        assert!(store.append(MetricPoint::new(999, 1, "x", 0.0)).is_err());
    }

    #[test]
    fn test_session_released_on_drop() {
        let store = MemoryStore::new();
        {
            let _a = store.open_session();
            let _b = store.open_session();
            assert_eq!(store.open_sessions(), 2);
        }
        assert_eq!(store.open_sessions(), 0);
    }

    #[test]
    fn test_clear_keeps_ids_increasing() {
        let (store, run) = store_with_run();
        store.clear().unwrap();
        assert!(store.list_runs(0, 100).is_empty());
        assert!(store.get_run(run.id).is_err());

        let exp = store.create_experiment("again", None).unwrap();
        assert!(exp.id > run.experiment_id);
    }

    #[test]
    fn test_snapshot_reload() {
        let path = std::env::temp_dir().join(format!("runboard_store_{}.json", Uuid::new_v4()));
        {
            let store = MemoryStore::with_backend(Box::new(LocalStorage::new(&path))).unwrap();
            store.create_experiment("persisted", Some("kept".to_string())).unwrap();
        }
        let reloaded = MemoryStore::with_backend(Box::new(LocalStorage::new(&path))).unwrap();
        let experiments = reloaded.list_experiments();
        assert_eq!(experiments.len(), 1);
        assert_eq!(experiments[0].name, "persisted");
        let _ = std::fs::remove_file(&path);
    }
}

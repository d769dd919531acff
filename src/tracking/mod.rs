//! Experiment tracking
//!
//! Records for experiments, runs and metric points, the [`RunStore`] and
//! [`MetricSink`] interfaces the orchestrator writes through, and an
//! in-memory implementation with optional JSON snapshots.

mod storage;
mod store;

pub use storage::{LocalStorage, StorageBackend, SNAPSHOT_INTERVAL};
pub use store::{MemoryStore, StoreState, TrackingSession};

use crate::error::{Result, RunboardError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub type ExperimentId = u64;
pub type RunId = u64;

/// Final metrics of a run
pub type RunMetrics = BTreeMap<String, f64>;

/// Run lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    /// Only `running -> completed | failed` is allowed, once. A terminal
    /// status cannot be stated again.
    pub fn check_transition(&self, next: RunStatus) -> Result<()> {
        match (self, next) {
            (RunStatus::Running, _) => Ok(()),
            (from, to) => Err(RunboardError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = RunboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(RunboardError::invalid_param("status", other, "unknown run status")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: ExperimentId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub experiment_id: ExperimentId,
    pub name: String,
    pub status: RunStatus,
    /// Echo of model type and hyperparameters
    pub parameters: Value,
    /// Present once the run has completed
    pub metrics: Option<RunMetrics>,
    pub tags: Vec<String>,
    /// Failure description
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One append-only metric observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub run_id: RunId,
    pub step: u64,
    pub name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl MetricPoint {
    pub fn new(run_id: RunId, step: u64, name: impl Into<String>, value: f64) -> Self {
        Self {
            run_id,
            step,
            name: name.into(),
            value,
            timestamp: Utc::now(),
        }
    }
}

/// Fields of a new run; status starts as running
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewRun {
    pub experiment_id: ExperimentId,
    #[serde(default = "default_run_name")]
    pub name: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_run_name() -> String {
    "Run".to_string()
}

/// Partial update; `None` leaves a field unchanged (last write wins)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunUpdate {
    pub status: Option<RunStatus>,
    pub metrics: Option<RunMetrics>,
    pub tags: Option<Vec<String>>,
    pub notes: Option<String>,
}

impl RunUpdate {
    /// Final metrics are accepted only by the update that completes a run
    /// and notes only by the one that fails it, so `metrics` is set iff
    /// the run is completed and `notes` iff it failed.
    pub fn check_against(&self, current: RunStatus) -> Result<()> {
        if let Some(next) = self.status {
            current.check_transition(next)?;
        }
        let completing = current == RunStatus::Running && self.status == Some(RunStatus::Completed);
        let failing = current == RunStatus::Running && self.status == Some(RunStatus::Failed);

        if self.metrics.is_some() != completing {
            let reason = if completing {
                "a completed run needs final metrics"
            } else {
                "final metrics are only accepted with status completed"
            };
            return Err(RunboardError::invalid_param("metrics", current, reason));
        }
        let has_notes = self.notes.as_deref().is_some_and(|n| !n.is_empty());
        if failing && !has_notes {
            return Err(RunboardError::invalid_param("notes", current, "a failed run needs notes"));
        }
        if self.notes.is_some() && !failing {
            return Err(RunboardError::invalid_param(
                "notes",
                current,
                "notes are only accepted with status failed",
            ));
        }
        Ok(())
    }
}

/// Access to run records
pub trait RunStore {
    fn fetch(&self, run_id: RunId) -> Result<Run>;

    fn update(&self, run_id: RunId, update: RunUpdate) -> Result<Run>;

    /// Terminal success with final metrics
    fn complete(&self, run_id: RunId, metrics: RunMetrics) -> Result<Run> {
        self.update(
            run_id,
            RunUpdate {
                status: Some(RunStatus::Completed),
                metrics: Some(metrics),
                ..Default::default()
            },
        )
    }

    /// Terminal failure with a description
    fn fail(&self, run_id: RunId, notes: String) -> Result<Run> {
        self.update(
            run_id,
            RunUpdate {
                status: Some(RunStatus::Failed),
                notes: Some(notes),
                ..Default::default()
            },
        )
    }
}

/// Append-only metric log
pub trait MetricSink {
    fn append(&self, point: MetricPoint) -> Result<()>;

    /// Append several points as one write
    fn append_batch(&self, points: Vec<MetricPoint>) -> Result<()> {
        for point in points {
            self.append(point)?;
        }
        Ok(())
    }
}

//! Runboard - Experiment tracking with a live training orchestrator
//!
//! This crate provides the backend of an experiment-tracking dashboard:
//! - Data preprocessing into deterministic train/validation/test splits
//! - Native classifiers behind a registry with static capability flags
//! - A background orchestrator that streams per-step metrics while training
//! - Experiment, run and metric tracking
//! - Web server and CLI interfaces
//!
//! # Modules
//!
//! ## Core
//! - [`preprocessing`] - Encoding, imputation, scaling, splitting
//! - [`training`] - Classifiers and classification metrics
//! - [`registry`] - Model types, default hyperparameters, constructors
//! - [`orchestrator`] - Strategies, step evaluation, run lifecycle
//! - [`tracking`] - Runs, metric points, run store and metric sink
//!
//! ## Services
//! - [`server`] - HTTP server with REST API
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Core modules
pub mod preprocessing;
pub mod training;
pub mod registry;
pub mod orchestrator;
pub mod tracking;

// Services
pub mod server;
pub mod cli;

pub use error::{Result, RunboardError};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, RunboardError};

    // Preprocessing
    pub use crate::preprocessing::{PreprocessingPipeline, Split};

    // Training
    pub use crate::training::{Classifier, Estimator};

    // Registry
    pub use crate::registry::{create_model, Capabilities, Hyperparams, ModelKind};

    // Orchestration
    pub use crate::orchestrator::{
        train_background_task, JobSpec, OrchestratorConfig, StepEvaluator, StrategyKind,
        TrainingStrategy,
    };

    // Experiment tracking
    pub use crate::tracking::{
        Experiment, MemoryStore, MetricPoint, MetricSink, Run, RunStatus, RunStore,
        TrackingSession,
    };
}

//! Error types for runboard

use thiserror::Error;

/// Result type alias for runboard operations
pub type Result<T> = std::result::Result<T, RunboardError>;

/// Main error type for the orchestrator and its collaborators
#[derive(Error, Debug)]
pub enum RunboardError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Preprocessing error: {0}")]
    PreprocessingError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Unknown model type: {0}")]
    UnknownModelType(String),

    #[error("Optional metric unavailable: {0}")]
    OptionalMetricUnavailable(String),

    #[error("Run not found: {0}")]
    RunNotFound(u64),

    #[error("Experiment not found: {0}")]
    ExperimentNotFound(u64),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

impl RunboardError {
    /// Shorthand for an `InvalidParameter` error
    pub fn invalid_param(
        name: impl Into<String>,
        value: impl std::fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        RunboardError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<polars::error::PolarsError> for RunboardError {
    fn from(err: polars::error::PolarsError) -> Self {
        RunboardError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for RunboardError {
    fn from(err: serde_json::Error) -> Self {
        RunboardError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for RunboardError {
    fn from(err: ndarray::ShapeError) -> Self {
        RunboardError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RunboardError::DataError("test error".to_string());
        assert_eq!(err.to_string(), "Data error: test error");
    }

    #[test]
    fn test_unknown_model_type_names_identifier() {
        let err = RunboardError::UnknownModelType("Foo".to_string());
        assert!(err.to_string().contains("Foo"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RunboardError = io_err.into();
        assert!(matches!(err, RunboardError::IoError(_)));
    }

    #[test]
    fn test_invalid_param_helper() {
        let err = RunboardError::invalid_param("n_estimators", -1, "must be positive");
        assert_eq!(
            err.to_string(),
            "Invalid parameter: n_estimators = -1, must be positive"
        );
    }
}

//! Tabular dataset -> train/validation/test partitions

use super::encoder::{encode_target, LabelEncoder};
use super::imputer::MeanImputer;
use super::scaler::StandardScaler;
use super::split::{take, take_rows, train_test_split};
use crate::error::{Result, RunboardError};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::Serialize;
use std::fs::File;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Seed for both sequential splits
pub const SPLIT_SEED: u64 = 42;
/// Fraction carved off the full dataset by the first split
pub const HOLDOUT_FRACTION: f64 = 0.30;
/// Fraction of the holdout that becomes the test partition
pub const TEST_FRACTION_OF_HOLDOUT: f64 = 0.50;

/// Clean numeric partitions of a dataset
#[derive(Debug, Clone, Serialize)]
pub struct Split {
    pub x_train: Array2<f64>,
    pub x_val: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<f64>,
    pub y_val: Array1<f64>,
    pub y_test: Array1<f64>,
    pub feature_names: Vec<String>,
    /// Original target label per class index
    pub class_labels: Vec<String>,
}

impl Split {
    pub fn n_features(&self) -> usize {
        self.x_train.ncols()
    }

    pub fn n_classes(&self) -> usize {
        self.class_labels.len()
    }
}

/// Load a CSV file with a header row
pub fn load_csv(path: &Path) -> Result<DataFrame> {
    let file = File::open(path).map_err(|e| {
        RunboardError::DataError(format!("cannot open {}: {}", path.display(), e))
    })?;

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(100))
        .into_reader_with_file_handle(file)
        .finish()?;
    Ok(df)
}

/// Encoding, imputation, scaling and splitting for one dataset.
///
/// The last column is the target. Scaling statistics come from the full
/// feature matrix before any split is taken.
#[derive(Debug, Default)]
pub struct PreprocessingPipeline {
    encoders: Vec<(String, LabelEncoder)>,
    imputer: MeanImputer,
    scaler: StandardScaler,
}

impl PreprocessingPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `path` and produce the three partitions
    pub fn run(&mut self, path: &Path) -> Result<Split> {
        let start = Instant::now();
        let df = load_csv(path)?;
        let split = self.run_frame(&df)?;
        info!(
            path = %path.display(),
            rows = df.height(),
            features = split.n_features(),
            classes = split.n_classes(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Preprocessed dataset"
        );
        Ok(split)
    }

    /// Same as [`run`](Self::run) on an in-memory frame
    pub fn run_frame(&mut self, df: &DataFrame) -> Result<Split> {
        let (x, y, feature_names, class_labels) = self.to_matrix(df)?;

        let x = self.imputer.fit_transform(&x)?;
        let x = self.scaler.fit_transform(&x)?;

        let first = train_test_split(x.nrows(), HOLDOUT_FRACTION, SPLIT_SEED)?;
        let second = train_test_split(first.test.len(), TEST_FRACTION_OF_HOLDOUT, SPLIT_SEED)?;

        let val_idx: Vec<usize> = second.train.iter().map(|&i| first.test[i]).collect();
        let test_idx: Vec<usize> = second.test.iter().map(|&i| first.test[i]).collect();

        debug!(
            train = first.train.len(),
            val = val_idx.len(),
            test = test_idx.len(),
            "Split partitions"
        );

        Ok(Split {
            x_train: take_rows(&x, &first.train),
            x_val: take_rows(&x, &val_idx),
            x_test: take_rows(&x, &test_idx),
            y_train: take(&y, &first.train),
            y_val: take(&y, &val_idx),
            y_test: take(&y, &test_idx),
            feature_names,
            class_labels,
        })
    }

    /// Columns of the frame that were label-encoded, with their vocabularies
    pub fn encoders(&self) -> &[(String, LabelEncoder)] {
        &self.encoders
    }

    fn to_matrix(
        &mut self,
        df: &DataFrame,
    ) -> Result<(Array2<f64>, Array1<f64>, Vec<String>, Vec<String>)> {
        let columns = df.get_columns();
        if columns.len() < 2 {
            return Err(RunboardError::PreprocessingError(format!(
                "need at least one feature column and a target, got {} columns",
                columns.len()
            )));
        }
        if df.height() < 2 {
            return Err(RunboardError::PreprocessingError(format!(
                "need at least 2 rows, got {}",
                df.height()
            )));
        }

        let (target_col, feature_cols) = columns
            .split_last()
            .ok_or_else(|| RunboardError::PreprocessingError("empty frame".to_string()))?;

        let n_rows = df.height();
        let mut x = Array2::<f64>::zeros((n_rows, feature_cols.len()));
        let mut feature_names = Vec::with_capacity(feature_cols.len());
        self.encoders.clear();

        for (j, column) in feature_cols.iter().enumerate() {
            let series = column.as_materialized_series();
            let name = series.name().to_string();

            let values: Vec<Option<f64>> = if series.dtype() == &DataType::String {
                let mut encoder = LabelEncoder::new();
                let codes = encoder.fit_transform(series)?;
                self.encoders.push((name.clone(), encoder));
                codes
            } else {
                let cast = series.cast(&DataType::Float64).map_err(|e| {
                    RunboardError::PreprocessingError(format!("column '{}': {}", name, e))
                })?;
                cast.f64()?.into_iter().collect()
            };

            for (i, v) in values.into_iter().enumerate() {
                x[[i, j]] = v.unwrap_or(f64::NAN);
            }
            feature_names.push(name);
        }

        let target = encode_target(target_col.as_materialized_series())?;
        let y = Array1::from_vec(target.codes);

        Ok((x, y, feature_names, target.labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(n: usize) -> DataFrame {
        let a: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let b: Vec<&str> = (0..n).map(|i| if i % 3 == 0 { "x" } else { "y" }).collect();
        let y: Vec<&str> = (0..n).map(|i| if i % 2 == 0 { "cat" } else { "dog" }).collect();
        df!("a" => a, "b" => b, "label" => y).unwrap()
    }

    #[test]
    fn test_partition_sizes() {
        let split = PreprocessingPipeline::new().run_frame(&frame(100)).unwrap();
        assert_eq!(split.x_train.nrows(), 70);
        assert_eq!(split.x_val.nrows(), 15);
        assert_eq!(split.x_test.nrows(), 15);
        assert_eq!(split.y_train.len(), 70);
        assert_eq!(split.class_labels, vec!["cat", "dog"]);
        assert_eq!(split.feature_names, vec!["a", "b"]);
    }

    #[test]
    fn test_categorical_feature_recorded() {
        let mut pipeline = PreprocessingPipeline::new();
        pipeline.run_frame(&frame(20)).unwrap();
        let (name, encoder) = &pipeline.encoders()[0];
        assert_eq!(name, "b");
        assert_eq!(encoder.classes(), &["x", "y"]);
    }

    #[test]
    fn test_missing_values_are_imputed() {
        let df = df!(
            "f" => &[Some(1.0), None, Some(3.0), Some(5.0), Some(7.0), None, Some(2.0), Some(4.0)],
            "y" => &[0i64, 1, 0, 1, 0, 1, 0, 1]
        )
        .unwrap();
        let split = PreprocessingPipeline::new().run_frame(&df).unwrap();
        assert!(split.x_train.iter().chain(split.x_val.iter()).all(|v| v.is_finite()));
    }

    #[test]
    fn test_requires_target_and_feature() {
        let df = df!("only" => &[1.0, 2.0, 3.0]).unwrap();
        assert!(PreprocessingPipeline::new().run_frame(&df).is_err());
    }
}

//! Integration test: dataset file to train/validation/test partitions

use ndarray::{concatenate, Axis};
use polars::prelude::*;
use runboard::error::RunboardError;
use runboard::preprocessing::{train_test_split, PreprocessingPipeline};
use std::path::PathBuf;

fn write_csv(contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("runboard_prep_{}.csv", uuid::Uuid::new_v4()));
    std::fs::write(&path, contents).unwrap();
    path
}

fn mixed_csv(rows: usize) -> String {
    let mut csv = String::from("age,income,city,label\n");
    for i in 0..rows {
        let age = if i % 17 == 4 { String::new() } else { (20 + i % 40).to_string() };
        let city = ["paris", "berlin", "oslo"][i % 3];
        let label = if (i * 7) % 5 < 2 { "churn" } else { "stay" };
        csv.push_str(&format!("{},{:.2},{},{}\n", age, 1000.0 + (i as f64) * 12.5, city, label));
    }
    csv
}

#[test]
fn test_pipeline_is_deterministic() {
    let path = write_csv(&mixed_csv(200));
    let first = PreprocessingPipeline::new().run(&path).unwrap();
    let second = PreprocessingPipeline::new().run(&path).unwrap();

    assert_eq!(first.x_train, second.x_train);
    assert_eq!(first.x_val, second.x_val);
    assert_eq!(first.x_test, second.x_test);
    assert_eq!(first.y_train, second.y_train);
    assert_eq!(first.y_val, second.y_val);
    assert_eq!(first.y_test, second.y_test);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_partition_proportions() {
    let path = write_csv(&mixed_csv(200));
    let split = PreprocessingPipeline::new().run(&path).unwrap();

    assert_eq!(split.x_train.nrows(), 140);
    assert_eq!(split.x_val.nrows(), 30);
    assert_eq!(split.x_test.nrows(), 30);
    assert_eq!(split.n_features(), 3);
    assert_eq!(split.class_labels, vec!["churn", "stay"]);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_features_are_clean_and_standardized() {
    let path = write_csv(&mixed_csv(120));
    let split = PreprocessingPipeline::new().run(&path).unwrap();

    let all = concatenate(
        Axis(0),
        &[split.x_train.view(), split.x_val.view(), split.x_test.view()],
    )
    .unwrap();
    assert!(all.iter().all(|v| v.is_finite()), "no missing values survive");

    for col in all.columns() {
        let mean = col.mean().unwrap();
        let var = col.mapv(|v| (v - mean).powi(2)).mean().unwrap();
        assert!(mean.abs() < 1e-9, "column mean {}", mean);
        assert!((var - 1.0).abs() < 1e-9, "column variance {}", var);
    }
    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_numeric_target_maps_to_class_indices() {
    let df = df!(
        "x" => &[0.1, 0.4, 0.2, 0.9, 0.8, 0.7, 0.3, 0.6, 0.5, 0.05],
        "y" => &[3i64, 7, 3, 9, 9, 7, 3, 9, 7, 3]
    )
    .unwrap();
    let split = PreprocessingPipeline::new().run_frame(&df).unwrap();
    assert_eq!(split.class_labels, vec!["3", "7", "9"]);

    let labels = concatenate(
        Axis(0),
        &[split.y_train.view(), split.y_val.view(), split.y_test.view()],
    )
    .unwrap();
    assert!(labels.iter().all(|&v| v == 0.0 || v == 1.0 || v == 2.0));
}

#[test]
fn test_split_indices_cover_all_rows() {
    let split = train_test_split(50, 0.30, 42).unwrap();
    assert_eq!(split.test.len(), 15);
    let mut all: Vec<usize> = split.train.iter().chain(split.test.iter()).copied().collect();
    all.sort_unstable();
    assert_eq!(all, (0..50).collect::<Vec<_>>());
}

#[test]
fn test_missing_file_is_data_error() {
    let err = PreprocessingPipeline::new()
        .run(std::path::Path::new("/nonexistent/runboard.csv"))
        .unwrap_err();
    assert!(matches!(err, RunboardError::DataError(_)));
}

#[test]
fn test_degenerate_inputs_rejected() {
    let single_column = write_csv("label\na\nb\na\n");
    assert!(PreprocessingPipeline::new().run(&single_column).is_err());

    let one_row = write_csv("x,label\n1.0,a\n");
    assert!(PreprocessingPipeline::new().run(&one_row).is_err());

    let missing_target = write_csv("x,label\n1.0,a\n2.0,\n3.0,b\n4.0,a\n");
    assert!(matches!(
        PreprocessingPipeline::new().run(&missing_target),
        Err(RunboardError::PreprocessingError(_))
    ));

    for path in [single_column, one_row, missing_target] {
        let _ = std::fs::remove_file(&path);
    }
}

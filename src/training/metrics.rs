//! Classification metrics

use super::models::class_index;
use crate::error::{Result, RunboardError};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Probability clipping bound for log-loss
pub const LOG_LOSS_EPS: f64 = 1e-15;

/// Support-weighted precision, recall and F1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Fraction of exact label matches. Empty input scores 0.
pub fn accuracy(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| t == p)
        .count();
    correct as f64 / y_true.len() as f64
}

#[derive(Default)]
struct ClassCounts {
    tp: usize,
    fp: usize,
    fn_: usize,
    support: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    // zero division scores 0
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Weighted-average precision, recall and F1 over the labels present in
/// either `y_true` or `y_pred`, weighted by true support.
///
/// A class never predicted has precision 0; a class with no true members
/// contributes nothing to the weighted average.
pub fn weighted_scores(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> WeightedScores {
    let mut counts: BTreeMap<i64, ClassCounts> = BTreeMap::new();

    for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
        let (t, p) = (t.to_bits() as i64, p.to_bits() as i64);
        counts.entry(t).or_default().support += 1;
        if t == p {
            counts.entry(t).or_default().tp += 1;
        } else {
            counts.entry(p).or_default().fp += 1;
            counts.entry(t).or_default().fn_ += 1;
        }
    }

    let total: usize = counts.values().map(|c| c.support).sum();
    if total == 0 {
        return WeightedScores { precision: 0.0, recall: 0.0, f1: 0.0 };
    }

    let mut scores = WeightedScores { precision: 0.0, recall: 0.0, f1: 0.0 };
    for c in counts.values() {
        let precision = ratio(c.tp, c.tp + c.fp);
        let recall = ratio(c.tp, c.tp + c.fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        let w = c.support as f64 / total as f64;
        scores.precision += w * precision;
        scores.recall += w * recall;
        scores.f1 += w * f1;
    }
    scores
}

/// Mean cross-entropy of `proba` (columns ordered as `classes`).
///
/// Fails with `OptionalMetricUnavailable` when the shapes disagree or a true
/// label is outside the model's classes.
pub fn log_loss(y_true: &Array1<f64>, proba: &Array2<f64>, classes: &[f64]) -> Result<f64> {
    if proba.nrows() != y_true.len() || proba.ncols() != classes.len() {
        return Err(RunboardError::OptionalMetricUnavailable(format!(
            "probability matrix {}x{} does not match {} samples and {} classes",
            proba.nrows(),
            proba.ncols(),
            y_true.len(),
            classes.len()
        )));
    }
    if y_true.is_empty() {
        return Err(RunboardError::OptionalMetricUnavailable(
            "no samples to score".to_string(),
        ));
    }

    let mut total = 0.0;
    for (row, &label) in proba.rows().into_iter().zip(y_true.iter()) {
        let k = class_index(classes, label).ok_or_else(|| {
            RunboardError::OptionalMetricUnavailable(format!(
                "label {} was not seen during training",
                label
            ))
        })?;
        let clipped: Vec<f64> = row
            .iter()
            .map(|p| p.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS))
            .collect();
        let sum: f64 = clipped.iter().sum();
        total -= (clipped[k] / sum).ln();
    }

    let loss = total / y_true.len() as f64;
    if loss.is_finite() {
        Ok(loss)
    } else {
        Err(RunboardError::OptionalMetricUnavailable(
            "log-loss is not finite".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_accuracy() {
        let t = array![0.0, 1.0, 1.0, 2.0];
        let p = array![0.0, 1.0, 0.0, 2.0];
        assert_eq!(accuracy(&t, &p), 0.75);
    }

    #[test]
    fn test_weighted_scores_perfect() {
        let t = array![0.0, 1.0, 2.0, 2.0];
        let s = weighted_scores(&t, &t);
        assert_eq!(s, WeightedScores { precision: 1.0, recall: 1.0, f1: 1.0 });
    }

    #[test]
    fn test_zero_division_is_zero() {
        // class 1 is never predicted
        let t = array![0.0, 0.0, 1.0, 1.0];
        let p = array![0.0, 0.0, 0.0, 0.0];
        let s = weighted_scores(&t, &p);

        // class 0: precision 0.5, recall 1.0; class 1: precision 0 (0/0), recall 0
        assert!((s.precision - 0.25).abs() < 1e-12);
        assert!((s.recall - 0.5).abs() < 1e-12);
        assert!((s.f1 - (0.5 * 2.0 / 3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_log_loss_known_value() {
        let t = array![0.0, 1.0];
        let p = array![[0.8, 0.2], [0.4, 0.6]];
        let loss = log_loss(&t, &p, &[0.0, 1.0]).unwrap();
        let expected = -(0.8f64.ln() + 0.6f64.ln()) / 2.0;
        assert!((loss - expected).abs() < 1e-12);
    }

    #[test]
    fn test_log_loss_unseen_label_unavailable() {
        let t = array![0.0, 2.0];
        let p = array![[0.5, 0.5], [0.5, 0.5]];
        let err = log_loss(&t, &p, &[0.0, 1.0]).unwrap_err();
        assert!(matches!(err, RunboardError::OptionalMetricUnavailable(_)));
    }
}

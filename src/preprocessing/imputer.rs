//! Mean imputation for missing feature values

use crate::error::{Result, RunboardError};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Replaces `NaN` cells with the mean of the observed values in their column
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeanImputer {
    fill_values: Option<Array1<f64>>,
}

impl MeanImputer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute per-column means over non-missing cells.
    /// A column with no observed value is filled with 0.
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        let means = x
            .axis_iter(Axis(1))
            .map(|col| {
                let (sum, count) = col
                    .iter()
                    .filter(|v| !v.is_nan())
                    .fold((0.0, 0usize), |(s, c), &v| (s + v, c + 1));
                if count == 0 {
                    0.0
                } else {
                    sum / count as f64
                }
            })
            .collect();
        self.fill_values = Some(means);
        Ok(self)
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let fill = self.fill_values.as_ref().ok_or(RunboardError::ModelNotFitted)?;
        if fill.len() != x.ncols() {
            return Err(RunboardError::ShapeError {
                expected: format!("{} columns", fill.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }

        let mut out = x.clone();
        for (mut col, &mean) in out.axis_iter_mut(Axis(1)).zip(fill.iter()) {
            col.mapv_inplace(|v| if v.is_nan() { mean } else { v });
        }
        Ok(out)
    }

    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    pub fn fill_values(&self) -> Option<&Array1<f64>> {
        self.fill_values.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_mean_imputation() {
        let x = array![[1.0, f64::NAN], [3.0, 4.0], [f64::NAN, 8.0]];
        let out = MeanImputer::new().fit_transform(&x).unwrap();

        assert_eq!(out[[2, 0]], 2.0);
        assert_eq!(out[[0, 1]], 6.0);
        assert!(out.iter().all(|v| !v.is_nan()));
    }

    #[test]
    fn test_all_missing_column_fills_zero() {
        let x = array![[f64::NAN], [f64::NAN]];
        let out = MeanImputer::new().fit_transform(&x).unwrap();
        assert_eq!(out, array![[0.0], [0.0]]);
    }
}

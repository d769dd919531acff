//! Label encoding for categorical columns and class targets

use crate::error::{Result, RunboardError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Ordinal label encoder
///
/// Categories are sorted and mapped to `0..k`. Missing cells stay missing
/// (`None`) so a later imputation pass can fill them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
    is_fitted: bool,
}

impl LabelEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn the sorted category vocabulary of a string series
    pub fn fit(&mut self, series: &Series) -> Result<&mut Self> {
        let ca = series
            .str()
            .map_err(|e| RunboardError::PreprocessingError(e.to_string()))?;

        let uniques: BTreeSet<&str> = ca.into_iter().flatten().collect();
        self.classes = uniques.into_iter().map(str::to_string).collect();
        self.is_fitted = true;
        Ok(self)
    }

    /// Encode a string series into category indices
    pub fn transform(&self, series: &Series) -> Result<Vec<Option<f64>>> {
        if !self.is_fitted {
            return Err(RunboardError::ModelNotFitted);
        }
        let ca = series
            .str()
            .map_err(|e| RunboardError::PreprocessingError(e.to_string()))?;

        ca.into_iter()
            .map(|v| match v {
                None => Ok(None),
                Some(s) => self
                    .classes
                    .binary_search_by(|c| c.as_str().cmp(s))
                    .map(|idx| Some(idx as f64))
                    .map_err(|_| {
                        RunboardError::PreprocessingError(format!("unseen category '{}'", s))
                    }),
            })
            .collect()
    }

    pub fn fit_transform(&mut self, series: &Series) -> Result<Vec<Option<f64>>> {
        self.fit(series)?;
        self.transform(series)
    }

    /// Learned categories, index order
    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

/// Encoded class target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedTarget {
    /// Class index per row
    pub codes: Vec<f64>,
    /// Original label for each class index
    pub labels: Vec<String>,
}

/// Encode a target column into contiguous class indices.
///
/// String targets go through [`LabelEncoder`]. Numeric targets are mapped
/// by sorted distinct value. A missing target is an error.
pub fn encode_target(series: &Series) -> Result<EncodedTarget> {
    if series.null_count() > 0 {
        return Err(RunboardError::PreprocessingError(format!(
            "target column '{}' has {} missing values",
            series.name(),
            series.null_count()
        )));
    }

    if series.dtype() == &DataType::String {
        let mut encoder = LabelEncoder::new();
        let codes = encoder
            .fit_transform(series)?
            .into_iter()
            .map(|c| c.unwrap_or(0.0))
            .collect();
        return Ok(EncodedTarget {
            codes,
            labels: encoder.classes().to_vec(),
        });
    }

    let values = series.cast(&DataType::Float64)?;
    let values: Vec<f64> = values.f64()?.into_iter().flatten().collect();

    let mut distinct = values.clone();
    distinct.sort_by(f64::total_cmp);
    distinct.dedup();

    let codes = values
        .iter()
        .map(|v| {
            distinct
                .binary_search_by(|d| d.total_cmp(v))
                .map(|i| i as f64)
                .map_err(|_| RunboardError::PreprocessingError(format!("bad target value {}", v)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(EncodedTarget {
        codes,
        labels: distinct.iter().map(|d| d.to_string()).collect(),
    })
}

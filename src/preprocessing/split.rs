//! Seeded shuffle splits

use crate::error::{Result, RunboardError};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Row indices of one train/test split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..n_samples` with `seed` and carve off the first
/// `ceil(test_fraction * n)` indices as the test part.
pub fn train_test_split(n_samples: usize, test_fraction: f64, seed: u64) -> Result<SplitIndices> {
    if !(0.0..1.0).contains(&test_fraction) || test_fraction == 0.0 {
        return Err(RunboardError::invalid_param(
            "test_fraction",
            test_fraction,
            "must be in (0, 1)",
        ));
    }

    let n_test = (test_fraction * n_samples as f64).ceil() as usize;
    if n_test == 0 || n_test >= n_samples {
        return Err(RunboardError::PreprocessingError(format!(
            "cannot split {} samples with test fraction {}",
            n_samples, test_fraction
        )));
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok(SplitIndices { train, test: indices })
}

/// Gather `indices` rows of a matrix
pub fn take_rows(x: &Array2<f64>, indices: &[usize]) -> Array2<f64> {
    x.select(Axis(0), indices)
}

/// Gather `indices` entries of a vector
pub fn take(y: &Array1<f64>, indices: &[usize]) -> Array1<f64> {
    y.select(Axis(0), indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sizes_and_disjoint() {
        let split = train_test_split(100, 0.3, 42).unwrap();
        assert_eq!(split.test.len(), 30);
        assert_eq!(split.train.len(), 70);

        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_is_deterministic() {
        let a = train_test_split(57, 0.5, 42).unwrap();
        let b = train_test_split(57, 0.5, 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.test.len(), 29);
    }

    #[test]
    fn test_split_rejects_degenerate() {
        assert!(train_test_split(1, 0.3, 42).is_err());
        assert!(train_test_split(10, 0.0, 42).is_err());
    }
}

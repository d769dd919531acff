//! Data preprocessing module
//!
//! Turns a raw tabular file into clean numeric train/validation/test
//! partitions:
//! - Label encoding of categorical features and class targets
//! - Mean imputation of missing feature values
//! - Standard scaling fit on the full feature matrix
//! - Deterministic 70/15/15 split via two seeded shuffle splits

mod encoder;
mod imputer;
mod pipeline;
mod scaler;
mod split;

pub use encoder::{encode_target, EncodedTarget, LabelEncoder};
pub use imputer::MeanImputer;
pub use pipeline::{
    load_csv, PreprocessingPipeline, Split, HOLDOUT_FRACTION, SPLIT_SEED,
    TEST_FRACTION_OF_HOLDOUT,
};
pub use scaler::StandardScaler;
pub use split::{take, take_rows, train_test_split, SplitIndices};

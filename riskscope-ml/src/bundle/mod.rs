//! Model bundles and the inference path that reads them.

pub mod format;
pub mod predictor;

pub use format::{FORMAT_VERSION, FeatureSpec, MAGIC, ModelBundle};
pub use predictor::{FeatureMap, Prediction, Predictor};

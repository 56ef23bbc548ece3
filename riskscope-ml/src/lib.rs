//! # riskscope-ml: evaluation, calibration and explainability harness
//!
//! Trains and compares binary classifiers over tabular data, calibrates their
//! probabilities, attributes predictions to features and packages fitted
//! models into bundles that the inference path can load later.

// Data
pub mod data;
pub mod error;
pub mod preprocess;

// Models
pub mod algorithms;
pub mod calibration;
pub mod model;

// Evaluation & explanation
pub mod eval;
pub mod explain;

// Artifacts & runs
pub mod bundle;
pub mod pipeline;

// Re-exports
pub use algorithms::{AlgorithmKind, Capabilities, Classifier, Estimator};
pub use bundle::{FeatureMap, FeatureSpec, ModelBundle, Prediction, Predictor};
pub use calibration::{CalibratedClassifier, CalibrationMode};
pub use data::{Dataset, TargetEncoding};
pub use error::{MlError, Result};
pub use eval::{EvaluationReport, Evaluator};
pub use explain::{ArtifactSink, ExplainSkip, Explanation, FsArtifactSink, explain_model};
pub use model::Model;
pub use preprocess::{FeaturePreprocessor, FittedPreprocessor};

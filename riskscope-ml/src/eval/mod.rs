//! Split-based evaluation: partitions, metrics and the evaluation loop.

pub mod evaluator;
pub mod metrics;
pub mod split;

pub use evaluator::{AlgorithmSummary, EvaluationReport, Evaluator, OrderedMap, SplitResult};
pub use metrics::{accuracy, f1_score, mean_present, roc_auc};
pub use split::{Partition, split_by_test_size, split_by_train_ratio, stratified_kfold};

//! Closed registry mapping algorithm identifiers to fresh estimators.

use super::{
    Capabilities, Classifier, DecisionTree, GradientBoosting, LogisticRegression, RandomForest,
    Svm,
};
use crate::error::{MlError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported algorithm families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    DecisionTree,
    RandomForest,
    GradientBoosting,
    LogisticRegression,
    Svm,
}

impl AlgorithmKind {
    pub const ALL: [AlgorithmKind; 5] = [
        Self::DecisionTree,
        Self::RandomForest,
        Self::GradientBoosting,
        Self::LogisticRegression,
        Self::Svm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DecisionTree => "decision_tree",
            Self::RandomForest => "random_forest",
            Self::GradientBoosting => "gradient_boosting",
            Self::LogisticRegression => "logistic_regression",
            Self::Svm => "svm",
        }
    }

    /// Tree-structured families explained with exact TreeSHAP.
    pub fn is_tree_family(&self) -> bool {
        matches!(
            self,
            Self::DecisionTree | Self::RandomForest | Self::GradientBoosting
        )
    }

    /// Model-type names used by stored training jobs (`RandomForest`, `SVM`, ...).
    pub fn from_model_type(name: &str) -> Result<Self> {
        match name.trim() {
            "LogisticRegression" => Ok(Self::LogisticRegression),
            "DecisionTree" => Ok(Self::DecisionTree),
            "RandomForest" => Ok(Self::RandomForest),
            "GradientBoosting" => Ok(Self::GradientBoosting),
            "SVM" => Ok(Self::Svm),
            other => Err(MlError::config(format!("Unsupported model type: {other}"))),
        }
    }

    /// A fresh, unfitted estimator with fixed hyperparameters.
    pub fn build(&self, seed: u64) -> Estimator {
        match self {
            Self::DecisionTree => Estimator::DecisionTree(DecisionTree::new()),
            Self::RandomForest => Estimator::RandomForest(RandomForest::new(100, seed)),
            Self::GradientBoosting => {
                Estimator::GradientBoosting(GradientBoosting::new(100, 0.1, 3))
            }
            Self::LogisticRegression => {
                Estimator::LogisticRegression(LogisticRegression::new(1.0, 100))
            }
            Self::Svm => Estimator::Svm(Svm::new(1.0, seed)),
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlgorithmKind {
    type Err = MlError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| MlError::UnknownAlgorithm(s.trim().to_string()))
    }
}

/// Any registered estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Estimator {
    DecisionTree(DecisionTree),
    RandomForest(RandomForest),
    GradientBoosting(GradientBoosting),
    LogisticRegression(LogisticRegression),
    Svm(Svm),
}

impl Estimator {
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            Self::DecisionTree(_) => AlgorithmKind::DecisionTree,
            Self::RandomForest(_) => AlgorithmKind::RandomForest,
            Self::GradientBoosting(_) => AlgorithmKind::GradientBoosting,
            Self::LogisticRegression(_) => AlgorithmKind::LogisticRegression,
            Self::Svm(_) => AlgorithmKind::Svm,
        }
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            Self::DecisionTree(m) => m,
            Self::RandomForest(m) => m,
            Self::GradientBoosting(m) => m,
            Self::LogisticRegression(m) => m,
            Self::Svm(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Classifier {
        match self {
            Self::DecisionTree(m) => m,
            Self::RandomForest(m) => m,
            Self::GradientBoosting(m) => m,
            Self::LogisticRegression(m) => m,
            Self::Svm(m) => m,
        }
    }
}

impl Classifier for Estimator {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.inner_mut().fit(x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.inner().predict(x)
    }

    fn capabilities(&self) -> Capabilities {
        self.inner().capabilities()
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.inner().predict_proba(x)
    }

    fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.inner().decision_function(x)
    }
}

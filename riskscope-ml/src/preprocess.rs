//! Feature preprocessing.
//!
//! A [`FeaturePreprocessor`] is a plan derived from column kinds. Fitting it on
//! a set of training rows yields a [`FittedPreprocessor`] whose category
//! vocabulary is frozen; the same fitted value transforms test rows and
//! inference rows.

use crate::data::{ColumnValues, Dataset};
use crate::error::{MlError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Column plan: which columns are one-hot encoded and which pass through.
#[derive(Debug, Clone, PartialEq)]
pub struct FeaturePreprocessor {
    target: String,
    categorical: Vec<String>,
    passthrough: Vec<String>,
}

impl FeaturePreprocessor {
    /// Plan over every non-target column of `dataset`.
    pub fn new(dataset: &Dataset, target: &str) -> Result<Self> {
        if !dataset.has_column(target) {
            return Err(MlError::config(format!(
                "Target column '{target}' not found in dataset"
            )));
        }

        let mut categorical = Vec::new();
        let mut passthrough = Vec::new();
        for column in dataset.columns() {
            if column.name == target {
                continue;
            }
            if column.kind.is_numeric_like() {
                passthrough.push(column.name.clone());
            } else {
                categorical.push(column.name.clone());
            }
        }
        Ok(Self {
            target: target.to_string(),
            categorical,
            passthrough,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn categorical_columns(&self) -> &[String] {
        &self.categorical
    }

    pub fn passthrough_columns(&self) -> &[String] {
        &self.passthrough
    }

    /// Learn category vocabularies from `rows` only.
    pub fn fit(&self, dataset: &Dataset, rows: &[usize]) -> Result<FittedPreprocessor> {
        let mut blocks = Vec::with_capacity(self.categorical.len());
        for name in &self.categorical {
            let column = dataset.require_column(name)?;
            let labels = column.labels();
            let categories: BTreeSet<String> = rows
                .iter()
                .filter_map(|&r| labels.get(r).cloned().flatten())
                .collect();
            blocks.push(OneHotBlock {
                column: name.clone(),
                categories: categories.into_iter().collect(),
            });
        }

        let mut feature_names = Vec::new();
        for block in &blocks {
            for category in &block.categories {
                feature_names.push(format!("{}={}", block.column, category));
            }
        }
        feature_names.extend(self.passthrough.iter().cloned());

        tracing::debug!(
            one_hot = blocks.len(),
            passthrough = self.passthrough.len(),
            features = feature_names.len(),
            "Preprocessor fitted"
        );

        Ok(FittedPreprocessor {
            blocks,
            passthrough: self.passthrough.clone(),
            feature_names,
        })
    }
}

/// Sorted vocabulary of one categorical column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotBlock {
    pub column: String,
    pub categories: Vec<String>,
}

/// A preprocessor with frozen vocabularies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPreprocessor {
    blocks: Vec<OneHotBlock>,
    passthrough: Vec<String>,
    feature_names: Vec<String>,
}

impl FittedPreprocessor {
    /// Output names: `<column>=<category>` indicators, then passthrough columns.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn blocks(&self) -> &[OneHotBlock] {
        &self.blocks
    }

    /// Encode `rows` of `dataset`. Unseen or missing categories give an all-zero block.
    pub fn transform(&self, dataset: &Dataset, rows: &[usize]) -> Result<Array2<f64>> {
        let mut out = Array2::zeros((rows.len(), self.n_features()));
        let mut offset = 0;

        for block in &self.blocks {
            let column = dataset.require_column(&block.column)?;
            let labels = column.labels();
            for (i, &r) in rows.iter().enumerate() {
                let Some(Some(value)) = labels.get(r) else {
                    continue;
                };
                if let Ok(k) = block.categories.binary_search(value) {
                    out[[i, offset + k]] = 1.0;
                }
            }
            offset += block.categories.len();
        }

        for name in &self.passthrough {
            let column = dataset.require_column(name)?;
            if !column.kind.is_numeric_like() {
                return Err(MlError::config(format!(
                    "Column '{name}' was numeric at fit time but is {:?} now",
                    column.kind
                )));
            }
            let ColumnValues::Numeric(values) = &column.values else {
                return Err(MlError::dataset(format!("Column '{name}' has no numeric storage")));
            };
            for (i, &r) in rows.iter().enumerate() {
                out[[i, offset]] = values.get(r).copied().unwrap_or(f64::NAN);
            }
            offset += 1;
        }

        Ok(out)
    }
}

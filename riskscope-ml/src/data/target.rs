//! Target column handling.
//!
//! Two encodings exist: [`ClassLabels`] maps arbitrary labels onto class
//! indices, and [`TargetEncoding`] records how a bundle's training labels
//! were derived from the raw target.

use crate::data::dataset::{Column, ColumnValues};
use crate::error::{MlError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Target labels mapped to class indices in sorted label order.
///
/// With two distinct labels the second one is the positive class (index 1).
#[derive(Debug, Clone)]
pub struct ClassLabels {
    pub y: Array1<f64>,
    pub classes: Vec<String>,
}

impl ClassLabels {
    pub fn from_column(column: &Column) -> Result<Self> {
        let cells = column.labels();
        if let Some(row) = cells.iter().position(|c| c.is_none()) {
            return Err(MlError::config(format!(
                "Target column '{}' has a missing value at row {}",
                column.name, row
            )));
        }
        let cells: Vec<String> = cells.into_iter().flatten().collect();

        let mut classes = cells.clone();
        classes.sort_by(compare_labels);
        classes.dedup();

        let y = cells
            .iter()
            .map(|c| {
                classes
                    .iter()
                    .position(|k| k == c)
                    .map(|i| i as f64)
                    .unwrap_or(0.0)
            })
            .collect();
        Ok(Self { y, classes })
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn is_binary(&self) -> bool {
        self.classes.len() == 2
    }

    /// The encoding a bundle trained on these labels should carry.
    pub fn encoding(&self) -> TargetEncoding {
        TargetEncoding::ClassIndex {
            classes: self.classes.clone(),
        }
    }
}

/// Numeric order when both labels parse, lexicographic otherwise.
fn compare_labels(a: &String, b: &String) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

/// How the raw target was turned into binary labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetEncoding {
    /// Raw target already in {0, 1}.
    AsIs,
    /// Label 1 iff raw value >= threshold (the median of the raw target).
    BinarizedAtMedian { threshold: f64 },
    /// Label `i` is `classes[i]`.
    ClassIndex { classes: Vec<String> },
}

impl TargetEncoding {
    /// Short description carried in payloads and bundles.
    pub fn note(&self) -> String {
        match self {
            Self::AsIs => "as_is".to_string(),
            Self::BinarizedAtMedian { threshold } => format!("binarized_at_median_{threshold}"),
            Self::ClassIndex { classes } => format!("class_index_{}", classes.join("_")),
        }
    }

    /// Original label for a predicted class index, when the mapping is known.
    pub fn class_label(&self, index: i64) -> Option<&str> {
        match self {
            Self::ClassIndex { classes } => usize::try_from(index)
                .ok()
                .and_then(|i| classes.get(i))
                .map(String::as_str),
            _ => None,
        }
    }

    pub fn apply(&self, raw: f64) -> f64 {
        match self {
            Self::AsIs | Self::ClassIndex { .. } => raw,
            Self::BinarizedAtMedian { threshold } => {
                if raw >= *threshold {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

impl fmt::Display for TargetEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.note())
    }
}

/// A binarized numeric target.
#[derive(Debug, Clone)]
pub struct BinaryTarget {
    pub y: Array1<f64>,
    pub encoding: TargetEncoding,
    /// Source rows kept (rows with a missing raw target are dropped).
    pub rows: Vec<usize>,
}

/// Binarize `raw` at its median unless it already is {0, 1}.
pub fn binarize_if_needed(raw: &[f64]) -> Result<BinaryTarget> {
    let rows: Vec<usize> = (0..raw.len()).filter(|&i| !raw[i].is_nan()).collect();
    if rows.is_empty() {
        return Err(MlError::config("Target column has no numeric values"));
    }
    let present: Vec<f64> = rows.iter().map(|&i| raw[i]).collect();

    let encoding = if present.iter().all(|&v| v == 0.0 || v == 1.0) {
        TargetEncoding::AsIs
    } else {
        TargetEncoding::BinarizedAtMedian {
            threshold: median(&present),
        }
    };
    let y = present.iter().map(|&v| encoding.apply(v)).collect();
    Ok(BinaryTarget { y, encoding, rows })
}

/// Median of non-empty data; mean of the two middle values for even lengths.
pub fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

impl BinaryTarget {
    /// Labels pulled from a column, coercing text cells to numbers.
    pub fn from_column(column: &Column) -> Result<Self> {
        let raw = match &column.values {
            ColumnValues::Numeric(v) => v.clone(),
            ColumnValues::Categorical(_) => column.to_f64(),
        };
        binarize_if_needed(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_target_is_as_is() {
        let t = binarize_if_needed(&[0.0, 1.0, 1.0, 0.0]).unwrap();
        assert_eq!(t.encoding, TargetEncoding::AsIs);
        assert_eq!(t.encoding.note(), "as_is");
        assert_eq!(t.y.to_vec(), vec![0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_continuous_target_binarized_at_median() {
        let t = binarize_if_needed(&[1.0, 4.0, 2.0, 8.0]).unwrap();
        assert_eq!(t.encoding, TargetEncoding::BinarizedAtMedian { threshold: 3.0 });
        assert_eq!(t.encoding.note(), "binarized_at_median_3");
        assert_eq!(t.y.to_vec(), vec![0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_value_equal_to_median_is_positive() {
        let t = binarize_if_needed(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(t.encoding.note(), "binarized_at_median_2");
        assert_eq!(t.y.to_vec(), vec![0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_missing_raw_target_rows_dropped() {
        let t = binarize_if_needed(&[1.0, f64::NAN, 0.0]).unwrap();
        assert_eq!(t.rows, vec![0, 2]);
        assert_eq!(t.encoding, TargetEncoding::AsIs);
    }

    #[test]
    fn test_all_missing_target_is_configuration_error() {
        let err = binarize_if_needed(&[f64::NAN, f64::NAN]).unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
    }

    #[test]
    fn test_class_labels_numeric_order() {
        let col = Column::numeric("y", vec![10.0, 2.0, 10.0]);
        let labels = ClassLabels::from_column(&col).unwrap();
        assert_eq!(labels.classes, vec!["2", "10"]);
        assert_eq!(labels.y.to_vec(), vec![1.0, 0.0, 1.0]);
        assert!(labels.is_binary());
    }

    #[test]
    fn test_class_labels_text() {
        let col = Column::categorical("y", &[Some("yes"), Some("no"), Some("maybe")]);
        let labels = ClassLabels::from_column(&col).unwrap();
        assert_eq!(labels.n_classes(), 3);
        assert_eq!(labels.classes[0], "maybe");
    }

    #[test]
    fn test_class_labels_encoding_keeps_mapping() {
        let col = Column::categorical("y", &[Some("yes"), Some("no"), Some("yes")]);
        let encoding = ClassLabels::from_column(&col).unwrap().encoding();
        assert_eq!(encoding.note(), "class_index_no_yes");
        assert_eq!(encoding.class_label(1), Some("yes"));
        assert_eq!(encoding.class_label(2), None);
        assert_eq!(encoding.class_label(-1), None);
        assert_eq!(TargetEncoding::AsIs.class_label(0), None);
    }

    #[test]
    fn test_class_labels_reject_missing() {
        let col = Column::numeric("y", vec![1.0, f64::NAN]);
        assert!(ClassLabels::from_column(&col).is_err());
    }
}

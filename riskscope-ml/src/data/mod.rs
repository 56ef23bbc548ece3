//! Tabular input: CSV loading, column kinds and target encodings.

pub mod dataset;
pub mod target;

pub use dataset::{Column, ColumnKind, ColumnValues, Dataset};
pub use target::{BinaryTarget, ClassLabels, TargetEncoding, binarize_if_needed, median};

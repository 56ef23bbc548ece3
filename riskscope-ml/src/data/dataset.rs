//! In-memory tabular dataset with inferred column kinds.

use crate::error::{MlError, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// Cells treated as missing when loading text data.
const MISSING_MARKERS: &[&str] = &["", "na", "n/a", "nan", "null", "none"];

/// Inferred kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Boolean,
    Categorical,
}

impl ColumnKind {
    /// Numeric and boolean columns pass through preprocessing unchanged.
    pub fn is_numeric_like(&self) -> bool {
        matches!(self, Self::Numeric | Self::Boolean)
    }
}

/// Column storage. Missing numeric cells are `NaN`, missing categorical cells `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Numeric(Vec<f64>),
    Categorical(Vec<Option<String>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    pub values: ColumnValues,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Numeric,
            values: ColumnValues::Numeric(values),
        }
    }

    pub fn boolean(name: impl Into<String>, values: Vec<Option<bool>>) -> Self {
        let values = values
            .into_iter()
            .map(|v| match v {
                Some(true) => 1.0,
                Some(false) => 0.0,
                None => f64::NAN,
            })
            .collect();
        Self {
            name: name.into(),
            kind: ColumnKind::Boolean,
            values: ColumnValues::Numeric(values),
        }
    }

    pub fn categorical<S: AsRef<str>>(name: impl Into<String>, values: &[Option<S>]) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Categorical,
            values: ColumnValues::Categorical(
                values
                    .iter()
                    .map(|v| v.as_ref().map(|s| s.as_ref().to_string()))
                    .collect(),
            ),
        }
    }

    /// Infer the kind of a column from raw text cells.
    pub fn from_text(name: impl Into<String>, cells: &[String]) -> Self {
        let present: Vec<&str> = cells
            .iter()
            .map(|c| c.trim())
            .filter(|c| !is_missing(c))
            .collect();

        let all_bool = !present.is_empty() && present.iter().all(|c| parse_bool(c).is_some());
        let all_numeric = present.iter().all(|c| c.parse::<f64>().is_ok());

        if all_bool {
            let values = cells.iter().map(|c| parse_bool(c.trim())).collect();
            Self::boolean(name, values)
        } else if all_numeric {
            let values = cells
                .iter()
                .map(|c| {
                    let c = c.trim();
                    if is_missing(c) {
                        f64::NAN
                    } else {
                        c.parse::<f64>().unwrap_or(f64::NAN)
                    }
                })
                .collect();
            Self::numeric(name, values)
        } else {
            let values: Vec<Option<String>> = cells
                .iter()
                .map(|c| {
                    let c = c.trim();
                    (!is_missing(c)).then(|| c.to_string())
                })
                .collect();
            Self {
                name: name.into(),
                kind: ColumnKind::Categorical,
                values: ColumnValues::Categorical(values),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values coerced to `f64`; unparsable or missing cells become `NaN`.
    pub fn to_f64(&self) -> Vec<f64> {
        match &self.values {
            ColumnValues::Numeric(v) => v.clone(),
            ColumnValues::Categorical(v) => v
                .iter()
                .map(|c| {
                    c.as_deref()
                        .and_then(|s| s.trim().parse::<f64>().ok())
                        .unwrap_or(f64::NAN)
                })
                .collect(),
        }
    }

    /// Display form of each cell, `None` for missing values.
    pub fn labels(&self) -> Vec<Option<String>> {
        match &self.values {
            ColumnValues::Numeric(v) => v
                .iter()
                .map(|x| (!x.is_nan()).then(|| format!("{x}")))
                .collect(),
            ColumnValues::Categorical(v) => v.clone(),
        }
    }
}

fn is_missing(cell: &str) -> bool {
    MISSING_MARKERS.contains(&cell.to_ascii_lowercase().as_str())
}

fn parse_bool(cell: &str) -> Option<bool> {
    match cell.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// A read-only table of named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Dataset {
    /// Build from columns; all columns must have the same length and unique names.
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let n_rows = columns.first().map(|c| c.len()).unwrap_or(0);
        for col in &columns {
            if col.len() != n_rows {
                return Err(MlError::dataset(format!(
                    "Column '{}' has {} rows, expected {}",
                    col.name,
                    col.len(),
                    n_rows
                )));
            }
        }
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(MlError::dataset(format!("Duplicate column '{}'", col.name)));
            }
        }
        Ok(Self { columns, n_rows })
    }

    /// Load a CSV file with a header row.
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| MlError::dataset(format!("Cannot open '{}': {e}", path.display())))?;
        let dataset = Self::from_csv_reader(file)?;
        tracing::debug!(
            path = %path.display(),
            rows = dataset.n_rows(),
            columns = dataset.n_columns(),
            "Dataset loaded"
        );
        Ok(dataset)
    }

    /// Load CSV from any reader.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
        if headers.is_empty() {
            return Err(MlError::dataset("CSV has no header row"));
        }

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for record in rdr.records() {
            let record = record?;
            for (i, value) in record.iter().enumerate() {
                cells[i].push(value.to_string());
            }
        }

        let columns = headers
            .into_iter()
            .zip(cells)
            .map(|(name, values)| Column::from_text(name, &values))
            .collect();
        Self::from_columns(columns)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Look up a column that the request depends on.
    pub fn require_column(&self, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| MlError::config(format!("Column '{name}' not found")))
    }
}

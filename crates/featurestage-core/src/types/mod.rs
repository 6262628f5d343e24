//! # Core Type Definitions
//!
//! This module contains the tabular data model of the feature stage:
//! - Cell values (`Scalar`)
//! - Named columns (`Column`)
//! - Ordered, immutable-by-convention tables (`Dataset`)
//! - Error taxonomy (`StageError`)
//!
//! ## Immutability
//!
//! No operation in this crate mutates a `Dataset` it was handed. Every step
//! that adds, replaces or selects columns returns a new `Dataset`.

use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

// =============================================================================
// SCALAR
// =============================================================================

/// A single typed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Missing value.
    Null,
    /// Integer value.
    Int(i64),
    /// Floating-point value. Never NaN; missing numbers are `Null`.
    Float(f64),
    /// Free-form text.
    Text(String),
    /// Parsed wall-clock timestamp.
    Timestamp(NaiveDateTime),
}

impl Scalar {
    /// Check if the value is missing.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Numeric view of the value. `None` for nulls and non-numeric cells.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(v) => Some(*v as f64),
            Scalar::Float(v) => Some(*v),
            Scalar::Null | Scalar::Text(_) | Scalar::Timestamp(_) => None,
        }
    }

    /// Check if the value can take part in numeric fitting (numbers and nulls).
    #[must_use]
    pub fn is_numeric_or_null(&self) -> bool {
        matches!(self, Scalar::Null | Scalar::Int(_) | Scalar::Float(_))
    }

    /// Short type name used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Null => "null",
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
            Scalar::Text(_) => "text",
            Scalar::Timestamp(_) => "timestamp",
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::Float(v) => {
                // Integral floats keep a decimal point so the column reads
                // back as Float.
                if v.is_finite() && v.fract() == 0.0 {
                    write!(f, "{:.1}", v)
                } else {
                    write!(f, "{}", v)
                }
            }
            Scalar::Text(s) => f.write_str(s),
            Scalar::Timestamp(ts) => write!(f, "{}", ts.format(crate::primitives::TIMESTAMP_FORMAT)),
        }
    }
}

// =============================================================================
// COLUMN
// =============================================================================

/// A named sequence of cells, one per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    values: Vec<Scalar>,
}

impl Column {
    /// Create a new column.
    #[must_use]
    pub fn new(name: impl Into<String>, values: Vec<Scalar>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cell values in row order.
    #[must_use]
    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the column has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of `Null` cells.
    #[must_use]
    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }
}

// =============================================================================
// DATASET
// =============================================================================

/// An ordered collection of equally long, uniquely named columns.
///
/// Invariants (checked by every constructor):
/// - column names are unique
/// - all columns have the same length
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    columns: Vec<Column>,
    rows: usize,
}

impl Dataset {
    /// Create an empty dataset (no columns, no rows).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dataset from columns, validating the invariants.
    pub fn from_columns(columns: Vec<Column>) -> Result<Self, StageError> {
        let rows = columns.first().map(Column::len).unwrap_or(0);
        let mut seen = BTreeSet::new();

        for column in &columns {
            if column.name().is_empty() {
                return Err(StageError::ParseError("empty column name".to_string()));
            }
            if !seen.insert(column.name()) {
                return Err(StageError::ParseError(format!(
                    "duplicate column '{}'",
                    column.name()
                )));
            }
            if column.len() != rows {
                return Err(StageError::ParseError(format!(
                    "column '{}' has {} rows, expected {}",
                    column.name(),
                    column.len(),
                    rows
                )));
            }
        }

        Ok(Self { columns, rows })
    }

    /// Number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// `(rows, columns)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.columns.len())
    }

    /// Columns in order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    /// Look up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Check whether a column exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Return a new dataset with `column` added.
    ///
    /// An existing column with the same name is replaced in place; otherwise
    /// the column is appended. A dataset without columns adopts the row
    /// count of the first column added.
    pub fn with_column(&self, column: Column) -> Result<Self, StageError> {
        let mut columns = self.columns.clone();
        match columns.iter().position(|c| c.name() == column.name()) {
            Some(idx) => columns[idx] = column,
            None => columns.push(column),
        }
        Self::from_columns(columns)
    }

    /// Return a new dataset holding only the named columns, in the given order.
    pub fn select(&self, names: &[&str]) -> Result<Self, StageError> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let column = self
                .column(name)
                .ok_or_else(|| StageError::TransformError(format!("missing column '{}'", name)))?;
            columns.push(column.clone());
        }
        Self::from_columns(columns)
    }

    /// Return the first `n` rows as a new dataset.
    #[must_use]
    pub fn head(&self, n: usize) -> Self {
        let take = n.min(self.rows);
        let columns = self
            .columns
            .iter()
            .map(|c| Column::new(c.name(), c.values()[..take].to_vec()))
            .collect();
        Self {
            columns,
            rows: take,
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the feature stage.
///
/// - No silent failures
/// - Use `Result<T, StageError>` for fallible operations
/// - Every variant is fatal for the stage; gate failure is NOT an error
#[derive(Debug, Error)]
pub enum StageError {
    /// The tracking service could not answer the gate query.
    #[error("Validation gate unavailable: {0}")]
    GateUnavailable(String),

    /// The requested artifact or artifact version does not exist.
    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    /// Tabular input is malformed.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Fitting or applying the transform violated an integrity constraint.
    #[error("Transform error: {0}")]
    TransformError(String),

    /// An artifact or metric could not be published.
    #[error("Publish error: {0}")]
    PublishError(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

// =============================================================================
// TESTS
// =============================================================================

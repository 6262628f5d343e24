//! # Tabular Format
//!
//! CSV codec for [`Dataset`].
//!
//! This is a pure transformation between bytes and datasets; file I/O is in
//! the app layer.
//!
//! ## Column Typing
//!
//! Each column is typed from its cells after missing-value tokens are
//! removed:
//! 1. every cell parses as `i64` → `Int`
//! 2. every cell parses as a finite `f64` → `Float`
//! 3. otherwise → `Text`
//!
//! Missing-value tokens (see [`NA_TOKENS`]) become `Null` in every column type.

use crate::primitives::MAX_TABULAR_SIZE;
use crate::{Column, Dataset, Scalar, StageError};

/// Cell contents read as missing values.
pub const NA_TOKENS: &[&str] = &["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

#[derive(Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Int,
    Float,
    Text,
}

fn is_na(cell: &str) -> bool {
    NA_TOKENS.contains(&cell)
}

fn infer_type(cells: &[String]) -> ColumnType {
    let mut present = cells.iter().filter(|c| !is_na(c)).peekable();
    if present.peek().is_none() {
        return ColumnType::Float;
    }

    let present: Vec<&String> = present.collect();
    if present.iter().all(|c| c.parse::<i64>().is_ok()) {
        ColumnType::Int
    } else if present
        .iter()
        .all(|c| c.parse::<f64>().is_ok_and(f64::is_finite))
    {
        ColumnType::Float
    } else {
        ColumnType::Text
    }
}

fn typed_cell(cell: String, column_type: ColumnType) -> Scalar {
    if is_na(&cell) {
        return Scalar::Null;
    }
    // Types were inferred over the same cells, so the parses cannot fail.
    match column_type {
        ColumnType::Int => cell.parse().map(Scalar::Int).unwrap_or(Scalar::Null),
        ColumnType::Float => cell.parse().map(Scalar::Float).unwrap_or(Scalar::Null),
        ColumnType::Text => Scalar::Text(cell),
    }
}

// =============================================================================
// READ
// =============================================================================

/// Parse CSV bytes (header row required) into a dataset.
///
/// # Errors
///
/// `StageError::ParseError` on oversized input, a missing or invalid header,
/// ragged rows or invalid UTF-8.
pub fn read_csv(bytes: &[u8]) -> Result<Dataset, StageError> {
    if bytes.len() > MAX_TABULAR_SIZE {
        return Err(StageError::ParseError(format!(
            "Input size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_TABULAR_SIZE
        )));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| StageError::ParseError(format!("Invalid header: {}", e)))?
        .iter()
        .map(str::to_string)
        .collect();

    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(StageError::ParseError("Missing header row".to_string()));
    }

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for (line, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| StageError::ParseError(format!("Row {}: {}", line + 1, e)))?;
        for (idx, cell) in record.iter().enumerate() {
            cells[idx].push(cell.to_string());
        }
    }

    let columns = headers
        .into_iter()
        .zip(cells)
        .map(|(name, raw)| {
            let column_type = infer_type(&raw);
            let values = raw
                .into_iter()
                .map(|cell| typed_cell(cell, column_type))
                .collect();
            Column::new(name, values)
        })
        .collect();

    Dataset::from_columns(columns)
}

// =============================================================================
// WRITE
// =============================================================================

/// Serialize a dataset as CSV: one header row naming every column, then one
/// record per row. `Null` cells are written empty.
pub fn write_csv(dataset: &Dataset) -> Result<Vec<u8>, StageError> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record(dataset.column_names())
        .map_err(|e| StageError::SerializationError(e.to_string()))?;

    for row in 0..dataset.row_count() {
        let record: Vec<String> = dataset
            .columns()
            .iter()
            .map(|c| c.values()[row].to_string())
            .collect();
        writer
            .write_record(&record)
            .map_err(|e| StageError::SerializationError(e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| StageError::SerializationError(e.to_string()))
}

// =============================================================================
// TESTS
// =============================================================================

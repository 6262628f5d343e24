//! The column transformer: fit on the current dataset, apply, reattach label.

use super::scaler::ColumnStats;
use super::spec::FeatureSpec;
use crate::{Column, Dataset, StageError};
use serde::{Deserialize, Serialize};

/// One branch of the column transformer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Branch {
    /// Numeric columns standardized with fitted statistics, in output order.
    Standardize(Vec<ColumnStats>),
    /// Columns routed to a branch that produces no output. Reserved for a
    /// categorical encoder; the names are kept for lineage.
    Reserved(Vec<String>),
}

/// A fitted column transformer.
///
/// Owns every fitted parameter and nothing of the dataset that produced it,
/// so it can be serialized and reapplied on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedTransform {
    /// Label column re-attached after the transform.
    pub label: String,
    /// Branches in application order.
    pub branches: Vec<Branch>,
    /// Rows seen while fitting.
    pub fitted_rows: usize,
}

impl FittedTransform {
    /// Fitted statistics of the standardized columns, in output order.
    pub fn numeric_stats(&self) -> impl Iterator<Item = &ColumnStats> {
        self.branches
            .iter()
            .filter_map(|b| match b {
                Branch::Standardize(stats) => Some(stats.iter()),
                Branch::Reserved(_) => None,
            })
            .flatten()
    }

    /// Names of the columns the transform emits (label excluded).
    #[must_use]
    pub fn feature_names_out(&self) -> Vec<String> {
        self.numeric_stats().map(|s| s.name.clone()).collect()
    }

    /// Names routed to reserved (inert) branches.
    #[must_use]
    pub fn reserved_features(&self) -> Vec<String> {
        self.branches
            .iter()
            .filter_map(|b| match b {
                Branch::Reserved(names) => Some(names.iter().cloned()),
                Branch::Standardize(_) => None,
            })
            .flatten()
            .collect()
    }

    /// Apply the fitted transform to `dataset`.
    ///
    /// Every standardized column must be present. The label column is
    /// re-attached verbatim when present and omitted otherwise, so the same
    /// routine serves labelled and unlabelled data.
    pub fn transform(&self, dataset: &Dataset) -> Result<Dataset, StageError> {
        let mut columns = Vec::new();
        for stats in self.numeric_stats() {
            let source = dataset.column(&stats.name).ok_or_else(|| {
                StageError::TransformError(format!("missing fitted column '{}'", stats.name))
            })?;
            columns.push(stats.apply(source)?);
        }

        if let Some(label) = dataset.column(&self.label) {
            columns.push(label.clone());
        }

        if columns.is_empty() {
            return Ok(Dataset::new());
        }
        Dataset::from_columns(columns)
    }

    /// Map standardized columns back to their original scale.
    ///
    /// Columns the transform does not know are carried over untouched.
    pub fn inverse_transform(&self, dataset: &Dataset) -> Result<Dataset, StageError> {
        let mut columns: Vec<Column> = Vec::with_capacity(dataset.column_count());
        for column in dataset.columns() {
            match self.numeric_stats().find(|s| s.name == column.name()) {
                Some(stats) => columns.push(stats.invert(column)?),
                None => columns.push(column.clone()),
            }
        }
        Dataset::from_columns(columns)
    }
}

/// Fit the column transformer on `dataset` and apply it.
///
/// 1. Filter the spec's numeric list to present columns.
/// 2. Fit standardization on exactly those columns.
/// 3. Emit the standardized columns in filtered order.
/// 4. Re-attach the label column verbatim.
///
/// Present categorical columns are recorded in a reserved branch and emit
/// nothing. Row count and order are preserved.
///
/// # Errors
///
/// `StageError::TransformError` if the label column is missing or a selected
/// numeric column holds non-numeric cells.
pub fn fit_transform(
    dataset: &Dataset,
    spec: &FeatureSpec,
) -> Result<(Dataset, FittedTransform), StageError> {
    let label = dataset.column(&spec.label).ok_or_else(|| {
        StageError::TransformError(format!("missing label column '{}'", spec.label))
    })?;

    let resolved = spec.resolve(dataset);

    let mut stats = Vec::with_capacity(resolved.numeric.len());
    let mut columns = Vec::with_capacity(resolved.numeric.len() + 1);
    for name in &resolved.numeric {
        let source = dataset
            .column(name)
            .ok_or_else(|| StageError::TransformError(format!("missing column '{}'", name)))?;
        let fitted = ColumnStats::fit(source)?;
        columns.push(fitted.apply(source)?);
        stats.push(fitted);
    }
    columns.push(label.clone());

    let transformed = Dataset::from_columns(columns)?;

    let fitted = FittedTransform {
        label: spec.label.clone(),
        branches: vec![
            Branch::Standardize(stats),
            Branch::Reserved(resolved.categorical),
        ],
        fitted_rows: dataset.row_count(),
    };

    Ok((transformed, fitted))
}

//! Standardization (z-score) of a single numeric column.
//!
//! z = (x - μ) / σ, with μ and σ fitted on the non-null cells of the column.
//!
//! # Edge Cases
//!
//! - σ is the population standard deviation (divide by n)
//! - σ = 0, or no non-null cells: scale is set to 1
//! - null cells are skipped when fitting and stay null when applying

use crate::{Column, Scalar, StageError};
use serde::{Deserialize, Serialize};

/// Fitted parameters of one standardized column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    /// Column name.
    pub name: String,
    /// Mean of the non-null cells (0 when there are none).
    pub mean: f64,
    /// Divisor applied after centering.
    pub scale: f64,
    /// Population variance of the non-null cells.
    pub variance: f64,
    /// Number of non-null cells seen while fitting.
    pub samples: usize,
}

fn numeric_values(column: &Column) -> Result<Vec<f64>, StageError> {
    let mut values = Vec::with_capacity(column.len());
    for (row, cell) in column.values().iter().enumerate() {
        if !cell.is_numeric_or_null() {
            return Err(StageError::TransformError(format!(
                "column '{}' row {}: expected a number, found {}",
                column.name(),
                row,
                cell.type_name()
            )));
        }
        if let Some(v) = cell.as_f64() {
            values.push(v);
        }
    }
    Ok(values)
}

impl ColumnStats {
    /// Fit standardization parameters on `column`.
    ///
    /// # Errors
    ///
    /// `StageError::TransformError` if any cell is neither a number nor null.
    pub fn fit(column: &Column) -> Result<Self, StageError> {
        let values = numeric_values(column)?;
        let samples = values.len();

        if samples == 0 {
            return Ok(Self {
                name: column.name().to_string(),
                mean: 0.0,
                scale: 1.0,
                variance: 0.0,
                samples,
            });
        }

        let n = samples as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        let std = variance.sqrt();
        let scale = if std > 0.0 && std.is_finite() { std } else { 1.0 };

        if !mean.is_finite() {
            return Err(StageError::TransformError(format!(
                "column '{}': mean is not finite",
                column.name()
            )));
        }

        Ok(Self {
            name: column.name().to_string(),
            mean,
            scale,
            variance,
            samples,
        })
    }

    /// Standardize `column` with the fitted parameters.
    ///
    /// The output column keeps the fitted name and row order; values are
    /// `Float`, nulls stay `Null`.
    pub fn apply(&self, column: &Column) -> Result<Column, StageError> {
        let mut out = Vec::with_capacity(column.len());
        for (row, cell) in column.values().iter().enumerate() {
            let scaled = match cell {
                Scalar::Null => Scalar::Null,
                Scalar::Int(_) | Scalar::Float(_) => {
                    let v = cell.as_f64().unwrap_or_default();
                    Scalar::Float((v - self.mean) / self.scale)
                }
                Scalar::Text(_) | Scalar::Timestamp(_) => {
                    return Err(StageError::TransformError(format!(
                        "column '{}' row {}: expected a number, found {}",
                        self.name,
                        row,
                        cell.type_name()
                    )));
                }
            };
            out.push(scaled);
        }
        Ok(Column::new(self.name.clone(), out))
    }

    /// Undo standardization: x = z * σ + μ.
    pub fn invert(&self, column: &Column) -> Result<Column, StageError> {
        let values = column
            .values()
            .iter()
            .map(|cell| match cell {
                Scalar::Null => Ok(Scalar::Null),
                Scalar::Int(_) | Scalar::Float(_) => Ok(Scalar::Float(
                    cell.as_f64().unwrap_or_default() * self.scale + self.mean,
                )),
                other => Err(StageError::TransformError(format!(
                    "column '{}': cannot invert {}",
                    self.name,
                    other.type_name()
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Column::new(self.name.clone(), values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floats(name: &str, values: &[Option<f64>]) -> Column {
        Column::new(
            name,
            values
                .iter()
                .map(|v| v.map_or(Scalar::Null, Scalar::Float))
                .collect(),
        )
    }

    fn as_floats(column: &Column) -> Vec<Option<f64>> {
        column.values().iter().map(Scalar::as_f64).collect()
    }

    #[test]
    fn fits_population_statistics() {
        let stats = ColumnStats::fit(&floats("amt", &[Some(1.0), Some(2.0), Some(3.0)]))
            .expect("fit");

        assert!((stats.mean - 2.0).abs() < 1e-12);
        assert!((stats.variance - 2.0 / 3.0).abs() < 1e-12);
        assert!((stats.scale - (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(stats.samples, 3);
    }

    #[test]
    fn output_has_zero_mean_unit_variance() {
        let column = floats("amt", &[Some(10.0), Some(20.0), Some(60.0), Some(-5.0)]);
        let stats = ColumnStats::fit(&column).expect("fit");
        let scaled: Vec<f64> = as_floats(&stats.apply(&column).expect("apply"))
            .into_iter()
            .flatten()
            .collect();

        let n = scaled.len() as f64;
        let mean = scaled.iter().sum::<f64>() / n;
        let var = scaled.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        assert!(mean.abs() < 1e-12);
        assert!((var - 1.0).abs() < 1e-12);
    }

    #[test]
    fn nulls_skipped_and_preserved() {
        let column = floats("hour", &[Some(1.0), None, Some(3.0)]);
        let stats = ColumnStats::fit(&column).expect("fit");
        assert_eq!(stats.samples, 2);
        assert!((stats.mean - 2.0).abs() < 1e-12);

        let scaled = as_floats(&stats.apply(&column).expect("apply"));
        assert_eq!(scaled, vec![Some(-1.0), None, Some(1.0)]);
    }

    #[test]
    fn constant_column_uses_unit_scale() {
        let column = floats("amt", &[Some(5.0), Some(5.0)]);
        let stats = ColumnStats::fit(&column).expect("fit");
        assert_eq!(stats.scale, 1.0);
        assert_eq!(as_floats(&stats.apply(&column).expect("apply")), vec![Some(0.0), Some(0.0)]);
    }

    #[test]
    fn all_null_column_fits() {
        let column = floats("amt", &[None, None]);
        let stats = ColumnStats::fit(&column).expect("fit");
        assert_eq!(stats.samples, 0);
        assert_eq!(stats.scale, 1.0);
    }

    #[test]
    fn text_cell_is_integrity_error() {
        let column = Column::new("amt", vec![Scalar::Float(1.0), Scalar::Text("x".into())]);
        assert!(matches!(
            ColumnStats::fit(&column),
            Err(StageError::TransformError(_))
        ));
    }

    #[test]
    fn invert_restores_values() {
        let column = floats("amt", &[Some(3.0), Some(9.0), None]);
        let stats = ColumnStats::fit(&column).expect("fit");
        let restored = stats
            .invert(&stats.apply(&column).expect("apply"))
            .expect("invert");
        let values = as_floats(&restored);
        assert!((values[0].expect("v0") - 3.0).abs() < 1e-9);
        assert!((values[1].expect("v1") - 9.0).abs() < 1e-9);
        assert_eq!(values[2], None);
    }
}

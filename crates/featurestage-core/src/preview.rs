//! Row previews of a dataset, rendered as strings for metric logging.

use crate::Dataset;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The first rows of a dataset with every cell rendered as text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PreviewTable {
    /// Column names, in dataset order.
    pub columns: Vec<String>,
    /// Rendered rows; each row has one cell per column.
    pub rows: Vec<Vec<String>>,
}

impl PreviewTable {
    /// Build a preview of the first `rows` rows of `dataset`.
    #[must_use]
    pub fn from_dataset(dataset: &Dataset, rows: usize) -> Self {
        let head = dataset.head(rows);
        let columns = head.column_names().into_iter().map(String::from).collect();
        let rows = (0..head.row_count())
            .map(|row| {
                head.columns()
                    .iter()
                    .map(|c| c.values().get(row).map(ToString::to_string).unwrap_or_default())
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }

    /// Number of preview rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the preview holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl fmt::Display for PreviewTable {
    /// Left-aligned, space-padded text table.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut widths: Vec<usize> = self.columns.iter().map(String::len).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.len());
            }
        }

        let line = |cells: &[String]| -> String {
            cells
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{:<width$}", cell, width = width))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        writeln!(f, "{}", line(&self.columns))?;
        for row in &self.rows {
            writeln!(f, "{}", line(row))?;
        }
        Ok(())
    }
}

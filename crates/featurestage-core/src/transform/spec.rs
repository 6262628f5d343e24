//! Feature specification and its resolution against a concrete dataset.

use crate::primitives::{CATEGORICAL_FEATURES, LABEL_COLUMN, NUMERIC_FEATURES};
use crate::{Dataset, StageError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The fixed feature lists declared by the stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Declared categorical features (inert branch).
    pub categorical: Vec<String>,
    /// Declared numeric features (standardized when present).
    pub numeric: Vec<String>,
    /// Target label column, re-attached verbatim.
    pub label: String,
}

impl Default for FeatureSpec {
    fn default() -> Self {
        Self {
            categorical: CATEGORICAL_FEATURES.iter().map(|s| s.to_string()).collect(),
            numeric: NUMERIC_FEATURES.iter().map(|s| s.to_string()).collect(),
            label: LABEL_COLUMN.to_string(),
        }
    }
}

/// Feature lists filtered down to the columns actually present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFeatures {
    /// Present categorical features, in declaration order.
    pub categorical: Vec<String>,
    /// Present numeric features, in declaration order.
    pub numeric: Vec<String>,
}

impl FeatureSpec {
    /// Create a spec from explicit lists.
    #[must_use]
    pub fn new(categorical: Vec<String>, numeric: Vec<String>, label: impl Into<String>) -> Self {
        Self {
            categorical,
            numeric,
            label: label.into(),
        }
    }

    /// Check the spec is well-formed: non-empty names, no duplicates, and
    /// the label not listed as a feature.
    pub fn validate(&self) -> Result<(), StageError> {
        if self.label.is_empty() {
            return Err(StageError::ConfigError("label column is empty".to_string()));
        }

        let mut seen = BTreeSet::new();
        for name in self.categorical.iter().chain(&self.numeric) {
            if name.is_empty() {
                return Err(StageError::ConfigError("empty feature name".to_string()));
            }
            if name == &self.label {
                return Err(StageError::ConfigError(format!(
                    "label column '{}' listed as a feature",
                    name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(StageError::ConfigError(format!(
                    "feature '{}' declared twice",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Filter both lists to the columns present in `dataset`.
    ///
    /// Absent names are dropped silently; this is never an error.
    #[must_use]
    pub fn resolve(&self, dataset: &Dataset) -> ResolvedFeatures {
        let present = |names: &[String]| -> Vec<String> {
            names
                .iter()
                .filter(|n| dataset.has_column(n))
                .cloned()
                .collect()
        };

        ResolvedFeatures {
            categorical: present(&self.categorical),
            numeric: present(&self.numeric),
        }
    }
}

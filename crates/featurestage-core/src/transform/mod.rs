//! # Transform Module
//!
//! The column transformer pipeline of the stage.
//!
//! A `FeatureSpec` declares categorical and numeric feature names. At fit
//! time the lists are filtered against the dataset, numeric columns are
//! standardized with statistics of the *current* dataset, and the label column
//! is re-attached untouched. Categorical columns go to a reserved branch that
//! emits no output.

mod fitted;
mod scaler;
mod spec;

pub use fitted::{Branch, FittedTransform, fit_transform};
pub use scaler::ColumnStats;
pub use spec::{FeatureSpec, ResolvedFeatures};

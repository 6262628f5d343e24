//! # Stage Primitives
//!
//! Hardcoded names and constants of the feature stage.
//!
//! The stage does not learn or search its feature set: the column names below
//! are fixed at compile time and only overridable through explicit
//! configuration in the app layer.

/// Raw transaction timestamp column.
pub const TIMESTAMP_COLUMN: &str = "trans_date_trans_time";

/// Target label column. Must survive every transformation unmodified.
pub const LABEL_COLUMN: &str = "is_fraud";

/// Derived hour-of-day column (0-23).
pub const HOUR_COLUMN: &str = "hour";

/// Derived day-of-week column (0-6, Monday = 0).
pub const DAY_OF_WEEK_COLUMN: &str = "day_of_week";

/// Declared categorical features. Recorded, never encoded.
pub const CATEGORICAL_FEATURES: &[&str] = &["category", "state"];

/// Declared numeric features, standardized when present.
pub const NUMERIC_FEATURES: &[&str] = &["amt", HOUR_COLUMN, DAY_OF_WEEK_COLUMN];

/// Canonical textual form of a parsed timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Magic bytes for the fitted-transform binary format header.
///
/// - File Header = Magic Bytes ("FSTX") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"FSTX";

/// Current fitted-transform format version.
///
/// Increment this when making breaking changes to the serialization format.
pub const FORMAT_VERSION: u8 = 1;

/// Number of rows included in the published preview table.
pub const PREVIEW_ROWS: usize = 5;

// =============================================================================
// INPUT LIMITS
// =============================================================================

/// Maximum size of a tabular input accepted by the CSV codec (1 GiB).
pub const MAX_TABULAR_SIZE: usize = 1024 * 1024 * 1024;

/// Maximum size of a serialized fitted transform (16 MiB).
///
/// A transform holds a handful of floats per column; anything near this
/// limit is corrupt.
pub const MAX_TRANSFORM_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

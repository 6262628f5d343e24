//! # featurestage-core
//!
//! The deterministic transformation engine of the feature stage - THE LOGIC.
//!
//! Given a validated tabular dataset, this crate derives temporal features,
//! fits and applies numeric standardization, and serializes both the result
//! and the fitted transform to bytes. Everything that talks to a tracking
//! service or an artifact store lives in the `featurestage` app crate.
//!
//! ## Architectural Constraints
//!
//! - Pure Rust: NO async, NO network, NO logging dependency
//! - Deterministic: identical input bytes produce identical output bytes
//! - Never mutates a `Dataset` it was handed; every step returns a new one
//! - Counts that the caller should log (e.g. coerced timestamps) are returned,
//!   not printed

// =============================================================================
// MODULES
// =============================================================================

pub mod features;
pub mod formats;
pub mod preview;
pub mod primitives;
pub mod transform;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{Column, Dataset, Scalar, StageError};

// =============================================================================
// RE-EXPORTS: Pipeline
// =============================================================================

pub use features::{DerivedFeatures, derive_features, parse_timestamp};
pub use preview::PreviewTable;
pub use transform::{
    Branch, ColumnStats, FeatureSpec, FittedTransform, ResolvedFeatures, fit_transform,
};

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{
    TransformHeader, read_csv, transform_from_bytes, transform_to_bytes, write_csv,
};

#[cfg(feature = "crypto-hash")]
pub use formats::content_digest;

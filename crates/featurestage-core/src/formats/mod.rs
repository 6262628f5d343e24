//! # Formats Module
//!
//! Byte-level codecs for the two artifacts the stage publishes:
//! - `tabular`: CSV datasets
//! - `persistence`: fitted-transform blobs

mod persistence;
mod tabular;

pub use persistence::*;
pub use tabular::*;

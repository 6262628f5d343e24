//! # featurestage
//!
//! The gated feature-engineering stage - THE BINARY's library half.
//!
//! Exposed as a library so integration tests can drive the stage, the
//! service backends and the CLI commands directly.

pub mod cli;
pub mod config;
pub mod services;
pub mod stage;

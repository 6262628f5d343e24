//! # Stage Module
//!
//! The gated transformation stage built on top of the service contracts.
//!
//! - `gate` - validation gate check
//! - `loader` - dataset artifact resolution and parsing
//! - `publisher` - artifact and metric publication
//! - `orchestrator` - run lifecycle and state machine

mod gate;
mod loader;
mod orchestrator;
mod publisher;

pub use gate::{ABORT_MESSAGE, GateSettings, GateVerdict, check_validation_status};
pub use loader::load_data;
pub(crate) use loader::read_bounded;
pub use orchestrator::{StageOutcome, StageRunner, StageState};
pub use publisher::{
    Lineage, PublishOptions, PublishReceipt, TRANSFORM_FILE_EXTENSION, publish,
    transform_file_name,
};

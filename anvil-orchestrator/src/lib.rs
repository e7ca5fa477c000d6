//! Anvil Orchestrator
//!
//! Turns build triggers into executed builds: validates the trigger, numbers
//! the build, dispatches it onto the build worker pool, runs the configured
//! steps in order and records every outcome.

pub mod error;
pub mod handle;
pub mod service;

pub use error::{PipelineError, TriggerError};
pub use handle::BuildHandle;
pub use service::pipeline::{PipelineService, TriggerRequest};

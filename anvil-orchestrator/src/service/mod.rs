//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services coordinate repositories, the worker pool and the container runtime.

pub mod environment;
pub mod pipeline;

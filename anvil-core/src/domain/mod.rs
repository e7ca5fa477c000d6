//! Core domain types
//!
//! This module contains the core domain structures used across Anvil crates.
//! These types are owned by the persistence layer and read (or, for builds and
//! host status, written) by the orchestrator and reconciler.

pub mod application;
pub mod build;
pub mod host;
pub mod secret;
pub mod step;

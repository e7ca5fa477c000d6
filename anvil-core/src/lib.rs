//! Anvil Core
//!
//! Core types and abstractions for the Anvil build engine.
//!
//! This crate contains:
//! - Domain types: Core business entities (Application, Build, Host, etc.)
//! - Repository: Collaborator contracts for persistence, plus an in-memory store
//! - Pool: Bounded worker pool shared by builds and host probes

pub mod domain;
pub mod error;
pub mod pool;
pub mod repository;

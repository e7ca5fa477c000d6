//! Repository layer
//!
//! Collaborator contracts the build engine and reconciler need from the
//! persistence layer. The core never assumes a storage technology; it only
//! talks to these traits.
//!
//! All repositories are trait-based to enable testing and dependency injection.

mod applications;
mod builds;
mod hosts;
mod memory;

// Re-export traits
pub use applications::ApplicationRepository;
pub use builds::BuildRepository;
pub use hosts::{HostFilter, HostRepository};

// Re-export implementations
pub use memory::InMemoryStore;

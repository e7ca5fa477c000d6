//! Build repository

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::build::{Build, BuildStep};
use crate::error::RepositoryResult;

/// Persistence for build and step records
#[async_trait]
pub trait BuildRepository: Send + Sync {
    /// Inserts or replaces a build record
    async fn save_build(&self, build: &Build) -> RepositoryResult<()>;

    /// Inserts or replaces a step record
    async fn save_build_step(&self, step: &BuildStep) -> RepositoryResult<()>;

    /// Fetches a build by id
    async fn get_build(&self, id: Uuid) -> RepositoryResult<Option<Build>>;

    /// Lists a build's step records, sorted by order index
    async fn list_build_steps(&self, build_id: Uuid) -> RepositoryResult<Vec<BuildStep>>;
}

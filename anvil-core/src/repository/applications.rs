//! Application repository

use async_trait::async_trait;

use crate::domain::application::Application;
use crate::domain::step::StepSpec;
use crate::error::RepositoryResult;

/// Read access to application configuration, plus build numbering
#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    /// Fetches an application by id
    ///
    /// Returns `Ok(None)` when no such application is registered.
    async fn get_application(&self, id: &str) -> RepositoryResult<Option<Application>>;

    /// Fetches the application's steps, sorted by order index
    async fn get_step_specs(&self, application_id: &str) -> RepositoryResult<Vec<StepSpec>>;

    /// Allocates the next build number for an application
    ///
    /// Numbers are monotonic per application and never handed out twice.
    async fn next_build_number(&self, application_id: &str) -> RepositoryResult<u32>;
}

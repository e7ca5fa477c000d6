//! Host repository

use async_trait::async_trait;

use crate::domain::host::{Host, HostStatus};
use crate::error::RepositoryResult;

/// Selects which hosts a query returns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostFilter {
    pub id: Option<String>,
    pub status: Option<HostStatus>,
}

impl HostFilter {
    /// Matches every host
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches a single host by id
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            status: None,
        }
    }

    pub fn with_status(mut self, status: HostStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, host: &Host) -> bool {
        self.id.as_ref().is_none_or(|id| *id == host.id)
            && self.status.is_none_or(|status| status == host.status)
    }
}

/// Host records, of which the reconciler only writes the status field
#[async_trait]
pub trait HostRepository: Send + Sync {
    /// Lists hosts matching the filter
    async fn get_hosts(&self, filter: &HostFilter) -> RepositoryResult<Vec<Host>>;

    /// Sets a host's status (last write wins)
    async fn update_host_status(&self, host_id: &str, status: HostStatus) -> RepositoryResult<()>;
}

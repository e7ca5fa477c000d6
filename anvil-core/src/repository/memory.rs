//! In-memory repository
//!
//! Implements every collaborator contract over mutex-guarded maps. Used by the
//! CLI (loaded from an inventory file) and by tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::domain::application::Application;
use crate::domain::build::{Build, BuildStep};
use crate::domain::host::{Host, HostStatus};
use crate::domain::step::StepSpec;
use crate::error::{RepositoryError, RepositoryResult};
use crate::repository::{ApplicationRepository, BuildRepository, HostFilter, HostRepository};

/// Thread-safe in-memory implementation of all repositories
#[derive(Default)]
pub struct InMemoryStore {
    applications: Mutex<HashMap<String, Application>>,
    build_numbers: Mutex<HashMap<String, u32>>,
    builds: Mutex<HashMap<Uuid, Build>>,
    steps: Mutex<HashMap<Uuid, Vec<BuildStep>>>,
    hosts: Mutex<BTreeMap<String, Host>>,
}

fn lock<T>(mutex: &Mutex<T>) -> RepositoryResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| RepositoryError::Storage(format!("store lock poisoned: {}", e)))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces an application
    pub fn insert_application(&self, application: Application) -> RepositoryResult<()> {
        lock(&self.applications)?.insert(application.id.clone(), application);
        Ok(())
    }

    /// Registers or replaces a host
    pub fn insert_host(&self, host: Host) -> RepositoryResult<()> {
        lock(&self.hosts)?.insert(host.id.clone(), host);
        Ok(())
    }

    /// Fetches a host by id, credentials included
    pub fn host(&self, id: &str) -> RepositoryResult<Option<Host>> {
        Ok(lock(&self.hosts)?.get(id).cloned())
    }

    /// Lists all applications
    pub fn applications(&self) -> RepositoryResult<Vec<Application>> {
        let mut apps: Vec<_> = lock(&self.applications)?.values().cloned().collect();
        apps.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(apps)
    }
}

#[async_trait]
impl ApplicationRepository for InMemoryStore {
    async fn get_application(&self, id: &str) -> RepositoryResult<Option<Application>> {
        Ok(lock(&self.applications)?.get(id).cloned())
    }

    async fn get_step_specs(&self, application_id: &str) -> RepositoryResult<Vec<StepSpec>> {
        lock(&self.applications)?
            .get(application_id)
            .map(Application::ordered_steps)
            .ok_or_else(|| RepositoryError::NotFound(format!("application {}", application_id)))
    }

    async fn next_build_number(&self, application_id: &str) -> RepositoryResult<u32> {
        if !lock(&self.applications)?.contains_key(application_id) {
            return Err(RepositoryError::NotFound(format!(
                "application {}",
                application_id
            )));
        }

        let mut numbers = lock(&self.build_numbers)?;
        let next = numbers.entry(application_id.to_string()).or_insert(0);
        *next += 1;
        Ok(*next)
    }
}

#[async_trait]
impl BuildRepository for InMemoryStore {
    async fn save_build(&self, build: &Build) -> RepositoryResult<()> {
        lock(&self.builds)?.insert(build.id, build.clone());
        Ok(())
    }

    async fn save_build_step(&self, step: &BuildStep) -> RepositoryResult<()> {
        let mut steps = lock(&self.steps)?;
        let records = steps.entry(step.build_id).or_default();
        match records.iter_mut().find(|s| s.id == step.id) {
            Some(existing) => *existing = step.clone(),
            None => records.push(step.clone()),
        }
        Ok(())
    }

    async fn get_build(&self, id: Uuid) -> RepositoryResult<Option<Build>> {
        Ok(lock(&self.builds)?.get(&id).cloned())
    }

    async fn list_build_steps(&self, build_id: Uuid) -> RepositoryResult<Vec<BuildStep>> {
        let mut records = lock(&self.steps)?
            .get(&build_id)
            .cloned()
            .unwrap_or_default();
        records.sort_by_key(|s| s.order);
        Ok(records)
    }
}

#[async_trait]
impl HostRepository for InMemoryStore {
    async fn get_hosts(&self, filter: &HostFilter) -> RepositoryResult<Vec<Host>> {
        Ok(lock(&self.hosts)?
            .values()
            .filter(|h| filter.matches(h))
            .cloned()
            .collect())
    }

    async fn update_host_status(&self, host_id: &str, status: HostStatus) -> RepositoryResult<()> {
        let mut hosts = lock(&self.hosts)?;
        let host = hosts
            .get_mut(host_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("host {}", host_id)))?;
        host.status = status;
        Ok(())
    }
}

//! Inventory file
//!
//! JSON document listing the applications and hosts the CLI works with:
//!
//! ```json
//! {
//!   "applications": [{ "id": "web", "name": "Web", "repository": { "url": "..." }, "steps": [...] }],
//!   "hosts": [{ "id": "H1", "address": "10.0.0.1", "username": "deploy", "credential": { "password": "..." } }]
//! }
//! ```

use anvil_core::domain::application::Application;
use anvil_core::domain::host::Host;
use anvil_core::repository::InMemoryStore;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub applications: Vec<Application>,
    #[serde(default)]
    pub hosts: Vec<Host>,
}

impl Inventory {
    /// Reads and parses an inventory file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read inventory {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid inventory {}", path.display()))
    }

    /// Parses inventory JSON, rejecting duplicate ids
    pub fn parse(raw: &str) -> Result<Self> {
        let inventory: Inventory = serde_json::from_str(raw)?;

        let mut seen = HashSet::new();
        for app in &inventory.applications {
            if !seen.insert(app.id.as_str()) {
                bail!("Duplicate application id '{}'", app.id);
            }
        }

        let mut seen = HashSet::new();
        for host in &inventory.hosts {
            if !seen.insert(host.id.as_str()) {
                bail!("Duplicate host id '{}'", host.id);
            }
        }

        Ok(inventory)
    }

    /// Moves everything into a fresh in-memory store
    pub fn into_store(self) -> Result<InMemoryStore> {
        let store = InMemoryStore::new();
        for app in self.applications {
            store.insert_application(app)?;
        }
        for host in self.hosts {
            store.insert_host(host)?;
        }
        Ok(store)
    }
}

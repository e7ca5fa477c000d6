//! Host domain model
//!
//! Represents a remote machine reachable over SSH whose connectivity is
//! tracked by the fleet reconciler.

use serde::{Deserialize, Serialize};

use crate::domain::secret::Secret;

/// A remote host in the fleet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    /// Unique identifier for the host
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Network address (IP or DNS name)
    pub address: String,

    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,

    /// SSH login user
    pub username: String,

    /// Authentication material
    #[serde(default)]
    pub credential: HostCredential,

    /// Last observed connectivity status
    #[serde(default)]
    pub status: HostStatus,

    #[serde(default)]
    pub description: Option<String>,
}

/// SSH credentials for a host
///
/// Both fields may be set; the private key wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostCredential {
    #[serde(default)]
    pub password: Option<Secret>,
    #[serde(default)]
    pub private_key: Option<Secret>,
}

/// Connectivity status of a host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostStatus {
    /// Last probe succeeded
    Online,

    /// Not yet probed, or the last probe could not reach or log into the host
    #[default]
    Offline,

    /// The host's configuration prevents probing (e.g. no credentials)
    Error,
}

fn default_port() -> u16 {
    22
}

impl std::fmt::Display for HostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostStatus::Online => write!(f, "ONLINE"),
            HostStatus::Offline => write!(f, "OFFLINE"),
            HostStatus::Error => write!(f, "ERROR"),
        }
    }
}

impl Host {
    pub fn new(id: impl Into<String>, address: impl Into<String>, username: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            address: address.into(),
            port: default_port(),
            username: username.into(),
            credential: HostCredential::default(),
            status: HostStatus::Offline,
            description: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<Secret>) -> Self {
        self.credential.password = Some(password.into());
        self
    }

    pub fn with_private_key(mut self, key: impl Into<Secret>) -> Self {
        self.credential.private_key = Some(key.into());
        self
    }

    /// A copy with credential material stripped, for query paths
    pub fn redacted(&self) -> Host {
        Host {
            credential: HostCredential {
                password: self.credential.password.as_ref().map(|_| Secret::new("******")),
                private_key: self
                    .credential
                    .private_key
                    .as_ref()
                    .map(|_| Secret::new("******")),
            },
            ..self.clone()
        }
    }
}

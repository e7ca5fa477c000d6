//! Step configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default in-container working directory for steps
pub const DEFAULT_WORKING_DIR: &str = "/workspace";

/// One configured step of an application's pipeline
///
/// Loaded from the persistence layer and immutable for the lifetime of a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSpec {
    pub name: String,
    pub image: String,
    pub commands: Vec<String>,
    #[serde(default = "default_working_dir")]
    pub working_dir: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub continue_on_error: bool,
    pub order: u32,
}

fn default_working_dir() -> String {
    DEFAULT_WORKING_DIR.to_string()
}

impl StepSpec {
    /// Creates a step with default working directory and no environment
    pub fn new(
        name: impl Into<String>,
        image: impl Into<String>,
        commands: Vec<String>,
        order: u32,
    ) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            commands,
            working_dir: default_working_dir(),
            env: BTreeMap::new(),
            continue_on_error: false,
            order,
        }
    }

    pub fn continue_on_error(mut self, value: bool) -> Self {
        self.continue_on_error = value;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

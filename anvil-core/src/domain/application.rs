//! Application domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::step::StepSpec;

/// A registered application that can be built
///
/// Owned by the persistence layer; read-only to the build engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    pub name: String,
    pub repository: SourceRepository,
    /// Ordered step configuration
    #[serde(default)]
    pub steps: Vec<StepSpec>,
    /// Host ids this application deploys to
    #[serde(default)]
    pub target_hosts: Vec<String>,
    #[serde(default)]
    pub auto_trigger: bool,
    /// Variables passed to every step of every build
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// Source repository location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRepository {
    pub url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Opaque reference into the secret store, never the secret itself
    #[serde(default)]
    pub credentials: Option<String>,
}

fn default_branch() -> String {
    "main".to_string()
}

impl SourceRepository {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            branch: default_branch(),
            credentials: None,
        }
    }
}

impl Application {
    pub fn new(id: impl Into<String>, name: impl Into<String>, repository: SourceRepository) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            repository,
            steps: Vec::new(),
            target_hosts: Vec::new(),
            auto_trigger: false,
            variables: BTreeMap::new(),
        }
    }

    pub fn with_step(mut self, step: StepSpec) -> Self {
        self.steps.push(step);
        self
    }

    /// Steps sorted by order index
    pub fn ordered_steps(&self) -> Vec<StepSpec> {
        let mut steps = self.steps.clone();
        steps.sort_by_key(|s| s.order);
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordered_steps() {
        let app = Application::new("A1", "demo", SourceRepository::new("https://example.com/r.git"))
            .with_step(StepSpec::new("build", "alpine", vec!["make".into()], 1))
            .with_step(StepSpec::new("git", "alpine/git", vec!["clone".into()], 0));

        let names: Vec<_> = app.ordered_steps().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["git", "build"]);
    }

    #[test]
    fn test_default_branch() {
        let json = r#"{"id":"A1","name":"demo","repository":{"url":"u"}}"#;
        let app: Application = serde_json::from_str(json).unwrap();
        assert_eq!(app.repository.branch, "main");
        assert!(!app.auto_trigger);
        assert!(app.steps.is_empty());
    }
}

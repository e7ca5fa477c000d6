//! Step environment
//!
//! Precedence, lowest first: application variables, build metadata, then the
//! step's own variables.

use anvil_core::domain::application::Application;
use anvil_core::domain::build::Build;
use anvil_core::domain::step::StepSpec;
use std::collections::BTreeMap;

/// Builds the environment passed to one step's container
pub fn step_environment(
    application: &Application,
    build: &Build,
    step: &StepSpec,
) -> BTreeMap<String, String> {
    let mut env = application.variables.clone();

    let branch = build
        .branch
        .clone()
        .unwrap_or_else(|| application.repository.branch.clone());

    env.insert("ANVIL_APPLICATION".into(), application.id.clone());
    env.insert("ANVIL_BUILD_ID".into(), build.id.to_string());
    env.insert("ANVIL_BUILD_NUMBER".into(), build.build_number.to_string());
    env.insert("ANVIL_TRIGGER".into(), build.trigger.to_string());
    env.insert("ANVIL_REPO_URL".into(), application.repository.url.clone());
    env.insert("ANVIL_REPO_BRANCH".into(), branch);
    if let Some(revision) = &build.revision {
        env.insert("ANVIL_REVISION".into(), revision.clone());
    }

    env.extend(step.env.clone());
    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_core::domain::application::SourceRepository;
    use anvil_core::domain::build::TriggerOrigin;

    #[test]
    fn test_precedence() {
        let mut app = Application::new("A1", "demo", SourceRepository::new("https://git/r.git"));
        app.variables.insert("LEVEL".into(), "app".into());
        app.variables.insert("APP_ONLY".into(), "1".into());

        let build = Build::pending("A1", 5, TriggerOrigin::Webhook, Some("abc123".into()), None);
        let step = StepSpec::new("build", "alpine", vec!["make".into()], 0).with_env("LEVEL", "step");

        let env = step_environment(&app, &build, &step);
        assert_eq!(env["LEVEL"], "step");
        assert_eq!(env["APP_ONLY"], "1");
        assert_eq!(env["ANVIL_BUILD_NUMBER"], "5");
        assert_eq!(env["ANVIL_TRIGGER"], "webhook");
        assert_eq!(env["ANVIL_REPO_BRANCH"], "main");
        assert_eq!(env["ANVIL_REVISION"], "abc123");
    }

    #[test]
    fn test_revision_absent() {
        let app = Application::new("A1", "demo", SourceRepository::new("u"));
        let build = Build::pending("A1", 1, TriggerOrigin::Manual, None, Some("dev".into()));
        let step = StepSpec::new("s", "alpine", vec![], 0);

        let env = step_environment(&app, &build, &step);
        assert!(!env.contains_key("ANVIL_REVISION"));
        assert_eq!(env["ANVIL_REPO_BRANCH"], "dev");
    }
}

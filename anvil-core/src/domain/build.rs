//! Build domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::step::StepSpec;
use crate::error::TransitionError;

/// One execution attempt of an application
///
/// Created in `Pending` when a trigger is accepted, mutated only by the
/// orchestrator, immutable once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    pub id: Uuid,
    pub application_id: String,
    pub build_number: u32,
    pub status: BuildStatus,
    pub trigger: TriggerOrigin,
    pub revision: Option<String>,
    pub branch: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
}

/// Build (and step) lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

/// What caused a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerOrigin {
    Manual,
    Webhook,
}

/// One step's execution record within a build
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStep {
    pub id: Uuid,
    pub build_id: Uuid,
    pub name: String,
    pub order: u32,
    pub status: BuildStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub log: String,
    pub error_message: Option<String>,
    pub exit_code: Option<i32>,
}

impl BuildStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BuildStatus::Success | BuildStatus::Failed | BuildStatus::Cancelled
        )
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: BuildStatus) -> bool {
        match (self, next) {
            (BuildStatus::Pending, BuildStatus::Running) => true,
            (BuildStatus::Running, BuildStatus::Success) => true,
            (BuildStatus::Pending | BuildStatus::Running, BuildStatus::Failed) => true,
            (BuildStatus::Pending | BuildStatus::Running, BuildStatus::Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStatus::Pending => write!(f, "PENDING"),
            BuildStatus::Running => write!(f, "RUNNING"),
            BuildStatus::Success => write!(f, "SUCCESS"),
            BuildStatus::Failed => write!(f, "FAILED"),
            BuildStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl fmt::Display for TriggerOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerOrigin::Manual => write!(f, "manual"),
            TriggerOrigin::Webhook => write!(f, "webhook"),
        }
    }
}

impl FromStr for TriggerOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "manual" => Ok(TriggerOrigin::Manual),
            "webhook" => Ok(TriggerOrigin::Webhook),
            other => Err(format!("unknown trigger origin: {}", other)),
        }
    }
}

impl Build {
    /// Creates a new build in `Pending`
    pub fn pending(
        application_id: impl Into<String>,
        build_number: u32,
        trigger: TriggerOrigin,
        revision: Option<String>,
        branch: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            application_id: application_id.into(),
            build_number,
            status: BuildStatus::Pending,
            trigger,
            revision,
            branch,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            duration_ms: None,
            error_message: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves the build to `Running` and stamps the start time
    pub fn mark_running(&mut self) -> Result<(), TransitionError> {
        self.transition(BuildStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Moves the build to a terminal status, stamping end time and duration
    pub fn finish(
        &mut self,
        status: BuildStatus,
        error_message: Option<String>,
    ) -> Result<(), TransitionError> {
        if !status.is_terminal() {
            return Err(TransitionError {
                from: self.status,
                to: status,
            });
        }
        self.transition(status)?;

        let now = Utc::now();
        let started = self.started_at.unwrap_or(self.created_at);
        self.finished_at = Some(now);
        self.duration_ms = Some((now - started).num_milliseconds());
        self.error_message = error_message;
        Ok(())
    }

    fn transition(&mut self, next: BuildStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

impl BuildStep {
    /// Creates the record for a step that is starting now
    pub fn start(build_id: Uuid, spec: &StepSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            build_id,
            name: spec.name.clone(),
            order: spec.order,
            status: BuildStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            log: String::new(),
            error_message: None,
            exit_code: None,
        }
    }

    /// Finalizes the step record
    ///
    /// After this call the record is never mutated again.
    pub fn finish(
        &mut self,
        status: BuildStatus,
        log: String,
        exit_code: i32,
        error_message: Option<String>,
    ) -> Result<(), TransitionError> {
        if self.status != BuildStatus::Running || !status.is_terminal() {
            return Err(TransitionError {
                from: self.status,
                to: status,
            });
        }

        let now = Utc::now();
        self.status = status;
        self.finished_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds());
        self.log = log;
        self.exit_code = Some(exit_code);
        self.error_message = error_message;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        assert!(BuildStatus::Pending.can_transition_to(BuildStatus::Running));
        assert!(BuildStatus::Pending.can_transition_to(BuildStatus::Cancelled));
        assert!(BuildStatus::Running.can_transition_to(BuildStatus::Success));
        assert!(BuildStatus::Running.can_transition_to(BuildStatus::Failed));
        assert!(!BuildStatus::Pending.can_transition_to(BuildStatus::Success));
        assert!(!BuildStatus::Success.can_transition_to(BuildStatus::Failed));
        assert!(!BuildStatus::Cancelled.can_transition_to(BuildStatus::Running));
    }

    #[test]
    fn test_build_lifecycle() {
        let mut build = Build::pending("A1", 1, TriggerOrigin::Manual, None, None);
        assert_eq!(build.status, BuildStatus::Pending);

        build.mark_running().unwrap();
        assert!(build.started_at.is_some());

        build.finish(BuildStatus::Success, None).unwrap();
        assert!(build.is_terminal());
        assert!(build.duration_ms.unwrap() >= 0);

        // Terminal builds are immutable
        assert!(build.finish(BuildStatus::Failed, Some("late".into())).is_err());
        assert_eq!(build.status, BuildStatus::Success);
        assert!(build.error_message.is_none());
    }

    #[test]
    fn test_finish_requires_terminal_status() {
        let mut build = Build::pending("A1", 1, TriggerOrigin::Webhook, None, None);
        assert!(build.finish(BuildStatus::Running, None).is_err());
    }

    #[test]
    fn test_step_finalized_once() {
        let spec = StepSpec::new("git", "alpine/git", vec!["clone".into()], 0);
        let mut step = BuildStep::start(Uuid::new_v4(), &spec);
        step.finish(BuildStatus::Failed, "log".into(), 1, Some("boom".into()))
            .unwrap();
        assert_eq!(step.exit_code, Some(1));
        assert!(
            step.finish(BuildStatus::Success, String::new(), 0, None)
                .is_err()
        );
    }

    #[test]
    fn test_trigger_origin_parse() {
        assert_eq!("manual".parse::<TriggerOrigin>(), Ok(TriggerOrigin::Manual));
        assert_eq!("WEBHOOK".parse::<TriggerOrigin>(), Ok(TriggerOrigin::Webhook));
        assert!("cron".parse::<TriggerOrigin>().is_err());
        assert_eq!(
            serde_json::to_string(&TriggerOrigin::Webhook).unwrap(),
            "\"webhook\""
        );
    }
}

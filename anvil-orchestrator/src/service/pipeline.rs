//! Pipeline Service
//!
//! Build lifecycle: trigger validation, numbering, dispatch onto the build
//! pool and sequential step execution.
//!
//! A build moves `PENDING -> RUNNING -> SUCCESS | FAILED | CANCELLED`, or
//! straight from `PENDING` to `CANCELLED` when cancelled while queued. Step
//! records are persisted as each step starts and again when it finishes.

use anvil_core::domain::application::Application;
use anvil_core::domain::build::{Build, BuildStatus, BuildStep, TriggerOrigin};
use anvil_core::domain::step::StepSpec;
use anvil_core::pool::WorkerPool;
use anvil_core::repository::{ApplicationRepository, BuildRepository};
use anvil_runner::{ContainerRequest, ContainerResult, ContainerRuntime, WorkspaceManager};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{PipelineError, TriggerError};
use crate::handle::BuildHandle;
use crate::service::environment::step_environment;

/// A request to start a build
#[derive(Debug, Clone)]
pub struct TriggerRequest {
    pub application_id: String,
    pub origin: TriggerOrigin,
    /// Commit the build is for, when the trigger knows it
    pub revision: Option<String>,
}

impl TriggerRequest {
    pub fn new(application_id: impl Into<String>, origin: TriggerOrigin) -> Self {
        Self {
            application_id: application_id.into(),
            origin,
            revision: None,
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }
}

/// Orchestrates builds
///
/// Cheap to clone; clones share the pool and the set of active builds.
#[derive(Clone)]
pub struct PipelineService {
    inner: Arc<Inner>,
}

struct Inner {
    applications: Arc<dyn ApplicationRepository>,
    builds: Arc<dyn BuildRepository>,
    runtime: Arc<dyn ContainerRuntime>,
    workspaces: WorkspaceManager,
    pool: WorkerPool,
    active: Mutex<HashMap<Uuid, CancellationToken>>,
}

/// How the step loop ended
enum StepsOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

impl PipelineService {
    pub fn new(
        applications: Arc<dyn ApplicationRepository>,
        builds: Arc<dyn BuildRepository>,
        runtime: Arc<dyn ContainerRuntime>,
        workspaces: WorkspaceManager,
        max_parallel_builds: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                applications,
                builds,
                runtime,
                workspaces,
                pool: WorkerPool::new("build", max_parallel_builds),
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Triggers a build of `application_id`
    pub async fn trigger(
        &self,
        application_id: &str,
        origin: TriggerOrigin,
    ) -> Result<BuildHandle, TriggerError> {
        self.trigger_with(TriggerRequest::new(application_id, origin))
            .await
    }

    /// Validates the trigger, records a `PENDING` build and dispatches it
    ///
    /// Returns as soon as the build is recorded. Validation failures leave no
    /// build record behind and consume no build number.
    pub async fn trigger_with(&self, request: TriggerRequest) -> Result<BuildHandle, TriggerError> {
        let application_id = request.application_id;

        let application = self
            .inner
            .applications
            .get_application(&application_id)
            .await?
            .ok_or_else(|| TriggerError::ApplicationNotFound(application_id.clone()))?;

        if request.origin == TriggerOrigin::Webhook && !application.auto_trigger {
            return Err(TriggerError::AutoTriggerDisabled(application_id));
        }

        let mut steps = self
            .inner
            .applications
            .get_step_specs(&application_id)
            .await?;
        if steps.is_empty() {
            return Err(TriggerError::NoSteps(application_id));
        }
        steps.sort_by_key(|s| s.order);

        let build_number = self
            .inner
            .applications
            .next_build_number(&application_id)
            .await?;

        let build = Build::pending(
            &application_id,
            build_number,
            request.origin,
            request.revision,
            Some(application.repository.branch.clone()),
        );
        self.inner.builds.save_build(&build).await?;

        info!(
            "Build #{} of {} queued ({} trigger, id {})",
            build_number, application_id, build.trigger, build.id
        );

        let build_id = build.id;
        let cancel = CancellationToken::new();
        self.inner.track(build_id, cancel.clone());

        let join = tokio::spawn(drive(
            self.inner.clone(),
            application,
            steps,
            build,
            cancel.clone(),
        ));

        Ok(BuildHandle::new(build_id, build_number, cancel, join))
    }

    /// Current status of a build
    pub async fn status(&self, build_id: Uuid) -> Result<BuildStatus, PipelineError> {
        Ok(self.build(build_id).await?.status)
    }

    /// Fetches a build record
    pub async fn build(&self, build_id: Uuid) -> Result<Build, PipelineError> {
        self.inner
            .builds
            .get_build(build_id)
            .await?
            .ok_or(PipelineError::BuildNotFound(build_id))
    }

    /// Step records of a build, in order
    pub async fn steps(&self, build_id: Uuid) -> Result<Vec<BuildStep>, PipelineError> {
        self.build(build_id).await?;
        Ok(self.inner.builds.list_build_steps(build_id).await?)
    }

    /// Requests cancellation of a build that has not finished yet
    ///
    /// Returns `false` when the build is unknown or already terminal.
    pub fn cancel(&self, build_id: Uuid) -> bool {
        let active = self.inner.active.lock().unwrap_or_else(PoisonError::into_inner);
        match active.get(&build_id) {
            Some(token) => {
                info!("Cancellation requested for build {}", build_id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of builds queued or running
    pub fn active_builds(&self) -> usize {
        self.inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Inner {
    fn track(&self, build_id: Uuid, token: CancellationToken) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(build_id, token);
    }

    fn untrack(&self, build_id: Uuid) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&build_id);
    }

    async fn persist_build(&self, build: &Build) {
        if let Err(e) = self.builds.save_build(build).await {
            error!("Failed to persist build {}: {}", build.id, e);
        }
    }

    /// Fails every step record of the build that was left `RUNNING`
    async fn fail_open_steps(&self, build_id: Uuid, message: &str) {
        let steps = match self.builds.list_build_steps(build_id).await {
            Ok(steps) => steps,
            Err(e) => {
                error!("Failed to load steps of build {}: {}", build_id, e);
                return;
            }
        };

        for mut step in steps.into_iter().filter(|s| !s.status.is_terminal()) {
            let log = std::mem::take(&mut step.log);
            match step.finish(BuildStatus::Failed, log, -1, Some(message.to_string())) {
                Ok(()) => self.persist_step(&step).await,
                Err(e) => error!("Step '{}' of build {}: {}", step.name, build_id, e),
            }
        }
    }

    async fn persist_step(&self, step: &BuildStep) {
        if let Err(e) = self.builds.save_build_step(step).await {
            error!(
                "Failed to persist step '{}' of build {}: {}",
                step.name, step.build_id, e
            );
        }
    }
}

/// Waits for a pool slot, then runs the build in its own task
///
/// A panic inside the build task is contained here and recorded as a
/// failed build.
async fn drive(
    inner: Arc<Inner>,
    application: Application,
    steps: Vec<StepSpec>,
    mut build: Build,
    cancel: CancellationToken,
) -> Build {
    let slot = tokio::select! {
        slot = inner.pool.acquire() => Some(slot),
        _ = cancel.cancelled() => None,
    };

    let build = match slot {
        None => {
            info!("Build {} cancelled while queued", build.id);
            if let Err(e) = build.finish(BuildStatus::Cancelled, Some("Build cancelled".into())) {
                error!("Build {}: {}", build.id, e);
            }
            inner.persist_build(&build).await;
            build
        }
        Some(_slot) => {
            let build_id = build.id;
            let fallback = build.clone();
            let task = tokio::spawn(execute(inner.clone(), application, steps, build, cancel));

            match task.await {
                Ok(build) => build,
                Err(e) => {
                    error!("Build {} worker crashed: {}", build_id, e);
                    let mut build = match inner.builds.get_build(build_id).await {
                        Ok(Some(latest)) => latest,
                        _ => fallback,
                    };
                    let message = format!("Build worker crashed: {}", e);
                    inner.fail_open_steps(build_id, &message).await;
                    if !build.is_terminal() {
                        if let Err(e) = build.finish(BuildStatus::Failed, Some(message)) {
                            error!("Build {}: {}", build_id, e);
                        }
                        inner.persist_build(&build).await;
                    }
                    build
                }
            }
        }
    };

    inner.untrack(build.id);
    build
}

/// Runs a dispatched build from `RUNNING` to its terminal state
async fn execute(
    inner: Arc<Inner>,
    application: Application,
    steps: Vec<StepSpec>,
    mut build: Build,
    cancel: CancellationToken,
) -> Build {
    if let Err(e) = build.mark_running() {
        error!("Build {} cannot start: {}", build.id, e);
        return build;
    }
    inner.persist_build(&build).await;

    info!(
        "Starting build #{} of {} ({} steps)",
        build.build_number,
        application.id,
        steps.len()
    );

    let workspace = match inner.workspaces.allocate(&application.id, build.build_number) {
        Ok(workspace) => workspace,
        Err(e) => {
            error!("Build {}: {}", build.id, e);
            if let Err(e) = build.finish(BuildStatus::Failed, Some(e.to_string())) {
                error!("Build {}: {}", build.id, e);
            }
            inner.persist_build(&build).await;
            return build;
        }
    };
    debug!("Build {} workspace: {}", build.id, workspace.path().display());

    let outcome = run_steps(&inner, &application, &steps, &build, workspace.path(), &cancel).await;

    match tokio::task::spawn_blocking(move || workspace.release()).await {
        Ok(0) => {}
        Ok(failures) => warn!("Build {}: {} workspace entries left behind", build.id, failures),
        Err(e) => warn!("Build {}: workspace purge task failed: {}", build.id, e),
    }

    let (status, error_message) = match outcome {
        StepsOutcome::Completed => (BuildStatus::Success, None),
        StepsOutcome::Failed(message) => (BuildStatus::Failed, Some(message)),
        StepsOutcome::Cancelled => (BuildStatus::Cancelled, Some("Build cancelled".to_string())),
    };
    if let Err(e) = build.finish(status, error_message) {
        error!("Build {}: {}", build.id, e);
    }
    inner.persist_build(&build).await;

    info!(
        "Build #{} of {} finished: {} in {}ms",
        build.build_number,
        application.id,
        build.status,
        build.duration_ms.unwrap_or_default()
    );
    build
}

/// Executes the steps in order, stopping at the first hard failure
async fn run_steps(
    inner: &Inner,
    application: &Application,
    steps: &[StepSpec],
    build: &Build,
    workspace: &Path,
    cancel: &CancellationToken,
) -> StepsOutcome {
    for spec in steps {
        if cancel.is_cancelled() {
            info!("Build {} cancelled before step '{}'", build.id, spec.name);
            return StepsOutcome::Cancelled;
        }

        let mut record = BuildStep::start(build.id, spec);
        inner.persist_step(&record).await;
        info!("Build {}: running step '{}' ({})", build.id, spec.name, spec.image);

        let request = ContainerRequest {
            name: container_name(build, spec),
            image: spec.image.clone(),
            commands: spec.commands.clone(),
            workspace: workspace.to_path_buf(),
            working_dir: spec.working_dir.clone(),
            env: step_environment(application, build, spec),
        };
        let result = inner.runtime.run(&request, cancel).await;

        if result.success {
            finish_step(inner, &mut record, BuildStatus::Success, result, None).await;
            continue;
        }

        if cancel.is_cancelled() {
            let message = Some("Step cancelled".to_string());
            finish_step(inner, &mut record, BuildStatus::Cancelled, result, message).await;
            return StepsOutcome::Cancelled;
        }

        let message = format!("Step '{}' failed: {}", spec.name, result.error);
        finish_step(inner, &mut record, BuildStatus::Failed, result, Some(message.clone())).await;

        if spec.continue_on_error {
            warn!("Build {}: {} (continuing)", build.id, message);
            continue;
        }
        warn!("Build {}: {}", build.id, message);
        return StepsOutcome::Failed(message);
    }

    StepsOutcome::Completed
}

async fn finish_step(
    inner: &Inner,
    record: &mut BuildStep,
    status: BuildStatus,
    result: ContainerResult,
    error_message: Option<String>,
) {
    if let Err(e) = record.finish(status, result.output, result.exit_code, error_message) {
        error!("Step '{}' of build {}: {}", record.name, record.build_id, e);
    }
    inner.persist_step(record).await;
}

/// `anvil-<build id>-<order>-<suffix>`, unique per step run
fn container_name(build: &Build, spec: &StepSpec) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("anvil-{}-{}-{}", build.id.simple(), spec.order, &suffix[..8])
}

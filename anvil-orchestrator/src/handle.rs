//! Build handles

use anvil_core::domain::build::Build;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::PipelineError;

/// Handle to an accepted build
///
/// Returned by a trigger as soon as the build is recorded; the build itself
/// runs on the worker pool.
#[derive(Debug)]
pub struct BuildHandle {
    build_id: Uuid,
    build_number: u32,
    cancel: CancellationToken,
    join: JoinHandle<Build>,
}

impl BuildHandle {
    pub(crate) fn new(
        build_id: Uuid,
        build_number: u32,
        cancel: CancellationToken,
        join: JoinHandle<Build>,
    ) -> Self {
        Self {
            build_id,
            build_number,
            cancel,
            join,
        }
    }

    pub fn build_id(&self) -> Uuid {
        self.build_id
    }

    pub fn build_number(&self) -> u32 {
        self.build_number
    }

    /// Requests cancellation; observed between steps and while a container runs
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the build to reach a terminal state
    pub async fn wait(self) -> Result<Build, PipelineError> {
        self.join
            .await
            .map_err(|e| PipelineError::Worker(e.to_string()))
    }
}

//! The deployment orchestrator.
//!
//! [`Orchestrator::run`] resolves the run parameters, assembles the plan
//! for the selected folders and walks it step by step. Every decision is
//! written to the checkpoint before the next step starts, so a failed or
//! interrupted run can be resumed by running it again with the same
//! checkpoint.

mod background;
mod folder;
mod prelude;
mod project;
mod protocol;
mod runner;
pub mod teardown;

pub use teardown::{Teardown, TeardownReport};

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info, warn};

use crate::checkpoint::{Checkpoint, RunStatus};
use crate::collab::Collaborators;
use crate::config::HoistConfig;
use crate::error::Result;
use crate::plan::ProjectMode;
use crate::platform::{ResourceDirectory, ResourceFactory};
use crate::progress::{ProgressSink, TracingSink};

/// Cooperative cancellation, checked at step boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What to deploy and how.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub folders: Vec<PathBuf>,
    pub mode: ProjectMode,
    /// Authentication profile; a profile recorded in the checkpoint wins
    pub profile: Option<String>,
    /// Suggested project name for fresh projects
    pub project_name: Option<String>,
    pub bypass_artifacts: bool,
    pub native_pipelines: bool,
    pub skip_cluster: bool,
}

impl DeployRequest {
    /// Deploy `folders` into a new project with default features.
    pub fn new(folders: Vec<PathBuf>) -> Self {
        Self {
            folders,
            mode: ProjectMode::Fresh,
            profile: None,
            project_name: None,
            bypass_artifacts: false,
            native_pipelines: true,
            skip_cluster: false,
        }
    }

    /// Add `folders` to the existing project `project_id`.
    pub fn incremental(folders: Vec<PathBuf>, project_id: impl Into<String>) -> Self {
        Self {
            mode: ProjectMode::Incremental {
                project_id: project_id.into(),
            },
            ..Self::new(folders)
        }
    }

    /// Take feature switches from the merged configuration.
    pub fn with_config(mut self, config: &HoistConfig) -> Self {
        self.bypass_artifacts = config.bypass_artifacts();
        self.native_pipelines = config.native_pipelines();
        self.skip_cluster = config.skip_cluster();
        if self.profile.is_none() {
            self.profile = config.profile.clone();
        }
        self
    }
}

/// Result of a run as reported to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl RunOutcome {
    fn succeeded() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            success: false,
            error: Some(message),
        }
    }
}

/// Drives deployments against a platform.
pub struct Orchestrator {
    directory: Arc<dyn ResourceDirectory>,
    factory: Arc<dyn ResourceFactory>,
    collab: Collaborators,
    progress: Arc<dyn ProgressSink>,
    cancel: CancelFlag,
    name_conflict_retries: u32,
}

impl Orchestrator {
    pub fn new(
        directory: Arc<dyn ResourceDirectory>,
        factory: Arc<dyn ResourceFactory>,
        collab: Collaborators,
    ) -> Self {
        Self {
            directory,
            factory,
            collab,
            progress: Arc::new(TracingSink),
            cancel: CancelFlag::new(),
            name_conflict_retries: 1,
        }
    }

    /// Use one platform object for both lookups and mutations.
    pub fn for_platform<P>(platform: Arc<P>, collab: Collaborators) -> Self
    where
        P: ResourceDirectory + ResourceFactory + 'static,
    {
        Self::new(platform.clone(), platform, collab)
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Renames allowed per creation after display-name conflicts.
    pub fn with_name_conflict_retries(mut self, retries: u32) -> Self {
        self.name_conflict_retries = retries;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Deploy the requested folders, resuming from `checkpoint`.
    ///
    /// The checkpoint is flushed before this returns, whatever the outcome.
    pub async fn run(&self, request: &DeployRequest, checkpoint: &mut Checkpoint) -> RunOutcome {
        let result = runner::execute(self, request, checkpoint).await;

        checkpoint.doc_mut().status = if result.is_ok() {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };
        let persisted = checkpoint.persist();

        match (result, persisted) {
            (Ok(()), Ok(())) => {
                info!(target: "hoist::deploy", "Deployment completed");
                RunOutcome::succeeded()
            }
            (Ok(()), Err(e)) | (Err(e), Ok(())) => {
                error!(target: "hoist::deploy", "{}", e);
                RunOutcome::failed(e.to_string())
            }
            (Err(e), Err(flush)) => {
                warn!(target: "hoist::deploy", "{}", flush);
                error!(target: "hoist::deploy", "{}", e);
                RunOutcome::failed(e.to_string())
            }
        }
    }

    /// Delete everything the checkpoint records.
    pub async fn teardown(&self, checkpoint: &mut Checkpoint) -> Result<TeardownReport> {
        Teardown::new(
            self.directory.clone(),
            self.factory.clone(),
            self.collab.auth.clone(),
        )
        .run(checkpoint)
        .await
    }
}

//! Plan execution.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{info, warn};

use super::background::{BackgroundKind, BackgroundTasks};
use super::prelude::{self, Prepared};
use super::{DeployRequest, Orchestrator};
use crate::checkpoint::{Checkpoint, RunStatus, ScopedRef, SlotRef};
use crate::collab::{Authentication, Classification};
use crate::error::{DeployError, Result};
use crate::plan::{self, FeatureFlags, Plan, ProjectMode, Step, StepKind};
use crate::progress::ProgressReporter;
use crate::types::{NamedRef, TAG_RUN, TAG_STEP, Tags, UserIdentity};

/// A folder taking part in the run.
pub(super) struct FolderRun {
    pub(super) name: String,
    pub(super) path: PathBuf,
    pub(super) classification: Classification,
    /// Write endpoint of the code repository, once known
    pub(super) endpoint: Option<String>,
    /// Generated specs uploaded as inline artifacts, by submodule and step
    pub(super) inline: HashMap<(Option<String>, StepKind), String>,
}

/// Mutable state of one run, threaded through every step.
pub(super) struct Run<'a> {
    pub(super) orch: &'a Orchestrator,
    pub(super) checkpoint: &'a mut Checkpoint,
    pub(super) auth: Authentication,
    pub(super) mode: ProjectMode,
    pub(super) flags: FeatureFlags,
    pub(super) namespace: String,
    pub(super) compartment: NamedRef,
    pub(super) cluster: Option<ScopedRef>,
    pub(super) subnet: Option<ScopedRef>,
    pub(super) tag: String,
    pub(super) user: Option<UserIdentity>,
    pub(super) project_name: String,
    pub(super) project_id: Option<String>,
    pub(super) artifact_repository_id: Option<String>,
    pub(super) cluster_environment_id: Option<String>,
    pub(super) knowledge_base_id: Option<String>,
    pub(super) folders: Vec<FolderRun>,
    pub(super) reporter: ProgressReporter,
    pub(super) background: BackgroundTasks,
}

/// Run the prelude, assemble the plan and execute it step by step.
pub(super) async fn execute(
    orch: &Orchestrator,
    request: &DeployRequest,
    checkpoint: &mut Checkpoint,
) -> Result<()> {
    checkpoint.doc_mut().status = RunStatus::Running;
    checkpoint.persist()?;

    let prepared = prelude::prepare(orch, request, checkpoint).await?;
    let classified: Vec<(String, Classification)> = prepared
        .folders
        .iter()
        .map(|f| (f.name.clone(), f.classification.clone()))
        .collect();
    let plan = plan::assemble(&prepared.mode, prepared.flags, &classified)?;
    info!(
        target: "hoist::deploy",
        steps = plan.steps.len(),
        weight = plan.total_weight,
        "Deploying {} folder(s) to {}",
        classified.len(),
        prepared.compartment.name
    );

    let mut run = Run::new(orch, checkpoint, prepared, &plan);
    run.execute_plan(&plan).await
}

impl<'a> Run<'a> {
    fn new(
        orch: &'a Orchestrator,
        checkpoint: &'a mut Checkpoint,
        prepared: Prepared,
        plan: &Plan,
    ) -> Self {
        let reporter = ProgressReporter::new(orch.progress.clone(), plan.total_weight);
        Self {
            orch,
            checkpoint,
            auth: prepared.auth,
            mode: prepared.mode,
            flags: prepared.flags,
            namespace: prepared.namespace,
            compartment: prepared.compartment,
            cluster: prepared.cluster,
            subnet: prepared.subnet,
            tag: prepared.tag,
            user: prepared.user,
            project_name: prepared.project_name,
            project_id: prepared.project_id,
            artifact_repository_id: None,
            cluster_environment_id: None,
            knowledge_base_id: None,
            folders: prepared.folders,
            reporter,
            background: BackgroundTasks::default(),
        }
    }

    async fn execute_plan(&mut self, plan: &Plan) -> Result<()> {
        for step in &plan.steps {
            if self.orch.cancel.is_cancelled() {
                warn!(target: "hoist::deploy", "Cancelled before {}", step);
                return Err(DeployError::Cancelled);
            }
            let message = self.execute_step(step).await?;
            info!(target: "hoist::deploy", "{}", message);
            self.reporter.advance(step.weight, Some(message));
        }

        // Nothing depends on these any more, but their ids belong in the
        // checkpoint before the run is reported complete.
        self.join_background(BackgroundKind::KnowledgeBase).await?;
        self.join_background(BackgroundKind::ProjectLog).await?;
        Ok(())
    }

    async fn execute_step(&mut self, step: &Step) -> Result<String> {
        match step.kind {
            StepKind::NotificationTopic => self.notification_topic(step).await,
            StepKind::Project => self.project(step).await,
            StepKind::LogGroup => self.log_group(step).await,
            StepKind::ProjectLog => self.project_log(step).await,
            StepKind::AccessPolicies => self.access_policies(step).await,
            StepKind::ArtifactRepository => self.artifact_repository(step).await,
            StepKind::ClusterEnvironment => self.cluster_environment(step).await,
            StepKind::KnowledgeBase => self.knowledge_base(step).await,
            StepKind::AdoptProject => self.adopt_project(step).await,
            StepKind::ResolveArtifactRepository => self.resolve_artifact_repository(step).await,
            StepKind::ResolveKnowledgeBase => self.resolve_knowledge_base(step).await,
            StepKind::SaveProjectManifest => self.save_project_manifest(step).await,
            _ => self.folder_step(step).await,
        }
    }

    /// Tags identifying the resource created for `slot_ref` by this run.
    pub(super) fn step_tags(&self, slot_ref: &SlotRef) -> Tags {
        let mut tags = Tags::new();
        tags.insert(TAG_RUN.to_string(), self.tag.clone());
        tags.insert(TAG_STEP.to_string(), slot_ref.path());
        tags
    }

    pub(super) fn project_id(&self) -> Result<String> {
        self.project_id.clone().ok_or_else(|| {
            DeployError::Precondition(format!(
                "Devops project {} is not available",
                self.project_name
            ))
        })
    }

    /// Id recorded for a slot an earlier step must have filled.
    pub(super) fn created_id(&self, slot_ref: &SlotRef) -> Result<String> {
        self.checkpoint
            .slot(slot_ref)
            .id()
            .map(str::to_string)
            .ok_or_else(|| {
                DeployError::Precondition(format!("{} was not provisioned", slot_ref.kind()))
            })
    }

    pub(super) fn folder_run(&self, name: &str) -> Result<&FolderRun> {
        self.folders
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| DeployError::Precondition(format!("Unknown folder {name}")))
    }

    pub(super) fn folder_run_mut(&mut self, name: &str) -> Result<&mut FolderRun> {
        self.folders
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or_else(|| DeployError::Precondition(format!("Unknown folder {name}")))
    }
}

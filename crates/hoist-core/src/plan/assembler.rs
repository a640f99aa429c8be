//! Composable step-list builders.
//!
//! Each builder returns the ordered steps of one chain; `assemble` stitches
//! them into a plan. Any branch that adds work adds it here as steps, so the
//! plan weight always matches what the runner reports.

use super::step::{Step, StepKind};
use crate::collab::{Classification, ProjectType};
use crate::error::{DeployError, Result};
use crate::types::Flavor;

/// Steps replaced by `AdoptProject` in incremental mode: notification topic,
/// project, log group, project log and access policies.
pub const ADOPTED_PROJECT_WEIGHT: u32 = 5;

/// Whether the project is set up by this run or already exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectMode {
    Fresh,
    /// Add folders to the existing project with the given id
    Incremental { project_id: String },
}

impl ProjectMode {
    pub fn is_incremental(&self) -> bool {
        matches!(self, ProjectMode::Incremental { .. })
    }
}

/// Features switching whole chains on or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    pub bypass_artifacts: bool,
    pub cluster: bool,
    pub native_pipelines: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            bypass_artifacts: false,
            cluster: false,
            native_pipelines: true,
        }
    }
}

/// Ordered steps plus the precomputed total weight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub steps: Vec<Step>,
    pub total_weight: u32,
}

impl Plan {
    pub fn from_steps(steps: Vec<Step>) -> Self {
        let total_weight = steps.iter().map(|s| s.weight).sum();
        Self {
            steps,
            total_weight,
        }
    }

    pub fn kinds_for(&self, folder: &str) -> Vec<StepKind> {
        self.steps
            .iter()
            .filter(|s| s.folder.as_deref() == Some(folder))
            .map(|s| s.kind)
            .collect()
    }

    pub fn contains(&self, kind: StepKind) -> bool {
        self.steps.iter().any(|s| s.kind == kind)
    }
}

/// Project-level prefix of a plan.
pub fn project_steps(mode: &ProjectMode, flags: FeatureFlags) -> Vec<Step> {
    let mut steps = Vec::new();
    match mode {
        ProjectMode::Fresh => {
            steps.push(Step::project(StepKind::NotificationTopic));
            steps.push(Step::project(StepKind::Project));
            steps.push(Step::project(StepKind::LogGroup));
            steps.push(Step::project(StepKind::ProjectLog));
            steps.push(Step::project(StepKind::AccessPolicies));
            steps.push(Step::project(StepKind::ArtifactRepository));
        }
        ProjectMode::Incremental { .. } => {
            steps.push(Step::project(StepKind::AdoptProject).with_weight(ADOPTED_PROJECT_WEIGHT));
            steps.push(Step::project(StepKind::ResolveArtifactRepository));
        }
    }
    if flags.cluster {
        steps.push(Step::project(StepKind::ClusterEnvironment));
    }
    steps.push(Step::project(match mode {
        ProjectMode::Fresh => StepKind::KnowledgeBase,
        ProjectMode::Incremental { .. } => StepKind::ResolveKnowledgeBase,
    }));
    steps
}

/// Binary build path: spec, artifact, pipeline and its stages.
pub fn build_chain(folder: &str, flavor: Flavor, flags: FeatureFlags) -> Vec<Step> {
    let mut steps = vec![Step::in_folder(StepKind::BuildSpec(flavor), folder)];
    if !flags.bypass_artifacts {
        steps.push(Step::in_folder(StepKind::BuildArtifact(flavor), folder));
    }
    steps.push(Step::in_folder(StepKind::BuildPipeline(flavor), folder));
    steps.push(Step::in_folder(StepKind::BuildStage(flavor), folder));
    if !flags.bypass_artifacts {
        steps.push(Step::in_folder(StepKind::ArtifactsStage(flavor), folder));
    }
    steps
}

/// Container image path of one flavor, optionally for one submodule.
pub fn image_chain(folder: &str, submodule: Option<&str>, flavor: Flavor) -> Vec<Step> {
    [
        StepKind::ContainerRepository(flavor),
        StepKind::ContainerBuildSpec(flavor),
        StepKind::ContainerArtifact(flavor),
        StepKind::ContainerPipeline(flavor),
        StepKind::ContainerBuildStage(flavor),
        StepKind::ContainerArtifactsStage(flavor),
    ]
    .into_iter()
    .map(|kind| Step::in_submodule(kind, folder, submodule))
    .collect()
}

/// Registry pull secret setup shared by every deployment of a folder.
pub fn cluster_setup(folder: &str) -> Vec<Step> {
    vec![
        Step::in_folder(StepKind::SetupSecretSpec, folder),
        Step::in_folder(StepKind::SetupSecretArtifact, folder),
    ]
}

/// ConfigMap and one deployment pipeline per image flavor.
pub fn cluster_chain(folder: &str, submodule: Option<&str>, flavors: &[Flavor]) -> Vec<Step> {
    let mut kinds = vec![StepKind::ConfigMapSpec, StepKind::ConfigMapArtifact];
    for &flavor in flavors {
        kinds.extend([
            StepKind::DeployConfigSpec(flavor),
            StepKind::DeployConfigArtifact(flavor),
            StepKind::DeployPipeline(flavor),
            StepKind::SetupSecretStage(flavor),
            StepKind::ApplyConfigMapStage(flavor),
            StepKind::DeployStage(flavor),
        ]);
    }
    kinds
        .into_iter()
        .map(|kind| Step::in_submodule(kind, folder, submodule))
        .collect()
}

/// Repository population and configuration persistence closing a folder.
pub fn folder_tail(folder: &str) -> Vec<Step> {
    vec![
        Step::in_folder(StepKind::PopulateRepository, folder),
        Step::in_folder(StepKind::SaveFolderManifest, folder),
        Step::in_folder(StepKind::SaveServicesConfig, folder),
    ]
}

/// Build flavors a folder supports under the given flags.
pub fn build_flavors(classification: &Classification, flags: FeatureFlags) -> Vec<Flavor> {
    let mut flavors = Vec::new();
    if classification.has_jvm_path() {
        flavors.push(Flavor::Jvm);
    }
    if flags.native_pipelines && classification.has_native_path() {
        flavors.push(Flavor::Native);
    }
    flavors
}

/// All steps of one folder, keyed by its project type.
pub fn folder_steps(
    folder: &str,
    classification: &Classification,
    flags: FeatureFlags,
) -> Result<Vec<Step>> {
    let flavors = build_flavors(classification, flags);
    if flavors.is_empty() {
        return Err(DeployError::Precondition(format!(
            "Folder {folder} has no resolvable build command and artifact location"
        )));
    }

    let mut steps = vec![Step::in_folder(StepKind::CodeRepository, folder)];
    for &flavor in &flavors {
        steps.extend(build_chain(folder, flavor, flags));
    }

    match classification.project_type {
        ProjectType::Generic | ProjectType::Framework => {
            for &flavor in &flavors {
                steps.extend(image_chain(folder, None, flavor));
            }
            if flags.cluster {
                steps.extend(cluster_setup(folder));
                steps.extend(cluster_chain(folder, None, &flavors));
            }
        }
        ProjectType::MultiModule => {
            if classification.submodules.is_empty() {
                return Err(DeployError::Precondition(format!(
                    "Folder {folder} has no deployable submodule"
                )));
            }
            for submodule in &classification.submodules {
                for &flavor in &flavors {
                    steps.extend(image_chain(folder, Some(submodule), flavor));
                }
            }
            if flags.cluster {
                steps.extend(cluster_setup(folder));
                for submodule in &classification.submodules {
                    steps.extend(cluster_chain(folder, Some(submodule), &flavors));
                }
            }
        }
    }

    steps.extend(folder_tail(folder));
    Ok(steps)
}

/// Compose the full plan for a run.
pub fn assemble(
    mode: &ProjectMode,
    flags: FeatureFlags,
    folders: &[(String, Classification)],
) -> Result<Plan> {
    if folders.is_empty() {
        return Err(DeployError::Precondition(
            "No folders selected for deployment".to_string(),
        ));
    }
    let mut steps = project_steps(mode, flags);
    for (name, classification) in folders {
        steps.extend(folder_steps(name, classification, flags)?);
    }
    steps.push(Step::project(StepKind::SaveProjectManifest));
    Ok(Plan::from_steps(steps))
}

//! Step descriptors.

use std::fmt;

use crate::checkpoint::{ProjectField, SlotKey, SlotRef};
use crate::types::Flavor;

/// Every kind of unit of work a deployment can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    NotificationTopic,
    Project,
    LogGroup,
    ProjectLog,
    AccessPolicies,
    ArtifactRepository,
    ClusterEnvironment,
    KnowledgeBase,
    /// Incremental mode: take over an existing project instead of setting one up
    AdoptProject,
    ResolveArtifactRepository,
    ResolveKnowledgeBase,

    CodeRepository,
    BuildSpec(Flavor),
    BuildArtifact(Flavor),
    BuildPipeline(Flavor),
    BuildStage(Flavor),
    ArtifactsStage(Flavor),
    ContainerRepository(Flavor),
    ContainerBuildSpec(Flavor),
    ContainerArtifact(Flavor),
    ContainerPipeline(Flavor),
    ContainerBuildStage(Flavor),
    ContainerArtifactsStage(Flavor),
    SetupSecretSpec,
    SetupSecretArtifact,
    ConfigMapSpec,
    ConfigMapArtifact,
    DeployConfigSpec(Flavor),
    DeployConfigArtifact(Flavor),
    DeployPipeline(Flavor),
    SetupSecretStage(Flavor),
    ApplyConfigMapStage(Flavor),
    DeployStage(Flavor),
    PopulateRepository,
    SaveFolderManifest,
    SaveServicesConfig,

    SaveProjectManifest,
}

impl StepKind {
    /// Folder-scoped checkpoint key of the resource this step provisions.
    pub fn slot_key(self) -> Option<SlotKey> {
        Some(match self {
            StepKind::BuildArtifact(f) => SlotKey::BuildArtifact(f),
            StepKind::BuildPipeline(f) => SlotKey::BuildPipeline(f),
            StepKind::BuildStage(f) => SlotKey::BuildStage(f),
            StepKind::ArtifactsStage(f) => SlotKey::ArtifactsStage(f),
            StepKind::ContainerRepository(f) => SlotKey::ContainerRepository(f),
            StepKind::ContainerArtifact(f) => SlotKey::ContainerArtifact(f),
            StepKind::ContainerPipeline(f) => SlotKey::ContainerPipeline(f),
            StepKind::ContainerBuildStage(f) => SlotKey::ContainerBuildStage(f),
            StepKind::ContainerArtifactsStage(f) => SlotKey::ContainerArtifactsStage(f),
            StepKind::SetupSecretArtifact => SlotKey::SetupSecretArtifact,
            StepKind::ConfigMapArtifact => SlotKey::ConfigMapArtifact,
            StepKind::DeployConfigArtifact(f) => SlotKey::DeployConfigArtifact(f),
            StepKind::DeployPipeline(f) => SlotKey::DeployPipeline(f),
            StepKind::SetupSecretStage(f) => SlotKey::SetupSecretStage(f),
            StepKind::ApplyConfigMapStage(f) => SlotKey::ApplyConfigMapStage(f),
            StepKind::DeployStage(f) => SlotKey::DeployStage(f),
            _ => return None,
        })
    }

    fn project_field(self) -> Option<ProjectField> {
        Some(match self {
            StepKind::NotificationTopic => ProjectField::NotificationTopic,
            StepKind::Project => ProjectField::Project,
            StepKind::LogGroup => ProjectField::LogGroup,
            StepKind::ProjectLog => ProjectField::ProjectLog,
            StepKind::ArtifactRepository | StepKind::ResolveArtifactRepository => {
                ProjectField::ArtifactRepository
            }
            StepKind::ClusterEnvironment => ProjectField::ClusterEnvironment,
            StepKind::KnowledgeBase | StepKind::ResolveKnowledgeBase => {
                ProjectField::KnowledgeBase
            }
            StepKind::SaveProjectManifest => ProjectField::ProjectManifest,
            _ => return None,
        })
    }

    /// Whether the step is part of the project-level prefix/suffix of a plan.
    pub fn is_project_level(self) -> bool {
        self.project_field().is_some()
            || matches!(self, StepKind::AccessPolicies | StepKind::AdoptProject)
    }

    pub fn describe(self) -> String {
        match self {
            StepKind::NotificationTopic => "notification topic".to_string(),
            StepKind::Project => "devops project".to_string(),
            StepKind::LogGroup => "log group".to_string(),
            StepKind::ProjectLog => "project log".to_string(),
            StepKind::AccessPolicies => "access policies".to_string(),
            StepKind::ArtifactRepository => "artifact repository".to_string(),
            StepKind::ClusterEnvironment => "cluster environment".to_string(),
            StepKind::KnowledgeBase => "knowledge base".to_string(),
            StepKind::AdoptProject => "existing devops project".to_string(),
            StepKind::ResolveArtifactRepository => "existing artifact repository".to_string(),
            StepKind::ResolveKnowledgeBase => "existing knowledge base".to_string(),
            StepKind::CodeRepository => "source code repository".to_string(),
            StepKind::BuildSpec(f) => format!("{} build spec", f.binary_label()),
            StepKind::BuildArtifact(f) => format!("{} artifact", f.binary_label()),
            StepKind::BuildPipeline(f) => format!("build pipeline for {}", f.binary_label()),
            StepKind::BuildStage(f) => format!("build stage for {}", f.binary_label()),
            StepKind::ArtifactsStage(f) => format!("artifacts stage for {}", f.binary_label()),
            StepKind::ContainerRepository(f) => {
                format!("container repository for {} image", f.image_label())
            }
            StepKind::ContainerBuildSpec(f) => format!("{} image build spec", f.image_label()),
            StepKind::ContainerArtifact(f) => format!("{} image artifact", f.image_label()),
            StepKind::ContainerPipeline(f) => {
                format!("build pipeline for {} image", f.image_label())
            }
            StepKind::ContainerBuildStage(f) => {
                format!("build stage for {} image", f.image_label())
            }
            StepKind::ContainerArtifactsStage(f) => {
                format!("artifacts stage for {} image", f.image_label())
            }
            StepKind::SetupSecretSpec => "cluster setup secret command spec".to_string(),
            StepKind::SetupSecretArtifact => "cluster setup secret command artifact".to_string(),
            StepKind::ConfigMapSpec => "cluster ConfigMap spec".to_string(),
            StepKind::ConfigMapArtifact => "cluster ConfigMap artifact".to_string(),
            StepKind::DeployConfigSpec(f) => {
                format!("{} deployment configuration spec", f.image_label())
            }
            StepKind::DeployConfigArtifact(f) => {
                format!("{} deployment configuration artifact", f.image_label())
            }
            StepKind::DeployPipeline(f) => format!("{} deployment pipeline", f.image_label()),
            StepKind::SetupSecretStage(f) => {
                format!("setup secret stage of {} deployment", f.image_label())
            }
            StepKind::ApplyConfigMapStage(f) => {
                format!("ConfigMap stage of {} deployment", f.image_label())
            }
            StepKind::DeployStage(f) => format!("deploy stage of {} deployment", f.image_label()),
            StepKind::PopulateRepository => "source code repository content".to_string(),
            StepKind::SaveFolderManifest => "list of generated resources".to_string(),
            StepKind::SaveServicesConfig => "services configuration".to_string(),
            StepKind::SaveProjectManifest => "list of generated project resources".to_string(),
        }
    }
}

/// One entry of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    pub folder: Option<String>,
    pub submodule: Option<String>,
    /// Progress units this step accounts for
    pub weight: u32,
}

impl Step {
    pub fn project(kind: StepKind) -> Self {
        Self {
            kind,
            folder: None,
            submodule: None,
            weight: 1,
        }
    }

    pub fn in_folder(kind: StepKind, folder: &str) -> Self {
        Self {
            kind,
            folder: Some(folder.to_string()),
            submodule: None,
            weight: 1,
        }
    }

    pub fn in_submodule(kind: StepKind, folder: &str, submodule: Option<&str>) -> Self {
        Self {
            kind,
            folder: Some(folder.to_string()),
            submodule: submodule.map(str::to_string),
            weight: 1,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Checkpoint slot written by this step, if it provisions a resource.
    pub fn slot_ref(&self) -> Option<SlotRef> {
        if let Some(field) = self.kind.project_field() {
            return Some(SlotRef::Project(field));
        }
        let folder = self.folder.as_deref()?;
        match self.kind {
            StepKind::CodeRepository => Some(SlotRef::CodeRepository {
                folder: folder.to_string(),
            }),
            StepKind::SaveFolderManifest => Some(SlotRef::FolderManifest {
                folder: folder.to_string(),
            }),
            kind => kind
                .slot_key()
                .map(|key| SlotRef::scoped(folder, self.submodule.as_deref(), key)),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.kind.describe())?;
        match (&self.folder, &self.submodule) {
            (Some(folder), Some(sub)) => write!(f, " for {sub} of {folder}"),
            (Some(folder), None) => write!(f, " for {folder}"),
            _ => Ok(()),
        }
    }
}

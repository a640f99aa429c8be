//! Shared core types used across the checkpoint, platform and plan layers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Free-form tags attached to every created resource.
pub type Tags = BTreeMap<String, String>;

/// Tag carrying the run tag of the deployment that created a resource.
pub const TAG_RUN: &str = "hoist_deployID";
/// Tag carrying the checkpoint slot key of the step that created a resource.
pub const TAG_STEP: &str = "hoist_step";
/// Tag linking a resource to its devops project.
pub const TAG_PROJECT: &str = "hoist_projectID";
/// Tag linking a resource to its code repository.
pub const TAG_CODE_REPO: &str = "hoist_codeRepoID";
/// Present on code repositories until their initial push succeeded.
pub const TAG_INCOMPLETE: &str = "hoist_deployIncomplete";
/// Marks the inline artifacts holding generated-resource manifests.
pub const TAG_RESOURCES_LIST: &str = "hoist_resourcesList";

/// Remote resource kinds provisioned (or looked up) by a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    NotificationTopic,
    Project,
    LogGroup,
    Log,
    ArtifactRepository,
    ClusterEnvironment,
    KnowledgeBase,
    CodeRepository,
    DeployArtifact,
    BuildPipeline,
    BuildStage,
    DeployPipeline,
    DeployStage,
    ContainerRepository,
}

impl ResourceKind {
    /// Human-readable name used in progress messages and errors.
    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::NotificationTopic => "notification topic",
            ResourceKind::Project => "devops project",
            ResourceKind::LogGroup => "log group",
            ResourceKind::Log => "log",
            ResourceKind::ArtifactRepository => "artifact repository",
            ResourceKind::ClusterEnvironment => "cluster environment",
            ResourceKind::KnowledgeBase => "knowledge base",
            ResourceKind::CodeRepository => "source code repository",
            ResourceKind::DeployArtifact => "artifact",
            ResourceKind::BuildPipeline => "build pipeline",
            ResourceKind::BuildStage => "build pipeline stage",
            ResourceKind::DeployPipeline => "deployment pipeline",
            ResourceKind::DeployStage => "deployment pipeline stage",
            ResourceKind::ContainerRepository => "container repository",
        }
    }

    /// Category name under which the kind is listed in generated-resource manifests.
    pub fn manifest_category(self) -> &'static str {
        match self {
            ResourceKind::NotificationTopic => "notificationTopics",
            ResourceKind::Project => "projects",
            ResourceKind::LogGroup => "logGroups",
            ResourceKind::Log => "logs",
            ResourceKind::ArtifactRepository => "artifactRepositories",
            ResourceKind::ClusterEnvironment => "deployEnvironments",
            ResourceKind::KnowledgeBase => "knowledgeBases",
            ResourceKind::CodeRepository => "codeRepositories",
            ResourceKind::DeployArtifact => "artifacts",
            ResourceKind::BuildPipeline => "buildPipelines",
            ResourceKind::BuildStage => "buildPipelineStages",
            ResourceKind::DeployPipeline => "deployPipelines",
            ResourceKind::DeployStage => "deployPipelineStages",
            ResourceKind::ContainerRepository => "containerRepositories",
        }
    }

    /// Short token used when minting sandbox identifiers.
    pub fn id_token(self) -> &'static str {
        match self {
            ResourceKind::NotificationTopic => "onstopic",
            ResourceKind::Project => "devopsproject",
            ResourceKind::LogGroup => "loggroup",
            ResourceKind::Log => "log",
            ResourceKind::ArtifactRepository => "artifactrepository",
            ResourceKind::ClusterEnvironment => "devopsdeployenvironment",
            ResourceKind::KnowledgeBase => "admknowledgebase",
            ResourceKind::CodeRepository => "devopsrepository",
            ResourceKind::DeployArtifact => "devopsdeployartifact",
            ResourceKind::BuildPipeline => "devopsbuildpipeline",
            ResourceKind::BuildStage => "devopsbuildpipelinestage",
            ResourceKind::DeployPipeline => "devopsdeploypipeline",
            ResourceKind::DeployStage => "devopsdeploystage",
            ResourceKind::ContainerRepository => "containerrepo",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Build flavor: the fat JAR / JVM image path or the native executable path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    Jvm,
    Native,
}

impl Flavor {
    pub const ALL: [Flavor; 2] = [Flavor::Jvm, Flavor::Native];

    /// Token used in checkpoint keys and template names.
    pub fn token(self) -> &'static str {
        match self {
            Flavor::Jvm => "jvm",
            Flavor::Native => "native",
        }
    }

    /// Label of the binary produced by the build path.
    pub fn binary_label(self) -> &'static str {
        match self {
            Flavor::Jvm => "fat JAR",
            Flavor::Native => "native executable",
        }
    }

    /// Label of the container image produced from the binary.
    pub fn image_label(self) -> &'static str {
        match self {
            Flavor::Jvm => "JVM container",
            Flavor::Native => "native executable container",
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Identifier plus display name of a remote object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: String,
    pub name: String,
}

impl NamedRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Identity used to author commits when populating code repositories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub name: String,
    pub email: String,
}

/// Replace whitespace runs with underscores, as required for resource names.
pub fn remove_spaces(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_space = false;
    for ch in name.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

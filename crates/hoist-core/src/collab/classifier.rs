//! Folder classification.
//!
//! Decides what kind of project a folder holds and how it is built. The
//! default classifier reads a `hoist-project.toml` descriptor:
//!
//! ```toml
//! type = "framework"
//! build_command = "./gradlew build"
//! artifact = "build/libs/app-all.jar"
//! native_build_command = "./gradlew nativeCompile"
//! native_artifact = "build/native/nativeCompile/app"
//! ```

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const DESCRIPTOR_FILE: &str = "hoist-project.toml";

/// Project classification driving which steps a folder expands into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectType {
    /// Any folder with a user-supplied build command
    #[default]
    Generic,
    /// A recognized application framework with JVM and native build paths
    Framework,
    /// A recognized multi-module project with per-cloud deployable submodules
    MultiModule,
}

impl ProjectType {
    pub fn label(self) -> &'static str {
        match self {
            ProjectType::Generic => "Generic",
            ProjectType::Framework => "Framework",
            ProjectType::MultiModule => "Multi-module",
        }
    }
}

/// What the classifier found out about a folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub project_type: ProjectType,
    pub build_command: Option<String>,
    pub artifact_location: Option<String>,
    pub native_build_command: Option<String>,
    pub native_artifact_location: Option<String>,
    /// Deployable submodules of a multi-module project
    pub submodules: Vec<String>,
}

impl Classification {
    pub fn has_jvm_path(&self) -> bool {
        self.build_command.is_some() && self.artifact_location.is_some()
    }

    pub fn has_native_path(&self) -> bool {
        self.native_build_command.is_some() && self.native_artifact_location.is_some()
    }
}

pub trait FolderClassifier: Send + Sync {
    fn classify(&self, folder: &Path) -> anyhow::Result<Classification>;
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Descriptor {
    #[serde(rename = "type", default)]
    project_type: ProjectType,
    build_command: Option<String>,
    artifact: Option<String>,
    native_build_command: Option<String>,
    native_artifact: Option<String>,
    #[serde(default)]
    submodules: Vec<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Reads `<folder>/hoist-project.toml`; folders without one are generic
/// projects with nothing detected.
#[derive(Debug, Clone, Default)]
pub struct DescriptorClassifier;

impl FolderClassifier for DescriptorClassifier {
    fn classify(&self, folder: &Path) -> anyhow::Result<Classification> {
        let path = folder.join(DESCRIPTOR_FILE);
        if !path.exists() {
            return Ok(Classification::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read project descriptor: {}", path.display()))?;
        let descriptor: Descriptor = toml::from_str(&content)
            .with_context(|| format!("Failed to parse project descriptor: {}", path.display()))?;

        Ok(Classification {
            project_type: descriptor.project_type,
            build_command: non_blank(descriptor.build_command),
            artifact_location: non_blank(descriptor.artifact),
            native_build_command: non_blank(descriptor.native_build_command),
            native_artifact_location: non_blank(descriptor.native_artifact),
            submodules: descriptor
                .submodules
                .into_iter()
                .filter(|s| !s.trim().is_empty())
                .collect(),
        })
    }
}

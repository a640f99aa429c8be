//! Per-folder services configuration consumed by editors and tooling.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::templates::GENERATED_DIR;

pub const SERVICES_FILE: &str = "services.json";
pub const SERVICES_VERSION: &str = "1.0";

/// A pipeline listed in the services configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineEntry {
    pub id: String,
    pub display_name: String,
}

/// What was deployed for one folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicesConfig {
    pub version: String,
    pub profile: String,
    pub region: String,
    pub compartment_id: String,
    pub project_id: String,
    pub code_repository_id: String,
    #[serde(default)]
    pub build_pipelines: Vec<PipelineEntry>,
    #[serde(default)]
    pub deployment_pipelines: Vec<PipelineEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_base_id: Option<String>,
}

pub trait ServicesConfigWriter: Send + Sync {
    fn write(&self, folder: &Path, config: &ServicesConfig) -> anyhow::Result<PathBuf>;
}

/// Writes `<folder>/.hoist/services.json`.
#[derive(Debug, Clone, Default)]
pub struct FileServicesWriter;

impl FileServicesWriter {
    pub fn path(folder: &Path) -> PathBuf {
        folder.join(GENERATED_DIR).join(SERVICES_FILE)
    }

    pub fn load(folder: &Path) -> anyhow::Result<Option<ServicesConfig>> {
        let path = Self::path(folder);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read services config: {}", path.display()))?;
        let config = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse services config: {}", path.display()))?;
        Ok(Some(config))
    }
}

impl ServicesConfigWriter for FileServicesWriter {
    fn write(&self, folder: &Path, config: &ServicesConfig) -> anyhow::Result<PathBuf> {
        let path = Self::path(folder);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let bytes =
            serde_json::to_vec_pretty(config).context("Failed to serialize services config")?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write services config: {}", path.display()))?;
        Ok(path)
    }
}

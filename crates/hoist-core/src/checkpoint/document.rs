//! The persisted checkpoint document.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::slot::{ProjectField, ResourceSlots, Slot, SlotRef};
use crate::manifest::GeneratedResources;
use crate::types::{NamedRef, UserIdentity};

/// Checkpoint format version written by this build.
pub const CHECKPOINT_VERSION: u32 = 1;

fn default_version() -> u32 {
    CHECKPOINT_VERSION
}

/// A remote object living in a (possibly different) compartment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopedRef {
    pub id: String,
    pub compartment_id: String,
}

/// Outcome of the last run that touched the checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Pending,
    Running,
    Failed,
    Completed,
}

/// State of one deployment, mutated in place by every step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointDocument {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compartment: Option<NamedRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ScopedRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<ScopedRef>,

    #[serde(default, skip_serializing_if = "Slot::is_not_attempted")]
    pub project: Slot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(default, skip_serializing_if = "Slot::is_not_attempted")]
    pub notification_topic: Slot,
    #[serde(default, skip_serializing_if = "Slot::is_not_attempted")]
    pub log_group: Slot,
    /// Work-request handle of the project log creation
    #[serde(default, skip_serializing_if = "Slot::is_not_attempted")]
    pub project_log: Slot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_log_id: Option<String>,
    #[serde(default, skip_serializing_if = "Slot::is_not_attempted")]
    pub artifact_repository: Slot,
    #[serde(default, skip_serializing_if = "Slot::is_not_attempted")]
    pub cluster_environment: Slot,
    /// Work-request handle of the knowledge base creation
    #[serde(default, skip_serializing_if = "Slot::is_not_attempted")]
    pub knowledge_base: Slot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_base_id: Option<String>,
    #[serde(default, skip_serializing_if = "Slot::is_not_attempted")]
    pub project_manifest: Slot,

    /// Run tag attached to every resource created by the current run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserIdentity>,

    #[serde(default)]
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Project-level generated resources
    #[serde(default, skip_serializing_if = "GeneratedResources::is_empty")]
    pub manifest: GeneratedResources,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub folders: BTreeMap<String, FolderCheckpoint>,
}

/// Per-folder state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderCheckpoint {
    #[serde(default, skip_serializing_if = "Slot::is_not_attempted")]
    pub code_repository: Slot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_build_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub populated: bool,
    #[serde(default, skip_serializing_if = "ResourceSlots::is_empty")]
    pub resources: ResourceSlots,
    #[serde(default, skip_serializing_if = "GeneratedResources::is_empty")]
    pub manifest: GeneratedResources,
    #[serde(default, skip_serializing_if = "Slot::is_not_attempted")]
    pub manifest_artifact: Slot,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub submodules: BTreeMap<String, SubmoduleCheckpoint>,
}

/// Per-submodule state of a multi-module folder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmoduleCheckpoint {
    #[serde(default, skip_serializing_if = "ResourceSlots::is_empty")]
    pub resources: ResourceSlots,
}

impl CheckpointDocument {
    pub fn new() -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            profile: None,
            namespace: None,
            compartment: None,
            cluster: None,
            subnet: None,
            project: Slot::NotAttempted,
            project_name: None,
            notification_topic: Slot::NotAttempted,
            log_group: Slot::NotAttempted,
            project_log: Slot::NotAttempted,
            project_log_id: None,
            artifact_repository: Slot::NotAttempted,
            cluster_environment: Slot::NotAttempted,
            knowledge_base: Slot::NotAttempted,
            knowledge_base_id: None,
            project_manifest: Slot::NotAttempted,
            tag: None,
            user: None,
            status: RunStatus::Pending,
            updated_at: None,
            manifest: GeneratedResources::default(),
            folders: BTreeMap::new(),
        }
    }

    /// Reject documents written by a newer format.
    ///
    /// Older documents are accepted; their missing fields read as absent.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.version > CHECKPOINT_VERSION {
            anyhow::bail!(
                "Unsupported checkpoint version: {} (this build understands up to {})",
                self.version,
                CHECKPOINT_VERSION
            );
        }
        Ok(())
    }

    fn project_slot_mut(&mut self, field: ProjectField) -> &mut Slot {
        match field {
            ProjectField::NotificationTopic => &mut self.notification_topic,
            ProjectField::Project => &mut self.project,
            ProjectField::LogGroup => &mut self.log_group,
            ProjectField::ProjectLog => &mut self.project_log,
            ProjectField::ArtifactRepository => &mut self.artifact_repository,
            ProjectField::ClusterEnvironment => &mut self.cluster_environment,
            ProjectField::KnowledgeBase => &mut self.knowledge_base,
            ProjectField::ProjectManifest => &mut self.project_manifest,
        }
    }

    /// Current state of the addressed slot.
    pub fn slot(&self, slot_ref: &SlotRef) -> Slot {
        match slot_ref {
            SlotRef::Project(field) => match field {
                ProjectField::NotificationTopic => self.notification_topic.clone(),
                ProjectField::Project => self.project.clone(),
                ProjectField::LogGroup => self.log_group.clone(),
                ProjectField::ProjectLog => self.project_log.clone(),
                ProjectField::ArtifactRepository => self.artifact_repository.clone(),
                ProjectField::ClusterEnvironment => self.cluster_environment.clone(),
                ProjectField::KnowledgeBase => self.knowledge_base.clone(),
                ProjectField::ProjectManifest => self.project_manifest.clone(),
            },
            SlotRef::CodeRepository { folder } => self
                .folders
                .get(folder)
                .map(|f| f.code_repository.clone())
                .unwrap_or_default(),
            SlotRef::FolderManifest { folder } => self
                .folders
                .get(folder)
                .map(|f| f.manifest_artifact.clone())
                .unwrap_or_default(),
            SlotRef::Folder { folder, key } => self
                .folders
                .get(folder)
                .map(|f| f.resources.get(*key))
                .unwrap_or_default(),
            SlotRef::Submodule {
                folder,
                submodule,
                key,
            } => self
                .folders
                .get(folder)
                .and_then(|f| f.submodules.get(submodule))
                .map(|s| s.resources.get(*key))
                .unwrap_or_default(),
        }
    }

    /// Overwrite the addressed slot, creating folder entries as needed.
    pub fn set_slot(&mut self, slot_ref: &SlotRef, slot: Slot) {
        match slot_ref {
            SlotRef::Project(field) => *self.project_slot_mut(*field) = slot,
            SlotRef::CodeRepository { folder } => self.folder_mut(folder).code_repository = slot,
            SlotRef::FolderManifest { folder } => self.folder_mut(folder).manifest_artifact = slot,
            SlotRef::Folder { folder, key } => self.folder_mut(folder).resources.set(*key, slot),
            SlotRef::Submodule {
                folder,
                submodule,
                key,
            } => self
                .folder_mut(folder)
                .submodules
                .entry(submodule.clone())
                .or_default()
                .resources
                .set(*key, slot),
        }
    }

    pub fn folder(&self, name: &str) -> Option<&FolderCheckpoint> {
        self.folders.get(name)
    }

    pub fn folder_mut(&mut self, name: &str) -> &mut FolderCheckpoint {
        self.folders.entry(name.to_string()).or_default()
    }

    /// Every slot that is not `NotAttempted`, project-level first.
    pub fn recorded_slots(&self) -> Vec<(SlotRef, Slot)> {
        const PROJECT_FIELDS: [ProjectField; 8] = [
            ProjectField::NotificationTopic,
            ProjectField::Project,
            ProjectField::LogGroup,
            ProjectField::ProjectLog,
            ProjectField::ArtifactRepository,
            ProjectField::ClusterEnvironment,
            ProjectField::KnowledgeBase,
            ProjectField::ProjectManifest,
        ];

        let mut slots = Vec::new();
        for field in PROJECT_FIELDS {
            let slot_ref = SlotRef::Project(field);
            let slot = self.slot(&slot_ref);
            if !slot.is_not_attempted() {
                slots.push((slot_ref, slot));
            }
        }
        for (name, folder) in &self.folders {
            if !folder.code_repository.is_not_attempted() {
                slots.push((
                    SlotRef::CodeRepository {
                        folder: name.clone(),
                    },
                    folder.code_repository.clone(),
                ));
            }
            if !folder.manifest_artifact.is_not_attempted() {
                slots.push((
                    SlotRef::FolderManifest {
                        folder: name.clone(),
                    },
                    folder.manifest_artifact.clone(),
                ));
            }
            for (key, slot) in folder.resources.iter() {
                slots.push((
                    SlotRef::Folder {
                        folder: name.clone(),
                        key,
                    },
                    slot.clone(),
                ));
            }
            for (sub_name, sub) in &folder.submodules {
                for (key, slot) in sub.resources.iter() {
                    slots.push((
                        SlotRef::Submodule {
                            folder: name.clone(),
                            submodule: sub_name.clone(),
                            key,
                        },
                        slot.clone(),
                    ));
                }
            }
        }
        slots
    }

    /// Whether nothing was ever attempted against the platform.
    pub fn is_empty(&self) -> bool {
        self.recorded_slots().is_empty()
    }

    /// Manifest receiving entries for the given folder (or the project).
    pub fn manifest_mut(&mut self, folder: Option<&str>) -> &mut GeneratedResources {
        match folder {
            Some(folder) => &mut self.folder_mut(folder).manifest,
            None => &mut self.manifest,
        }
    }
}

impl Default for CheckpointDocument {
    fn default() -> Self {
        Self::new()
    }
}

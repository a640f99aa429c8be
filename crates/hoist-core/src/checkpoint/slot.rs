//! Tri-state resource slots and their addresses inside a checkpoint.
//!
//! A slot records what is known about one provisionable resource:
//! - `NotAttempted`: the step never ran (the key is absent from the document)
//! - `InProgress`: a creation was issued but never confirmed (`false` on disk)
//! - `Created(id)`: the step completed with the given identifier

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::{Flavor, ResourceKind};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Slot {
    #[default]
    NotAttempted,
    InProgress,
    Created(String),
}

impl Slot {
    /// Build a `Created` slot; an empty identifier degrades to `NotAttempted`.
    pub fn created(id: impl Into<String>) -> Self {
        let id = id.into();
        if id.is_empty() {
            Slot::NotAttempted
        } else {
            Slot::Created(id)
        }
    }

    pub fn is_not_attempted(&self) -> bool {
        matches!(self, Slot::NotAttempted)
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, Slot::InProgress)
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Slot::Created(id) => Some(id),
            _ => None,
        }
    }
}

impl Serialize for Slot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Slot::NotAttempted => serializer.serialize_none(),
            Slot::InProgress => serializer.serialize_bool(false),
            Slot::Created(id) => serializer.serialize_str(id),
        }
    }
}

impl<'de> Deserialize<'de> for Slot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            // The value itself carries no information.
            Flag(#[allow(dead_code)] bool),
            Id(String),
        }

        Ok(match Option::<Raw>::deserialize(deserializer)? {
            None => Slot::NotAttempted,
            // Any boolean means "attempted, outcome unknown".
            Some(Raw::Flag(_)) => Slot::InProgress,
            Some(Raw::Id(id)) => Slot::created(id),
        })
    }
}

/// Per-folder (or per-submodule) resource slots keyed by `SlotKey` string.
///
/// `NotAttempted` is represented by the key being absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceSlots(BTreeMap<String, Slot>);

impl ResourceSlots {
    pub fn get(&self, key: SlotKey) -> Slot {
        self.0.get(&key.as_string()).cloned().unwrap_or_default()
    }

    pub fn set(&mut self, key: SlotKey, slot: Slot) {
        let key = key.as_string();
        if slot.is_not_attempted() {
            self.0.remove(&key);
        } else {
            self.0.insert(key, slot);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Slot::is_not_attempted)
    }

    /// Iterate over recorded slots whose key parses as a known `SlotKey`.
    pub fn iter(&self) -> impl Iterator<Item = (SlotKey, &Slot)> {
        self.0
            .iter()
            .filter_map(|(key, slot)| SlotKey::parse(key).map(|key| (key, slot)))
    }
}

/// Keys of folder- and submodule-scoped resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKey {
    BuildArtifact(Flavor),
    BuildPipeline(Flavor),
    BuildStage(Flavor),
    ArtifactsStage(Flavor),
    ContainerRepository(Flavor),
    ContainerArtifact(Flavor),
    ContainerPipeline(Flavor),
    ContainerBuildStage(Flavor),
    ContainerArtifactsStage(Flavor),
    SetupSecretArtifact,
    ConfigMapArtifact,
    DeployConfigArtifact(Flavor),
    DeployPipeline(Flavor),
    SetupSecretStage(Flavor),
    ApplyConfigMapStage(Flavor),
    DeployStage(Flavor),
}

impl SlotKey {
    fn parts(self) -> (Option<Flavor>, &'static str) {
        match self {
            SlotKey::BuildArtifact(f) => (Some(f), "buildArtifact"),
            SlotKey::BuildPipeline(f) => (Some(f), "buildPipeline"),
            SlotKey::BuildStage(f) => (Some(f), "buildStage"),
            SlotKey::ArtifactsStage(f) => (Some(f), "artifactsStage"),
            SlotKey::ContainerRepository(f) => (Some(f), "containerRepository"),
            SlotKey::ContainerArtifact(f) => (Some(f), "containerArtifact"),
            SlotKey::ContainerPipeline(f) => (Some(f), "containerPipeline"),
            SlotKey::ContainerBuildStage(f) => (Some(f), "containerBuildStage"),
            SlotKey::ContainerArtifactsStage(f) => (Some(f), "containerArtifactsStage"),
            SlotKey::SetupSecretArtifact => (None, "setupSecretArtifact"),
            SlotKey::ConfigMapArtifact => (None, "configMapArtifact"),
            SlotKey::DeployConfigArtifact(f) => (Some(f), "deployConfigArtifact"),
            SlotKey::DeployPipeline(f) => (Some(f), "deployPipeline"),
            SlotKey::SetupSecretStage(f) => (Some(f), "setupSecretStage"),
            SlotKey::ApplyConfigMapStage(f) => (Some(f), "applyConfigMapStage"),
            SlotKey::DeployStage(f) => (Some(f), "deployStage"),
        }
    }

    pub fn as_string(self) -> String {
        match self.parts() {
            (Some(flavor), name) => format!("{}.{}", flavor.token(), name),
            (None, name) => name.to_string(),
        }
    }

    pub fn parse(value: &str) -> Option<SlotKey> {
        let (flavor, name) = match value.split_once('.') {
            Some(("jvm", name)) => (Some(Flavor::Jvm), name),
            Some(("native", name)) => (Some(Flavor::Native), name),
            Some(_) => return None,
            None => (None, value),
        };
        let key = match (flavor, name) {
            (Some(f), "buildArtifact") => SlotKey::BuildArtifact(f),
            (Some(f), "buildPipeline") => SlotKey::BuildPipeline(f),
            (Some(f), "buildStage") => SlotKey::BuildStage(f),
            (Some(f), "artifactsStage") => SlotKey::ArtifactsStage(f),
            (Some(f), "containerRepository") => SlotKey::ContainerRepository(f),
            (Some(f), "containerArtifact") => SlotKey::ContainerArtifact(f),
            (Some(f), "containerPipeline") => SlotKey::ContainerPipeline(f),
            (Some(f), "containerBuildStage") => SlotKey::ContainerBuildStage(f),
            (Some(f), "containerArtifactsStage") => SlotKey::ContainerArtifactsStage(f),
            (None, "setupSecretArtifact") => SlotKey::SetupSecretArtifact,
            (None, "configMapArtifact") => SlotKey::ConfigMapArtifact,
            (Some(f), "deployConfigArtifact") => SlotKey::DeployConfigArtifact(f),
            (Some(f), "deployPipeline") => SlotKey::DeployPipeline(f),
            (Some(f), "setupSecretStage") => SlotKey::SetupSecretStage(f),
            (Some(f), "applyConfigMapStage") => SlotKey::ApplyConfigMapStage(f),
            (Some(f), "deployStage") => SlotKey::DeployStage(f),
            _ => return None,
        };
        Some(key)
    }

    /// Remote kind of the resource stored under this key.
    pub fn kind(self) -> ResourceKind {
        match self {
            SlotKey::BuildArtifact(_)
            | SlotKey::ContainerArtifact(_)
            | SlotKey::SetupSecretArtifact
            | SlotKey::ConfigMapArtifact
            | SlotKey::DeployConfigArtifact(_) => ResourceKind::DeployArtifact,
            SlotKey::BuildPipeline(_) | SlotKey::ContainerPipeline(_) => {
                ResourceKind::BuildPipeline
            }
            SlotKey::BuildStage(_)
            | SlotKey::ArtifactsStage(_)
            | SlotKey::ContainerBuildStage(_)
            | SlotKey::ContainerArtifactsStage(_) => ResourceKind::BuildStage,
            SlotKey::ContainerRepository(_) => ResourceKind::ContainerRepository,
            SlotKey::DeployPipeline(_) => ResourceKind::DeployPipeline,
            SlotKey::SetupSecretStage(_)
            | SlotKey::ApplyConfigMapStage(_)
            | SlotKey::DeployStage(_) => ResourceKind::DeployStage,
        }
    }

    /// Deletion order during teardown: lower ranks are removed first.
    pub fn teardown_rank(self) -> u8 {
        match self.kind() {
            ResourceKind::DeployStage => 0,
            ResourceKind::BuildStage => 1,
            ResourceKind::DeployPipeline => 2,
            ResourceKind::BuildPipeline => 3,
            ResourceKind::DeployArtifact => 4,
            _ => 5,
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

/// Project-scoped slots stored as top-level checkpoint fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectField {
    NotificationTopic,
    Project,
    LogGroup,
    ProjectLog,
    ArtifactRepository,
    ClusterEnvironment,
    KnowledgeBase,
    ProjectManifest,
}

impl ProjectField {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectField::NotificationTopic => "notificationTopic",
            ProjectField::Project => "project",
            ProjectField::LogGroup => "logGroup",
            ProjectField::ProjectLog => "projectLogWorkRequest",
            ProjectField::ArtifactRepository => "artifactsRepository",
            ProjectField::ClusterEnvironment => "clusterEnvironment",
            ProjectField::KnowledgeBase => "knowledgeBaseWorkRequest",
            ProjectField::ProjectManifest => "projectManifest",
        }
    }

    pub fn kind(self) -> ResourceKind {
        match self {
            ProjectField::NotificationTopic => ResourceKind::NotificationTopic,
            ProjectField::Project => ResourceKind::Project,
            ProjectField::LogGroup => ResourceKind::LogGroup,
            ProjectField::ProjectLog => ResourceKind::Log,
            ProjectField::ArtifactRepository => ResourceKind::ArtifactRepository,
            ProjectField::ClusterEnvironment => ResourceKind::ClusterEnvironment,
            ProjectField::KnowledgeBase => ResourceKind::KnowledgeBase,
            ProjectField::ProjectManifest => ResourceKind::DeployArtifact,
        }
    }
}

/// Address of one slot inside a checkpoint document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SlotRef {
    Project(ProjectField),
    CodeRepository {
        folder: String,
    },
    FolderManifest {
        folder: String,
    },
    Folder {
        folder: String,
        key: SlotKey,
    },
    Submodule {
        folder: String,
        submodule: String,
        key: SlotKey,
    },
}

impl SlotRef {
    /// Resolve a folder-scoped key, descending into the submodule when given.
    pub fn scoped(folder: &str, submodule: Option<&str>, key: SlotKey) -> Self {
        match submodule {
            Some(submodule) => SlotRef::Submodule {
                folder: folder.to_string(),
                submodule: submodule.to_string(),
                key,
            },
            None => SlotRef::Folder {
                folder: folder.to_string(),
                key,
            },
        }
    }

    /// Folder owning the slot; `None` for project-level slots.
    pub fn folder(&self) -> Option<&str> {
        match self {
            SlotRef::Project(_) => None,
            SlotRef::CodeRepository { folder }
            | SlotRef::FolderManifest { folder }
            | SlotRef::Folder { folder, .. }
            | SlotRef::Submodule { folder, .. } => Some(folder),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            SlotRef::Project(field) => field.kind(),
            SlotRef::CodeRepository { .. } => ResourceKind::CodeRepository,
            SlotRef::FolderManifest { .. } => ResourceKind::DeployArtifact,
            SlotRef::Folder { key, .. } | SlotRef::Submodule { key, .. } => key.kind(),
        }
    }

    /// Stable path used as the step tag so unconfirmed creations can be found again.
    pub fn path(&self) -> String {
        match self {
            SlotRef::Project(field) => field.as_str().to_string(),
            SlotRef::CodeRepository { folder } => format!("repositories/{folder}/codeRepository"),
            SlotRef::FolderManifest { folder } => format!("repositories/{folder}/resourcesList"),
            SlotRef::Folder { folder, key } => format!("repositories/{folder}/{key}"),
            SlotRef::Submodule {
                folder,
                submodule,
                key,
            } => format!("repositories/{folder}/subs/{submodule}/{key}"),
        }
    }
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Holder {
        #[serde(default, skip_serializing_if = "Slot::is_not_attempted")]
        slot: Slot,
    }

    #[test]
    fn absent_null_and_empty_are_not_attempted() {
        for json in [r#"{}"#, r#"{"slot":null}"#, r#"{"slot":""}"#] {
            let holder: Holder = serde_json::from_str(json).unwrap();
            assert_eq!(holder.slot, Slot::NotAttempted, "input {json}");
        }
    }

    #[test]
    fn false_sentinel_is_in_progress() {
        let holder: Holder = serde_json::from_str(r#"{"slot":false}"#).unwrap();
        assert_eq!(holder.slot, Slot::InProgress);
        assert_eq!(serde_json::to_string(&holder).unwrap(), r#"{"slot":false}"#);
    }

    #[test]
    fn identifier_is_created_and_not_attempted_is_omitted() {
        let holder: Holder = serde_json::from_str(r#"{"slot":"ocid1.x"}"#).unwrap();
        assert_eq!(holder.slot, Slot::Created("ocid1.x".to_string()));

        let empty = Holder {
            slot: Slot::NotAttempted,
        };
        assert_eq!(serde_json::to_string(&empty).unwrap(), "{}");
    }

    #[test]
    fn slot_keys_parse_back() {
        let keys = [
            SlotKey::BuildArtifact(Flavor::Jvm),
            SlotKey::ContainerArtifactsStage(Flavor::Native),
            SlotKey::SetupSecretArtifact,
            SlotKey::DeployStage(Flavor::Jvm),
        ];
        for key in keys {
            assert_eq!(SlotKey::parse(&key.as_string()), Some(key));
        }
        assert_eq!(SlotKey::parse("wasm.buildArtifact"), None);
        assert_eq!(SlotKey::parse("unknown"), None);
    }

    #[test]
    fn resource_slots_drop_not_attempted_keys() {
        let mut slots = ResourceSlots::default();
        slots.set(SlotKey::BuildPipeline(Flavor::Jvm), Slot::InProgress);
        assert!(!slots.is_empty());
        slots.set(SlotKey::BuildPipeline(Flavor::Jvm), Slot::NotAttempted);
        assert!(slots.is_empty());
        assert_eq!(serde_json::to_string(&slots).unwrap(), "{}");
    }
}

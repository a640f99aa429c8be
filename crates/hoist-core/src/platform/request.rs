//! Request and response shapes exchanged with the platform.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{ResourceKind, Tags};

/// Property carrying the inline content of generic artifacts.
pub const CONTENT_PROPERTY: &str = "content";

/// A creation call for any resource kind.
///
/// `parent` is the scope the resource lives in: a compartment for
/// compartment-level resources, the project for project-level ones, the
/// pipeline for stages and the log group for logs.
///
/// `references` holds the ids of other resources this one is wired to, such
/// as the code repository a build stage checks out. The platform keeps them
/// on the resource so a resumed run can tell when a dependency was replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub kind: ResourceKind,
    pub display_name: String,
    pub description: String,
    pub parent: String,
    pub properties: BTreeMap<String, String>,
    pub references: BTreeMap<String, String>,
    pub tags: Tags,
}

impl CreateRequest {
    pub fn new(kind: ResourceKind, display_name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            kind,
            display_name: display_name.into(),
            description: String::new(),
            parent: parent.into(),
            properties: BTreeMap::new(),
            references: BTreeMap::new(),
            tags: Tags::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn property(mut self, key: &str, value: impl Into<String>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn reference(mut self, key: &str, id: impl Into<String>) -> Self {
        self.references.insert(key.to_string(), id.into());
        self
    }

    pub fn tag(mut self, key: &str, value: impl Into<String>) -> Self {
        self.tags.insert(key.to_string(), value.into());
        self
    }

    pub fn tags(mut self, tags: &Tags) -> Self {
        self.tags
            .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }
}

/// What a creation call returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The resource exists (possibly still provisioning) under `id`
    Resource(CreatedResource),
    /// The platform accepted a long-running work request
    Pending { handle: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedResource {
    pub id: String,
    pub display_name: String,
    /// Write endpoint for code repositories
    pub endpoint: Option<String>,
}

/// Lifecycle state reported by the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceState {
    Creating,
    Active,
    Failed,
    Deleted,
}

/// A resource as seen by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub id: String,
    pub kind: ResourceKind,
    pub display_name: String,
    pub parent: String,
    pub state: ResourceState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub references: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: Tags,
}

impl ResourceInfo {
    /// Whether the resource can be reused by a resumed run.
    pub fn is_usable(&self) -> bool {
        matches!(self.state, ResourceState::Creating | ResourceState::Active)
    }

    /// Names of the references whose ids differ from `expected`.
    pub fn stale_references(&self, expected: &BTreeMap<String, String>) -> Vec<String> {
        expected
            .iter()
            .filter(|(key, id)| self.references.get(*key) != Some(*id))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

/// In-place modification of an existing resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceUpdate {
    /// Replaces the complete tag set when given
    pub tags: Option<Tags>,
    /// Replaces the inline content of generic artifacts when given
    pub content: Option<String>,
}

/// Access policies required by build and deploy pipelines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRequest {
    pub compartment_id: String,
    pub cluster_compartment_id: Option<String>,
    pub subnet_compartment_id: Option<String>,
}

/// State of a long-running work request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkRequestStatus {
    Pending,
    Succeeded { resource_id: String },
    Failed { reason: String },
}

/// A cluster usable as a deployment target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    pub id: String,
    pub name: String,
    pub compartment_id: String,
    pub subnet_id: String,
    pub subnet_compartment_id: String,
}

//! Generated-resources manifests.
//!
//! An append-only audit list of `{id, originalName}` pairs grouped by
//! resource category. Manifests are kept inside the checkpoint so they
//! accumulate across resumed runs, and are uploaded as inline artifacts on
//! the project for cleanup tooling. The orchestrator never reads them back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::ResourceKind;

/// One generated resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedResource {
    pub id: String,
    pub original_name: String,
}

/// Generated resources grouped by manifest category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeneratedResources(BTreeMap<String, Vec<GeneratedResource>>);

impl GeneratedResources {
    /// Record a created resource. Recording the same id twice is a no-op.
    pub fn record(&mut self, kind: ResourceKind, id: &str, original_name: &str) {
        let entries = self
            .0
            .entry(kind.manifest_category().to_string())
            .or_default();
        if entries.iter().any(|entry| entry.id == id) {
            return;
        }
        entries.push(GeneratedResource {
            id: id.to_string(),
            original_name: original_name.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn category(&self, kind: ResourceKind) -> &[GeneratedResource] {
        self.0
            .get(kind.manifest_category())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Render the manifest as the JSON body of an inline artifact.
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

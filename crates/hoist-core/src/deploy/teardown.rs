//! Removal of everything a deployment created.
//!
//! Resources are deleted children first so the platform never rejects a
//! deletion because of live dependents. Each slot is cleared and flushed as
//! soon as its resource is gone, so an interrupted teardown can be resumed.

use std::sync::Arc;

use tracing::{info, warn};

use crate::checkpoint::{Checkpoint, CheckpointDocument, ProjectField, Slot, SlotRef};
use crate::collab::{AuthProvider, Authentication};
use crate::error::{DeployError, PlatformError, Result};
use crate::platform::{ResourceDirectory, ResourceFactory};
use crate::types::{ResourceKind, TAG_RUN, TAG_STEP, Tags};

/// What a teardown removed and what it could not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Resources deleted by their recorded id
    pub deleted: Vec<String>,
    /// Unconfirmed creations found by their tags and deleted
    pub swept: Vec<String>,
    pub failed: Vec<String>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Teardown {
    directory: Arc<dyn ResourceDirectory>,
    factory: Arc<dyn ResourceFactory>,
    auth: Arc<dyn AuthProvider>,
}

/// One resource slated for deletion.
struct Target {
    slot_ref: SlotRef,
    /// Recorded id; `None` when only the tags can locate it
    id: Option<String>,
    rank: u8,
}

impl Teardown {
    pub fn new(
        directory: Arc<dyn ResourceDirectory>,
        factory: Arc<dyn ResourceFactory>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        Self {
            directory,
            factory,
            auth,
        }
    }

    /// Delete every resource recorded in `checkpoint`.
    ///
    /// The checkpoint file is removed once nothing is left to delete.
    pub async fn run(&self, checkpoint: &mut Checkpoint) -> Result<TeardownReport> {
        let auth = self
            .auth
            .authenticate(checkpoint.doc().profile.as_deref())
            .await
            .map_err(|e| DeployError::collaborator("Failed to authenticate", e))?;
        if let Some(problem) = &auth.problem {
            return Err(DeployError::Precondition(format!(
                "Authentication failed: {problem}"
            )));
        }

        let mut report = TeardownReport::default();
        for target in targets(checkpoint.doc()) {
            let kind = target.slot_ref.kind();
            let removed = match &target.id {
                Some(id) => self.delete(&auth, kind, id, &mut report).await,
                None => false,
            };
            let removed = removed || self.sweep(&auth, checkpoint.doc(), &target, &mut report).await;
            if removed {
                clear(checkpoint, &target.slot_ref)?;
            }
        }

        if report.is_clean() {
            // Shared resources stay; forget them with the rest.
            checkpoint
                .store()
                .remove()
                .map_err(DeployError::Checkpoint)?;
            *checkpoint.doc_mut() = CheckpointDocument::new();
            info!(
                target: "hoist::teardown",
                deleted = report.deleted.len(),
                swept = report.swept.len(),
                "Teardown completed"
            );
        } else {
            checkpoint.persist()?;
            warn!(
                target: "hoist::teardown",
                failed = report.failed.len(),
                "Teardown left resources behind; run it again to retry"
            );
        }
        Ok(report)
    }

    /// Delete by id. A resource that is already gone counts as deleted.
    async fn delete(
        &self,
        auth: &Authentication,
        kind: ResourceKind,
        id: &str,
        report: &mut TeardownReport,
    ) -> bool {
        match self.factory.delete(auth, kind, id).await {
            Ok(()) => {
                info!(target: "hoist::teardown", "Deleted {} {}", kind, id);
                report.deleted.push(format!("{kind} {id}"));
                true
            }
            Err(PlatformError::NotFound { .. }) => {
                info!(target: "hoist::teardown", "{} {} is already gone", kind, id);
                true
            }
            Err(e) => {
                warn!(target: "hoist::teardown", "Failed to delete {} {}: {}", kind, id, e);
                false
            }
        }
    }

    /// Look the resource up by run tag and step key and delete what is found.
    async fn sweep(
        &self,
        auth: &Authentication,
        doc: &CheckpointDocument,
        target: &Target,
        report: &mut TeardownReport,
    ) -> bool {
        let kind = target.slot_ref.kind();
        let failed = format!("{} {}", kind, target.slot_ref);
        let Some(tag) = &doc.tag else {
            report.failed.push(failed);
            return false;
        };

        let mut tags = Tags::new();
        tags.insert(TAG_RUN.to_string(), tag.clone());
        tags.insert(TAG_STEP.to_string(), target.slot_ref.path());
        let found = match self.directory.find_tagged(auth, kind, &tags).await {
            Ok(found) => found,
            Err(e) => {
                warn!(target: "hoist::teardown", "Lookup of {} failed: {}", target.slot_ref, e);
                report.failed.push(failed);
                return false;
            }
        };

        let mut clean = true;
        for resource in found {
            if target.id.as_deref() == Some(resource.id.as_str()) {
                // Already tried by id and refused.
                clean = false;
                continue;
            }
            match self.factory.delete(auth, kind, &resource.id).await {
                Ok(()) | Err(PlatformError::NotFound { .. }) => {
                    info!(target: "hoist::teardown", "Swept {} {}", kind, resource.id);
                    report.swept.push(format!("{kind} {}", resource.id));
                }
                Err(e) => {
                    warn!(target: "hoist::teardown", "Failed to delete {} {}: {}", kind, resource.id, e);
                    clean = false;
                }
            }
        }
        if !clean {
            report.failed.push(failed);
        }
        clean
    }
}

fn clear(checkpoint: &mut Checkpoint, slot_ref: &SlotRef) -> Result<()> {
    let doc = checkpoint.doc_mut();
    match slot_ref {
        SlotRef::Project(ProjectField::ProjectLog) => doc.project_log_id = None,
        SlotRef::Project(ProjectField::KnowledgeBase) => doc.knowledge_base_id = None,
        _ => {}
    }
    checkpoint.set(slot_ref, Slot::NotAttempted)
}

/// Deletion order: lower ranks go first.
fn project_rank(field: ProjectField) -> u8 {
    match field {
        ProjectField::ProjectManifest => 7,
        ProjectField::ClusterEnvironment => 7,
        ProjectField::ProjectLog => 8,
        ProjectField::KnowledgeBase => 8,
        ProjectField::ArtifactRepository => 8,
        _ => 9,
    }
}

/// Everything the checkpoint recorded, minus shared compartment resources,
/// ordered children first.
fn targets(doc: &CheckpointDocument) -> Vec<Target> {
    let mut targets: Vec<Target> = doc
        .recorded_slots()
        .into_iter()
        .filter_map(|(slot_ref, slot)| {
            let rank = match &slot_ref {
                SlotRef::Project(ProjectField::NotificationTopic | ProjectField::LogGroup) => {
                    return None;
                }
                SlotRef::Project(field) => project_rank(*field),
                SlotRef::CodeRepository { .. } => 6,
                SlotRef::FolderManifest { .. } => 4,
                SlotRef::Folder { key, .. } | SlotRef::Submodule { key, .. } => {
                    key.teardown_rank()
                }
            };
            // Background slots hold a work-request handle, not the resource id.
            let id = match &slot_ref {
                SlotRef::Project(ProjectField::ProjectLog) => doc.project_log_id.clone(),
                SlotRef::Project(ProjectField::KnowledgeBase) => doc.knowledge_base_id.clone(),
                _ => slot.id().map(str::to_string),
            };
            Some(Target { slot_ref, id, rank })
        })
        .collect();
    targets.sort_by_key(|t| t.rank);
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::SlotKey;
    use crate::types::Flavor;

    #[test]
    fn targets_skip_shared_resources_and_put_the_project_last() {
        let mut doc = CheckpointDocument::new();
        doc.notification_topic = Slot::created("topic");
        doc.log_group = Slot::created("group");
        doc.project = Slot::created("project");
        doc.knowledge_base = Slot::created("wr-1");
        doc.knowledge_base_id = Some("kb".to_string());
        doc.set_slot(
            &SlotRef::CodeRepository {
                folder: "app".to_string(),
            },
            Slot::created("repo"),
        );
        doc.set_slot(
            &SlotRef::scoped("app", None, SlotKey::BuildPipeline(Flavor::Jvm)),
            Slot::created("pipeline"),
        );
        doc.set_slot(
            &SlotRef::scoped("app", None, SlotKey::BuildStage(Flavor::Jvm)),
            Slot::InProgress,
        );

        let ordered = targets(&doc);
        let ids: Vec<Option<&str>> = ordered.iter().map(|t| t.id.as_deref()).collect();
        assert_eq!(
            ids,
            vec![None, Some("pipeline"), Some("repo"), Some("kb"), Some("project")]
        );
    }
}

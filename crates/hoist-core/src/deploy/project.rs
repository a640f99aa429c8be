//! Project-level steps.

use tracing::{info, warn};

use super::background::BackgroundKind;
use super::protocol::{ConflictPolicy, Resolved};
use super::runner::Run;
use crate::checkpoint::{ProjectField, Slot, SlotRef};
use crate::error::{DeployError, Result};
use crate::naming;
use crate::platform::{CONTENT_PROPERTY, CreateRequest, PolicyRequest, ResourceUpdate};
use crate::plan::Step;
use crate::types::{ResourceKind, TAG_PROJECT, TAG_RESOURCES_LIST, Tags};

impl Run<'_> {
    /// Adopt a compartment-wide resource by name before creating it.
    async fn ensure_shared(
        &mut self,
        field: ProjectField,
        name: &str,
        description: &str,
    ) -> Result<Resolved> {
        let slot_ref = SlotRef::Project(field);
        if let Some(existing) = self.reuse(&slot_ref).await? {
            return Ok(existing);
        }
        let kind = slot_ref.kind();
        match self
            .orch
            .directory
            .find_named(&self.auth, kind, &self.compartment.id, name)
            .await
        {
            Ok(Some(info)) => {
                info!(target: "hoist::deploy", "Using existing {} {}", kind, info.display_name);
                self.checkpoint
                    .set(&slot_ref, Slot::created(info.id.clone()))?;
                return Ok(Resolved {
                    id: info.id,
                    display_name: info.display_name,
                    endpoint: None,
                    reused: true,
                });
            }
            Ok(None) => {}
            Err(e) => warn!(target: "hoist::deploy", "Lookup of {} {} failed: {}", kind, name, e),
        }
        let request = CreateRequest::new(kind, name, self.compartment.id.clone())
            .description(description);
        self.create(&slot_ref, request, ConflictPolicy::Fail).await
    }

    pub(super) async fn notification_topic(&mut self, step: &Step) -> Result<String> {
        let resolved = self
            .ensure_shared(
                ProjectField::NotificationTopic,
                naming::NOTIFICATION_TOPIC_NAME,
                "Notifications of devops projects created by hoist",
            )
            .await?;
        Ok(resolved.message(step))
    }

    pub(super) async fn project(&mut self, step: &Step) -> Result<String> {
        let topic_id = self.created_id(&SlotRef::Project(ProjectField::NotificationTopic))?;
        let request = CreateRequest::new(
            ResourceKind::Project,
            self.project_name.clone(),
            self.compartment.id.clone(),
        )
        .description("Devops project created by hoist")
        .property("notification_topic_id", topic_id);

        let resolved = self
            .ensure(
                &SlotRef::Project(ProjectField::Project),
                request,
                ConflictPolicy::Prompt,
            )
            .await?;
        self.project_id = Some(resolved.id.clone());
        if self.project_name != resolved.display_name {
            self.project_name = resolved.display_name.clone();
        }
        if self.checkpoint.doc().project_name.as_deref() != Some(self.project_name.as_str()) {
            self.checkpoint.doc_mut().project_name = Some(self.project_name.clone());
            self.checkpoint.persist()?;
        }
        Ok(format!("{} {}", resolved.message(step), self.project_name))
    }

    pub(super) async fn log_group(&mut self, step: &Step) -> Result<String> {
        let resolved = self
            .ensure_shared(
                ProjectField::LogGroup,
                naming::LOG_GROUP_NAME,
                "Logs of devops projects created by hoist",
            )
            .await?;
        Ok(resolved.message(step))
    }

    pub(super) async fn project_log(&mut self, step: &Step) -> Result<String> {
        let project_id = self.project_id()?;
        let log_group_id = self.created_id(&SlotRef::Project(ProjectField::LogGroup))?;
        let request = CreateRequest::new(
            ResourceKind::Log,
            naming::log_name(&self.project_name),
            log_group_id.clone(),
        )
        .property("source_resource", project_id)
        .property("log_type", "SERVICE");
        let conflict = ConflictPolicy::DerivedLog {
            base: self.project_name.clone(),
            log_group_id,
        };
        let outcome = self
            .ensure_background(BackgroundKind::ProjectLog, request, conflict)
            .await?;
        Ok(outcome.message(step))
    }

    pub(super) async fn access_policies(&mut self, step: &Step) -> Result<String> {
        let request = PolicyRequest {
            compartment_id: self.compartment.id.clone(),
            cluster_compartment_id: self.cluster.as_ref().map(|c| c.compartment_id.clone()),
            subnet_compartment_id: self.subnet.as_ref().map(|s| s.compartment_id.clone()),
        };
        self.orch
            .factory
            .update_policies(&self.auth, request)
            .await
            .map_err(|e| DeployError::remote("Failed to set up access policies", e))?;
        Ok(format!("Configured {step}"))
    }

    pub(super) async fn artifact_repository(&mut self, step: &Step) -> Result<String> {
        let project_id = self.project_id()?;
        let request = CreateRequest::new(
            ResourceKind::ArtifactRepository,
            format!("{}ArtifactRepository", self.project_name),
            self.compartment.id.clone(),
        )
        .description(format!("Artifacts of devops project {}", self.project_name))
        .property("repository_type", "GENERIC")
        .tag(TAG_PROJECT, project_id);
        let resolved = self
            .ensure(
                &SlotRef::Project(ProjectField::ArtifactRepository),
                request,
                ConflictPolicy::Fail,
            )
            .await?;
        self.artifact_repository_id = Some(resolved.id.clone());
        Ok(resolved.message(step))
    }

    pub(super) async fn cluster_environment(&mut self, step: &Step) -> Result<String> {
        let project_id = self.project_id()?;
        let slot_ref = SlotRef::Project(ProjectField::ClusterEnvironment);
        if self.mode.is_incremental()
            && self.checkpoint.slot(&slot_ref).is_not_attempted()
            && let Some(id) = self.find_by_project(ResourceKind::ClusterEnvironment).await?
        {
            self.cluster_environment_id = Some(id);
            return Ok(format!("Using existing {step}"));
        }

        let cluster = self.cluster.clone().ok_or_else(|| {
            DeployError::Precondition("No target cluster selected".to_string())
        })?;
        let request = CreateRequest::new(
            ResourceKind::ClusterEnvironment,
            format!("{}Cluster", self.project_name),
            project_id.clone(),
        )
        .reference("cluster_id", cluster.id)
        .tag(TAG_PROJECT, project_id);
        let resolved = self.ensure(&slot_ref, request, ConflictPolicy::Fail).await?;
        self.cluster_environment_id = Some(resolved.id.clone());
        Ok(resolved.message(step))
    }

    pub(super) async fn knowledge_base(&mut self, step: &Step) -> Result<String> {
        let project_id = self.project_id()?;
        let request = CreateRequest::new(
            ResourceKind::KnowledgeBase,
            format!("{}Audits", self.project_name),
            self.compartment.id.clone(),
        )
        .description(format!("Vulnerability audits of devops project {}", self.project_name))
        .tag(TAG_PROJECT, project_id);
        let outcome = self
            .ensure_background(BackgroundKind::KnowledgeBase, request, ConflictPolicy::Fail)
            .await?;
        Ok(outcome.message(step))
    }

    /// Incremental mode: the project was verified before the plan ran.
    pub(super) async fn adopt_project(&mut self, step: &Step) -> Result<String> {
        let project_id = self.project_id()?;
        info!(target: "hoist::deploy", "Adding folders to devops project {} ({})", self.project_name, project_id);
        Ok(format!("Using {step} {}", self.project_name))
    }

    /// First live resource of `kind` linked to the project.
    async fn find_by_project(&self, kind: ResourceKind) -> Result<Option<String>> {
        let mut tags = Tags::new();
        tags.insert(TAG_PROJECT.to_string(), self.project_id()?);
        let found = self
            .orch
            .directory
            .find_tagged(&self.auth, kind, &tags)
            .await
            .map_err(|e| DeployError::remote(format!("Failed to look up {kind}"), e))?;
        Ok(found.into_iter().find(|r| r.is_usable()).map(|r| r.id))
    }

    async fn resolve_by_project(&self, kind: ResourceKind) -> Result<String> {
        self.find_by_project(kind).await?.ok_or_else(|| {
            DeployError::Precondition(format!(
                "Failed to resolve {} for devops project {}",
                kind, self.project_name
            ))
        })
    }

    pub(super) async fn resolve_artifact_repository(&mut self, step: &Step) -> Result<String> {
        let id = self.resolve_by_project(ResourceKind::ArtifactRepository).await?;
        self.artifact_repository_id = Some(id);
        Ok(format!("Using {step}"))
    }

    pub(super) async fn resolve_knowledge_base(&mut self, step: &Step) -> Result<String> {
        let id = self.resolve_by_project(ResourceKind::KnowledgeBase).await?;
        self.knowledge_base_id = Some(id);
        Ok(format!("Using {step}"))
    }

    pub(super) async fn save_project_manifest(&mut self, step: &Step) -> Result<String> {
        self.join_background(BackgroundKind::ProjectLog).await?;
        self.join_background(BackgroundKind::KnowledgeBase).await?;

        if self.checkpoint.doc().manifest.is_empty() {
            return Ok(format!("No {step} to save"));
        }
        let slot_ref = SlotRef::Project(ProjectField::ProjectManifest);
        let name = format!("{}_generated_resources", self.project_name);
        match self.save_manifest(&slot_ref, name).await {
            Ok(()) => Ok(format!("Saved {step}")),
            Err(e @ DeployError::Checkpoint(_)) => Err(e),
            Err(e) => {
                warn!(target: "hoist::deploy", "Failed to save {}: {}", step, e);
                Ok(format!("Skipped {step}"))
            }
        }
    }

    /// Upload the manifest addressed by `slot_ref` as an inline artifact,
    /// creating the artifact once and updating it afterwards.
    pub(super) async fn save_manifest(&mut self, slot_ref: &SlotRef, name: String) -> Result<()> {
        let content = {
            let doc = self.checkpoint.doc();
            let manifest = match slot_ref.folder() {
                Some(folder) => doc
                    .folder(folder)
                    .map(|f| f.manifest.clone())
                    .unwrap_or_default(),
                None => doc.manifest.clone(),
            };
            manifest
                .to_json()
                .map_err(|e| DeployError::collaborator("Failed to render resource list", e))?
        };

        if let Some(existing) = self.reuse(slot_ref).await? {
            let update = ResourceUpdate {
                tags: None,
                content: Some(content),
            };
            return self
                .orch
                .factory
                .update(&self.auth, ResourceKind::DeployArtifact, &existing.id, update)
                .await
                .map_err(|e| DeployError::remote("Failed to update list of generated resources", e));
        }

        let request = CreateRequest::new(ResourceKind::DeployArtifact, name, self.project_id()?)
            .description("Resources generated by hoist")
            .property("artifact_type", "GENERIC_FILE")
            .property(CONTENT_PROPERTY, content)
            .tag(TAG_RESOURCES_LIST, "true");
        self.create(slot_ref, request, ConflictPolicy::Fail).await?;
        Ok(())
    }
}

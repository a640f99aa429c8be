//! The check-reuse-or-create protocol.
//!
//! Every provisioned resource goes through [`Run::ensure`]:
//!
//! 1. `Created(id)`: verify the id against the directory; a missing or
//!    unhealthy resource clears the slot. A resource wired to a dependency
//!    that has since been replaced is deleted and created again.
//! 2. `InProgress`: an earlier attempt may have created the resource without
//!    the id reaching the checkpoint, so look for a resource carrying this
//!    run's tag and step key and adopt it.
//! 3. Otherwise mark the slot `InProgress`, flush, create, record the id and
//!    flush again. A failed creation leaves the slot `InProgress`.

use tracing::{debug, info, warn};

use super::background::BackgroundKind;
use super::runner::Run;
use crate::checkpoint::{ProjectField, Slot, SlotRef};
use crate::error::{DeployError, PlatformError, Result};
use crate::naming;
use crate::platform::{CreateOutcome, CreateRequest, ResourceInfo, WorkRequestStatus};
use crate::plan::Step;
use crate::types::ResourceKind;

/// What to do when the platform reports a display-name collision.
pub(super) enum ConflictPolicy {
    Fail,
    /// Ask the name prompt for a replacement
    Prompt,
    /// Derive `<base>LogN`, skipping names already present in the log group
    DerivedLog { base: String, log_group_id: String },
}

/// A resource a step ended up with.
#[derive(Debug, Clone)]
pub(super) struct Resolved {
    pub(super) id: String,
    pub(super) display_name: String,
    pub(super) endpoint: Option<String>,
    pub(super) reused: bool,
}

impl Resolved {
    fn from_info(info: ResourceInfo, reused: bool) -> Self {
        Self {
            id: info.id,
            display_name: info.display_name,
            endpoint: info.endpoint,
            reused,
        }
    }

    pub(super) fn message(&self, step: &Step) -> String {
        if self.reused {
            format!("Using already created {step}")
        } else {
            format!("Created {step}")
        }
    }
}

/// How an asynchronous creation step resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BackgroundOutcome {
    Reused,
    /// Creation issued; completion is awaited at the join point
    Requested,
}

impl BackgroundOutcome {
    pub(super) fn message(self, step: &Step) -> String {
        match self {
            BackgroundOutcome::Reused => format!("Using already created {step}"),
            BackgroundOutcome::Requested => format!("Requested {step}"),
        }
    }
}

struct Issued {
    outcome: CreateOutcome,
    display_name: String,
}

impl Run<'_> {
    /// Reuse the resource recorded for `slot_ref`, or create it.
    pub(super) async fn ensure(
        &mut self,
        slot_ref: &SlotRef,
        request: CreateRequest,
        conflict: ConflictPolicy,
    ) -> Result<Resolved> {
        if let Some(existing) = self.reusable(slot_ref).await? {
            let stale = existing.stale_references(&request.references);
            if stale.is_empty() {
                return Ok(Resolved::from_info(existing, true));
            }
            self.discard_stale(slot_ref, &existing, &stale).await?;
        }
        self.create(slot_ref, request, conflict).await
    }

    /// Steps 1 and 2 of the protocol. `None` means the slot is now
    /// `NotAttempted` or still `InProgress` with nothing to adopt.
    pub(super) async fn reuse(&mut self, slot_ref: &SlotRef) -> Result<Option<Resolved>> {
        Ok(self
            .reusable(slot_ref)
            .await?
            .map(|info| Resolved::from_info(info, true)))
    }

    async fn reusable(&mut self, slot_ref: &SlotRef) -> Result<Option<ResourceInfo>> {
        let kind = slot_ref.kind();
        match self.checkpoint.slot(slot_ref) {
            Slot::Created(id) => {
                debug!(target: "hoist::deploy", "Verifying {} {}", kind, id);
                match self.orch.directory.resource(&self.auth, kind, &id).await {
                    Ok(Some(info)) if info.is_usable() => return Ok(Some(info)),
                    Ok(_) => {
                        warn!(target: "hoist::deploy", "{} {} no longer exists, creating it again", kind, id);
                    }
                    Err(e) => {
                        warn!(target: "hoist::deploy", "Could not verify {} {}: {}", kind, id, e);
                    }
                }
                self.checkpoint.set(slot_ref, Slot::NotAttempted)?;
                Ok(None)
            }
            Slot::InProgress => {
                let Some(info) = self.rediscover(slot_ref).await else {
                    return Ok(None);
                };
                info!(target: "hoist::deploy", "Adopting {} {} created by an interrupted attempt", kind, info.id);
                self.record_created(slot_ref, &info.id, &info.display_name)?;
                Ok(Some(info))
            }
            Slot::NotAttempted => Ok(None),
        }
    }

    /// Delete a resource still wired to replaced dependencies and clear its slot.
    async fn discard_stale(
        &mut self,
        slot_ref: &SlotRef,
        existing: &ResourceInfo,
        stale: &[String],
    ) -> Result<()> {
        let kind = slot_ref.kind();
        warn!(
            target: "hoist::deploy",
            "{} {} refers to a replaced {}, creating it again",
            kind,
            existing.id,
            stale.join(", ")
        );
        match self.orch.factory.delete(&self.auth, kind, &existing.id).await {
            Ok(()) | Err(PlatformError::NotFound { .. }) => {}
            Err(e) => {
                return Err(DeployError::remote(
                    format!("Failed to replace {} {}", kind, existing.display_name),
                    e,
                ));
            }
        }
        self.checkpoint.set(slot_ref, Slot::NotAttempted)?;
        Ok(())
    }

    /// Live resource carrying this run's tag and the slot's step key.
    async fn rediscover(&self, slot_ref: &SlotRef) -> Option<ResourceInfo> {
        let tags = self.step_tags(slot_ref);
        match self
            .orch
            .directory
            .find_tagged(&self.auth, slot_ref.kind(), &tags)
            .await
        {
            Ok(found) => found.into_iter().find(ResourceInfo::is_usable),
            Err(e) => {
                warn!(target: "hoist::deploy", "Lookup of {} failed: {}", slot_ref, e);
                None
            }
        }
    }

    /// Step 3 of the protocol for resources created synchronously.
    pub(super) async fn create(
        &mut self,
        slot_ref: &SlotRef,
        request: CreateRequest,
        conflict: ConflictPolicy,
    ) -> Result<Resolved> {
        let issued = self.issue(slot_ref, request, &conflict).await?;
        match issued.outcome {
            CreateOutcome::Resource(created) => {
                self.record_created(slot_ref, &created.id, &created.display_name)?;
                Ok(Resolved {
                    id: created.id,
                    display_name: created.display_name,
                    endpoint: created.endpoint,
                    reused: false,
                })
            }
            CreateOutcome::Pending { handle } => Err(DeployError::Precondition(format!(
                "Creation of {} {} returned work request {} instead of a resource",
                slot_ref.kind(),
                issued.display_name,
                handle
            ))),
        }
    }

    /// Mark the slot `InProgress` and issue the creation call, renaming on
    /// conflicts as the policy allows.
    async fn issue(
        &mut self,
        slot_ref: &SlotRef,
        request: CreateRequest,
        conflict: &ConflictPolicy,
    ) -> Result<Issued> {
        let kind = slot_ref.kind();
        let mut request = request.tags(&self.step_tags(slot_ref));
        self.checkpoint.set(slot_ref, Slot::InProgress)?;

        let mut renames = 0;
        loop {
            debug!(target: "hoist::deploy", "Creating {} {}", kind, request.display_name);
            match self.orch.factory.create(&self.auth, request.clone()).await {
                Ok(outcome) => {
                    return Ok(Issued {
                        outcome,
                        display_name: request.display_name,
                    });
                }
                Err(e) if e.is_name_conflict() && !matches!(conflict, ConflictPolicy::Fail) => {
                    let taken = request.display_name.clone();
                    if renames >= self.orch.name_conflict_retries {
                        return Err(DeployError::NameConflict { kind, name: taken });
                    }
                    let Some(replacement) = self.replacement_name(conflict, kind, &taken).await?
                    else {
                        return Err(DeployError::NameConflict { kind, name: taken });
                    };
                    renames += 1;
                    info!(target: "hoist::deploy", "{} name {} already exists, retrying as {}", kind, taken, replacement);
                    if kind == ResourceKind::Project {
                        self.project_name = replacement.clone();
                        self.checkpoint.doc_mut().project_name = Some(replacement.clone());
                        self.checkpoint.persist()?;
                    }
                    request.display_name = replacement;
                }
                Err(e) => {
                    return Err(DeployError::remote(
                        format!("Failed to create {} {}", kind, request.display_name),
                        e,
                    ));
                }
            }
        }
    }

    async fn replacement_name(
        &self,
        conflict: &ConflictPolicy,
        kind: ResourceKind,
        taken: &str,
    ) -> Result<Option<String>> {
        match conflict {
            ConflictPolicy::Fail => Ok(None),
            ConflictPolicy::Prompt => self
                .orch
                .collab
                .names
                .replacement_name(kind, taken)
                .map_err(|e| DeployError::collaborator("Failed to obtain a replacement name", e)),
            ConflictPolicy::DerivedLog { base, log_group_id } => {
                let existing = self
                    .orch
                    .directory
                    .log_names(&self.auth, log_group_id)
                    .await
                    .map_err(|e| DeployError::remote("Failed to list existing logs", e))?;
                Ok(Some(naming::next_free_log_name(base, &existing)))
            }
        }
    }

    /// Set `Created(id)`, list the resource in its manifest and flush.
    fn record_created(&mut self, slot_ref: &SlotRef, id: &str, display_name: &str) -> Result<()> {
        let doc = self.checkpoint.doc_mut();
        doc.set_slot(slot_ref, Slot::created(id));
        doc.manifest_mut(slot_ref.folder())
            .record(slot_ref.kind(), id, display_name);
        self.checkpoint.persist()
    }

    /// The protocol for resources created through work requests.
    ///
    /// The slot holds the work-request handle; the resolved id lives in a
    /// separate field filled at the join point. A poll still running is left
    /// to [`Run::join_background`].
    pub(super) async fn ensure_background(
        &mut self,
        task: BackgroundKind,
        request: CreateRequest,
        conflict: ConflictPolicy,
    ) -> Result<BackgroundOutcome> {
        let slot_ref = SlotRef::Project(task.field());
        let kind = slot_ref.kind();

        if let Some(id) = self.resolved_id(task) {
            match self.orch.directory.resource(&self.auth, kind, &id).await {
                Ok(Some(info)) if info.is_usable() => {
                    self.on_resolved(task, &info.id);
                    return Ok(BackgroundOutcome::Reused);
                }
                Ok(_) => warn!(target: "hoist::deploy", "{} {} no longer exists, creating it again", kind, id),
                Err(e) => warn!(target: "hoist::deploy", "Could not verify {} {}: {}", kind, id, e),
            }
            self.set_resolved_id(task, None);
            self.checkpoint.set(&slot_ref, Slot::NotAttempted)?;
        }

        match self.checkpoint.slot(&slot_ref) {
            Slot::Created(handle) => {
                match self.orch.directory.work_request(&self.auth, &handle).await {
                    Ok(WorkRequestStatus::Succeeded { resource_id }) => {
                        if let Ok(Some(info)) =
                            self.orch.directory.resource(&self.auth, kind, &resource_id).await
                            && info.is_usable()
                        {
                            self.complete_background(task, &info.id, &info.display_name)?;
                            return Ok(BackgroundOutcome::Reused);
                        }
                        warn!(target: "hoist::deploy", "{} {} no longer exists, creating it again", kind, resource_id);
                    }
                    Ok(WorkRequestStatus::Pending) => {
                        debug!(target: "hoist::deploy", "Work request {} still pending", handle);
                        self.background.spawn(
                            task,
                            self.orch.factory.clone(),
                            self.auth.clone(),
                            handle,
                            request.display_name.clone(),
                        );
                        return Ok(BackgroundOutcome::Requested);
                    }
                    Ok(WorkRequestStatus::Failed { reason }) => {
                        warn!(target: "hoist::deploy", "Work request {} for {} failed: {}", handle, kind, reason);
                    }
                    Err(e) => {
                        warn!(target: "hoist::deploy", "Could not inspect work request {}: {}", handle, e);
                    }
                }
                self.checkpoint.set(&slot_ref, Slot::NotAttempted)?;
            }
            Slot::InProgress => {
                if let Some(info) = self.rediscover(&slot_ref).await {
                    info!(target: "hoist::deploy", "Adopting {} {} created by an interrupted attempt", kind, info.id);
                    self.checkpoint
                        .doc_mut()
                        .set_slot(&slot_ref, Slot::created(info.id.clone()));
                    self.complete_background(task, &info.id, &info.display_name)?;
                    return Ok(BackgroundOutcome::Reused);
                }
            }
            Slot::NotAttempted => {}
        }

        let issued = self.issue(&slot_ref, request, &conflict).await?;
        match issued.outcome {
            CreateOutcome::Pending { handle } => {
                self.checkpoint.set(&slot_ref, Slot::created(handle.clone()))?;
                self.background.spawn(
                    task,
                    self.orch.factory.clone(),
                    self.auth.clone(),
                    handle,
                    issued.display_name,
                );
                Ok(BackgroundOutcome::Requested)
            }
            CreateOutcome::Resource(created) => {
                self.checkpoint
                    .doc_mut()
                    .set_slot(&slot_ref, Slot::created(created.id.clone()));
                self.complete_background(task, &created.id, &created.display_name)?;
                Ok(BackgroundOutcome::Requested)
            }
        }
    }

    /// Block on a background poll, if one is running.
    pub(super) async fn join_background(&mut self, task: BackgroundKind) -> Result<()> {
        let Some(pending) = self.background.take(task) else {
            return Ok(());
        };
        if !pending.handle.is_finished() {
            self.reporter
                .note(format!("Still waiting for {} to be created...", task.label()));
        }
        let slot_ref = SlotRef::Project(task.field());
        let source = match pending.handle.await {
            Ok(Ok(id)) => {
                info!(target: "hoist::deploy", "Created {} {}", task.label(), id);
                return self.complete_background(task, &id, &pending.display_name);
            }
            Ok(Err(e)) => e,
            Err(e) => PlatformError::Unavailable(e.to_string()),
        };
        self.checkpoint.set(&slot_ref, Slot::InProgress)?;
        Err(DeployError::Background {
            what: format!("Creation of {}", task.label()),
            source,
        })
    }

    fn complete_background(&mut self, task: BackgroundKind, id: &str, display_name: &str) -> Result<()> {
        let kind = SlotRef::Project(task.field()).kind();
        self.set_resolved_id(task, Some(id.to_string()));
        self.checkpoint
            .doc_mut()
            .manifest
            .record(kind, id, display_name);
        self.on_resolved(task, id);
        self.checkpoint.persist()
    }

    fn on_resolved(&mut self, task: BackgroundKind, id: &str) {
        if task == BackgroundKind::KnowledgeBase {
            self.knowledge_base_id = Some(id.to_string());
        }
    }

    fn resolved_id(&self, task: BackgroundKind) -> Option<String> {
        let doc = self.checkpoint.doc();
        match task.field() {
            ProjectField::ProjectLog => doc.project_log_id.clone(),
            _ => doc.knowledge_base_id.clone(),
        }
    }

    fn set_resolved_id(&mut self, task: BackgroundKind, id: Option<String>) {
        let doc = self.checkpoint.doc_mut();
        match task.field() {
            ProjectField::ProjectLog => doc.project_log_id = id,
            _ => doc.knowledge_base_id = id,
        }
    }
}

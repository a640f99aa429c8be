//! Run prelude: everything resolved before the plan is assembled.
//!
//! Answers recorded in the checkpoint by an earlier run are verified against
//! the directory and reused; answers that no longer hold are cleared and
//! asked again.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::runner::FolderRun;
use super::{DeployRequest, Orchestrator};
use crate::checkpoint::{Checkpoint, ScopedRef};
use crate::collab::Authentication;
use crate::error::{DeployError, Result};
use crate::naming;
use crate::plan::{FeatureFlags, ProjectMode};
use crate::types::{NamedRef, ResourceKind, UserIdentity, remove_spaces};

/// Answers collected by the prelude.
pub(super) struct Prepared {
    pub(super) auth: Authentication,
    pub(super) mode: ProjectMode,
    pub(super) flags: FeatureFlags,
    pub(super) namespace: String,
    pub(super) compartment: NamedRef,
    pub(super) cluster: Option<ScopedRef>,
    pub(super) subnet: Option<ScopedRef>,
    pub(super) tag: String,
    pub(super) user: Option<UserIdentity>,
    pub(super) project_name: String,
    pub(super) project_id: Option<String>,
    pub(super) folders: Vec<FolderRun>,
}

pub(super) async fn prepare(
    orch: &Orchestrator,
    request: &DeployRequest,
    checkpoint: &mut Checkpoint,
) -> Result<Prepared> {
    let auth = authenticate(orch, request, checkpoint).await?;
    let folders = resolve_folders(orch, request, checkpoint)?;
    check_cancelled(orch)?;

    let namespace = namespace(orch, &auth, checkpoint).await?;

    let (compartment, project_name, project_id) = match &request.mode {
        ProjectMode::Fresh => {
            let compartment = compartment(orch, &auth, checkpoint).await?;
            check_cancelled(orch)?;
            let name = project_name(orch, request, &folders, checkpoint)?;
            (compartment, name, None)
        }
        ProjectMode::Incremental { project_id } => {
            let (compartment, name) = existing_project(orch, &auth, project_id, checkpoint).await?;
            (compartment, name, Some(project_id.clone()))
        }
    };
    check_cancelled(orch)?;

    let (cluster, subnet) = if request.skip_cluster {
        (None, None)
    } else {
        cluster(orch, &auth, &compartment, checkpoint).await?
    };
    check_cancelled(orch)?;

    let user = user(orch, &auth, checkpoint).await?;

    let tag = match checkpoint.doc().tag.clone() {
        Some(tag) => tag,
        None => {
            let tag = naming::run_tag(Utc::now());
            info!(target: "hoist::deploy", "Run tag {}", tag);
            checkpoint.doc_mut().tag = Some(tag.clone());
            checkpoint.persist()?;
            tag
        }
    };

    let flags = FeatureFlags {
        bypass_artifacts: request.bypass_artifacts,
        cluster: cluster.is_some(),
        native_pipelines: request.native_pipelines,
    };

    Ok(Prepared {
        auth,
        mode: request.mode.clone(),
        flags,
        namespace,
        compartment,
        cluster,
        subnet,
        tag,
        user,
        project_name,
        project_id,
        folders,
    })
}

fn check_cancelled(orch: &Orchestrator) -> Result<()> {
    if orch.cancel.is_cancelled() {
        return Err(DeployError::Cancelled);
    }
    Ok(())
}

async fn authenticate(
    orch: &Orchestrator,
    request: &DeployRequest,
    checkpoint: &mut Checkpoint,
) -> Result<Authentication> {
    let profile = checkpoint
        .doc()
        .profile
        .clone()
        .or_else(|| request.profile.clone());
    let auth = orch
        .collab
        .auth
        .authenticate(profile.as_deref())
        .await
        .map_err(|e| DeployError::collaborator("Failed to resolve authentication", e))?;
    if let Some(problem) = &auth.problem {
        return Err(DeployError::Precondition(format!(
            "Authentication failed: {problem}"
        )));
    }
    if checkpoint.doc().profile.as_deref() != Some(auth.profile.as_str()) {
        checkpoint.doc_mut().profile = Some(auth.profile.clone());
        checkpoint.persist()?;
    }
    Ok(auth)
}

/// Name, classification and cached build commands of every folder.
fn resolve_folders(
    orch: &Orchestrator,
    request: &DeployRequest,
    checkpoint: &mut Checkpoint,
) -> Result<Vec<FolderRun>> {
    if request.folders.is_empty() {
        return Err(DeployError::Precondition(
            "No folders selected for deployment".to_string(),
        ));
    }

    let mut seen = BTreeSet::new();
    let mut folders = Vec::with_capacity(request.folders.len());
    for path in &request.folders {
        if !path.is_dir() {
            return Err(DeployError::Precondition(format!(
                "Folder {} does not exist",
                path.display()
            )));
        }
        let name = folder_name(path)?;
        if !seen.insert(name.clone()) {
            return Err(DeployError::Precondition(format!(
                "More than one selected folder maps to code repository {name}"
            )));
        }

        let known = checkpoint
            .doc()
            .folder(&name)
            .is_some_and(|f| !f.code_repository.is_not_attempted());
        if !known && orch.collab.populator.is_versioned(path) {
            return Err(DeployError::Precondition(format!(
                "Folder {} is already a git repository; only unversioned folders can be deployed",
                path.display()
            )));
        }

        let mut classification = orch.collab.classifier.classify(path).map_err(|e| {
            DeployError::collaborator(format!("Failed to classify folder {}", path.display()), e)
        })?;
        debug!(
            target: "hoist::deploy",
            "Folder {} classified as {}",
            name,
            classification.project_type.label()
        );

        let cached = checkpoint.doc_mut().folder_mut(&name);
        if classification.build_command.is_none() {
            classification.build_command = cached.build_command.clone();
        }
        if classification.native_build_command.is_none() {
            classification.native_build_command = cached.native_build_command.clone();
        }
        cached.build_command = classification.build_command.clone();
        cached.native_build_command = classification.native_build_command.clone();

        folders.push(FolderRun {
            name,
            path: path.clone(),
            classification,
            endpoint: None,
            inline: HashMap::new(),
        });
    }
    checkpoint.persist()?;
    Ok(folders)
}

fn folder_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| remove_spaces(&n.to_string_lossy()))
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            DeployError::Precondition(format!("Invalid folder path {}", path.display()))
        })
}

async fn namespace(
    orch: &Orchestrator,
    auth: &Authentication,
    checkpoint: &mut Checkpoint,
) -> Result<String> {
    if let Some(namespace) = checkpoint.doc().namespace.clone() {
        return Ok(namespace);
    }
    let namespace = orch
        .directory
        .namespace(auth)
        .await
        .map_err(|e| DeployError::remote("Failed to resolve object storage namespace", e))?;
    checkpoint.doc_mut().namespace = Some(namespace.clone());
    checkpoint.persist()?;
    Ok(namespace)
}

async fn compartment(
    orch: &Orchestrator,
    auth: &Authentication,
    checkpoint: &mut Checkpoint,
) -> Result<NamedRef> {
    if let Some(recorded) = checkpoint.doc().compartment.clone() {
        match orch.directory.compartment(auth, &recorded.id).await {
            Ok(Some(compartment)) => return Ok(compartment),
            Ok(None) => warn!(
                target: "hoist::deploy",
                "Compartment {} no longer exists, selecting another one",
                recorded.name
            ),
            Err(e) => warn!(
                target: "hoist::deploy",
                "Could not verify compartment {}: {}",
                recorded.name,
                e
            ),
        }
        checkpoint.doc_mut().compartment = None;
        checkpoint.persist()?;
    }

    let choices = orch
        .directory
        .compartments(auth)
        .await
        .map_err(|e| DeployError::remote("Failed to list compartments", e))?;
    let selected = orch
        .collab
        .params
        .select_compartment(&choices)
        .map_err(|e| DeployError::collaborator("Failed to select a compartment", e))?
        .ok_or_else(|| DeployError::Precondition("No target compartment selected".to_string()))?;
    checkpoint.doc_mut().compartment = Some(selected.clone());
    checkpoint.persist()?;
    Ok(selected)
}

/// Verify the recorded cluster, or offer the clusters of the compartment.
///
/// A run that already provisioned resources without a cluster keeps
/// deploying without one.
async fn cluster(
    orch: &Orchestrator,
    auth: &Authentication,
    compartment: &NamedRef,
    checkpoint: &mut Checkpoint,
) -> Result<(Option<ScopedRef>, Option<ScopedRef>)> {
    if let Some(recorded) = checkpoint.doc().cluster.clone() {
        match orch.directory.cluster(auth, &recorded.id).await {
            Ok(Some(info)) => {
                let subnet = subnet(orch, auth, &info.subnet_id, checkpoint).await?;
                return Ok((Some(recorded), subnet));
            }
            Ok(None) => warn!(
                target: "hoist::deploy",
                "Cluster {} no longer exists, selecting another one",
                recorded.id
            ),
            Err(e) => warn!(
                target: "hoist::deploy",
                "Could not verify cluster {}: {}",
                recorded.id,
                e
            ),
        }
        let doc = checkpoint.doc_mut();
        doc.cluster = None;
        doc.subnet = None;
        checkpoint.persist()?;
    } else if !checkpoint.doc().is_empty() {
        return Ok((None, None));
    }

    let choices = orch
        .directory
        .clusters(auth, &compartment.id)
        .await
        .map_err(|e| DeployError::remote("Failed to list clusters", e))?;
    if choices.is_empty() {
        debug!(target: "hoist::deploy", "No cluster in compartment {}", compartment.name);
        return Ok((None, None));
    }
    let Some(selected) = orch
        .collab
        .params
        .select_cluster(&choices)
        .map_err(|e| DeployError::collaborator("Failed to select a cluster", e))?
    else {
        return Ok((None, None));
    };

    let cluster = ScopedRef {
        id: selected.id.clone(),
        compartment_id: selected.compartment_id.clone(),
    };
    let subnet = ScopedRef {
        id: selected.subnet_id.clone(),
        compartment_id: selected.subnet_compartment_id.clone(),
    };
    let doc = checkpoint.doc_mut();
    doc.cluster = Some(cluster.clone());
    doc.subnet = Some(subnet.clone());
    checkpoint.persist()?;
    Ok((Some(cluster), Some(subnet)))
}

async fn subnet(
    orch: &Orchestrator,
    auth: &Authentication,
    cluster_subnet_id: &str,
    checkpoint: &mut Checkpoint,
) -> Result<Option<ScopedRef>> {
    if let Some(recorded) = checkpoint.doc().subnet.clone()
        && recorded.id == cluster_subnet_id
    {
        return Ok(Some(recorded));
    }
    let subnet = orch
        .directory
        .subnet(auth, cluster_subnet_id)
        .await
        .map_err(|e| DeployError::remote("Failed to resolve cluster subnet", e))?;
    checkpoint.doc_mut().subnet = subnet.clone();
    checkpoint.persist()?;
    Ok(subnet)
}

fn project_name(
    orch: &Orchestrator,
    request: &DeployRequest,
    folders: &[FolderRun],
    checkpoint: &mut Checkpoint,
) -> Result<String> {
    if let Some(name) = checkpoint.doc().project_name.clone() {
        return Ok(name);
    }
    let suggested = request
        .project_name
        .clone()
        .or_else(|| folders.first().map(|f| f.name.clone()))
        .unwrap_or_default();
    let name = orch
        .collab
        .params
        .project_name(&suggested)
        .map_err(|e| DeployError::collaborator("Failed to obtain a project name", e))?
        .map(|n| remove_spaces(&n))
        .filter(|n| !n.is_empty())
        .ok_or(DeployError::Cancelled)?;
    checkpoint.doc_mut().project_name = Some(name.clone());
    checkpoint.persist()?;
    Ok(name)
}

/// Incremental mode: the project must exist; its compartment is the target.
async fn existing_project(
    orch: &Orchestrator,
    auth: &Authentication,
    project_id: &str,
    checkpoint: &mut Checkpoint,
) -> Result<(NamedRef, String)> {
    let project = orch
        .directory
        .resource(auth, ResourceKind::Project, project_id)
        .await
        .map_err(|e| DeployError::remote("Failed to look up devops project", e))?
        .filter(|p| p.is_usable())
        .ok_or_else(|| {
            DeployError::Precondition(format!("Devops project {project_id} does not exist"))
        })?;
    let compartment = orch
        .directory
        .compartment(auth, &project.parent)
        .await
        .map_err(|e| DeployError::remote("Failed to look up project compartment", e))?
        .ok_or_else(|| {
            DeployError::Precondition(format!(
                "Compartment of devops project {} does not exist",
                project.display_name
            ))
        })?;
    if checkpoint.doc().compartment.as_ref() != Some(&compartment) {
        checkpoint.doc_mut().compartment = Some(compartment.clone());
        checkpoint.persist()?;
    }
    Ok((compartment, project.display_name))
}

async fn user(
    orch: &Orchestrator,
    auth: &Authentication,
    checkpoint: &mut Checkpoint,
) -> Result<Option<UserIdentity>> {
    if let Some(user) = checkpoint.doc().user.clone() {
        return Ok(Some(user));
    }
    match orch.directory.current_user(auth).await {
        Ok(Some(user)) => {
            checkpoint.doc_mut().user = Some(user.clone());
            checkpoint.persist()?;
            Ok(Some(user))
        }
        Ok(None) => Ok(None),
        Err(e) => {
            warn!(target: "hoist::deploy", "Could not resolve current user: {}", e);
            Ok(None)
        }
    }
}

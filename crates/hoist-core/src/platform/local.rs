//! Local sandbox platform.
//!
//! Implements both platform traits against an in-process resource table,
//! optionally persisted to `<platform_dir>/platform.json`. Code repositories
//! are real bare git repositories under `<platform_dir>/git/` so that the
//! repository populator can push to them.
//!
//! The sandbox enforces the constraints the orchestrator has to cope with:
//! project names are unique per compartment, log names are unique per log
//! group, resources can only be created under a live parent, and logs and
//! knowledge bases are created through work requests that settle only after
//! a number of polls.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::request::{
    CONTENT_PROPERTY, ClusterInfo, CreateOutcome, CreateRequest, CreatedResource, PolicyRequest, ResourceInfo,
    ResourceState, ResourceUpdate, WorkRequestStatus,
};
use super::{PlatformResult, ResourceDirectory, ResourceFactory};
use crate::checkpoint::ScopedRef;
use crate::collab::Authentication;
use crate::error::PlatformError;
use crate::types::{NamedRef, ResourceKind, Tags, UserIdentity};

const STATE_FILE: &str = "platform.json";
const DEFAULT_NAMESPACE: &str = "sandbox";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkRequest {
    resource_id: String,
    polls_left: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SandboxState {
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    user: Option<UserIdentity>,
    #[serde(default)]
    compartments: BTreeMap<String, NamedRef>,
    #[serde(default)]
    clusters: BTreeMap<String, ClusterInfo>,
    #[serde(default)]
    resources: BTreeMap<String, ResourceInfo>,
    #[serde(default)]
    work_requests: BTreeMap<String, WorkRequest>,
    #[serde(default)]
    policies: BTreeSet<String>,
    #[serde(default)]
    next_id: u64,
}

impl SandboxState {
    fn mint(&mut self, token: &str) -> String {
        self.next_id += 1;
        format!("ocid1.{}.sandbox..{:08}", token, self.next_id)
    }

    fn live(&self, id: &str) -> Option<&ResourceInfo> {
        self.resources.get(id).filter(|r| r.is_usable())
    }

    fn parent_exists(&self, parent: &str) -> bool {
        self.compartments.contains_key(parent) || self.live(parent).is_some()
    }

    fn name_taken(&self, kind: ResourceKind, parent: &str, name: &str) -> bool {
        self.resources.values().any(|r| {
            r.kind == kind && r.parent == parent && r.display_name == name && r.is_usable()
        })
    }
}

/// In-process implementation of [`ResourceDirectory`] and [`ResourceFactory`].
#[derive(Debug)]
pub struct LocalPlatform {
    state: RwLock<SandboxState>,
    root: Option<PathBuf>,
    settle_after: u32,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl LocalPlatform {
    /// A sandbox that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::with_state(SandboxState::default(), None)
    }

    /// Open (or start) the sandbox persisted under `dir`.
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        let path = dir.join(STATE_FILE);
        let state = if path.exists() {
            let bytes = fs::read(&path)
                .with_context(|| format!("Failed to read sandbox state: {}", path.display()))?;
            serde_json::from_slice(&bytes)
                .with_context(|| format!("Failed to parse sandbox state: {}", path.display()))?
        } else {
            SandboxState::default()
        };
        Ok(Self::with_state(state, Some(dir.to_path_buf())))
    }

    fn with_state(state: SandboxState, root: Option<PathBuf>) -> Self {
        Self {
            state: RwLock::new(state),
            root,
            settle_after: 2,
            poll_interval: Duration::from_millis(500),
            poll_timeout: Duration::from_secs(600),
        }
    }

    /// Number of polls before a work request settles.
    pub fn with_settle_after(mut self, polls: u32) -> Self {
        self.settle_after = polls;
        self
    }

    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_timeout = timeout;
        self
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn save(&self, state: &SandboxState) -> PlatformResult<()> {
        let Some(root) = &self.root else {
            return Ok(());
        };
        write_state(root, state).map_err(|e| PlatformError::Unavailable(format!("{e:#}")))
    }

    pub async fn add_compartment(&self, name: &str) -> anyhow::Result<NamedRef> {
        let mut state = self.state.write().await;
        let compartment = NamedRef::new(state.mint("compartment"), name);
        state
            .compartments
            .insert(compartment.id.clone(), compartment.clone());
        self.save(&state)?;
        Ok(compartment)
    }

    pub async fn remove_compartment(&self, id: &str) -> anyhow::Result<bool> {
        let mut state = self.state.write().await;
        let removed = state.compartments.remove(id).is_some();
        self.save(&state)?;
        Ok(removed)
    }

    pub async fn add_cluster(&self, compartment_id: &str, name: &str) -> anyhow::Result<ClusterInfo> {
        let mut state = self.state.write().await;
        if !state.compartments.contains_key(compartment_id) {
            anyhow::bail!("Compartment {} does not exist", compartment_id);
        }
        let cluster = ClusterInfo {
            id: state.mint("cluster"),
            name: name.to_string(),
            compartment_id: compartment_id.to_string(),
            subnet_id: state.mint("subnet"),
            subnet_compartment_id: compartment_id.to_string(),
        };
        state.clusters.insert(cluster.id.clone(), cluster.clone());
        self.save(&state)?;
        Ok(cluster)
    }

    pub async fn set_user(&self, user: UserIdentity) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        state.user = Some(user);
        self.save(&state)?;
        Ok(())
    }

    /// Delete a resource and everything under it behind the orchestrator's back.
    pub async fn remove_resource(&self, id: &str) -> anyhow::Result<bool> {
        let mut state = self.state.write().await;
        let removed = state.resources.contains_key(id);
        let mut doomed = vec![id.to_string()];
        while let Some(next) = doomed.pop() {
            state.resources.remove(&next);
            doomed.extend(
                state
                    .resources
                    .values()
                    .filter(|r| r.parent == next)
                    .map(|r| r.id.clone()),
            );
        }
        self.save(&state)?;
        Ok(removed)
    }

    /// Make every pending work request for `kind` fail with `reason`.
    pub async fn fail_pending_work_requests(&self, kind: ResourceKind, reason: &str) {
        let mut state = self.state.write().await;
        let ids: BTreeSet<String> = state
            .resources
            .values()
            .filter(|r| r.kind == kind && r.state == ResourceState::Creating)
            .map(|r| r.id.clone())
            .collect();
        for request in state.work_requests.values_mut() {
            if ids.contains(&request.resource_id) && request.polls_left > 0 {
                request.failure = Some(reason.to_string());
            }
        }
    }

    /// Live resources of one kind.
    pub async fn resources(&self, kind: ResourceKind) -> Vec<ResourceInfo> {
        let state = self.state.read().await;
        state
            .resources
            .values()
            .filter(|r| r.kind == kind && r.is_usable())
            .cloned()
            .collect()
    }

    pub async fn compartment_list(&self) -> Vec<NamedRef> {
        self.state.read().await.compartments.values().cloned().collect()
    }

    pub async fn has_policies(&self, compartment_id: &str) -> bool {
        self.state.read().await.policies.contains(compartment_id)
    }

    fn init_repository(&self, id: &str) -> PlatformResult<Option<String>> {
        let Some(root) = &self.root else {
            return Ok(None);
        };
        let path = root.join("git").join(format!("{id}.git"));
        git2::Repository::init_bare(&path).map_err(|e| {
            PlatformError::Unavailable(format!(
                "failed to initialize repository {}: {}",
                path.display(),
                e.message()
            ))
        })?;
        Ok(Some(path.to_string_lossy().into_owned()))
    }
}

fn write_state(root: &Path, state: &SandboxState) -> anyhow::Result<()> {
    fs::create_dir_all(root)
        .with_context(|| format!("Failed to create sandbox directory: {}", root.display()))?;
    let path = root.join(STATE_FILE);
    let tmp_path = root.join(format!("{}.{}.tmp", STATE_FILE, std::process::id()));
    let bytes = serde_json::to_vec_pretty(state).context("Failed to serialize sandbox state")?;
    fs::write(&tmp_path, bytes)
        .with_context(|| format!("Failed to write sandbox state: {}", tmp_path.display()))?;
    if path.exists() {
        fs::remove_file(&path)
            .with_context(|| format!("Failed to replace sandbox state: {}", path.display()))?;
    }
    fs::rename(&tmp_path, &path)
        .with_context(|| format!("Failed to rename sandbox state: {}", tmp_path.display()))?;
    Ok(())
}

fn check(auth: &Authentication) -> PlatformResult<()> {
    match &auth.problem {
        Some(problem) => Err(PlatformError::Rejected(problem.clone())),
        None => Ok(()),
    }
}

fn tags_match(resource: &ResourceInfo, tags: &Tags) -> bool {
    tags.iter()
        .all(|(key, value)| resource.tags.get(key) == Some(value))
}

#[async_trait]
impl ResourceDirectory for LocalPlatform {
    async fn namespace(&self, auth: &Authentication) -> PlatformResult<String> {
        check(auth)?;
        let state = self.state.read().await;
        if state.namespace.is_empty() {
            Ok(DEFAULT_NAMESPACE.to_string())
        } else {
            Ok(state.namespace.clone())
        }
    }

    async fn compartment(
        &self,
        auth: &Authentication,
        id: &str,
    ) -> PlatformResult<Option<NamedRef>> {
        check(auth)?;
        Ok(self.state.read().await.compartments.get(id).cloned())
    }

    async fn compartments(&self, auth: &Authentication) -> PlatformResult<Vec<NamedRef>> {
        check(auth)?;
        Ok(self.compartment_list().await)
    }

    async fn cluster(&self, auth: &Authentication, id: &str) -> PlatformResult<Option<ClusterInfo>> {
        check(auth)?;
        Ok(self.state.read().await.clusters.get(id).cloned())
    }

    async fn clusters(
        &self,
        auth: &Authentication,
        compartment_id: &str,
    ) -> PlatformResult<Vec<ClusterInfo>> {
        check(auth)?;
        let state = self.state.read().await;
        Ok(state
            .clusters
            .values()
            .filter(|c| c.compartment_id == compartment_id)
            .cloned()
            .collect())
    }

    async fn subnet(&self, auth: &Authentication, id: &str) -> PlatformResult<Option<ScopedRef>> {
        check(auth)?;
        let state = self.state.read().await;
        Ok(state
            .clusters
            .values()
            .find(|c| c.subnet_id == id)
            .map(|c| ScopedRef {
                id: c.subnet_id.clone(),
                compartment_id: c.subnet_compartment_id.clone(),
            }))
    }

    async fn resource(
        &self,
        auth: &Authentication,
        kind: ResourceKind,
        id: &str,
    ) -> PlatformResult<Option<ResourceInfo>> {
        check(auth)?;
        let state = self.state.read().await;
        Ok(state.resources.get(id).filter(|r| r.kind == kind).cloned())
    }

    async fn find_tagged(
        &self,
        auth: &Authentication,
        kind: ResourceKind,
        tags: &Tags,
    ) -> PlatformResult<Vec<ResourceInfo>> {
        check(auth)?;
        let state = self.state.read().await;
        Ok(state
            .resources
            .values()
            .filter(|r| r.kind == kind && r.is_usable() && tags_match(r, tags))
            .cloned()
            .collect())
    }

    async fn find_named(
        &self,
        auth: &Authentication,
        kind: ResourceKind,
        parent: &str,
        name: &str,
    ) -> PlatformResult<Option<ResourceInfo>> {
        check(auth)?;
        let state = self.state.read().await;
        Ok(state
            .resources
            .values()
            .find(|r| {
                r.kind == kind && r.parent == parent && r.display_name == name && r.is_usable()
            })
            .cloned())
    }

    async fn log_names(
        &self,
        auth: &Authentication,
        log_group_id: &str,
    ) -> PlatformResult<Vec<String>> {
        check(auth)?;
        let state = self.state.read().await;
        Ok(state
            .resources
            .values()
            .filter(|r| r.kind == ResourceKind::Log && r.parent == log_group_id && r.is_usable())
            .map(|r| r.display_name.clone())
            .collect())
    }

    async fn work_request(
        &self,
        auth: &Authentication,
        handle: &str,
    ) -> PlatformResult<WorkRequestStatus> {
        check(auth)?;
        let mut state = self.state.write().await;
        let Some(request) = state.work_requests.get_mut(handle) else {
            return Err(PlatformError::WorkRequestFailed {
                handle: handle.to_string(),
                reason: "unknown work request".to_string(),
            });
        };

        if let Some(reason) = request.failure.clone() {
            let resource_id = request.resource_id.clone();
            if let Some(resource) = state.resources.get_mut(&resource_id) {
                resource.state = ResourceState::Failed;
            }
            self.save(&state)?;
            return Ok(WorkRequestStatus::Failed { reason });
        }

        if request.polls_left > 0 {
            request.polls_left -= 1;
            self.save(&state)?;
            return Ok(WorkRequestStatus::Pending);
        }

        let resource_id = request.resource_id.clone();
        match state.resources.get_mut(&resource_id) {
            Some(resource) => {
                if resource.state == ResourceState::Creating {
                    resource.state = ResourceState::Active;
                    self.save(&state)?;
                }
                Ok(WorkRequestStatus::Succeeded { resource_id })
            }
            None => Ok(WorkRequestStatus::Failed {
                reason: format!("resource {resource_id} no longer exists"),
            }),
        }
    }

    async fn current_user(&self, auth: &Authentication) -> PlatformResult<Option<UserIdentity>> {
        check(auth)?;
        Ok(self.state.read().await.user.clone())
    }
}

#[async_trait]
impl ResourceFactory for LocalPlatform {
    async fn create(
        &self,
        auth: &Authentication,
        request: CreateRequest,
    ) -> PlatformResult<CreateOutcome> {
        check(auth)?;
        let mut state = self.state.write().await;

        if !state.parent_exists(&request.parent) {
            return Err(PlatformError::Rejected(format!(
                "parent {} of {} '{}' does not exist",
                request.parent, request.kind, request.display_name
            )));
        }
        if matches!(request.kind, ResourceKind::Project | ResourceKind::Log)
            && state.name_taken(request.kind, &request.parent, &request.display_name)
        {
            return Err(PlatformError::AlreadyExists {
                kind: request.kind,
                name: request.display_name,
            });
        }

        let id = state.mint(request.kind.id_token());
        let endpoint = if request.kind == ResourceKind::CodeRepository {
            self.init_repository(&id)?
        } else {
            None
        };
        let asynchronous = matches!(request.kind, ResourceKind::Log | ResourceKind::KnowledgeBase);

        let resource = ResourceInfo {
            id: id.clone(),
            kind: request.kind,
            display_name: request.display_name.clone(),
            parent: request.parent,
            state: if asynchronous {
                ResourceState::Creating
            } else {
                ResourceState::Active
            },
            endpoint: endpoint.clone(),
            content: request.properties.get(CONTENT_PROPERTY).cloned(),
            references: request.references,
            tags: request.tags,
        };
        state.resources.insert(id.clone(), resource);

        let outcome = if asynchronous {
            let handle = state.mint("workrequest");
            state.work_requests.insert(
                handle.clone(),
                WorkRequest {
                    resource_id: id,
                    polls_left: self.settle_after,
                    failure: None,
                },
            );
            CreateOutcome::Pending { handle }
        } else {
            CreateOutcome::Resource(CreatedResource {
                id,
                display_name: request.display_name,
                endpoint,
            })
        };
        self.save(&state)?;
        Ok(outcome)
    }

    async fn update(
        &self,
        auth: &Authentication,
        kind: ResourceKind,
        id: &str,
        update: ResourceUpdate,
    ) -> PlatformResult<()> {
        check(auth)?;
        let mut state = self.state.write().await;
        let resource = state
            .resources
            .get_mut(id)
            .filter(|r| r.kind == kind && r.is_usable())
            .ok_or_else(|| PlatformError::NotFound {
                kind,
                id: id.to_string(),
            })?;
        if let Some(tags) = update.tags {
            resource.tags = tags;
        }
        if let Some(content) = update.content {
            resource.content = Some(content);
        }
        self.save(&state)
    }

    async fn update_policies(
        &self,
        auth: &Authentication,
        request: PolicyRequest,
    ) -> PlatformResult<()> {
        check(auth)?;
        let mut state = self.state.write().await;
        if !state.compartments.contains_key(&request.compartment_id) {
            return Err(PlatformError::Rejected(format!(
                "compartment {} does not exist",
                request.compartment_id
            )));
        }
        state.policies.insert(request.compartment_id);
        state.policies.extend(request.cluster_compartment_id);
        state.policies.extend(request.subnet_compartment_id);
        self.save(&state)
    }

    async fn wait_for_work_request(
        &self,
        auth: &Authentication,
        handle: &str,
    ) -> PlatformResult<String> {
        let started = tokio::time::Instant::now();
        loop {
            match self.work_request(auth, handle).await? {
                WorkRequestStatus::Succeeded { resource_id } => return Ok(resource_id),
                WorkRequestStatus::Failed { reason } => {
                    return Err(PlatformError::WorkRequestFailed {
                        handle: handle.to_string(),
                        reason,
                    });
                }
                WorkRequestStatus::Pending => {
                    if started.elapsed() >= self.poll_timeout {
                        return Err(PlatformError::Unavailable(format!(
                            "work request {handle} did not settle in time"
                        )));
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    async fn delete(
        &self,
        auth: &Authentication,
        kind: ResourceKind,
        id: &str,
    ) -> PlatformResult<()> {
        check(auth)?;
        let mut state = self.state.write().await;
        match state.resources.get(id) {
            Some(resource) if resource.kind == kind => {}
            _ => {
                return Err(PlatformError::NotFound {
                    kind,
                    id: id.to_string(),
                });
            }
        }
        if state.resources.values().any(|r| r.parent == id && r.is_usable()) {
            return Err(PlatformError::Rejected(format!(
                "{kind} {id} still has dependent resources"
            )));
        }
        state.resources.remove(id);
        self.save(&state)?;

        if kind == ResourceKind::CodeRepository
            && let Some(root) = &self.root
        {
            let path = root.join("git").join(format!("{id}.git"));
            if path.exists()
                && let Err(e) = fs::remove_dir_all(&path)
            {
                tracing::warn!("Failed to remove sandbox repository {}: {}", path.display(), e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> Authentication {
        Authentication::new("DEFAULT", "sandbox-1")
    }

    #[tokio::test]
    async fn project_names_are_unique_per_compartment() {
        let platform = LocalPlatform::in_memory();
        let compartment = platform.add_compartment("dev").await.unwrap();

        let request = CreateRequest::new(ResourceKind::Project, "shop", &compartment.id);
        platform.create(&auth(), request.clone()).await.unwrap();
        let err = platform.create(&auth(), request).await.unwrap_err();
        assert!(err.is_name_conflict());
    }

    #[tokio::test]
    async fn work_requests_settle_after_polls() {
        let platform = LocalPlatform::in_memory()
            .with_settle_after(2)
            .with_polling(Duration::from_millis(1), Duration::from_secs(5));
        let compartment = platform.add_compartment("dev").await.unwrap();

        let outcome = platform
            .create(
                &auth(),
                CreateRequest::new(ResourceKind::KnowledgeBase, "shopAudits", &compartment.id),
            )
            .await
            .unwrap();
        let CreateOutcome::Pending { handle } = outcome else {
            panic!("knowledge base creation should be asynchronous");
        };

        assert_eq!(
            platform.work_request(&auth(), &handle).await.unwrap(),
            WorkRequestStatus::Pending
        );
        let id = platform.wait_for_work_request(&auth(), &handle).await.unwrap();
        let kb = platform
            .resource(&auth(), ResourceKind::KnowledgeBase, &id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kb.state, ResourceState::Active);
    }

    #[tokio::test]
    async fn creation_under_missing_parent_is_rejected() {
        let platform = LocalPlatform::in_memory();
        let err = platform
            .create(
                &auth(),
                CreateRequest::new(ResourceKind::BuildStage, "Build", "ocid1.gone"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Rejected(_)));
    }

    #[tokio::test]
    async fn authentication_problems_reject_calls() {
        let platform = LocalPlatform::in_memory();
        let mut auth = auth();
        auth.problem = Some("profile DEFAULT has no key".to_string());
        let err = platform.namespace(&auth).await.unwrap_err();
        assert_eq!(
            err,
            PlatformError::Rejected("profile DEFAULT has no key".to_string())
        );
    }
}

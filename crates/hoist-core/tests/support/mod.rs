#![allow(dead_code)]

pub mod git;

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;

use hoist_core::checkpoint::{Checkpoint, CheckpointStore, ScopedRef};
use hoist_core::collab::{
    Authentication, BuiltinTemplates, Collaborators, ConfigAuthProvider, DescriptorClassifier,
    FileServicesWriter, FixedParameters, RepositoryPopulator,
};
use hoist_core::config::HoistConfig;
use hoist_core::deploy::{DeployRequest, Orchestrator};
use hoist_core::error::PlatformError;
use hoist_core::platform::{
    ClusterInfo, CreateOutcome, CreateRequest, LocalPlatform, PlatformResult, PolicyRequest,
    ResourceDirectory, ResourceFactory, ResourceInfo, ResourceUpdate, WorkRequestStatus,
};
use hoist_core::types::{NamedRef, ResourceKind, Tags, UserIdentity};

pub const REGION: &str = "us-ashburn-1";
pub const PROFILE: &str = "DEFAULT";

pub const GENERIC_DESCRIPTOR: &str = r#"
build_command = "make build"
artifact = "out/app.jar"
"#;

pub const FRAMEWORK_DESCRIPTOR: &str = r#"
type = "framework"
build_command = "./gradlew build"
artifact = "build/libs/app-all.jar"
native_build_command = "./gradlew nativeCompile"
native_artifact = "build/native/nativeCompile/app"
"#;

pub const MULTI_MODULE_DESCRIPTOR: &str = r#"
type = "multi-module"
build_command = "./gradlew build"
artifact = "oci/build/libs/oci-all.jar"
native_build_command = "./gradlew nativeCompile"
native_artifact = "oci/build/native/nativeCompile/oci"
submodules = ["oci", "aws"]
"#;

pub fn auth() -> Authentication {
    Authentication::new(PROFILE, REGION)
}

/// What the next creation of a kind should do instead of succeeding.
#[derive(Debug, Clone)]
pub enum Script {
    /// Fail without creating anything
    Fail(PlatformError),
    /// Never return, as if the process died before sending the request
    HangBeforeCreate,
    /// Create the resource, then never return, as if the process died
    /// before the answer was recorded
    HangAfterCreate,
}

/// Wraps the sandbox, counting creations and replaying scripted failures.
pub struct ScriptedPlatform {
    inner: Arc<LocalPlatform>,
    creates: Mutex<BTreeMap<ResourceKind, usize>>,
    scripts: Mutex<BTreeMap<ResourceKind, VecDeque<Script>>>,
    /// Kind of resource behind each work request handed out
    handles: Mutex<BTreeMap<String, ResourceKind>>,
    wait_failures: Mutex<BTreeMap<ResourceKind, PlatformError>>,
    hung: Notify,
}

impl ScriptedPlatform {
    pub fn new(inner: LocalPlatform) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(inner),
            creates: Mutex::new(BTreeMap::new()),
            scripts: Mutex::new(BTreeMap::new()),
            handles: Mutex::new(BTreeMap::new()),
            wait_failures: Mutex::new(BTreeMap::new()),
            hung: Notify::new(),
        })
    }

    pub fn inner(&self) -> &LocalPlatform {
        &self.inner
    }

    pub fn script(&self, kind: ResourceKind, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(script);
    }

    /// Fail the next wait on a work request for `kind` with `error`, leaving
    /// the resource itself untouched on the platform.
    pub fn fail_wait(&self, kind: ResourceKind, error: PlatformError) {
        self.wait_failures.lock().unwrap().insert(kind, error);
    }

    /// Creation calls of `kind` that reached the platform.
    pub fn creates(&self, kind: ResourceKind) -> usize {
        self.creates
            .lock()
            .unwrap()
            .get(&kind)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_creates(&self) -> usize {
        self.creates.lock().unwrap().values().sum()
    }

    pub fn reset_counts(&self) {
        self.creates.lock().unwrap().clear();
    }

    /// Resolves once a scripted hang has been reached.
    pub async fn hung(&self) {
        self.hung.notified().await
    }

    fn next_script(&self, kind: ResourceKind) -> Option<Script> {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(&kind)
            .and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl ResourceDirectory for ScriptedPlatform {
    async fn namespace(&self, auth: &Authentication) -> PlatformResult<String> {
        self.inner.namespace(auth).await
    }

    async fn compartment(
        &self,
        auth: &Authentication,
        id: &str,
    ) -> PlatformResult<Option<NamedRef>> {
        self.inner.compartment(auth, id).await
    }

    async fn compartments(&self, auth: &Authentication) -> PlatformResult<Vec<NamedRef>> {
        self.inner.compartments(auth).await
    }

    async fn cluster(&self, auth: &Authentication, id: &str) -> PlatformResult<Option<ClusterInfo>> {
        self.inner.cluster(auth, id).await
    }

    async fn clusters(
        &self,
        auth: &Authentication,
        compartment_id: &str,
    ) -> PlatformResult<Vec<ClusterInfo>> {
        self.inner.clusters(auth, compartment_id).await
    }

    async fn subnet(&self, auth: &Authentication, id: &str) -> PlatformResult<Option<ScopedRef>> {
        self.inner.subnet(auth, id).await
    }

    async fn resource(
        &self,
        auth: &Authentication,
        kind: ResourceKind,
        id: &str,
    ) -> PlatformResult<Option<ResourceInfo>> {
        self.inner.resource(auth, kind, id).await
    }

    async fn find_tagged(
        &self,
        auth: &Authentication,
        kind: ResourceKind,
        tags: &Tags,
    ) -> PlatformResult<Vec<ResourceInfo>> {
        self.inner.find_tagged(auth, kind, tags).await
    }

    async fn find_named(
        &self,
        auth: &Authentication,
        kind: ResourceKind,
        parent: &str,
        name: &str,
    ) -> PlatformResult<Option<ResourceInfo>> {
        self.inner.find_named(auth, kind, parent, name).await
    }

    async fn log_names(
        &self,
        auth: &Authentication,
        log_group_id: &str,
    ) -> PlatformResult<Vec<String>> {
        self.inner.log_names(auth, log_group_id).await
    }

    async fn work_request(
        &self,
        auth: &Authentication,
        handle: &str,
    ) -> PlatformResult<WorkRequestStatus> {
        self.inner.work_request(auth, handle).await
    }

    async fn current_user(&self, auth: &Authentication) -> PlatformResult<Option<UserIdentity>> {
        self.inner.current_user(auth).await
    }
}

#[async_trait]
impl ResourceFactory for ScriptedPlatform {
    async fn create(
        &self,
        auth: &Authentication,
        request: CreateRequest,
    ) -> PlatformResult<CreateOutcome> {
        let kind = request.kind;
        *self.creates.lock().unwrap().entry(kind).or_default() += 1;
        match self.next_script(kind) {
            Some(Script::Fail(error)) => Err(error),
            Some(Script::HangBeforeCreate) => {
                self.hung.notify_one();
                std::future::pending::<PlatformResult<CreateOutcome>>().await
            }
            Some(Script::HangAfterCreate) => {
                self.inner.create(auth, request).await?;
                self.hung.notify_one();
                std::future::pending::<PlatformResult<CreateOutcome>>().await
            }
            None => {
                let outcome = self.inner.create(auth, request).await?;
                if let CreateOutcome::Pending { handle } = &outcome {
                    self.handles.lock().unwrap().insert(handle.clone(), kind);
                }
                Ok(outcome)
            }
        }
    }

    async fn update(
        &self,
        auth: &Authentication,
        kind: ResourceKind,
        id: &str,
        update: ResourceUpdate,
    ) -> PlatformResult<()> {
        self.inner.update(auth, kind, id, update).await
    }

    async fn update_policies(
        &self,
        auth: &Authentication,
        request: PolicyRequest,
    ) -> PlatformResult<()> {
        self.inner.update_policies(auth, request).await
    }

    async fn wait_for_work_request(
        &self,
        auth: &Authentication,
        handle: &str,
    ) -> PlatformResult<String> {
        let kind = self.handles.lock().unwrap().get(handle).copied();
        let failure = kind.and_then(|kind| self.wait_failures.lock().unwrap().remove(&kind));
        if let Some(error) = failure {
            return Err(error);
        }
        self.inner.wait_for_work_request(auth, handle).await
    }

    async fn delete(
        &self,
        auth: &Authentication,
        kind: ResourceKind,
        id: &str,
    ) -> PlatformResult<()> {
        self.inner.delete(auth, kind, id).await
    }
}

/// Records pushes instead of running git.
#[derive(Debug, Default)]
pub struct RecordingPopulator {
    pushes: Mutex<Vec<(String, PathBuf)>>,
    failures: Mutex<usize>,
}

impl RecordingPopulator {
    pub fn fail_next(&self, times: usize) {
        *self.failures.lock().unwrap() = times;
    }

    pub fn pushes(&self) -> Vec<(String, PathBuf)> {
        self.pushes.lock().unwrap().clone()
    }
}

#[async_trait]
impl RepositoryPopulator for RecordingPopulator {
    async fn populate(
        &self,
        endpoint: &str,
        folder: &Path,
        _user: Option<&UserIdentity>,
    ) -> anyhow::Result<()> {
        {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                anyhow::bail!("remote hung up unexpectedly");
            }
        }
        self.pushes
            .lock()
            .unwrap()
            .push((endpoint.to_string(), folder.to_path_buf()));
        Ok(())
    }

    fn is_versioned(&self, folder: &Path) -> bool {
        folder.join(".git").exists()
    }
}

/// A sandbox platform, a workspace of folders and a state directory, all
/// inside one temporary directory.
pub struct Harness {
    pub temp: TempDir,
    pub platform: Arc<ScriptedPlatform>,
    pub populator: Arc<RecordingPopulator>,
    pub compartment: NamedRef,
}

impl Harness {
    pub async fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let local = LocalPlatform::open(&temp.path().join("platform"))
            .unwrap()
            .with_settle_after(1)
            .with_polling(Duration::from_millis(1), Duration::from_secs(5));
        let compartment = local.add_compartment("dev").await.unwrap();
        local
            .set_user(UserIdentity {
                name: "Dev".to_string(),
                email: "dev@example.com".to_string(),
            })
            .await
            .unwrap();

        Self {
            temp,
            platform: ScriptedPlatform::new(local),
            populator: Arc::new(RecordingPopulator::default()),
            compartment,
        }
    }

    pub fn workspace(&self) -> PathBuf {
        self.temp.path().join("work")
    }

    /// A folder holding a descriptor and one source file.
    pub fn folder(&self, name: &str, descriptor: &str) -> PathBuf {
        let path = self.workspace().join(name);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("hoist-project.toml"), descriptor).unwrap();
        std::fs::write(path.join("main.txt"), format!("source of {name}\n")).unwrap();
        path
    }

    pub fn config(&self) -> HoistConfig {
        HoistConfig {
            region: Some(REGION.to_string()),
            ..HoistConfig::default()
        }
    }

    pub fn params(&self) -> FixedParameters {
        FixedParameters::new().with_compartment(self.compartment.id.clone())
    }

    /// Add a cluster to the compartment and answer parameters targeting it.
    pub async fn cluster_params(&self) -> FixedParameters {
        self.platform
            .inner()
            .add_cluster(&self.compartment.id, "dev-cluster")
            .await
            .unwrap();
        self.params().with_cluster(true)
    }

    pub fn collaborators(&self, params: FixedParameters) -> Collaborators {
        let params = Arc::new(params);
        Collaborators {
            auth: Arc::new(ConfigAuthProvider::new(&self.config())),
            classifier: Arc::new(DescriptorClassifier),
            populator: self.populator.clone(),
            templates: Arc::new(BuiltinTemplates),
            params: params.clone(),
            names: params,
            services: Arc::new(FileServicesWriter),
        }
    }

    pub fn orchestrator(&self, params: FixedParameters) -> Orchestrator {
        Orchestrator::for_platform(self.platform.clone(), self.collaborators(params))
    }

    pub fn store(&self, key: &str) -> CheckpointStore {
        CheckpointStore::for_workspace(&self.temp.path().join("state"), &self.workspace().join(key))
    }

    /// Load (or start) the checkpoint stored under `key`.
    pub fn checkpoint(&self, key: &str) -> Checkpoint {
        Checkpoint::open(self.store(key)).unwrap()
    }

    pub async fn resources(&self, kind: ResourceKind) -> Vec<ResourceInfo> {
        self.platform.inner().resources(kind).await
    }
}

pub fn request(folders: Vec<PathBuf>) -> DeployRequest {
    DeployRequest::new(folders)
}

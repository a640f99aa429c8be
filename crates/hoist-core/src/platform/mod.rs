//! Remote platform contracts.
//!
//! The orchestrator talks to the platform through two narrow traits:
//! [`ResourceDirectory`] for read-only lookups used during reconciliation and
//! [`ResourceFactory`] for mutations. Both receive the resolved
//! [`Authentication`] on every call and treat it as opaque.

pub mod local;
pub mod request;

pub use local::LocalPlatform;
pub use request::{
    CONTENT_PROPERTY, ClusterInfo, CreateOutcome, CreateRequest, CreatedResource, PolicyRequest, ResourceInfo,
    ResourceState, ResourceUpdate, WorkRequestStatus,
};

use async_trait::async_trait;

use crate::checkpoint::ScopedRef;
use crate::collab::Authentication;
use crate::error::PlatformError;
use crate::types::{NamedRef, ResourceKind, Tags, UserIdentity};

/// Result type for platform calls.
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Read-only lookups against the platform.
///
/// Lookups of a single object return `Ok(None)` when it does not exist;
/// `Err` is reserved for failures of the lookup itself.
#[async_trait]
pub trait ResourceDirectory: Send + Sync {
    /// Object storage namespace of the tenancy.
    async fn namespace(&self, auth: &Authentication) -> PlatformResult<String>;

    async fn compartment(&self, auth: &Authentication, id: &str)
    -> PlatformResult<Option<NamedRef>>;

    async fn compartments(&self, auth: &Authentication) -> PlatformResult<Vec<NamedRef>>;

    async fn cluster(&self, auth: &Authentication, id: &str) -> PlatformResult<Option<ClusterInfo>>;

    async fn clusters(
        &self,
        auth: &Authentication,
        compartment_id: &str,
    ) -> PlatformResult<Vec<ClusterInfo>>;

    async fn subnet(&self, auth: &Authentication, id: &str) -> PlatformResult<Option<ScopedRef>>;

    async fn resource(
        &self,
        auth: &Authentication,
        kind: ResourceKind,
        id: &str,
    ) -> PlatformResult<Option<ResourceInfo>>;

    /// Live resources of `kind` carrying every tag in `tags`.
    async fn find_tagged(
        &self,
        auth: &Authentication,
        kind: ResourceKind,
        tags: &Tags,
    ) -> PlatformResult<Vec<ResourceInfo>>;

    /// Live resource of `kind` with the given display name under `parent`.
    async fn find_named(
        &self,
        auth: &Authentication,
        kind: ResourceKind,
        parent: &str,
        name: &str,
    ) -> PlatformResult<Option<ResourceInfo>>;

    /// Display names of the logs in a log group.
    async fn log_names(&self, auth: &Authentication, log_group_id: &str)
    -> PlatformResult<Vec<String>>;

    async fn work_request(
        &self,
        auth: &Authentication,
        handle: &str,
    ) -> PlatformResult<WorkRequestStatus>;

    /// Identity of the authenticated user, used to author commits.
    async fn current_user(&self, auth: &Authentication) -> PlatformResult<Option<UserIdentity>>;
}

/// Mutating calls against the platform.
#[async_trait]
pub trait ResourceFactory: Send + Sync {
    async fn create(
        &self,
        auth: &Authentication,
        request: CreateRequest,
    ) -> PlatformResult<CreateOutcome>;

    async fn update(
        &self,
        auth: &Authentication,
        kind: ResourceKind,
        id: &str,
        update: ResourceUpdate,
    ) -> PlatformResult<()>;

    async fn update_policies(
        &self,
        auth: &Authentication,
        request: PolicyRequest,
    ) -> PlatformResult<()>;

    /// Poll a work request until it settles; returns the resulting resource id.
    async fn wait_for_work_request(
        &self,
        auth: &Authentication,
        handle: &str,
    ) -> PlatformResult<String>;

    async fn delete(&self, auth: &Authentication, kind: ResourceKind, id: &str)
    -> PlatformResult<()>;
}
